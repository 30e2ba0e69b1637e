//! Process-exit hooks.

use std::panic;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::streaming::CaptureController;

/// Resolves on Ctrl-C (or SIGTERM on unix) and cancels `token`. Also
/// resolves if `token` is cancelled from elsewhere.
pub async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}

/// Chains a panic hook that tells the streaming worker to stop before the
/// previous hook runs, so a crash elsewhere still releases the sink.
pub fn install_panic_hook(controller: Arc<CaptureController>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        controller.teardown();
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn external_cancellation_ends_the_wait() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(wait_for_signal(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
