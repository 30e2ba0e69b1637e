#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::capture::xcap_source::display_geometry;
use crate::capture::{FrameSource, XcapScreen};
use crate::preview::PreviewStreamer;
use crate::result::Result;
use crate::server::AppState;
use crate::streaming::{CaptureController, ControllerOptions};

mod capture;
mod config;
mod output;
mod pacing;
mod performance_profiler;
mod preview;
mod result;
mod server;
mod shutdown;
mod streaming;
#[cfg(test)]
mod testing;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config, created with defaults if missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Address to serve the control API on, overrides the config
    #[arg(short, long)]
    bind: Option<String>,

    /// Monitor index to capture, overrides the config
    #[arg(short, long)]
    display: Option<usize>,

    /// Log per-second capture throughput
    #[arg(long, default_value_t = false)]
    profiler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let mut config = config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.display.is_some() {
        config.display = args.display;
    }

    let geometry = display_geometry(config.display)?;
    info!(
        "Capturing display {} ({}x{})",
        geometry.name, geometry.width, geometry.height
    );
    let source = Arc::new(FrameSource::new(XcapScreen::new(config.display), &geometry));

    let sink: Arc<dyn output::VideoSink> = Arc::from(output::from_config(&config.sink));
    info!("Video sink: {}", config.sink.name);

    let controller = Arc::new(CaptureController::new(
        source.clone(),
        sink,
        ControllerOptions {
            pixel_format: config.sink.pixel_format,
            frame_rate: config.frame_rate,
            stop_timeout: config.stop_timeout(),
            profiler: args.profiler,
        },
    ));
    shutdown::install_panic_hook(controller.clone());

    let shutdown_token = CancellationToken::new();
    let state = AppState {
        controller: controller.clone(),
        preview: Arc::new(PreviewStreamer::new(source, config.preview.clone())),
        shutdown: shutdown_token.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown::wait_for_signal(shutdown_token.clone()))
        .await;

    shutdown_token.cancel();
    controller.shutdown().await;
    served?;
    Ok(())
}
