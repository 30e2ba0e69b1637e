//! Low-bandwidth preview feed: one independent loop per WebSocket viewer,
//! pushing downscaled JPEG frames as `data:` URIs at a fixed cadence.
//!
//! Viewers share the [`FrameSource`] with the streaming worker but never the
//! sink. A failed push ends that viewer's loop and nothing else.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, RgbaImage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{CaptureError, Frame, FrameSource};
use crate::config::PreviewConfig;
use crate::pacing::pace_delay;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to encode preview: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Preview frame does not match its dimensions")]
    MalformedFrame,

    #[error("Preview task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct PreviewStreamer {
    source: Arc<FrameSource>,
    config: PreviewConfig,
}

impl PreviewStreamer {
    pub fn new(source: Arc<FrameSource>, config: PreviewConfig) -> Self {
        Self { source, config }
    }

    /// Captures and encodes one preview frame off the async runtime.
    pub async fn next_payload(&self) -> Result<String, PreviewError> {
        let source = self.source.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let frame = source.capture_frame()?;
            encode_preview(frame, &config)
        })
        .await?
    }

    /// Runs one viewer's loop until it disconnects, a push fails, or
    /// `shutdown` fires.
    pub async fn serve(self: Arc<Self>, socket: WebSocket, shutdown: CancellationToken) {
        let viewer = Uuid::new_v4();
        info!("Preview viewer {} connected", viewer);
        let (mut sender, mut receiver) = socket.split();
        let mut frames = 0u64;

        loop {
            let started = Instant::now();
            match self.next_payload().await {
                Ok(payload) => {
                    if let Err(e) = sender.send(Message::Text(payload)).await {
                        debug!("Preview viewer {} push failed: {}", viewer, e);
                        break;
                    }
                    frames += 1;
                }
                Err(PreviewError::Task(e)) => {
                    warn!("Preview viewer {}: {}", viewer, e);
                    break;
                }
                Err(e) => debug!("Preview viewer {} skipping frame: {}", viewer, e),
            }

            // inbound traffic is drained but never shortens the wait
            let deadline = tokio::time::Instant::now() + pace_delay(self.config.fps, started);
            let open = loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break true,
                    msg = receiver.next() => match msg {
                        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break false,
                        Some(Ok(_)) => {}
                    },
                    _ = shutdown.cancelled() => {
                        let _ = sender.send(Message::Close(None)).await;
                        break false;
                    }
                }
            };
            if !open {
                break;
            }
        }

        info!("Preview viewer {} disconnected after {} frames", viewer, frames);
    }
}

/// Downscales with area averaging, encodes as JPEG and wraps the result as
/// an inline `data:` URI.
pub fn encode_preview(frame: Frame, config: &PreviewConfig) -> Result<String, PreviewError> {
    let (width, height) = (frame.width(), frame.height());
    let image =
        RgbaImage::from_raw(width, height, frame.into_rgba()).ok_or(PreviewError::MalformedFrame)?;

    let scaled_width = (width * config.scale_percent / 100).max(1);
    let scaled_height = (height * config.scale_percent / 100).max(1);
    let small = imageops::thumbnail(&image, scaled_width, scaled_height);
    let rgb = DynamicImage::ImageRgba8(small).into_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality).encode_image(&rgb)?;

    let mut payload = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    payload.push_str(DATA_URI_PREFIX);
    STANDARD.encode_string(&jpeg, &mut payload);
    Ok(payload)
}
