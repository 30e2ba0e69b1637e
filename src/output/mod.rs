use serde::{Deserialize, Serialize};

use crate::config::{SinkConfig, SinkKind};

/// Pixel layout a sink session consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Yuv420p,
}

impl PixelFormat {
    /// Bytes in one frame of the given size.
    pub fn frame_size(self, width: usize, height: usize) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => width * height * 4,
            PixelFormat::Yuv420p => width * height + 2 * ((width + 1) / 2) * ((height + 1) / 2),
        }
    }

    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Yuv420p => "yuv420p",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to open video sink: {0}")]
    InitFailed(String),

    #[error("Failed to send frame to video sink: {0}")]
    SendFailed(String),

    #[error("Failed to close video sink: {0}")]
    CloseFailed(String),
}

/// Opens sessions on a video output. Each streaming worker opens exactly one.
pub trait VideoSink: Send + Sync + 'static {
    fn open(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Box<dyn SinkSession>, SinkError>;
}

pub trait SinkSession: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError>;
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Owns an open session and releases it exactly once: through
/// [`SessionGuard::close`], or on drop if that never ran.
pub struct SessionGuard {
    session: Option<Box<dyn SinkSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn SinkSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        match self.session.as_mut() {
            Some(session) => session.send(frame),
            None => Err(SinkError::SendFailed("session already released".into())),
        }
    }

    pub fn close(&mut self) -> Result<(), SinkError> {
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            warn!("Sink session dropped without close, releasing");
            if let Err(e) = session.close() {
                warn!("{}", e);
            }
        }
    }
}

pub fn from_config(config: &SinkConfig) -> Box<dyn VideoSink> {
    match config.kind {
        SinkKind::Ffmpeg => Box::new(FfmpegOutput::new(
            &config.ffmpeg_binary,
            config.ffmpeg_output_args.clone(),
        )),
        SinkKind::File => Box::new(FileOutput::new(&config.path)),
        SinkKind::Noop => Box::new(NoOpOutput::new()),
    }
}

mod ffmpeg_output;
mod file_output;
mod noop_output;

pub use ffmpeg_output::FfmpegOutput;
pub use file_output::FileOutput;
pub use noop_output::NoOpOutput;
