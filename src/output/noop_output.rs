use crate::output::{PixelFormat, SinkError, SinkSession, VideoSink};

/// Voids outputs, for dry runs.
pub struct NoOpOutput;

impl NoOpOutput {
    pub fn new() -> Self {
        Self {}
    }
}

impl VideoSink for NoOpOutput {
    fn open(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        info!("Discarding {}x{} {:?} frames", width, height, format);
        Ok(Box::new(NoOpSession))
    }
}

struct NoOpSession;

impl SinkSession for NoOpSession {
    fn send(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
