use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::output::{PixelFormat, SinkError, SinkSession, VideoSink};

/// Writes raw frames back to back into a file or device node
/// (e.g. a v4l2loopback device).
pub struct FileOutput {
    path: PathBuf,
}

impl FileOutput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl VideoSink for FileOutput {
    fn open(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| SinkError::InitFailed(format!("{}: {}", self.path.display(), e)))?;
        info!(
            "Writing {}x{} {:?} frames to {}",
            width,
            height,
            format,
            self.path.display()
        );
        Ok(Box::new(FileSession {
            file,
            frame_size: format.frame_size(width as usize, height as usize),
        }))
    }
}

struct FileSession {
    file: File,
    frame_size: usize,
}

impl SinkSession for FileSession {
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if frame.len() != self.frame_size {
            return Err(SinkError::SendFailed(format!(
                "frame has {} bytes, expected {}",
                frame.len(),
                self.frame_size
            )));
        }
        self.file
            .write_all(frame)
            .map_err(|e| SinkError::SendFailed(e.to_string()))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.file
            .flush()
            .map_err(|e| SinkError::CloseFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_appended_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.rgba");
        let output = FileOutput::new(&path);

        let mut session = output.open(1, 1, PixelFormat::Rgba).unwrap();
        session.send(&[1, 2, 3, 4]).unwrap();
        session.send(&[5, 6, 7, 8]).unwrap();
        session.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn wrong_sized_frames_fail_to_send() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new(dir.path().join("frames.rgba"));
        let mut session = output.open(2, 2, PixelFormat::Rgba).unwrap();
        assert!(matches!(
            session.send(&[0; 4]),
            Err(SinkError::SendFailed(_))
        ));
    }

    #[test]
    fn unopenable_path_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new(dir.path().join("missing").join("frames.rgba"));
        assert!(matches!(
            output.open(1, 1, PixelFormat::Rgba),
            Err(SinkError::InitFailed(_))
        ));
    }
}
