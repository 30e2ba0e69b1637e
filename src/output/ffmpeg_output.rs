use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::output::{PixelFormat, SinkError, SinkSession, VideoSink};

/// Pipes raw frames into an `ffmpeg` child, which encodes and forwards them
/// to whatever the output arguments name (network stream, loopback device,
/// file).
pub struct FfmpegOutput {
    binary: String,
    output_args: Vec<String>,
}

impl FfmpegOutput {
    pub fn new(binary: &str, output_args: Vec<String>) -> Self {
        Self {
            binary: binary.to_string(),
            output_args,
        }
    }

    fn command(&self, width: u32, height: u32, format: PixelFormat) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-f", "rawvideo", "-pix_fmt", format.ffmpeg_name()])
            .args(["-s", &format!("{}x{}", width, height)])
            // frames arrive at whatever pace the worker holds
            .args(["-use_wallclock_as_timestamps", "1"])
            .args(["-i", "-"])
            .args(&self.output_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        command
    }
}

impl VideoSink for FfmpegOutput {
    fn open(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        let mut child = self
            .command(width, height, format)
            .spawn()
            .map_err(|e| SinkError::InitFailed(format!("{}: {}", self.binary, e)))?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SinkError::InitFailed("ffmpeg stdin unavailable".into()));
            }
        };

        if let Ok(Some(status)) = child.try_wait() {
            return Err(SinkError::InitFailed(format!(
                "ffmpeg exited immediately with {}",
                status
            )));
        }

        info!(
            "Started {} for {}x{} {:?} (pid {})",
            self.binary,
            width,
            height,
            format,
            child.id()
        );
        Ok(Box::new(FfmpegSession {
            child: Some(child),
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl SinkSession for FfmpegSession {
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::SendFailed("ffmpeg stdin closed".into()))?;
        stdin
            .write_all(frame)
            .map_err(|e| SinkError::SendFailed(format!("ffmpeg: {}", e)))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // EOF on stdin lets ffmpeg flush and exit on its own
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| SinkError::CloseFailed(e.to_string()))?;
        debug!("ffmpeg exited with {}", status);
        if status.success() {
            Ok(())
        } else {
            Err(SinkError::CloseFailed(format!("ffmpeg exited with {}", status)))
        }
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            warn!("Killing ffmpeg process {}", child.id());
            if let Err(e) = child.kill() {
                warn!("Failed to kill ffmpeg: {}", e);
            }
            let _ = child.wait();
        }
    }
}
