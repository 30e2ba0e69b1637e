use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::output::PixelFormat;
use crate::pacing::FrameRate;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Monitor index; the primary monitor when absent.
    #[serde(default)]
    pub display: Option<usize>,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: FrameRate,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_fps")]
    pub fps: FrameRate,
    #[serde(default = "default_scale_percent")]
    pub scale_percent: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Ffmpeg,
    File,
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,
    #[serde(default = "default_sink_name")]
    pub name: String,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    #[serde(default = "default_sink_path")]
    pub path: String,
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,
    #[serde(default = "default_ffmpeg_output_args")]
    pub ffmpeg_output_args: Vec<String>,
}

impl Config {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            display: None,
            frame_rate: default_frame_rate(),
            stop_timeout_ms: default_stop_timeout_ms(),
            preview: PreviewConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            fps: default_preview_fps(),
            scale_percent: default_scale_percent(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            name: default_sink_name(),
            pixel_format: default_pixel_format(),
            path: default_sink_path(),
            ffmpeg_binary: default_ffmpeg_binary(),
            ffmpeg_output_args: default_ffmpeg_output_args(),
        }
    }
}

pub fn load(path: &Path) -> Result<Config> {
    // create a new file if it does not exist
    if !path.exists() {
        let mut file = File::create(path)?;
        let config = Config::default();
        info!("Writing default config to {}", path.display());
        file.write_all(toml::to_string(&config)?.as_ref())?;
        return Ok(config);
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let config: Config = toml::from_str(&contents)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(1..=100).contains(&config.preview.scale_percent) {
        anyhow::bail!(
            "preview.scale_percent must be within 1..=100, got {}",
            config.preview.scale_percent
        );
    }
    if !(1..=100).contains(&config.preview.jpeg_quality) {
        anyhow::bail!(
            "preview.jpeg_quality must be within 1..=100, got {}",
            config.preview.jpeg_quality
        );
    }
    if config.stop_timeout_ms == 0 {
        anyhow::bail!("stop_timeout_ms must be positive");
    }
    Ok(())
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_frame_rate() -> FrameRate {
    FrameRate::constant(30)
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_preview_fps() -> FrameRate {
    FrameRate::constant(5)
}

fn default_scale_percent() -> u32 {
    50
}

fn default_jpeg_quality() -> u8 {
    70
}

fn default_sink_kind() -> SinkKind {
    SinkKind::Ffmpeg
}

fn default_sink_name() -> String {
    "Screen Capture".to_string()
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Rgba
}

fn default_sink_path() -> String {
    "screen.raw".to_string()
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_ffmpeg_output_args() -> Vec<String> {
    [
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
        "-f",
        "mpegts",
        "udp://127.0.0.1:1234",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
