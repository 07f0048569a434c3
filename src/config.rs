use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    timeline::RenderMode,
};

/// Main configuration for the Timeline Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Frame loop and seek settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Audio mix bus settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Caption styling
    #[serde(default)]
    pub captions: CaptionConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.encoder.validate()?;
        self.audio.validate()?;
        self.captions.validate()?;
        Ok(())
    }
}

fn invalid<V: ToString>(key: &str, value: V) -> crate::error::CompositorError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Frame loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output frames per timeline second
    pub fps: u32,

    /// Drift between decoder position and target that triggers a seek (seconds)
    pub seek_tolerance: f64,

    /// Drift above which the frame loop waits for the seek to land (seconds)
    pub blocking_seek_threshold: f64,

    /// Upper bound on a blocking seek before the job fails (milliseconds)
    pub seek_timeout_ms: u64,

    /// Reject overlapping clips instead of letting the first match win
    pub reject_overlaps: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            seek_tolerance: 0.05,
            blocking_seek_threshold: 0.5,
            seek_timeout_ms: 5_000,
            reject_overlaps: false,
        }
    }
}

impl RenderConfig {
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > 240 {
            return Err(invalid("render.fps", self.fps));
        }
        if !(self.seek_tolerance > 0.0) {
            return Err(invalid("render.seek_tolerance", self.seek_tolerance));
        }
        if self.blocking_seek_threshold < self.seek_tolerance {
            return Err(invalid(
                "render.blocking_seek_threshold",
                format!("{} (below seek_tolerance {})", self.blocking_seek_threshold, self.seek_tolerance),
            ));
        }
        if self.seek_timeout_ms == 0 {
            return Err(invalid("render.seek_timeout_ms", self.seek_timeout_ms));
        }
        Ok(())
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Height cap in turbo mode
    pub turbo_max_height: u32,

    /// Height cap in quality mode
    pub quality_max_height: u32,

    /// Video bitrate in turbo mode (bits per second)
    pub turbo_video_bitrate: u64,

    /// Video bitrate in quality mode (bits per second)
    pub quality_video_bitrate: u64,

    /// Audio bitrate (bits per second)
    pub audio_bitrate: u64,

    /// ffmpeg binary used for decoding and encoding
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary used for source metadata
    pub ffprobe_path: PathBuf,

    /// Encoder worker threads
    pub threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            turbo_max_height: 720,
            quality_max_height: 1080,
            turbo_video_bitrate: 4_000_000,
            quality_video_bitrate: 12_000_000,
            audio_bitrate: 128_000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            threads: num_cpus::get(),
        }
    }
}

impl EncoderConfig {
    pub fn max_height(&self, mode: RenderMode) -> u32 {
        match mode {
            RenderMode::Turbo => self.turbo_max_height,
            RenderMode::Quality => self.quality_max_height,
        }
    }

    pub fn video_bitrate(&self, mode: RenderMode) -> u64 {
        match mode {
            RenderMode::Turbo => self.turbo_video_bitrate,
            RenderMode::Quality => self.quality_video_bitrate,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.turbo_max_height < 2 {
            return Err(invalid("encoder.turbo_max_height", self.turbo_max_height));
        }
        if self.quality_max_height < 2 {
            return Err(invalid("encoder.quality_max_height", self.quality_max_height));
        }
        if self.turbo_video_bitrate == 0 || self.quality_video_bitrate == 0 || self.audio_bitrate == 0 {
            return Err(invalid(
                "encoder.bitrates",
                format!("{}/{}/{}", self.turbo_video_bitrate, self.quality_video_bitrate, self.audio_bitrate),
            ));
        }
        if self.threads == 0 {
            return Err(invalid("encoder.threads", self.threads));
        }
        Ok(())
    }
}

/// Audio mix bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Bus sample rate (Hz)
    pub sample_rate: u32,

    /// Bus channel count
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(invalid("audio.sample_rate", self.sample_rate));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(invalid("audio.channels", self.channels));
        }
        Ok(())
    }
}

/// Caption styling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Font file; system fonts are searched when unset
    pub font_path: Option<PathBuf>,

    /// Font size as a fraction of the output height
    pub font_scale: f32,

    /// Outline stroke width in pixels at scale 1, centred on the glyph edge
    pub outline_width: f32,

    /// Baseline centre as a fraction of the output height
    pub baseline: f32,

    /// Gradient start colour (left)
    pub gradient_start: [u8; 3],

    /// Gradient end colour (right)
    pub gradient_end: [u8; 3],

    /// Outline colour
    pub outline_color: [u8; 3],
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_scale: 0.12,
            outline_width: 8.0,
            baseline: 0.8,
            gradient_start: [0xf4, 0x72, 0xb6],
            gradient_end: [0x63, 0x66, 0xf1],
            outline_color: [0, 0, 0],
        }
    }
}

impl CaptionConfig {
    fn validate(&self) -> Result<()> {
        if !(self.font_scale > 0.0 && self.font_scale <= 1.0) {
            return Err(invalid("captions.font_scale", self.font_scale));
        }
        if self.outline_width < 0.0 {
            return Err(invalid("captions.outline_width", self.outline_width));
        }
        if !(0.0..=1.0).contains(&self.baseline) {
            return Err(invalid("captions.baseline", self.baseline));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.fps, 60);
        assert_eq!(config.encoder.max_height(RenderMode::Turbo), 720);
        assert_eq!(config.encoder.video_bitrate(RenderMode::Quality), 12_000_000);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.render.seek_timeout_ms = 750;
        original_config.captions.font_path = Some(PathBuf::from("/fonts/Outfit-Black.ttf"));

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.render.seek_timeout_ms, 750);
        assert_eq!(loaded_config.captions.font_path, original_config.captions.font_path);
        assert_eq!(loaded_config.audio.sample_rate, original_config.audio.sample_rate);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[render]\nfps = 30\n").unwrap();
        assert_eq!(config.render.fps, 30);
        assert_eq!(config.render.seek_tolerance, 0.05);
        assert_eq!(config.encoder.turbo_video_bitrate, 4_000_000);
    }

    #[test]
    fn test_invalid_seek_thresholds() {
        let mut config = Config::default();
        config.render.blocking_seek_threshold = 0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_audio_channels() {
        let mut config = Config::default();
        config.audio.channels = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::CompositorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
