use std::fmt;

use thiserror::Error;

/// Main error type for the Timeline Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render-input errors. All of these are raised before any resource is allocated.
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Timeline is empty: no clips and no captions")]
    Empty,

    #[error("Invalid clip '{id}': {reason}")]
    InvalidClip { id: String, reason: String },

    #[error("Invalid caption '{text}': {reason}")]
    InvalidCaption { text: String, reason: String },

    #[error("Clips '{first}' and '{second}' overlap on the {track} track")]
    Overlap {
        track: String,
        first: String,
        second: String,
    },

    #[error("Failed to parse timeline description {path}: {reason}")]
    ParseFailed { path: String, reason: String },
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },

    #[error("Failed to write mixed audio bus: {reason}")]
    BusWriteFailed { reason: String },
}

/// Video-specific errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to load video file: {path}")]
    LoadFailed { path: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Seek to {target:.3}s did not complete within {timeout_ms}ms")]
    SeekTimeout { target: f64, timeout_ms: u64 },

    #[error("Seek to {target:.3}s failed: {reason}")]
    SeekFailed { target: f64, reason: String },

    #[error("Frame processing failed: {reason}")]
    FrameProcessingFailed { reason: String },

    #[error("Required asset missing: {asset}")]
    AssetMissing { asset: String },
}

/// Encoder negotiation and runtime capture errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("No supported codec pair found (tried: {tried})")]
    NoSupportedCodec { tried: String },

    #[error("Encoder backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Encoder reported an error while capturing: {reason}")]
    CaptureFailed { reason: String },

    #[error("Failed to finalize encoded output: {reason}")]
    FinalizeFailed { reason: String },
}

/// Visual filter errors
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Filter not found: {name}")]
    NotFound { name: String },

    #[error("Malformed filter expression: {expression}")]
    Malformed { expression: String },

    #[error("Filter application failed: {filter} - {reason}")]
    ApplyFailed { filter: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

/// Pipeline stage a failure is attributed to when reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    EmptyTimeline,
    Input,
    Decode,
    Seek,
    Encode,
    Config,
    Io,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EmptyTimeline => "empty-timeline",
            Self::Input => "input",
            Self::Decode => "decode",
            Self::Seek => "seek",
            Self::Encode => "encode",
            Self::Config => "config",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

impl CompositorError {
    /// The stage that failed
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Timeline(TimelineError::Empty) => FailureStage::EmptyTimeline,
            Self::Timeline(_) | Self::Filter(FilterError::NotFound { .. }) => FailureStage::Input,
            Self::Filter(FilterError::Malformed { .. }) => FailureStage::Input,
            Self::Filter(FilterError::ApplyFailed { .. }) => FailureStage::Decode,
            Self::Audio(_) => FailureStage::Decode,
            Self::Video(VideoError::SeekTimeout { .. } | VideoError::SeekFailed { .. }) => {
                FailureStage::Seek
            }
            Self::Video(_) => FailureStage::Decode,
            Self::Encoder(_) => FailureStage::Encode,
            Self::Config(_) => FailureStage::Config,
            Self::Io(_) => FailureStage::Io,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeline(TimelineError::Empty) => {
                "Nothing to render: add at least one clip or caption.".to_string()
            }
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::LoadFailed { path }) => {
                format!("Could not load video file '{}'. Please check the file exists and that ffprobe is installed.", path)
            }
            Self::Encoder(EncoderError::NoSupportedCodec { .. }) => {
                "No usable encoder found. Install an ffmpeg build with libvpx/libopus or libx264.".to_string()
            }
            Self::Filter(FilterError::NotFound { name }) => {
                format!("Filter '{}' not found. Available filters: none, grayscale, sepia, invert, brightness, contrast, saturate, vhs", name)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => format!("{} failed: {}", self.stage(), self),
        }
    }
}
