//! # Video Module
//!
//! Frame surface types, the seekable source, codec negotiation and the
//! encoder sink. Decoding and encoding both run through external ffmpeg
//! processes driven over pipes.

pub mod codec;
pub mod encoder;
pub mod source;
pub mod types;

pub use codec::{negotiate, negotiate_with, parse_encoder_list, probe_encoders, CodecProfile, PREFERENCES};
pub use encoder::{EncodeSettings, EncodedMedia, EncoderSink, FfmpegEncoderSink};
pub use source::{probe_video, FfmpegVideoSource, VideoMetadata, VideoSource};
pub use types::{Frame, OutputGeometry};
