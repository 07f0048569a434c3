//! # Timeline Model
//!
//! Immutable render inputs (clips, captions) and the pure lookups the frame
//! loop performs on them every tick.

pub mod resolver;
pub mod types;

pub use resolver::{active_captions, active_clip, source_position, split_at};
pub use types::{CaptionCue, CaptionEffect, Clip, ClipKind, RenderMode, Timeline};
