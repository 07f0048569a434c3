//! # Captions
//!
//! Animated caption cues drawn over the composited frame. Each cue is
//! rendered with a black outline and a pink-to-indigo gradient fill, and
//! animated by its effect: `pop`, `fade` or `slide`.

pub mod animation;
pub mod renderer;

pub use animation::{animate, CaptionStyle};
pub use renderer::{find_system_font, CaptionRenderer};
