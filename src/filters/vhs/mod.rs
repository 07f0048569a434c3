//! # VHS Filter
//!
//! Recreates the look of VHS tapes with scan lines, color bleeding,
//! tracking errors, and characteristic noise patterns.

mod effect;

pub use effect::VhsFilter;

/// Relative strength of each VHS artefact at amount 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VhsSettings {
    pub scanline_intensity: f32,
    pub color_bleeding: f32,
    pub tracking_error: f32,
    pub noise_level: f32,
    pub chroma_shift: f32,
    pub saturation_boost: f32,
    /// Mixed with the frame index to seed noise
    pub seed: u64,
}

impl Default for VhsSettings {
    fn default() -> Self {
        Self {
            scanline_intensity: 0.9,
            color_bleeding: 0.8,
            tracking_error: 0.5,
            noise_level: 0.6,
            chroma_shift: 0.7,
            saturation_boost: 0.4,
            seed: 0x5648_5331,
        }
    }
}
