use std::f64::consts::PI;

use crate::timeline::CaptionEffect;

/// Fraction of a cue's lifetime spent fading in or out
const FADE_SPAN: f64 = 0.2;

/// Fraction of a cue's lifetime spent sliding into place
const SLIDE_SPAN: f64 = 0.25;

/// Distance a sliding cue travels, as a fraction of frame height
const SLIDE_DISTANCE: f64 = 0.1;

/// Per-frame presentation of a caption cue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionStyle {
    /// Multiplier on font size and outline width
    pub scale: f64,
    /// 0 is invisible, 1 is opaque
    pub opacity: f64,
    /// Downward offset from the resting position, as a fraction of frame height
    pub offset_y: f64,
}

impl CaptionStyle {
    pub const RESTING: CaptionStyle = CaptionStyle {
        scale: 1.0,
        opacity: 1.0,
        offset_y: 0.0,
    };

    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0 && self.scale > 0.0
    }
}

/// Evaluate an effect at progress `p` through the cue (clamped to [0, 1])
pub fn animate(effect: CaptionEffect, p: f64) -> CaptionStyle {
    let p = p.clamp(0.0, 1.0);
    match effect {
        CaptionEffect::Pop => CaptionStyle {
            scale: 0.5 + (p * PI).sin() * 0.7,
            ..CaptionStyle::RESTING
        },
        CaptionEffect::Fade => CaptionStyle {
            opacity: fade_envelope(p, FADE_SPAN, FADE_SPAN),
            ..CaptionStyle::RESTING
        },
        CaptionEffect::Slide => {
            let q = (p / SLIDE_SPAN).min(1.0);
            let eased = 1.0 - (1.0 - q).powi(3);
            CaptionStyle {
                scale: 1.0,
                opacity: fade_envelope(p, SLIDE_SPAN, FADE_SPAN),
                offset_y: SLIDE_DISTANCE * (1.0 - eased),
            }
        }
    }
}

/// Linear ramp up over `fade_in`, hold, linear ramp down over `fade_out`
fn fade_envelope(p: f64, fade_in: f64, fade_out: f64) -> f64 {
    (p / fade_in).min((1.0 - p) / fade_out).clamp(0.0, 1.0)
}
