//! Pure timeline lookups: which clip and which captions are live at an
//! instant, and where that instant lands in the clip's source media.

use crate::timeline::types::{CaptionCue, Clip};

/// First clip in list order whose half-open timeline interval contains `t`.
///
/// Overlapping clips are not arbitrated: the earliest entry in the list wins.
pub fn active_clip(clips: &[Clip], t: f64) -> Option<&Clip> {
    clips.iter().find(|clip| clip.contains(t))
}

/// Every caption visible at `t`, in list order
pub fn active_captions(captions: &[CaptionCue], t: f64) -> impl Iterator<Item = &CaptionCue> {
    captions.iter().filter(move |cue| cue.is_active(t))
}

/// Map a timeline instant inside `clip` to a position in its source media.
///
/// The result is clamped to `[source_start, source_end)`.
pub fn source_position(clip: &Clip, t: f64) -> f64 {
    let position = clip.source_start + (t - clip.timeline_start) * clip.playback_rate;
    position.clamp(clip.source_start, just_below(clip.source_end))
}

/// Cut `clip` at timeline instant `t`.
///
/// Returns `None` unless `t` lies strictly inside the clip. Both halves keep the
/// rate and filter; ids get `-a`/`-b` suffixes.
pub fn split_at(clip: &Clip, t: f64) -> Option<(Clip, Clip)> {
    if t <= clip.timeline_start || t >= clip.timeline_end() {
        return None;
    }

    let cut = clip.source_start + (t - clip.timeline_start) * clip.playback_rate;

    let mut head = clip.clone();
    head.id = format!("{}-a", clip.id);
    head.source_end = cut;

    let mut tail = clip.clone();
    tail.id = format!("{}-b", clip.id);
    tail.source_start = cut;
    tail.timeline_start = t;

    Some((head, tail))
}

/// Largest f64 strictly less than `x`
fn just_below(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        return x;
    }
    if x == 0.0 {
        return -f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits - 1)
    } else {
        f64::from_bits(bits + 1)
    }
}
