use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};

/// Which track a clip belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Audio,
}

impl ClipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipKind::Video => "video",
            ClipKind::Audio => "audio",
        }
    }
}

/// A trimmed, re-timed reference into one source media asset.
///
/// The clip plays the half-open source interval `[source_start, source_end)`
/// beginning at `timeline_start` on the output timeline. Source time advances
/// `playback_rate` seconds per output second, so the clip occupies
/// `(source_end - source_start) / playback_rate` seconds of timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,

    #[serde(rename = "type", alias = "kind")]
    pub kind: ClipKind,

    #[serde(alias = "startTime")]
    pub source_start: f64,

    #[serde(alias = "endTime")]
    pub source_end: f64,

    pub timeline_start: f64,

    #[serde(default = "default_playback_rate")]
    pub playback_rate: f64,

    /// Filter expression such as `none`, `grayscale` or `sepia(60%)`; video only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_playback_rate() -> f64 {
    1.0
}

impl Clip {
    pub fn video<S: Into<String>>(id: S, source_start: f64, source_end: f64, timeline_start: f64) -> Self {
        Self {
            id: id.into(),
            kind: ClipKind::Video,
            source_start,
            source_end,
            timeline_start,
            playback_rate: 1.0,
            filter: None,
        }
    }

    pub fn audio<S: Into<String>>(id: S, source_start: f64, source_end: f64, timeline_start: f64) -> Self {
        Self {
            id: id.into(),
            kind: ClipKind::Audio,
            source_start,
            source_end,
            timeline_start,
            playback_rate: 1.0,
            filter: None,
        }
    }

    pub fn with_rate(mut self, playback_rate: f64) -> Self {
        self.playback_rate = playback_rate;
        self
    }

    pub fn with_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Seconds of output timeline this clip occupies
    pub fn duration(&self) -> f64 {
        (self.source_end - self.source_start) / self.playback_rate
    }

    /// Exclusive end of the clip on the output timeline
    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.duration()
    }

    /// Whether `t` falls in `[timeline_start, timeline_end)`
    pub fn contains(&self, t: f64) -> bool {
        t >= self.timeline_start && t < self.timeline_end()
    }

    /// Filter expression, with `None` meaning the identity transform
    pub fn filter_expression(&self) -> &str {
        self.filter.as_deref().unwrap_or("none")
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> crate::error::CompositorError {
            TimelineError::InvalidClip {
                id: self.id.clone(),
                reason: reason.to_string(),
            }
            .into()
        };

        if !self.source_start.is_finite() || !self.source_end.is_finite() {
            return Err(invalid("source interval must be finite"));
        }
        if self.source_start < 0.0 {
            return Err(invalid("sourceStart must not be negative"));
        }
        if self.source_end <= self.source_start {
            return Err(invalid("sourceEnd must be greater than sourceStart"));
        }
        if !self.timeline_start.is_finite() || self.timeline_start < 0.0 {
            return Err(invalid("timelineStart must be a non-negative number"));
        }
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(invalid("playbackRate must be a positive number"));
        }
        if self.kind == ClipKind::Audio && self.filter.is_some() {
            return Err(invalid("audio clips cannot carry a visual filter"));
        }
        Ok(())
    }
}

/// Animation curve applied across a caption's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionEffect {
    #[default]
    Pop,
    Fade,
    Slide,
}

/// A timed text overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionCue {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub effect: CaptionEffect,
}

impl CaptionCue {
    pub fn new<S: Into<String>>(text: S, start_time: f64, end_time: f64, effect: CaptionEffect) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
            effect,
        }
    }

    /// Captions are visible on the closed interval `[start_time, end_time]`
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.start_time && t <= self.end_time
    }

    /// Normalized lifetime progress in `[0, 1]`
    pub fn progress(&self, t: f64) -> f64 {
        ((t - self.start_time) / (self.end_time - self.start_time)).clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        let reason = if !self.start_time.is_finite() || !self.end_time.is_finite() {
            Some("times must be finite")
        } else if self.start_time < 0.0 {
            Some("startTime must not be negative")
        } else if self.end_time <= self.start_time {
            Some("endTime must be greater than startTime")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(TimelineError::InvalidCaption {
                text: self.text.clone(),
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Output quality/speed trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Lower resolution cap and bitrate for faster output
    #[default]
    Turbo,
    Quality,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Turbo => f.write_str("turbo"),
            RenderMode::Quality => f.write_str("quality"),
        }
    }
}

/// Immutable aggregate of every clip and caption of one render job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    #[serde(default)]
    pub video_clips: Vec<Clip>,

    #[serde(default)]
    pub audio_clips: Vec<Clip>,

    #[serde(default, alias = "subtitles")]
    pub captions: Vec<CaptionCue>,
}

impl Timeline {
    pub fn new(video_clips: Vec<Clip>, audio_clips: Vec<Clip>, captions: Vec<CaptionCue>) -> Self {
        Self {
            video_clips,
            audio_clips,
            captions,
        }
    }

    /// Load a timeline description from a JSON file
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            TimelineError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.video_clips.is_empty() && self.audio_clips.is_empty() && self.captions.is_empty()
    }

    /// Latest clip end or caption end, with a one second floor
    pub fn total_duration(&self) -> f64 {
        let clip_end = self
            .video_clips
            .iter()
            .chain(self.audio_clips.iter())
            .map(Clip::timeline_end)
            .fold(0.0_f64, f64::max);

        let caption_end = self
            .captions
            .iter()
            .map(|c| c.end_time)
            .fold(0.0_f64, f64::max);

        let total = clip_end.max(caption_end);
        if total > 0.0 {
            total
        } else {
            1.0
        }
    }

    /// Check every clip and caption, rejecting empty timelines first
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(TimelineError::Empty.into());
        }

        for (expected, clips) in [
            (ClipKind::Video, &self.video_clips),
            (ClipKind::Audio, &self.audio_clips),
        ] {
            let mut seen = HashSet::new();
            for clip in clips {
                if !seen.insert(clip.id.as_str()) {
                    return Err(TimelineError::InvalidClip {
                        id: clip.id.clone(),
                        reason: format!("duplicate id on the {} track", expected.as_str()),
                    }
                    .into());
                }
                if clip.kind != expected {
                    return Err(TimelineError::InvalidClip {
                        id: clip.id.clone(),
                        reason: format!(
                            "{} clip placed on the {} track",
                            clip.kind.as_str(),
                            expected.as_str()
                        ),
                    }
                    .into());
                }
                clip.validate()?;
            }
        }

        for cue in &self.captions {
            cue.validate()?;
        }

        Ok(())
    }

    /// Pairs of clip ids that overlap within a track, in list order
    pub fn overlaps(&self, kind: ClipKind) -> Vec<(String, String)> {
        let clips = match kind {
            ClipKind::Video => &self.video_clips,
            ClipKind::Audio => &self.audio_clips,
        };

        let mut pairs = Vec::new();
        for (i, a) in clips.iter().enumerate() {
            for b in &clips[i + 1..] {
                if a.timeline_start < b.timeline_end() && b.timeline_start < a.timeline_end() {
                    pairs.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration_honors_rate() {
        let clip = Clip::video("v1", 0.0, 10.0, 0.0).with_rate(2.0);
        assert_eq!(clip.duration(), 5.0);
        assert_eq!(clip.timeline_end(), 5.0);
    }

    #[test]
    fn test_total_duration_scenario_a() {
        let timeline = Timeline::new(
            vec![Clip::video("v1", 0.0, 10.0, 0.0)],
            vec![Clip::audio("a1", 0.0, 10.0, 0.0)],
            vec![],
        );
        assert_eq!(timeline.total_duration(), 10.0);
    }

    #[test]
    fn test_total_duration_includes_captions() {
        let timeline = Timeline::new(
            vec![Clip::video("v1", 0.0, 4.0, 0.0)],
            vec![],
            vec![CaptionCue::new("LATE", 5.0, 7.5, CaptionEffect::Fade)],
        );
        assert_eq!(timeline.total_duration(), 7.5);
    }

    #[test]
    fn test_empty_timeline_has_one_second_floor_but_fails_validation() {
        let timeline = Timeline::default();
        assert_eq!(timeline.total_duration(), 1.0);
        assert!(matches!(
            timeline.validate(),
            Err(crate::error::CompositorError::Timeline(TimelineError::Empty))
        ));
    }

    #[test]
    fn test_degenerate_clip_rejected() {
        let timeline = Timeline::new(vec![Clip::video("v1", 5.0, 5.0, 0.0)], vec![], vec![]);
        assert!(timeline.validate().is_err());

        let timeline = Timeline::new(vec![Clip::video("v1", 0.0, 5.0, 0.0).with_rate(0.0)], vec![], vec![]);
        assert!(timeline.validate().is_err());
    }

    #[test]
    fn test_duplicate_clip_id_rejected_per_track() {
        let timeline = Timeline::new(
            vec![
                Clip::video("v", 0.0, 2.0, 0.0).with_filter("invert"),
                Clip::video("v", 2.0, 4.0, 2.0),
            ],
            vec![],
            vec![],
        );
        let err = timeline.validate().unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Input);
        assert!(matches!(
            err,
            crate::error::CompositorError::Timeline(TimelineError::InvalidClip { ref id, .. }) if id == "v"
        ));

        // The same id on different tracks is fine
        let timeline = Timeline::new(
            vec![Clip::video("c1", 0.0, 2.0, 0.0)],
            vec![Clip::audio("c1", 0.0, 2.0, 0.0)],
            vec![],
        );
        assert!(timeline.validate().is_ok());
    }

    #[test]
    fn test_clip_on_wrong_track_rejected() {
        let timeline = Timeline::new(vec![Clip::audio("a1", 0.0, 5.0, 0.0)], vec![], vec![]);
        assert!(timeline.validate().is_err());
    }

    #[test]
    fn test_overlap_detection() {
        let timeline = Timeline::new(
            vec![
                Clip::video("a", 0.0, 5.0, 0.0),
                Clip::video("b", 0.0, 5.0, 4.0),
                Clip::video("c", 0.0, 1.0, 9.0),
            ],
            vec![],
            vec![],
        );
        assert_eq!(
            timeline.overlaps(ClipKind::Video),
            vec![("a".to_string(), "b".to_string())]
        );
        assert!(timeline.overlaps(ClipKind::Audio).is_empty());
    }

    #[test]
    fn test_timeline_parses_editor_json() {
        let json = r#"{
            "videoClips": [
                {"id": "v-init", "type": "video", "startTime": 0, "endTime": 12.5,
                 "timelineStart": 0, "playbackRate": 1.5, "filter": "grayscale(100%)"}
            ],
            "audioClips": [
                {"id": "a-init", "type": "audio", "startTime": 0, "endTime": 9,
                 "timelineStart": 0, "playbackRate": 1}
            ],
            "subtitles": [
                {"text": "HELLO", "startTime": 0.5, "endTime": 1.0, "effect": "pop"}
            ]
        }"#;

        let timeline: Timeline = serde_json::from_str(json).unwrap();
        assert_eq!(timeline.video_clips[0].source_end, 12.5);
        assert_eq!(timeline.video_clips[0].filter_expression(), "grayscale(100%)");
        assert_eq!(timeline.audio_clips[0].kind, ClipKind::Audio);
        assert_eq!(timeline.captions[0].effect, CaptionEffect::Pop);
        assert!(timeline.validate().is_ok());
    }
}
