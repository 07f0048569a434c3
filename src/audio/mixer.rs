//! Declarative audio mix graph.
//!
//! Segments are scheduled once against the graph's own sample clock, whose
//! sample zero is the render job's shared origin. Rendering the bus never
//! consults the video frame loop.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::audio::types::AudioData;
use crate::error::{AudioError, Result};
use crate::timeline::Clip;

/// Frames mixed per parallel work unit
const MIX_BLOCK_FRAMES: usize = 4096;

/// One playback of a span of the source buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSegment {
    pub clip_id: String,
    /// Offset from the mix origin (seconds)
    pub start_at: f64,
    pub source_start: f64,
    pub source_end: f64,
    pub playback_rate: f64,
}

impl ScheduledSegment {
    /// Output seconds this segment plays for
    pub fn duration(&self) -> f64 {
        (self.source_end - self.source_start) / self.playback_rate
    }

    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration()
    }
}

/// Mixed output bus, interleaved
#[derive(Debug, Clone)]
pub struct MixBus {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MixBus {
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Write the bus as 32-bit float WAV for the encoder to consume
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let write_failed = |e: hound::Error| AudioError::BusWriteFailed { reason: e.to_string() };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec).map_err(write_failed)?;
        for &sample in &self.samples {
            writer.write_sample(sample).map_err(write_failed)?;
        }
        writer.finalize().map_err(write_failed)?;
        Ok(())
    }
}

/// Mix graph owning the decoded source buffer for one render job
pub struct AudioMixGraph {
    source: Arc<AudioData>,
    sample_rate: u32,
    channels: u16,
    segments: Vec<ScheduledSegment>,
}

impl AudioMixGraph {
    pub fn new(source: Arc<AudioData>, sample_rate: u32, channels: u16) -> Self {
        Self {
            source,
            sample_rate,
            channels,
            segments: Vec::new(),
        }
    }

    /// Schedule one clip. Segments are kept in scheduling order.
    pub fn schedule(&mut self, clip: &Clip) {
        let segment = ScheduledSegment {
            clip_id: clip.id.clone(),
            start_at: clip.timeline_start,
            source_start: clip.source_start,
            source_end: clip.source_end,
            playback_rate: clip.playback_rate,
        };
        debug!(
            "Scheduled audio segment {} at {:.3}s: source {:.3}-{:.3}s @ {}x",
            segment.clip_id, segment.start_at, segment.source_start, segment.source_end, segment.playback_rate
        );
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[ScheduledSegment] {
        &self.segments
    }

    pub fn source(&self) -> &AudioData {
        &self.source
    }

    /// Render the bus from the origin to `duration` seconds
    pub fn render(&self, duration: f64) -> MixBus {
        let channels = self.channels as usize;
        let total_frames = (duration * self.sample_rate as f64).ceil().max(0.0) as usize;
        let mut samples = vec![0.0f32; total_frames * channels];

        samples
            .par_chunks_mut(MIX_BLOCK_FRAMES * channels)
            .enumerate()
            .for_each(|(block, chunk)| {
                let first_frame = block * MIX_BLOCK_FRAMES;
                self.mix_block(first_frame, chunk);
            });

        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        info!(
            "Mixed {} audio segments into {:.2}s bus ({} Hz, {} ch)",
            self.segments.len(),
            duration,
            self.sample_rate,
            self.channels
        );

        MixBus {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    fn mix_block(&self, first_frame: usize, chunk: &mut [f32]) {
        let channels = self.channels as usize;
        let out_rate = self.sample_rate as f64;
        let src_rate = self.source.sample_rate as f64;
        let block_frames = chunk.len() / channels;
        let block_start = first_frame as f64 / out_rate;
        let block_end = (first_frame + block_frames) as f64 / out_rate;

        for segment in &self.segments {
            if segment.end_at() <= block_start || segment.start_at >= block_end {
                continue;
            }

            for offset in 0..block_frames {
                let t = (first_frame + offset) as f64 / out_rate;
                if t < segment.start_at || t >= segment.end_at() {
                    continue;
                }

                let source_time = segment.source_start + (t - segment.start_at) * segment.playback_rate;
                if source_time >= segment.source_end {
                    continue;
                }

                let source_frame = source_time * src_rate;
                for channel in 0..channels {
                    chunk[offset * channels + channel] += self.source.bus_sample_at_frame(source_frame, channel, channels);
                }
            }
        }
    }
}

/// Schedule every audio clip on the graph, up front and in list order
pub fn schedule_all(graph: &mut AudioMixGraph, clips: &[Clip]) {
    for clip in clips {
        graph.schedule(clip);
    }
}
