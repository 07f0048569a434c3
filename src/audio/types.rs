use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decoded audio asset held in memory for the lifetime of a render job
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// Original file path
    pub file_path: PathBuf,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioData {
    /// Build an in-memory asset from interleaved samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self {
            duration: frames as f64 / sample_rate as f64,
            samples,
            sample_rate,
            channels,
            file_path: PathBuf::new(),
            format: AudioFormat {
                extension: "pcm".to_string(),
                bit_depth: Some(32),
                compression: None,
                bitrate: None,
            },
        }
    }

    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Sample of `channel` at fractional frame position, linearly interpolated.
    ///
    /// Channels beyond the source's channel count fold onto the last one.
    pub fn sample_at_frame(&self, frame: f64, channel: usize) -> f32 {
        let channels = self.channels.max(1) as usize;
        let channel = channel.min(channels - 1);
        let frames = self.frame_count();

        if frame < 0.0 || frames == 0 {
            return 0.0;
        }

        let index = frame.floor() as usize;
        if index >= frames {
            return 0.0;
        }

        let frac = (frame - index as f64) as f32;
        let current = self.samples[index * channels + channel];
        let next = if index + 1 < frames {
            self.samples[(index + 1) * channels + channel]
        } else {
            current
        };

        current + (next - current) * frac
    }

    /// Sample for `bus_channel` of a bus `bus_channels` wide.
    ///
    /// Source channels the bus has no room for are averaged into its last
    /// channel, so a stereo source on a mono bus plays as (L + R) / 2.
    pub fn bus_sample_at_frame(&self, frame: f64, bus_channel: usize, bus_channels: usize) -> f32 {
        let channels = self.channels.max(1) as usize;
        let last_bus_channel = bus_channels.max(1) - 1;
        if channels <= last_bus_channel + 1 || bus_channel < last_bus_channel {
            return self.sample_at_frame(frame, bus_channel);
        }

        let folded = bus_channel..channels;
        let count = folded.len() as f32;
        folded.map(|c| self.sample_at_frame(frame, c)).sum::<f32>() / count
    }
}

/// Audio file format information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Compression type (if any)
    pub compression: Option<String>,

    /// Bitrate for compressed formats
    pub bitrate: Option<u32>,
}
