//! Codec negotiation against the local ffmpeg build.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EncoderError, Result};
use crate::timeline::RenderMode;

/// One container/codec combination the encoder sink can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    /// Mime type attached to the finished blob
    pub mime_type: &'static str,
    pub video_encoder: &'static str,
    pub audio_encoder: &'static str,
    /// ffmpeg muxer name
    pub muxer: &'static str,
    /// File extension for the container
    pub extension: &'static str,
}

/// Codec pairs in order of preference
pub static PREFERENCES: [CodecProfile; 3] = [
    CodecProfile {
        mime_type: "video/webm;codecs=vp9,opus",
        video_encoder: "libvpx-vp9",
        audio_encoder: "libopus",
        muxer: "webm",
        extension: "webm",
    },
    CodecProfile {
        mime_type: "video/webm;codecs=vp8,opus",
        video_encoder: "libvpx",
        audio_encoder: "libopus",
        muxer: "webm",
        extension: "webm",
    },
    CodecProfile {
        mime_type: "video/mp4",
        video_encoder: "libx264",
        audio_encoder: "aac",
        muxer: "mp4",
        extension: "mp4",
    },
];

impl CodecProfile {
    /// Encoder tuning arguments for this profile in the given mode
    pub fn tuning_args(&self, mode: RenderMode) -> Vec<&'static str> {
        let mut args = match (self.video_encoder, mode) {
            ("libvpx-vp9", RenderMode::Turbo) => vec!["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"],
            ("libvpx-vp9", RenderMode::Quality) => vec!["-deadline", "good", "-cpu-used", "2", "-row-mt", "1"],
            ("libvpx", RenderMode::Turbo) => vec!["-deadline", "realtime", "-cpu-used", "8"],
            ("libvpx", RenderMode::Quality) => vec!["-deadline", "good", "-cpu-used", "2"],
            ("libx264", RenderMode::Turbo) => vec!["-preset", "veryfast"],
            ("libx264", RenderMode::Quality) => vec!["-preset", "medium"],
            _ => Vec::new(),
        };

        // The output goes to a pipe, so the moov atom cannot be rewritten at the end
        if self.muxer == "mp4" {
            args.extend(["-movflags", "frag_keyframe+empty_moov"]);
        }
        args
    }

    pub fn is_supported_by(&self, encoders: &HashSet<String>) -> bool {
        encoders.contains(self.video_encoder) && encoders.contains(self.audio_encoder)
    }
}

/// Parse the encoder names out of `ffmpeg -encoders` output.
///
/// The listing starts with a legend terminated by a ` ------` line; every
/// following line is `<flags> <name> <description>`.
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _flags = fields.next()?;
            fields.next().map(str::to_string)
        })
        .collect()
}

/// Pick the first profile from the preference list the encoder set supports
pub fn negotiate(encoders: &HashSet<String>) -> Result<CodecProfile> {
    PREFERENCES
        .iter()
        .find(|profile| profile.is_supported_by(encoders))
        .copied()
        .ok_or_else(|| {
            let tried = PREFERENCES
                .iter()
                .map(|p| p.mime_type)
                .collect::<Vec<_>>()
                .join(", ");
            EncoderError::NoSupportedCodec { tried }.into()
        })
}

/// Ask the ffmpeg binary which encoders it was built with
pub async fn probe_encoders(ffmpeg_path: &Path) -> Result<HashSet<String>> {
    let output = Command::new(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| EncoderError::Unavailable {
            reason: format!("could not run {}: {}", ffmpeg_path.display(), e),
        })?;

    if !output.status.success() {
        return Err(EncoderError::Unavailable {
            reason: format!("{} -encoders exited with {}", ffmpeg_path.display(), output.status),
        }
        .into());
    }

    let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
    debug!("ffmpeg reports {} encoders", encoders.len());
    Ok(encoders)
}

/// Probe the local ffmpeg and negotiate a profile
pub async fn negotiate_with(ffmpeg_path: &Path) -> Result<CodecProfile> {
    let encoders = probe_encoders(ffmpeg_path).await?;
    let profile = negotiate(&encoders)?;
    info!("Negotiated codec profile {}", profile.mime_type);
    Ok(profile)
}
