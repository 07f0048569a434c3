//! Seekable decoded video source.
//!
//! The render job only ever talks to [`VideoSource`]; the ffmpeg-backed
//! implementation decodes straight to the output geometry at the render frame
//! rate so that one decoded frame corresponds to one tick at rate 1.0.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, OutputGeometry};

/// Facts about a source asset gathered before the job starts
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    pub frame_rate: f64,
    pub has_audio: bool,
}

/// A video asset the frame loop can reposition and read from
#[async_trait]
pub trait VideoSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Current decode position in source seconds.
    ///
    /// While a seek is pending this reports the seek target.
    fn position(&self) -> f64;

    /// Start repositioning to `target` without waiting for it to land
    fn request_seek(&mut self, target: f64) -> Result<()>;

    fn is_seeking(&self) -> bool;

    /// Suspend until the pending seek has produced a frame
    async fn wait_seeked(&mut self) -> Result<()>;

    /// Decode forward until the current frame is the one shown at `target`
    async fn advance(&mut self, target: f64) -> Result<()>;

    /// Most recently decoded frame
    fn frame(&self) -> Option<&Frame>;

    /// Release decoder resources
    async fn close(&mut self);
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational like `30000/1001`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (rate.parse::<f64>().ok()?, 1.0),
    };
    (den > 0.0 && num > 0.0).then(|| num / den)
}

/// Build [`VideoMetadata`] from `ffprobe -of json` output
pub fn parse_probe_output(path: &Path, json: &str) -> Result<VideoMetadata> {
    let load_failed = |reason: &str| VideoError::LoadFailed {
        path: format!("{} ({})", path.display(), reason),
    };

    let probe: ProbeOutput = serde_json::from_str(json).map_err(|_| load_failed("unreadable probe output"))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| load_failed("no video stream"))?;
    let has_audio = probe.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(load_failed("missing dimensions").into()),
    };

    // Browser recordings often leave the stream duration unset
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| load_failed("unknown duration"))?;

    let frame_rate = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    Ok(VideoMetadata {
        path: path.to_path_buf(),
        width,
        height,
        duration,
        frame_rate,
        has_audio,
    })
}

/// Probe a video asset with ffprobe
pub async fn probe_video(ffprobe_path: &Path, path: &Path) -> Result<VideoMetadata> {
    if !path.exists() {
        return Err(VideoError::LoadFailed {
            path: path.display().to_string(),
        }
        .into());
    }

    let output = Command::new(ffprobe_path)
        .args(["-v", "error", "-show_entries"])
        .arg("stream=codec_type,width,height,r_frame_rate,duration:format=duration")
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| VideoError::LoadFailed {
            path: format!("{} (could not run {}: {})", path.display(), ffprobe_path.display(), e),
        })?;

    if !output.status.success() {
        return Err(VideoError::LoadFailed {
            path: format!("{} (ffprobe exited with {})", path.display(), output.status),
        }
        .into());
    }

    let metadata = parse_probe_output(path, &String::from_utf8_lossy(&output.stdout))?;
    info!(
        "Video source {:?}: {}x{}, {:.2}s @ {:.2} fps",
        path, metadata.width, metadata.height, metadata.duration, metadata.frame_rate
    );
    Ok(metadata)
}

/// One running ffmpeg decode process starting at a fixed source time
struct DecodeSession {
    child: Child,
    stdout: ChildStdout,
    start: f64,
    frames_read: u64,
    ended: bool,
}

/// ffmpeg-backed [`VideoSource`].
///
/// Seeking restarts the decoder at the target with input-side `-ss`, which is
/// keyframe-accurate on demux and frame-accurate after decode.
pub struct FfmpegVideoSource {
    ffmpeg_path: PathBuf,
    metadata: VideoMetadata,
    geometry: OutputGeometry,
    fps: u32,
    session: Option<DecodeSession>,
    pending_seek: Option<f64>,
    frame: Option<Frame>,
    buffer: Vec<u8>,
}

impl FfmpegVideoSource {
    pub fn new(ffmpeg_path: &Path, metadata: VideoMetadata, geometry: OutputGeometry, fps: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_path_buf(),
            metadata,
            geometry,
            fps,
            session: None,
            pending_seek: None,
            frame: None,
            buffer: vec![0; geometry.frame_bytes()],
        }
    }

    /// ffmpeg arguments for a decode session starting at `start`
    fn decode_args(&self, start: f64) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", start.max(0.0)),
            "-i".to_string(),
            self.metadata.path.display().to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("fps={},scale={}:{}", self.fps, self.geometry.width, self.geometry.height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }

    fn spawn_session(&self, start: f64) -> Result<DecodeSession> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.decode_args(start))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    VideoError::DecodingFailed {
                        reason: format!("{} was not found on PATH", self.ffmpeg_path.display()),
                    }
                } else {
                    VideoError::DecodingFailed {
                        reason: format!("failed to spawn decoder: {}", e),
                    }
                }
            })?;

        let stdout = child.stdout.take().ok_or_else(|| VideoError::DecodingFailed {
            reason: "failed to capture decoder stdout".to_string(),
        })?;

        debug!("Started decode session at {:.3}s", start);
        Ok(DecodeSession {
            child,
            stdout,
            start,
            frames_read: 0,
            ended: false,
        })
    }

    /// Source time of the frame the session would produce next
    fn next_frame_time(session: &DecodeSession, fps: u32) -> f64 {
        session.start + session.frames_read as f64 / fps as f64
    }

    /// Read one frame from the session. Returns false at end of stream.
    async fn read_frame(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        if session.ended {
            return Ok(false);
        }

        match session.stdout.read_exact(&mut self.buffer).await {
            Ok(_) => {
                session.frames_read += 1;
                let frame = Frame::from_rgb_bytes(self.geometry.width, self.geometry.height, self.buffer.clone())
                    .ok_or_else(|| VideoError::FrameProcessingFailed {
                        reason: "decoded frame has the wrong size".to_string(),
                    })?;
                self.frame = Some(frame);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("Decoder reached end of stream at {:.3}s", Self::next_frame_time(session, self.fps));
                session.ended = true;
                Ok(false)
            }
            Err(e) => Err(VideoError::DecodingFailed {
                reason: format!("reading decoded frame: {}", e),
            }
            .into()),
        }
    }

    async fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.child.kill().await {
                warn!("Failed to stop decode session: {}", e);
            }
        }
    }
}

#[async_trait]
impl VideoSource for FfmpegVideoSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn position(&self) -> f64 {
        if let Some(target) = self.pending_seek {
            return target;
        }
        match &self.session {
            Some(session) if session.frames_read > 0 => {
                session.start + (session.frames_read - 1) as f64 / self.fps as f64
            }
            Some(session) => session.start,
            None => 0.0,
        }
    }

    fn request_seek(&mut self, target: f64) -> Result<()> {
        if !target.is_finite() || target < 0.0 {
            return Err(VideoError::SeekFailed {
                target,
                reason: "target outside the source".to_string(),
            }
            .into());
        }

        // Dropping the old session kills its process
        self.session = Some(self.spawn_session(target)?);
        self.pending_seek = Some(target);
        Ok(())
    }

    fn is_seeking(&self) -> bool {
        self.pending_seek.is_some()
    }

    async fn wait_seeked(&mut self) -> Result<()> {
        let Some(target) = self.pending_seek else {
            return Ok(());
        };

        let landed = self.read_frame().await?;
        self.pending_seek = None;
        if !landed {
            warn!("Seek to {:.3}s produced no frame; holding the last frame", target);
        }
        Ok(())
    }

    async fn advance(&mut self, target: f64) -> Result<()> {
        if self.pending_seek.is_some() {
            self.wait_seeked().await?;
        }
        if self.session.is_none() {
            self.session = Some(self.spawn_session(0.0)?);
        }

        let half_frame = 0.5 / self.fps as f64;
        loop {
            let due = match &self.session {
                Some(session) if !session.ended => Self::next_frame_time(session, self.fps) <= target + half_frame,
                _ => false,
            };
            if !due || !self.read_frame().await? {
                break;
            }
        }
        Ok(())
    }

    fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    async fn close(&mut self) {
        self.stop_session().await;
        self.pending_seek = None;
    }
}
