use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::{EncoderError, Result};
use crate::timeline::RenderMode;
use crate::video::codec::CodecProfile;
use crate::video::types::{Frame, OutputGeometry};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// The finished, in-memory encoded output of a render job
#[derive(Debug, Clone)]
pub struct EncodedMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
    /// Container file extension
    pub extension: String,
    /// Seconds of timeline covered
    pub duration: f64,
    pub frame_count: u64,
    pub completed_at: DateTime<Utc>,
}

impl EncodedMedia {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Write the blob to disk
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// Receives composited frames in timeline order and produces the encoded blob
#[async_trait]
pub trait EncoderSink: Send {
    fn profile(&self) -> &CodecProfile;

    async fn push_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Stop capturing and assemble the output
    async fn finish(self: Box<Self>) -> Result<EncodedMedia>;

    /// Stop capturing and discard everything produced so far
    async fn abort(self: Box<Self>);
}

/// Parameters for starting an ffmpeg encode
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub profile: CodecProfile,
    pub geometry: OutputGeometry,
    pub fps: u32,
    pub mode: RenderMode,
    /// Mixed audio bus written as WAV
    pub audio_path: PathBuf,
}

/// [`EncoderSink`] that pipes raw frames into an ffmpeg child process.
///
/// The mixed audio bus is the second input; the container comes back on
/// stdout and is collected in arrival order by a background task.
pub struct FfmpegEncoderSink {
    profile: CodecProfile,
    fps: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    collector: JoinHandle<std::io::Result<Vec<Vec<u8>>>>,
    errors: JoinHandle<String>,
    frames_written: u64,
}

impl FfmpegEncoderSink {
    pub fn encode_args(config: &EncoderConfig, settings: &EncodeSettings) -> Vec<String> {
        let profile = &settings.profile;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s:v",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(format!("{}x{}", settings.geometry.width, settings.geometry.height));
        args.extend(["-r".to_string(), settings.fps.to_string(), "-i".to_string(), "-".to_string()]);
        args.extend(["-i".to_string(), settings.audio_path.display().to_string()]);
        args.extend(
            ["-map", "0:v:0", "-map", "1:a:0", "-c:v", profile.video_encoder, "-pix_fmt", "yuv420p"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(["-b:v".to_string(), config.video_bitrate(settings.mode).to_string()]);
        args.extend(["-c:a".to_string(), profile.audio_encoder.to_string()]);
        args.extend(["-b:a".to_string(), config.audio_bitrate.to_string()]);
        args.extend(["-threads".to_string(), config.threads.to_string()]);
        args.extend(profile.tuning_args(settings.mode).into_iter().map(str::to_string));
        args.extend(["-f".to_string(), profile.muxer.to_string(), "-".to_string()]);
        args
    }

    pub fn start(config: &EncoderConfig, settings: EncodeSettings) -> Result<Self> {
        let args = Self::encode_args(config, &settings);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EncoderError::Unavailable {
                        reason: format!("{} was not found on PATH", config.ffmpeg_path.display()),
                    }
                } else {
                    EncoderError::Unavailable {
                        reason: format!("failed to spawn encoder: {}", e),
                    }
                }
            })?;

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().ok_or_else(|| EncoderError::Unavailable {
            reason: "failed to capture encoder stdout".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| EncoderError::Unavailable {
            reason: "failed to capture encoder stderr".to_string(),
        })?;

        let collector = tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunks.push(buf[..n].to_vec());
            }
            Ok::<_, std::io::Error>(chunks)
        });

        let errors = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        info!(
            "Encoder started: {} {}x{} @ {} fps",
            settings.profile.mime_type, settings.geometry.width, settings.geometry.height, settings.fps
        );

        Ok(Self {
            profile: settings.profile,
            fps: settings.fps,
            child,
            stdin,
            collector,
            errors,
            frames_written: 0,
        })
    }

    async fn stderr_text(errors: JoinHandle<String>) -> String {
        errors.await.map(|s| s.trim().to_string()).unwrap_or_default()
    }
}

#[async_trait]
impl EncoderSink for FfmpegEncoderSink {
    fn profile(&self) -> &CodecProfile {
        &self.profile
    }

    async fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| EncoderError::CaptureFailed {
            reason: "encoder input already closed".to_string(),
        })?;

        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| EncoderError::CaptureFailed {
                reason: format!("writing frame {}: {}", self.frames_written, e),
            })?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<EncodedMedia> {
        let mut this = *self;
        if let Some(mut stdin) = this.stdin.take() {
            stdin.shutdown().await.map_err(|e| EncoderError::FinalizeFailed {
                reason: format!("closing encoder input: {}", e),
            })?;
        }

        let status = this.child.wait().await.map_err(|e| EncoderError::FinalizeFailed {
            reason: format!("waiting for encoder: {}", e),
        })?;

        let chunks = this
            .collector
            .await
            .map_err(|e| EncoderError::FinalizeFailed {
                reason: format!("output reader stopped: {}", e),
            })?
            .map_err(|e| EncoderError::FinalizeFailed {
                reason: format!("reading encoder output: {}", e),
            })?;

        if !status.success() {
            let stderr = Self::stderr_text(this.errors).await;
            return Err(EncoderError::FinalizeFailed {
                reason: format!("encoder exited with {}: {}", status, stderr),
            }
            .into());
        }

        let data = chunks.concat();
        info!(
            "Encoder finished: {} frames, {} chunks, {} bytes",
            this.frames_written,
            chunks.len(),
            data.len()
        );

        Ok(EncodedMedia {
            data,
            mime_type: this.profile.mime_type.to_string(),
            extension: this.profile.extension.to_string(),
            duration: this.frames_written as f64 / this.fps as f64,
            frame_count: this.frames_written,
            completed_at: Utc::now(),
        })
    }

    async fn abort(self: Box<Self>) {
        let mut this = *self;
        this.stdin.take();
        if let Err(e) = this.child.kill().await {
            warn!("Failed to stop encoder: {}", e);
        }
        this.collector.abort();
        this.errors.abort();
        debug!("Encoder aborted after {} frames", this.frames_written);
    }
}
