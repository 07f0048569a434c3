use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::types::{AudioData, AudioFormat};
use crate::error::{AudioError, Result};

/// Decodes a whole audio asset into memory
pub struct AudioLoader;

impl AudioLoader {
    /// Decode an audio file on the blocking pool and return its samples
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref().to_path_buf();
        let extension = Self::detect_format(&path).unwrap_or_default();

        if !Self::is_format_supported(&extension) {
            return Err(AudioError::UnsupportedFormat { format: extension }.into());
        }

        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || match extension.as_str() {
            "wav" => Self::load_wav(&path),
            _ => Self::load_with_symphonia(&path),
        })
        .await
        .map_err(|e| AudioError::InvalidParameters {
            details: format!("decode task for {} panicked: {}", display, e),
        })?
    }

    /// Transcode through ffmpeg to float WAV in `scratch_dir`, then load that.
    ///
    /// Covers codecs the native decoders lack, such as Opus in WebM.
    pub async fn load_via_ffmpeg(ffmpeg_path: &Path, path: &Path, scratch_dir: &Path) -> Result<AudioData> {
        let load_failed = |reason: String| AudioError::LoadFailed {
            path: format!("{} ({})", path.display(), reason),
        };

        let wav_path = scratch_dir.join("source-audio.wav");
        let output = tokio::process::Command::new(ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(path)
            .args(["-vn", "-acodec", "pcm_f32le"])
            .arg(&wav_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| load_failed(format!("could not run {}: {}", ffmpeg_path.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(load_failed(format!("ffmpeg: {}", stderr.trim())).into());
        }

        debug!("Transcoded {:?} to {:?}", path, wav_path);
        let mut data = Self::load(&wav_path).await?;
        data.file_path = path.to_path_buf();
        Ok(data)
    }

    /// Load WAV files using the hound crate
    fn load_wav(path: &Path) -> Result<AudioData> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let reader = hound::WavReader::open(path).map_err(|_| load_failed())?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| load_failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| load_failed())?
            }
        };

        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: format!("{} declares {} channels at {} Hz", path.display(), spec.channels, spec.sample_rate),
            }
            .into());
        }

        let mut data = AudioData::from_samples(samples, spec.sample_rate, spec.channels);
        data.file_path = path.to_path_buf();
        data.format = AudioFormat {
            extension: "wav".to_string(),
            bit_depth: Some(spec.bits_per_sample),
            compression: None,
            bitrate: None,
        };

        debug!("Decoded WAV {:?}: {:.2}s, {} Hz, {} ch", path, data.duration, data.sample_rate, data.channels);
        Ok(data)
    }

    /// Load compressed and container formats using Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioData> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let file = File::open(path).map_err(|_| load_failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| load_failed())?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(load_failed)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.ok_or_else(|| AudioError::InvalidParameters {
            details: "No sample rate found".to_string(),
        })?;

        let channels = codec_params
            .channels
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No channel information found".to_string(),
            })?
            .count() as u16;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|_| load_failed())?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(AudioError::LoadFailed {
                        path: format!("{}: {}", path.display(), e),
                    }
                    .into())
                }
            };

            while !format.metadata().is_latest() {
                format.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    if buf.capacity() < decoded.capacity() * decoded.spec().channels.count() {
                        *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                    }
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                // A corrupt packet is skipped; the stream stays usable
                Err(SymphoniaError::DecodeError(_)) => skipped_packets += 1,
                Err(e) => {
                    return Err(AudioError::LoadFailed {
                        path: format!("{}: {}", path.display(), e),
                    }
                    .into())
                }
            }
        }

        if skipped_packets > 0 {
            warn!("Skipped {} undecodable packets in {:?}", skipped_packets, path);
        }

        if samples.is_empty() {
            return Err(load_failed().into());
        }

        let mut data = AudioData::from_samples(samples, sample_rate, channels);
        data.file_path = PathBuf::from(path);
        data.format = AudioFormat {
            extension: Self::detect_format(path).unwrap_or_else(|| "unknown".to_string()),
            bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
            compression: Some(format!("{:?}", codec_params.codec)),
            bitrate: None,
        };

        debug!("Decoded {:?}: {:.2}s, {} Hz, {} ch", path, data.duration, data.sample_rate, data.channels);
        Ok(data)
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => (sample as f32 - 128.0) / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "mp4" | "webm" | "mkv"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioLoader::detect_format("narration.wav"), Some("wav".to_string()));
        assert_eq!(AudioLoader::detect_format("voice.WEBM"), Some("webm".to_string()));
        assert_eq!(AudioLoader::detect_format("voice"), None);
    }

    #[test]
    fn test_format_support() {
        assert!(AudioLoader::is_format_supported("wav"));
        assert!(AudioLoader::is_format_supported("webm"));
        assert!(AudioLoader::is_format_supported("FLAC"));
        assert!(!AudioLoader::is_format_supported("xyz"));
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(128, 8), 0.0);
        assert_eq!(AudioLoader::int_to_float(0, 8), -1.0);
    }

    #[tokio::test]
    async fn test_load_wav_fixture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8_000 {
            writer.write_sample(if i % 2 == 0 { 16384i16 } else { -16384 }).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = AudioLoader::load(&path).await.unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.duration, 1.0);
        assert_eq!(audio.samples[0], 0.5);
        assert_eq!(audio.samples[1], 0.0);
        assert_eq!(audio.file_path, path);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.xyz");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"dummy content").unwrap();

        let result = AudioLoader::load(&file_path).await;
        match result {
            Err(crate::error::CompositorError::Audio(AudioError::UnsupportedFormat { format })) => {
                assert_eq!(format, "xyz");
            }
            other => panic!("Expected UnsupportedFormat error, got {:?}", other.map(|a| a.duration)),
        }
    }

    #[tokio::test]
    async fn test_garbage_wav_is_a_load_failure() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("broken.wav");
        std::fs::write(&file_path, b"not a riff header").unwrap();

        let err = AudioLoader::load(&file_path).await.unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Decode);
    }
}
