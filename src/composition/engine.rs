use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    audio::{schedule_all, AudioData, AudioLoader, AudioMixGraph},
    captions::CaptionRenderer,
    composition::{
        job::RenderJob,
        progress::{ProgressCallback, ProgressReporter},
    },
    config::Config,
    error::{AudioError, Result, TimelineError},
    filters::{FilterRegistry, ResolvedFilter},
    timeline::{Clip, ClipKind, RenderMode, Timeline},
    video::{self, EncodeSettings, EncodedMedia, FfmpegEncoderSink, FfmpegVideoSource, OutputGeometry},
};

/// Everything needed to render one timeline
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Screen recording the video clips cut from
    pub video_path: PathBuf,
    /// Narration the audio clips cut from
    pub audio_path: PathBuf,
    pub timeline: Timeline,
    pub mode: RenderMode,
}

impl RenderRequest {
    pub fn new<P: Into<PathBuf>>(video_path: P, audio_path: P, timeline: Timeline) -> Self {
        Self {
            video_path: video_path.into(),
            audio_path: audio_path.into(),
            timeline,
            mode: RenderMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Validated render inputs, produced before any resource is allocated
struct PreparedTimeline {
    timeline: Timeline,
    filters: HashMap<String, ResolvedFilter>,
    captions: Option<CaptionRenderer>,
}

/// Main composition engine that turns an edited timeline into one encoded video
///
/// The engine follows a clear pipeline:
/// 1. Validation - Reject empty or malformed timelines before touching any asset
/// 2. Source Probing - Read the video source's geometry and duration
/// 3. Audio Mixing - Decode the narration once and mix every audio clip onto a bus
/// 4. Encoder Setup - Negotiate a codec pair and start the encoder sink
/// 5. Frame Loop - Composite one frame per tick until the timeline ends
pub struct CompositionEngine {
    config: Config,
    registry: FilterRegistry,
}

impl CompositionEngine {
    /// Create a new composition engine with the built-in filters
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, FilterRegistry::new())
    }

    pub fn with_registry(config: Config, registry: FilterRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// Render a timeline, reporting progress as a percentage after every frame
    pub async fn compose<F>(&self, request: RenderRequest, progress: F) -> Result<EncodedMedia>
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.compose_inner(request, Box::new(progress), None).await
    }

    /// Render the full video against the full narration with no cuts or captions
    pub async fn compose_auto_sync<P, F>(
        &self,
        video_path: P,
        audio_path: P,
        mode: RenderMode,
        progress: F,
    ) -> Result<EncodedMedia>
    where
        P: AsRef<Path>,
        F: FnMut(f64) + Send + 'static,
    {
        let video_path = video_path.as_ref();
        let audio_path = audio_path.as_ref();
        info!("🔗 Auto-sync: deriving full-length clips");

        let metadata = video::probe_video(&self.config.encoder.ffprobe_path, video_path).await?;
        let scratch = Self::scratch_dir()?;
        let audio = Arc::new(self.load_audio(audio_path, scratch.path()).await?);

        let timeline = Timeline::new(
            vec![Clip::video("auto-video", 0.0, metadata.duration, 0.0)],
            vec![Clip::audio("auto-audio", 0.0, audio.duration, 0.0)],
            vec![],
        );
        debug!(
            "Auto-sync clips: video {:.2}s, audio {:.2}s",
            metadata.duration, audio.duration
        );

        let request = RenderRequest::new(video_path, audio_path, timeline).with_mode(mode);
        self.compose_inner(request, Box::new(progress), Some(audio)).await
    }

    async fn compose_inner(
        &self,
        request: RenderRequest,
        progress: ProgressCallback,
        preloaded_audio: Option<Arc<AudioData>>,
    ) -> Result<EncodedMedia> {
        info!("🎬 Starting Timeline Compositor render");
        info!("   Video: {:?}", request.video_path);
        info!("   Audio: {:?}", request.audio_path);
        info!("   Mode: {}", request.mode);

        // Pipeline Step 1: Validation
        let prepared = self.prepare_timeline(request.timeline)?;
        let total_duration = prepared.timeline.total_duration();

        let scratch = Self::scratch_dir()?;

        // Pipeline Step 2: Source Probing
        let metadata = video::probe_video(&self.config.encoder.ffprobe_path, &request.video_path).await?;
        let geometry = OutputGeometry::for_mode(
            metadata.width,
            metadata.height,
            request.mode,
            self.config.encoder.turbo_max_height,
            self.config.encoder.quality_max_height,
        );
        info!("   Output: {}x{} ({:.2}s)", geometry.width, geometry.height, total_duration);

        // Pipeline Step 3: Audio Mixing
        let audio = match preloaded_audio {
            Some(audio) => audio,
            None => Arc::new(self.load_audio(&request.audio_path, scratch.path()).await?),
        };
        let bus_path = self
            .mix_audio(audio, &prepared.timeline.audio_clips, total_duration, scratch.path())
            .await?;

        // Pipeline Step 4: Encoder Setup
        let profile = video::negotiate_with(&self.config.encoder.ffmpeg_path).await?;
        let sink = FfmpegEncoderSink::start(
            &self.config.encoder,
            EncodeSettings {
                profile,
                geometry,
                fps: self.config.render.fps,
                mode: request.mode,
                audio_path: bus_path,
            },
        )?;

        // Pipeline Step 5: Frame Loop
        let source = FfmpegVideoSource::new(&self.config.encoder.ffmpeg_path, metadata, geometry, self.config.render.fps);
        let job = RenderJob::new(
            prepared.timeline,
            prepared.filters,
            prepared.captions,
            Box::new(source),
            Box::new(sink),
            geometry,
            self.config.render.clone(),
            ProgressReporter::new(total_duration, progress),
        );

        let result = job.run().await;
        drop(scratch);

        if let Ok(media) = &result {
            info!("🎉 Composition complete: {} ({} bytes)", media.mime_type, media.size());
        }
        result
    }

    // ==========================================
    // PIPELINE STEP 1: VALIDATION
    // ==========================================

    /// Check the timeline and resolve everything it names.
    ///
    /// Runs before any file is opened, so a bad timeline never allocates
    /// decoders, encoders or scratch space.
    fn prepare_timeline(&self, timeline: Timeline) -> Result<PreparedTimeline> {
        info!("📋 Step 1: Validating timeline...");
        timeline.validate()?;

        for kind in [ClipKind::Video, ClipKind::Audio] {
            let overlaps = timeline.overlaps(kind);
            if let Some((first, second)) = overlaps.first() {
                if self.config.render.reject_overlaps {
                    return Err(TimelineError::Overlap {
                        track: kind.as_str().to_string(),
                        first: first.clone(),
                        second: second.clone(),
                    }
                    .into());
                }
                warn!(
                    "{} overlapping {} clip pair(s); the first clip in list order wins",
                    overlaps.len(),
                    kind.as_str()
                );
            }
        }

        let mut filters = HashMap::new();
        for clip in &timeline.video_clips {
            if let Some(filter) = self.registry.resolve(clip.filter_expression())? {
                debug!("Clip {} uses filter {}({})", clip.id, filter.name(), filter.amount());
                filters.insert(clip.id.clone(), filter);
            }
        }

        let captions = if timeline.captions.is_empty() {
            None
        } else {
            Some(CaptionRenderer::from_config(&self.config.captions)?)
        };

        info!(
            "   ✅ {} video clips, {} audio clips, {} captions, {:.2}s",
            timeline.video_clips.len(),
            timeline.audio_clips.len(),
            timeline.captions.len(),
            timeline.total_duration()
        );

        Ok(PreparedTimeline {
            timeline,
            filters,
            captions,
        })
    }

    // ==========================================
    // PIPELINE STEP 3: AUDIO MIXING
    // ==========================================

    /// Decode the narration, falling back to an ffmpeg transcode
    async fn load_audio(&self, path: &Path, scratch: &Path) -> Result<AudioData> {
        info!("🎵 Loading narration...");
        if !path.exists() {
            return Err(AudioError::LoadFailed {
                path: path.display().to_string(),
            }
            .into());
        }

        let audio = match AudioLoader::load(path).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Native decode of {:?} failed ({}); transcoding with ffmpeg", path, e);
                AudioLoader::load_via_ffmpeg(&self.config.encoder.ffmpeg_path, path, scratch).await?
            }
        };

        info!(
            "   Loaded: {:.1}s, {} Hz, {} channels",
            audio.duration, audio.sample_rate, audio.channels
        );
        Ok(audio)
    }

    /// Schedule every audio clip, render the bus and write it for the encoder
    async fn mix_audio(&self, audio: Arc<AudioData>, clips: &[Clip], duration: f64, scratch: &Path) -> Result<PathBuf> {
        info!("🎚️  Mixing {} audio clips...", clips.len());

        let mut graph = AudioMixGraph::new(audio, self.config.audio.sample_rate, self.config.audio.channels);
        schedule_all(&mut graph, clips);

        let bus_path = scratch.join("bus.wav");
        let target = bus_path.clone();
        tokio::task::spawn_blocking(move || graph.render(duration).write_wav(&target))
            .await
            .map_err(|e| AudioError::BusWriteFailed {
                reason: format!("mix task failed: {}", e),
            })??;

        debug!("Mixed bus written to {:?}", bus_path);
        Ok(bus_path)
    }

    fn scratch_dir() -> Result<tempfile::TempDir> {
        Ok(tempfile::Builder::new().prefix("timeline-compositor-").tempdir()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureStage;
    use crate::timeline::CaptionCue;

    const MISSING_VIDEO: &str = "/definitely/not/here/screen.webm";
    const MISSING_AUDIO: &str = "/definitely/not/here/voice.webm";

    fn request(timeline: Timeline) -> RenderRequest {
        RenderRequest::new(MISSING_VIDEO, MISSING_AUDIO, timeline)
    }

    #[tokio::test]
    async fn test_empty_timeline_fails_before_touching_assets() {
        let engine = CompositionEngine::new(Config::default());
        let err = engine
            .compose(request(Timeline::default()), |_| panic!("no progress expected"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::EmptyTimeline);
    }

    #[tokio::test]
    async fn test_unknown_filter_is_an_input_error() {
        let engine = CompositionEngine::new(Config::default());
        let timeline = Timeline::new(vec![Clip::video("v1", 0.0, 5.0, 0.0).with_filter("blur(3)")], vec![], vec![]);
        let err = engine.compose(request(timeline), |_| {}).await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Input);
    }

    #[tokio::test]
    async fn test_duplicate_video_clip_ids_are_an_input_error() {
        let engine = CompositionEngine::new(Config::default());
        let timeline = Timeline::new(
            vec![
                Clip::video("v", 0.0, 2.0, 0.0).with_filter("invert"),
                Clip::video("v", 2.0, 4.0, 2.0),
            ],
            vec![],
            vec![],
        );
        let err = engine.compose(request(timeline), |_| {}).await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Input);
    }

    #[tokio::test]
    async fn test_rejected_overlap() {
        let mut config = Config::default();
        config.render.reject_overlaps = true;
        let engine = CompositionEngine::new(config);

        let timeline = Timeline::new(
            vec![Clip::video("a", 0.0, 5.0, 0.0), Clip::video("b", 0.0, 5.0, 3.0)],
            vec![],
            vec![],
        );
        let err = engine.compose(request(timeline), |_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompositorError::Timeline(TimelineError::Overlap { .. })
        ));
    }

    #[tokio::test]
    async fn test_overlap_allowed_by_default_then_missing_source_is_decode_error() {
        let engine = CompositionEngine::new(Config::default());
        let timeline = Timeline::new(
            vec![Clip::video("a", 0.0, 5.0, 0.0), Clip::video("b", 0.0, 5.0, 3.0)],
            vec![],
            vec![],
        );
        let err = engine.compose(request(timeline), |_| {}).await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Decode);
    }

    #[tokio::test]
    async fn test_missing_caption_font_is_reported() {
        let mut config = Config::default();
        config.captions.font_path = Some(PathBuf::from("/no/such/font.ttf"));
        let engine = CompositionEngine::new(config);

        let timeline = Timeline::new(vec![], vec![], vec![CaptionCue::new("Hi", 0.0, 1.0, Default::default())]);
        let err = engine.compose(request(timeline), |_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(crate::error::VideoError::AssetMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_sync_missing_video() {
        let engine = CompositionEngine::new(Config::default());
        let err = engine
            .compose_auto_sync(MISSING_VIDEO, MISSING_AUDIO, RenderMode::Turbo, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Decode);
    }

    #[test]
    fn test_request_defaults_to_turbo() {
        let req = request(Timeline::default()).with_mode(RenderMode::Quality);
        assert_eq!(req.mode, RenderMode::Quality);
        assert_eq!(request(Timeline::default()).mode, RenderMode::Turbo);
    }
}
