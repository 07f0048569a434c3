//! The per-frame render loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    captions::CaptionRenderer,
    composition::{clock::FrameClock, progress::ProgressReporter},
    config::RenderConfig,
    error::{Result, VideoError},
    filters::ResolvedFilter,
    timeline::{active_captions, active_clip, source_position, Timeline},
    video::{EncodedMedia, EncoderSink, Frame, OutputGeometry, VideoSource},
};

/// Lifecycle of a render job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobState {
    Idle,
    /// Frame production suspended until the source lands on `target`
    Seeking { target: f64 },
    Rendering,
    Finalizing,
    Failed,
    Completed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Seeking { target } => write!(f, "seeking to {:.3}s", target),
            Self::Rendering => f.write_str("rendering"),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Failed => f.write_str("failed"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// One render from timeline to encoded blob.
///
/// The job exclusively owns the output surface, the video source and the
/// encoder sink. It ends in `Completed` or `Failed`; on failure the source
/// and sink are released and nothing produced so far is kept.
pub struct RenderJob {
    timeline: Arc<Timeline>,
    filters: HashMap<String, ResolvedFilter>,
    captions: Option<CaptionRenderer>,
    source: Box<dyn VideoSource>,
    sink: Option<Box<dyn EncoderSink>>,
    surface: Frame,
    progress: ProgressReporter,
    settings: RenderConfig,
    total_duration: f64,
    state: JobState,
    seeks: u64,
}

impl RenderJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timeline: Timeline,
        filters: HashMap<String, ResolvedFilter>,
        captions: Option<CaptionRenderer>,
        source: Box<dyn VideoSource>,
        sink: Box<dyn EncoderSink>,
        geometry: OutputGeometry,
        settings: RenderConfig,
        progress: ProgressReporter,
    ) -> Self {
        let total_duration = timeline.total_duration();
        Self {
            timeline: Arc::new(timeline),
            filters,
            captions,
            source,
            sink: Some(sink),
            surface: geometry.blank_frame(),
            progress,
            settings,
            total_duration,
            state: JobState::Idle,
            seeks: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Drive the frame loop to completion
    pub async fn run(mut self) -> Result<EncodedMedia> {
        let mut clock = FrameClock::new(self.settings.fps);
        info!(
            "🎞️  Rendering {:.2}s at {} fps ({} frames)",
            self.total_duration,
            clock.fps(),
            clock.frames_for(self.total_duration)
        );
        self.state = JobState::Rendering;

        loop {
            clock.wait_tick().await;
            match self.tick(&mut clock).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => return Err(self.fail(e).await),
            }
        }

        debug!(
            "Frame loop done after {} frames, {} seeks, wall-clock lag {:?}",
            clock.frame_index(),
            self.seeks,
            clock.lag()
        );
        self.finalize().await
    }

    /// Render and emit one frame. Returns true once the clock has passed the end.
    async fn tick(&mut self, clock: &mut FrameClock) -> Result<bool> {
        let t = clock.time();
        let frame_index = clock.frame_index();
        let timeline = Arc::clone(&self.timeline);

        match active_clip(&timeline.video_clips, t) {
            Some(clip) => {
                self.sync_source(source_position(clip, t)).await?;
                match self.source.frame() {
                    Some(frame) => self.surface.draw_source(frame),
                    None => self.surface.clear(),
                }
                if let Some(filter) = self.filters.get(&clip.id) {
                    filter.apply(&mut self.surface, frame_index)?;
                }
            }
            // Gaps are opaque black, never the previous frame
            None => self.surface.clear(),
        }

        if let Some(renderer) = &self.captions {
            for cue in active_captions(&timeline.captions, t) {
                renderer.render(&mut self.surface, cue, t);
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.push_frame(&self.surface).await?;
        }

        let next = clock.advance();
        self.progress.report(next);
        Ok(next >= self.total_duration)
    }

    /// Bring the source to `target`, seeking when it has drifted too far.
    ///
    /// Every wait on the decoder is bounded by the seek timeout. A stall on a
    /// tick that requested a seek is a seek timeout, otherwise a decode failure.
    async fn sync_source(&mut self, target: f64) -> Result<()> {
        let drift = (self.source.position() - target).abs();
        let timeout = self.settings.seek_timeout();
        let timeout_ms = timeout.as_millis() as u64;
        let mut seeked = false;

        if drift > self.settings.seek_tolerance {
            debug!("Seeking source to {:.3}s (drift {:.3}s)", target, drift);
            self.source.request_seek(target)?;
            self.seeks += 1;
            seeked = true;

            if drift > self.settings.blocking_seek_threshold {
                self.state = JobState::Seeking { target };
                tokio::time::timeout(timeout, self.source.wait_seeked())
                    .await
                    .map_err(|_| VideoError::SeekTimeout { target, timeout_ms })??;
                self.state = JobState::Rendering;
            }
        }

        match tokio::time::timeout(timeout, self.source.advance(target)).await {
            Ok(result) => result,
            Err(_) if seeked => Err(VideoError::SeekTimeout { target, timeout_ms }.into()),
            Err(_) => Err(VideoError::DecodingFailed {
                reason: format!("no frame for {:.3}s within {} ms", target, timeout_ms),
            }
            .into()),
        }
    }

    async fn finalize(mut self) -> Result<EncodedMedia> {
        self.state = JobState::Finalizing;
        self.progress.close();
        self.source.close().await;

        let Some(sink) = self.sink.take() else {
            self.state = JobState::Failed;
            return Err(VideoError::FrameProcessingFailed {
                reason: "encoder sink already released".to_string(),
            }
            .into());
        };

        match sink.finish().await {
            Ok(media) => {
                self.state = JobState::Completed;
                info!(
                    "✅ Render complete: {} frames, {:.2} MB {}",
                    media.frame_count,
                    media.size() as f64 / 1024.0 / 1024.0,
                    media.mime_type
                );
                Ok(media)
            }
            Err(e) => {
                self.state = JobState::Failed;
                warn!("Finalizing failed: {}", e);
                Err(e)
            }
        }
    }

    /// Release everything and hand back the error
    async fn fail(&mut self, error: crate::error::CompositorError) -> crate::error::CompositorError {
        warn!("Render failed while {}: {}", self.state, error);
        self.state = JobState::Failed;
        self.progress.close();
        self.source.close().await;
        if let Some(sink) = self.sink.take() {
            sink.abort().await;
        }
        error
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::FailureStage;
    use crate::filters::FilterRegistry;
    use crate::timeline::{CaptionCue, Clip};
    use crate::video::{CodecProfile, VideoMetadata, PREFERENCES};

    pub(crate) const GEOMETRY: OutputGeometry = OutputGeometry { width: 8, height: 6 };

    /// Source that lands every request instantly and shows a solid colour
    pub(crate) struct FakeSource {
        metadata: VideoMetadata,
        position: f64,
        pending: Option<f64>,
        frame: Frame,
        stall_seeks: bool,
        stall_decode: bool,
        pub(crate) seeks: Arc<Mutex<Vec<f64>>>,
        pub(crate) closed: Arc<AtomicBool>,
    }

    impl FakeSource {
        pub(crate) fn new(color: [u8; 3]) -> Self {
            Self {
                metadata: VideoMetadata {
                    path: "fake.webm".into(),
                    width: GEOMETRY.width,
                    height: GEOMETRY.height,
                    duration: 60.0,
                    frame_rate: 60.0,
                    has_audio: false,
                },
                position: 0.0,
                pending: None,
                frame: Frame::new_filled(GEOMETRY.width, GEOMETRY.height, color),
                stall_seeks: false,
                stall_decode: false,
                seeks: Arc::default(),
                closed: Arc::default(),
            }
        }

        pub(crate) fn stalling(mut self) -> Self {
            self.stall_seeks = true;
            self
        }

        /// Never produces a frame from `advance`
        pub(crate) fn stalling_decoder(mut self) -> Self {
            self.stall_decode = true;
            self
        }
    }

    #[async_trait]
    impl VideoSource for FakeSource {
        fn metadata(&self) -> &VideoMetadata {
            &self.metadata
        }

        fn position(&self) -> f64 {
            self.pending.unwrap_or(self.position)
        }

        fn request_seek(&mut self, target: f64) -> Result<()> {
            self.seeks.lock().unwrap().push(target);
            self.pending = Some(target);
            Ok(())
        }

        fn is_seeking(&self) -> bool {
            self.pending.is_some()
        }

        async fn wait_seeked(&mut self) -> Result<()> {
            if self.stall_seeks {
                std::future::pending::<()>().await;
            }
            if let Some(target) = self.pending.take() {
                self.position = target;
            }
            Ok(())
        }

        async fn advance(&mut self, target: f64) -> Result<()> {
            if self.stall_decode {
                std::future::pending::<()>().await;
            }
            self.pending = None;
            self.position = target;
            Ok(())
        }

        fn frame(&self) -> Option<&Frame> {
            Some(&self.frame)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Sink that records the top-left pixel and the lit pixel count of every frame
    #[derive(Default)]
    pub(crate) struct FakeSink {
        pub(crate) pixels: Arc<Mutex<Vec<[u8; 3]>>>,
        pub(crate) lit: Arc<Mutex<Vec<usize>>>,
        pub(crate) aborted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EncoderSink for FakeSink {
        fn profile(&self) -> &CodecProfile {
            &PREFERENCES[0]
        }

        async fn push_frame(&mut self, frame: &Frame) -> Result<()> {
            self.pixels.lock().unwrap().push(frame.get_pixel(0, 0));
            let lit = frame.as_bytes().chunks(3).filter(|px| px.iter().any(|&c| c > 0)).count();
            self.lit.lock().unwrap().push(lit);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<EncodedMedia> {
            let frames = self.pixels.lock().unwrap().len() as u64;
            Ok(EncodedMedia {
                data: vec![0x1a, 0x45, 0xdf, 0xa3],
                mime_type: PREFERENCES[0].mime_type.to_string(),
                extension: "webm".to_string(),
                duration: frames as f64 / 60.0,
                frame_count: frames,
                completed_at: Utc::now(),
            })
        }

        async fn abort(self: Box<Self>) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn job_for(
        timeline: Timeline,
        source: FakeSource,
        sink: FakeSink,
        filters: HashMap<String, ResolvedFilter>,
    ) -> (RenderJob, Arc<Mutex<Vec<f64>>>) {
        job_with(
            timeline,
            Box::new(source),
            sink,
            filters,
            None,
            GEOMETRY,
            RenderConfig::default(),
        )
    }

    fn job_with(
        timeline: Timeline,
        source: Box<dyn VideoSource>,
        sink: FakeSink,
        filters: HashMap<String, ResolvedFilter>,
        captions: Option<CaptionRenderer>,
        geometry: OutputGeometry,
        settings: RenderConfig,
    ) -> (RenderJob, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let progress = ProgressReporter::new(
            timeline.total_duration(),
            Box::new(move |p| recorder.lock().unwrap().push(p)),
        );
        let job = RenderJob::new(
            timeline,
            filters,
            captions,
            source,
            Box::new(sink),
            geometry,
            settings,
            progress,
        );
        (job, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_clip_renders_to_completion() {
        let timeline = Timeline::new(
            vec![Clip::video("v1", 0.0, 10.0, 0.0)],
            vec![Clip::audio("a1", 0.0, 10.0, 0.0)],
            vec![],
        );
        let sink = FakeSink::default();
        let pixels = Arc::clone(&sink.pixels);
        let (job, progress) = job_for(timeline, FakeSource::new([200, 10, 10]), sink, HashMap::new());
        assert_eq!(job.state(), JobState::Idle);

        let media = job.run().await.unwrap();
        assert_eq!(media.frame_count, 600);
        assert_eq!(pixels.lock().unwrap().len(), 600);

        let progress = progress.lock().unwrap();
        assert_eq!(progress.len(), 600);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100.0));
        assert_eq!(progress.iter().filter(|&&p| p == 100.0).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gaps_are_painted_black() {
        let timeline = Timeline::new(vec![Clip::video("v1", 0.0, 1.0, 1.0)], vec![], vec![]);
        let sink = FakeSink::default();
        let pixels = Arc::clone(&sink.pixels);
        let (job, _) = job_for(timeline, FakeSource::new([0, 200, 0]), sink, HashMap::new());

        job.run().await.unwrap();
        let pixels = pixels.lock().unwrap();
        assert_eq!(pixels.len(), 120);
        assert_eq!(pixels[30], [0, 0, 0]);
        assert_eq!(pixels[59], [0, 0, 0]);
        assert_eq!(pixels[60], [0, 200, 0]);
        assert_eq!(pixels[119], [0, 200, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_triggers_one_seek() {
        // Split at t=4, second half plays from source 6s onward
        let timeline = Timeline::new(
            vec![
                Clip::video("v1-a", 0.0, 4.0, 0.0),
                Clip::video("v1-b", 6.0, 12.0, 4.0),
            ],
            vec![],
            vec![],
        );
        let source = FakeSource::new([9, 9, 9]);
        let seeks = Arc::clone(&source.seeks);
        let (job, _) = job_for(timeline, source, FakeSink::default(), HashMap::new());

        job.run().await.unwrap();
        assert_eq!(*seeks.lock().unwrap(), vec![6.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_timeout_fails_the_job() {
        let timeline = Timeline::new(vec![Clip::video("v1", 30.0, 40.0, 0.0)], vec![], vec![]);
        let source = FakeSource::new([1, 2, 3]).stalling();
        let closed = Arc::clone(&source.closed);
        let sink = FakeSink::default();
        let aborted = Arc::clone(&sink.aborted);
        let (job, progress) = job_for(timeline, source, sink, HashMap::new());

        let err = job.run().await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Seek);
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::SeekTimeout { timeout_ms: 5000, .. })
        ));
        assert!(aborted.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(progress.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_filter_is_applied() {
        let timeline = Timeline::new(vec![Clip::video("v1", 0.0, 1.0, 0.0).with_filter("invert")], vec![], vec![]);
        let registry = FilterRegistry::new();
        let mut filters = HashMap::new();
        filters.insert("v1".to_string(), registry.resolve("invert").unwrap().unwrap());

        let sink = FakeSink::default();
        let pixels = Arc::clone(&sink.pixels);
        let (job, _) = job_for(timeline, FakeSource::new([255, 255, 255]), sink, filters);

        job.run().await.unwrap();
        assert!(pixels.lock().unwrap().iter().all(|&p| p == [0, 0, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caption_only_timeline_renders() {
        let timeline = Timeline::new(vec![], vec![], vec![CaptionCue::new("Hi", 0.0, 0.5, Default::default())]);
        let sink = FakeSink::default();
        let pixels = Arc::clone(&sink.pixels);
        let (job, progress) = job_for(timeline, FakeSource::new([5, 5, 5]), sink, HashMap::new());

        job.run().await.unwrap();
        assert_eq!(pixels.lock().unwrap().len(), 30);
        assert_eq!(progress.lock().unwrap().last(), Some(&100.0));
    }

    fn short_seek_timeout() -> RenderConfig {
        RenderConfig {
            seek_timeout_ms: 1_000,
            ..RenderConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_seek_that_never_lands_times_out() {
        // 0.2s of drift is above the seek tolerance but below the blocking threshold
        let timeline = Timeline::new(vec![Clip::video("v1", 0.2, 5.0, 0.0)], vec![], vec![]);
        let source = FakeSource::new([1, 2, 3]).stalling_decoder();
        let seeks = Arc::clone(&source.seeks);
        let closed = Arc::clone(&source.closed);
        let sink = FakeSink::default();
        let aborted = Arc::clone(&sink.aborted);
        let (job, progress) = job_with(
            timeline,
            Box::new(source),
            sink,
            HashMap::new(),
            None,
            GEOMETRY,
            short_seek_timeout(),
        );

        let err = job.run().await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Seek);
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::SeekTimeout { timeout_ms: 1000, .. })
        ));
        assert_eq!(*seeks.lock().unwrap(), vec![0.2]);
        assert!(aborted.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(progress.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_stall_without_seek_is_a_decode_failure() {
        let timeline = Timeline::new(vec![Clip::video("v1", 0.0, 5.0, 0.0)], vec![], vec![]);
        let source = FakeSource::new([1, 2, 3]).stalling_decoder();
        let seeks = Arc::clone(&source.seeks);
        let (job, _) = job_with(
            timeline,
            Box::new(source),
            FakeSink::default(),
            HashMap::new(),
            None,
            GEOMETRY,
            short_seek_timeout(),
        );

        let err = job.run().await.unwrap_err();
        assert_eq!(err.stage(), FailureStage::Decode);
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::DecodingFailed { .. })
        ));
        assert!(seeks.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_ffmpeg_decoder_fails_within_the_seek_timeout() {
        use crate::video::source::tests::{fake_decoder, tiny_metadata};
        use crate::video::FfmpegVideoSource;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_decoder(dir.path(), "sleep 60");
        let source = FfmpegVideoSource::new(&ffmpeg, tiny_metadata(), GEOMETRY, 60);

        let timeline = Timeline::new(vec![Clip::video("v1", 0.2, 5.0, 0.0)], vec![], vec![]);
        let settings = RenderConfig {
            seek_timeout_ms: 300,
            ..RenderConfig::default()
        };
        let (job, _) = job_with(
            timeline,
            Box::new(source),
            FakeSink::default(),
            HashMap::new(),
            None,
            GEOMETRY,
            settings,
        );

        let result = tokio::time::timeout(Duration::from_secs(5), job.run())
            .await
            .expect("render job hung on a stalled decoder");
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::SeekTimeout { timeout_ms: 300, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    #[ignore = "needs a system TrueType font such as DejaVu Sans Bold"]
    async fn test_captions_composited_only_while_cue_is_active() {
        let geometry = OutputGeometry { width: 320, height: 180 };
        let timeline = Timeline::new(vec![], vec![], vec![CaptionCue::new("Hi", 0.5, 1.0, Default::default())]);
        let renderer = crate::captions::renderer::tests::system_renderer();
        let sink = FakeSink::default();
        let lit = Arc::clone(&sink.lit);
        let (job, _) = job_with(
            timeline,
            Box::new(FakeSource::new([0, 0, 0])),
            sink,
            HashMap::new(),
            Some(renderer),
            geometry,
            RenderConfig::default(),
        );

        job.run().await.unwrap();
        let lit = lit.lock().unwrap();
        assert_eq!(lit.len(), 60);
        assert!(lit[..29].iter().all(|&n| n == 0));
        // Pop peaks halfway through the cue
        assert!(lit[45] > 0);
    }
}
