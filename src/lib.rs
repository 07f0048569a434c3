//! # Timeline Compositor
//!
//! Render an edited timeline of trimmed, re-timed video and audio clips with
//! animated captions into a single encoded video file.
//!
//! The clips cut from one screen recording and one narration track. Every
//! output frame is composited in real time: the active video clip's source
//! frame is drawn, its filter applied and the active captions drawn on top.
//! Audio clips are mixed onto a single bus that is muxed with the frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timeline_compositor::{
//!     CaptionCue, Clip, CompositionEngine, Config, RenderMode, RenderRequest, Timeline,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let timeline = Timeline::new(
//!     vec![
//!         Clip::video("intro", 0.0, 6.0, 0.0),
//!         Clip::video("demo", 10.0, 16.0, 6.0).with_filter("sepia(60%)"),
//!     ],
//!     vec![Clip::audio("voice", 0.0, 12.0, 0.0)],
//!     vec![CaptionCue::new("Welcome!", 0.5, 2.5, Default::default())],
//! );
//!
//! let engine = CompositionEngine::new(Config::default());
//! let request = RenderRequest::new("screen.webm", "voice.webm", timeline)
//!     .with_mode(RenderMode::Quality);
//!
//! let media = engine
//!     .compose(request, |percent| println!("{:.0}%", percent))
//!     .await?;
//! media.save(format!("output.{}", media.extension)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`timeline`] - Clip and caption model, active-clip lookups
//! - [`audio`] - Narration decoding and the mix bus
//! - [`video`] - Frame surfaces, the seekable source and the encoder sink
//! - [`filters`] - Per-clip visual filters
//! - [`captions`] - Caption rasterization and animation
//! - [`composition`] - Frame clock, render job and the engine
//! - [`config`] - Configuration management
//!
//! ## Custom Filters
//!
//! Register additional filters by implementing the [`Filter`](filters::Filter) trait:
//!
//! ```rust,no_run
//! use timeline_compositor::filters::{Filter, FilterParams, FilterRegistry};
//! use timeline_compositor::video::Frame;
//! use timeline_compositor::Result;
//!
//! struct Posterize;
//!
//! impl Filter for Posterize {
//!     fn name(&self) -> &str {
//!         "posterize"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Reduce each channel to a few levels"
//!     }
//!
//!     fn apply(&self, frame: &mut Frame, _params: &FilterParams) -> Result<()> {
//!         for byte in frame.as_bytes_mut() {
//!             *byte &= 0xC0;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = FilterRegistry::new();
//! registry.register("posterize", || Box::new(Posterize));
//! ```

pub mod audio;
pub mod captions;
pub mod composition;
pub mod config;
pub mod error;
pub mod filters;
pub mod timeline;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionEngine, RenderRequest},
    config::Config,
    error::{CompositorError, FailureStage, Result},
    timeline::{CaptionCue, CaptionEffect, Clip, RenderMode, Timeline},
    video::EncodedMedia,
};
