//! # Audio Mixing Module
//!
//! Decodes the narration asset once and mixes every audio clip onto a single
//! bus that is handed to the encoder alongside the composited frames.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timeline_compositor::audio::{schedule_all, AudioLoader, AudioMixGraph};
//! use timeline_compositor::timeline::Clip;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let narration = Arc::new(AudioLoader::load("narration.wav").await?);
//!
//! let mut graph = AudioMixGraph::new(narration, 48_000, 2);
//! schedule_all(&mut graph, &[Clip::audio("a1", 0.0, 8.0, 0.5).with_rate(1.25)]);
//!
//! let bus = graph.render(10.0);
//! bus.write_wav("bus.wav")?;
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod mixer;
pub mod types;

pub use loader::AudioLoader;
pub use mixer::{schedule_all, AudioMixGraph, MixBus, ScheduledSegment};
pub use types::{AudioData, AudioFormat};
