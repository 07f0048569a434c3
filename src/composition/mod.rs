//! # Composition Engine
//!
//! The composition engine validates a timeline, prepares the audio bus and
//! encoder, and drives the frame loop that composites every output frame.

pub mod clock;
pub mod engine;
pub mod job;
pub mod progress;

// Re-exports for convenience
pub use clock::FrameClock;
pub use engine::{CompositionEngine, RenderRequest};
pub use job::{JobState, RenderJob};
pub use progress::{ProgressCallback, ProgressReporter};
