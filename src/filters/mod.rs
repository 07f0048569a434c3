//! # Visual Filters
//!
//! Per-clip transforms applied to the output surface after the source image
//! is drawn and before captions are composited. A clip names its filter with
//! a CSS-like expression: `sepia`, `contrast(1.4)`, `grayscale(50%)`.
//!
//! ## Built-in Filters
//!
//! - **grayscale**, **sepia**, **invert**: amount in 0..=1, default 1
//! - **brightness**, **contrast**, **saturate**: linear factor, default 1
//! - **vhs**: scan lines, color bleeding, tracking errors, noise; default 0.8
//!
//! ## Usage
//!
//! ```rust
//! use timeline_compositor::filters::FilterRegistry;
//! use timeline_compositor::video::Frame;
//!
//! let registry = FilterRegistry::new();
//! let sepia = registry.resolve("sepia(60%)").unwrap().unwrap();
//!
//! let mut frame = Frame::new_filled(4, 4, [120, 120, 120]);
//! sepia.apply(&mut frame, 0).unwrap();
//! ```

pub mod color;
pub mod registry;
pub mod traits;
pub mod vhs;

pub use color::{Brightness, Contrast, Grayscale, Invert, Saturate, Sepia};
pub use registry::{FilterRegistry, ResolvedFilter};
pub use traits::{Filter, FilterParams, FilterSpec};
pub use vhs::{VhsFilter, VhsSettings};
