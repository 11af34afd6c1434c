//! Observability: metrics and tracing spans for the transform element.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `parallax_vision_frames_transformed` | Counter | Frames transformed successfully |
//! | `parallax_vision_frame_errors` | Counter | Frames that failed, labelled by error kind |
//! | `parallax_vision_pool_buffers_available` | Gauge | Idle buffers in the output pool |
//! | `parallax_vision_transform_time_ns` | Histogram | Time spent per frame |
//!
//! Every metric carries `element` and `unique_id` labels.
//!
//! ## Tracing
//!
//! Each frame runs inside a `transform` span and each negotiation inside a
//! `negotiate` span, both at debug level.
//!
//! ## Example
//!
//! ```rust
//! use parallax_vision::observability::{TransformMetrics, init_metrics};
//!
//! init_metrics();
//! let metrics = TransformMetrics::new("passthrough", 1);
//! metrics.record_frame();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{TransformMetrics, init_metrics};
pub use tracing_support::{span_negotiation, span_transform};
