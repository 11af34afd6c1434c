//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRAMES_TRANSFORMED: &str = "parallax_vision_frames_transformed";
const FRAME_ERRORS: &str = "parallax_vision_frame_errors";
const POOL_BUFFERS_AVAILABLE: &str = "parallax_vision_pool_buffers_available";
const TRANSFORM_TIME_NS: &str = "parallax_vision_transform_time_ns";

/// Describe the crate's metrics.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_TRANSFORMED,
        Unit::Count,
        "Frames transformed successfully"
    );
    metrics::describe_counter!(
        FRAME_ERRORS,
        Unit::Count,
        "Frames whose transform failed"
    );
    metrics::describe_gauge!(
        POOL_BUFFERS_AVAILABLE,
        Unit::Count,
        "Idle buffers in the output pool"
    );
    metrics::describe_histogram!(
        TRANSFORM_TIME_NS,
        Unit::Nanoseconds,
        "Time to transform a single frame"
    );
}

/// Metric handles for one element instance.
#[derive(Clone)]
pub struct TransformMetrics {
    element: String,
    unique_id: String,
    frames: Counter,
    pool_available: Gauge,
    transform_time: Histogram,
}

impl TransformMetrics {
    /// Create handles labelled with the element name and instance id.
    pub fn new(element: &str, unique_id: u32) -> Self {
        let unique_id = unique_id.to_string();
        Self {
            frames: counter!(
                FRAMES_TRANSFORMED,
                "element" => element.to_string(),
                "unique_id" => unique_id.clone()
            ),
            pool_available: gauge!(
                POOL_BUFFERS_AVAILABLE,
                "element" => element.to_string(),
                "unique_id" => unique_id.clone()
            ),
            transform_time: histogram!(
                TRANSFORM_TIME_NS,
                "element" => element.to_string(),
                "unique_id" => unique_id.clone()
            ),
            element: element.to_string(),
            unique_id,
        }
    }

    /// Record a successfully transformed frame.
    #[inline]
    pub fn record_frame(&self) {
        self.frames.increment(1);
    }

    /// Record a failed frame.
    pub fn record_error(&self, kind: &'static str) {
        counter!(
            FRAME_ERRORS,
            "element" => self.element.clone(),
            "unique_id" => self.unique_id.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    /// Record idle buffers in the output pool.
    #[inline]
    pub fn record_pool_available(&self, available: usize) {
        self.pool_available.set(available as f64);
    }

    /// Record time spent on one frame.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.transform_time.record(duration.as_nanos() as f64);
    }

    /// The element label.
    pub fn element(&self) -> &str {
        &self.element
    }
}

impl std::fmt::Debug for TransformMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformMetrics")
            .field("element", &self.element)
            .field("unique_id", &self.unique_id)
            .finish_non_exhaustive()
    }
}
