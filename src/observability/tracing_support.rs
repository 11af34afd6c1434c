//! Tracing spans for the transform element.

use tracing::{Level, Span, span};

/// Span covering one frame.
///
/// ```rust
/// use parallax_vision::observability::span_transform;
///
/// let span = span_transform("passthrough", 1, 0);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_transform(element: &str, unique_id: u32, frame_num: u64) -> Span {
    span!(
        Level::DEBUG,
        "transform",
        element = %element,
        unique_id,
        frame_num
    )
}

/// Span covering caps negotiation.
#[inline]
pub fn span_negotiation(element: &str, unique_id: u32) -> Span {
    span!(Level::DEBUG, "negotiate", element = %element, unique_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_enter() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);
        let span = span_transform("test", 3, 10);
        let _guard = span.enter();
        let negotiation = span_negotiation("test", 3);
        let _inner = negotiation.enter();
        tracing::debug!("inside spans");
    }
}
