use tracing::{Span, field};

use super::TraceId;

/// Root span for a request or a background job iteration.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
        cart_id = field::Empty,
        buyer_id = field::Empty
    )
}

/// Child span; inherits the trace id from the enclosing root span.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name, cart_id = field::Empty)
}
