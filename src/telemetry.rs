//! Telemetry utilities for route timing and request spans.

use std::time::Instant;

/// Guard for timing a request and recording route metrics.
///
/// Records latency when dropped, so early returns are counted too.
/// The label is the method plus the matched route template
/// (`GET /api/questions/:id`), never the raw URI.
pub struct RouteTimer {
    route: String,
    start: Instant,
}

impl RouteTimer {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            start: Instant::now(),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

impl Drop for RouteTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_route(&self.route, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one HTTP request.
    pub fn request(method: &str, route: &str) -> Span {
        info_span!("request", method = %method, route = %route)
    }

    /// Span for a chat operation.
    pub fn chat(kind: &str, chat_id: i64, user_id: i64) -> Span {
        info_span!("chat", kind = %kind, chat_id = chat_id, user_id = user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_on_drop() {
        crate::metrics::init();
        {
            let timer = RouteTimer::new("GET /timer-test");
            assert_eq!(timer.route(), "GET /timer-test");
        }
        assert!(crate::metrics::gather_metrics().contains("GET /timer-test"));
    }
}
