//! Prometheus metrics collection for stdforum.
//!
//! Exposed on `/metrics` when `server.metrics` is enabled.
//!
//! - `forum_requests_total{route}` - Requests handled by route
//! - `forum_request_duration_seconds{route}` - Route latency histogram
//! - `forum_request_errors_total{route,error}` - Error responses by code
//! - `forum_chat_fanout` - Notification rows created per chat message

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Chat messages persisted.
pub static MESSAGES_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Failed login attempts (bad credentials, disallowed domain, rate limited).
pub static LOGIN_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Badges granted, by tier.
pub static BADGES_AWARDED: OnceLock<IntCounterVec> = OnceLock::new();

/// Link preview fetches, by result.
pub static LINK_PREVIEWS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Per-route metrics
// ========================================================================

pub static ROUTE_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

pub static ROUTE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

pub static ROUTE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Notification rows created per chat message.
pub static CHAT_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                let m = $init.expect(concat!(stringify!($metric), " creation failed"));
                if let Err(e) = r.register(Box::new(m.clone())) {
                    tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                }
                let _ = $metric.set(m);
            }
        };
    }

    register!(MESSAGES_SENT, IntCounter::new("forum_chat_messages_total", "Chat messages sent"));
    register!(LOGIN_FAILURES, IntCounterVec::new(Opts::new("forum_login_failures_total", "Failed logins by reason"), &["reason"]));
    register!(BADGES_AWARDED, IntCounterVec::new(Opts::new("forum_badges_awarded_total", "Badges awarded by tier"), &["tier"]));
    register!(LINK_PREVIEWS, IntCounterVec::new(Opts::new("forum_link_previews_total", "Link preview fetches by result"), &["result"]));

    register!(ROUTE_COUNTER, IntCounterVec::new(Opts::new("forum_requests_total", "Requests handled by route"), &["route"]));
    register!(ROUTE_LATENCY, HistogramVec::new(
        HistogramOpts::new("forum_request_duration_seconds", "Request latency by route")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["route"]));
    register!(ROUTE_ERRORS, IntCounterVec::new(Opts::new("forum_request_errors_total", "Error responses by route and code"), &["route", "error"]));
    register!(CHAT_FANOUT, Histogram::with_opts(
        HistogramOpts::new("forum_chat_fanout", "Notification rows per chat message")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers; all are no-ops until `init` has run.
// ============================================================================

#[inline]
pub fn record_route(route: &str, duration_secs: f64) {
    if let Some(c) = ROUTE_COUNTER.get() {
        c.with_label_values(&[route]).inc();
    }
    if let Some(h) = ROUTE_LATENCY.get() {
        h.with_label_values(&[route]).observe(duration_secs);
    }
}

#[inline]
pub fn record_route_error(route: &str, error: &str) {
    if let Some(c) = ROUTE_ERRORS.get() {
        c.with_label_values(&[route, error]).inc();
    }
}

/// Record a sent chat message and its notification fan-out.
#[inline]
pub fn record_message(recipients: u64) {
    if let Some(c) = MESSAGES_SENT.get() {
        c.inc();
    }
    if let Some(h) = CHAT_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn record_login_failure(reason: &str) {
    if let Some(c) = LOGIN_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_badge(tier: &str) {
    if let Some(c) = BADGES_AWARDED.get() {
        c.with_label_values(&[tier]).inc();
    }
}

#[inline]
pub fn record_link_preview(result: &str) {
    if let Some(c) = LINK_PREVIEWS.get() {
        c.with_label_values(&[result]).inc();
    }
}
