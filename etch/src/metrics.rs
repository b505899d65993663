//! Metrics declaration and recording.
//!
//! Without the `metrics` feature every recording function is an empty inline
//! function the compiler removes.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track upstream requests by kind.
    pub static ref UPSTREAM_REQUESTS: &'static str = {
        metrics::describe_counter!(
            "etch_upstream_requests_total",
            "Total number of upstream requests, labelled by kind (plain, ranged, refetch)."
        );
        "etch_upstream_requests_total"
    };
    /// Track callers served by another caller's fetch.
    pub static ref DEDUPLICATED_FOLLOWERS: &'static str = {
        metrics::describe_counter!(
            "etch_deduplicated_total",
            "Total number of requests that awaited an in-flight fetch."
        );
        "etch_deduplicated_total"
    };
    /// Track overlap byte mismatches.
    pub static ref CONSISTENCY_FAILURES: &'static str = {
        metrics::describe_counter!(
            "etch_consistency_failures_total",
            "Total number of partial responses whose overlap byte did not match the cache."
        );
        "etch_consistency_failures_total"
    };
    /// Track store writes by outcome.
    pub static ref CACHE_WRITES: &'static str = {
        metrics::describe_counter!(
            "etch_cache_writes_total",
            "Total number of cache write attempts, labelled by outcome."
        );
        "etch_cache_writes_total"
    };
    /// Track events dropped because a subscriber buffer was full.
    pub static ref DROPPED_EVENTS: &'static str = {
        metrics::describe_counter!(
            "etch_dropped_events_total",
            "Total number of cache events dropped for slow subscribers."
        );
        "etch_dropped_events_total"
    };
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_upstream_request(kind: &'static str) {
    metrics::counter!(*UPSTREAM_REQUESTS, "kind" => kind).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_upstream_request(_kind: &'static str) {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_follower() {
    metrics::counter!(*DEDUPLICATED_FOLLOWERS).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_follower() {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_consistency_failure() {
    metrics::counter!(*CONSISTENCY_FAILURES).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_consistency_failure() {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_cache_write(outcome: &'static str) {
    metrics::counter!(*CACHE_WRITES, "outcome" => outcome).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_cache_write(_outcome: &'static str) {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_dropped_event() {
    metrics::counter!(*DROPPED_EVENTS).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_dropped_event() {}
