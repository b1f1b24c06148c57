//! Metric instrument factories for markup-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"markup-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for markup-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("markup-rs")
}

/// Counter: work requests by outcome.
/// Labels: `result` ("reserved" | "resumed" | "empty" | "lost_race").
pub fn reservations() -> Counter<u64> {
    meter()
        .u64_counter("markup.reservations")
        .with_description("Number of work requests by outcome")
        .build()
}

/// Counter: new reservations per priority tier.
/// Labels: `priority`.
pub fn reservations_by_tier() -> Counter<u64> {
    meter()
        .u64_counter("markup.reservations.tier")
        .with_description("Number of reservations made per priority tier")
        .build()
}

/// Counter: finalized or revised answers.
/// Labels: `role` ("admin" | "assessor"), `markup` ("processed" | "pending").
pub fn assessments_submitted() -> Counter<u64> {
    meter()
        .u64_counter("markup.assessments.submitted")
        .with_description("Number of assessments finalized or revised")
        .build()
}

/// Counter: markup consensus changes.
/// Labels: `from`, `to`.
pub fn markup_transitions() -> Counter<u64> {
    meter()
        .u64_counter("markup.status_transitions")
        .with_description("Number of markup status or settled-answer changes")
        .build()
}

/// Counter: abandoned reservations deleted by the reaper.
pub fn reservations_reaped() -> Counter<u64> {
    meter()
        .u64_counter("markup.reservations.reaped")
        .with_description("Number of abandoned reservations reclaimed")
        .build()
}

/// Counter: reaper passes that failed.
pub fn reaper_failures() -> Counter<u64> {
    meter()
        .u64_counter("markup.reaper.failures")
        .with_description("Number of failed reaper passes")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("markup.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
