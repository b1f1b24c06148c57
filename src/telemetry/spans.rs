//! Span helpers for reservation and assessment operations.

use tracing::Span;

use crate::model::{BatchId, MarkupId, UserId};

/// Start a span for a work request.
pub fn start_reservation_span(user_id: UserId) -> Span {
    tracing::info_span!("markup.request_next", "user.id" = user_id.0)
}

/// Start a span for an assessment submission or edit.
///
/// The `markup.status` field is declared empty and is filled by
/// [`record_status_transition`] when consensus changes.
pub fn start_assessment_span(operation: &'static str, user_id: UserId, markup_id: MarkupId) -> Span {
    tracing::info_span!(
        "markup.assessment",
        "assessment.operation" = operation,
        "user.id" = user_id.0,
        "markup.id" = markup_id.0,
        "markup.status" = tracing::field::Empty,
    )
}

/// Start a span for a batch settings change. Consensus changes it causes
/// are recorded here like those of an assessment.
pub fn start_batch_span(batch_id: BatchId) -> Span {
    tracing::info_span!(
        "markup.batch_update",
        "batch.id" = batch_id.0,
        "markup.status" = tracing::field::Empty,
    )
}

/// Record a markup status transition on the given span.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.record("markup.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
