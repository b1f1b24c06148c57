//! Assessment submission, revision and consensus resolution.
//!
//! Every finalization locks the markup row first, writes the answer, and
//! re-evaluates consensus before committing. Concurrent answers to the same
//! markup therefore resolve one after another, and a markup's status always
//! matches the assessment rows that are committed with it.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use tracing::{Instrument, debug, info};

use super::batch::{field_catalogue_on, get_batch_on, get_markup_on};
use crate::consensus::{self, Tally, Verdict};
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::model::*;
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_status_transition, start_assessment_span};

/// Result of submitting or revising an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub assessment_id: AssessmentId,
    pub hash: String,
    pub markup_processed: bool,
    pub correct_hash: Option<String>,
}

impl super::Db {
    /// Submit or revise the caller's answer for a markup.
    ///
    /// Admins always write a fresh authoritative answer, replacing any earlier
    /// admin answer on the markup, and the markup is processed on their
    /// fingerprint. Everyone else finalizes or revises the assessment they
    /// already hold on the markup; holding none (never reserved, or reaped)
    /// is a `Conflict`.
    pub async fn submit_assessment(
        &self,
        identity: &Identity,
        markup_id: MarkupId,
        fields: Vec<AssessmentField>,
    ) -> Result<SubmitOutcome> {
        identity.require_answerer()?;
        let span = start_assessment_span("submit", identity.user_id, markup_id);
        self.submit_inner(identity, markup_id, fields, &span)
            .instrument(span.clone())
            .await
    }

    /// Replace the fields of an existing assessment, addressed by id.
    ///
    /// Only the owner may edit; non-admins only within the edit window.
    pub async fn update_assessment(
        &self,
        identity: &Identity,
        assessment_id: AssessmentId,
        fields: Vec<AssessmentField>,
    ) -> Result<SubmitOutcome> {
        identity.require_answerer()?;

        let markup_id: Option<i64> =
            sqlx::query_scalar("SELECT markup_id FROM assessments WHERE id = $1")
                .bind(assessment_id.0)
                .fetch_optional(self.pool())
                .await?;
        let markup_id =
            MarkupId(markup_id.ok_or_else(|| Error::NotFound(format!("assessment {assessment_id}")))?);

        let span = start_assessment_span("update", identity.user_id, markup_id);
        async {
            let now = self.now();
            let mut tx = self.pool().begin().await?;
            let markup = get_markup_on(&mut *tx, markup_id, true).await?;

            // Reload under the markup lock; the reaper may have removed it.
            let current = load_assessment_on(&mut *tx, assessment_id).await?;
            current.ensure_editable_by(identity, now, self.timing().edit_window)?;

            let outcome = finalize_on(&mut *tx, &markup, &current, &fields, now, &span).await?;
            tx.commit().await?;

            record_submission(identity, &outcome);
            Ok::<_, Error>(outcome)
        }
        .instrument(span.clone())
        .await
    }

    async fn submit_inner(
        &self,
        identity: &Identity,
        markup_id: MarkupId,
        fields: Vec<AssessmentField>,
        span: &tracing::Span,
    ) -> Result<SubmitOutcome> {
        let now = self.now();
        let mut tx = self.pool().begin().await?;
        let markup = get_markup_on(&mut *tx, markup_id, true).await?;

        let current = if identity.is_admin {
            let removed = sqlx::query(
                "DELETE FROM assessments
                 WHERE markup_id = $1 AND (is_prior OR (user_id = $2 AND hash IS NULL))",
            )
            .bind(markup_id.0)
            .bind(identity.user_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if removed > 0 {
                debug!(markup_id = %markup_id, removed, "superseded earlier admin answer");
            }

            // Inserted already finalized: an admin may hold an open
            // reservation elsewhere, and only one open row per user is allowed.
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO assessments (markup_id, user_id, is_prior, hash, created_at, updated_at)
                 VALUES ($1, $2, TRUE, $3, $4, $4)
                 RETURNING id",
            )
            .bind(markup_id.0)
            .bind(identity.user_id.0)
            .bind(fingerprint(&fields))
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            load_assessment_on(&mut *tx, AssessmentId(id)).await?
        } else {
            let held: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM assessments
                 WHERE markup_id = $1 AND user_id = $2 AND NOT is_prior
                 FOR UPDATE",
            )
            .bind(markup_id.0)
            .bind(identity.user_id.0)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(id) = held else {
                return Err(Error::Conflict(format!(
                    "user {} holds no assessment for markup {markup_id}; the reservation may have expired",
                    identity.user_id
                )));
            };
            let current = load_assessment_on(&mut *tx, AssessmentId(id)).await?;
            current.ensure_editable_by(identity, now, self.timing().edit_window)?;
            current
        };

        let outcome = finalize_on(&mut *tx, &markup, &current, &fields, now, span).await?;
        tx.commit().await?;

        record_submission(identity, &outcome);
        Ok(outcome)
    }

    /// Fetch one assessment with its fields, finalized or not.
    pub async fn get_assessment(&self, id: AssessmentId) -> Result<Assessment> {
        let mut conn = self.pool().acquire().await?;
        load_assessment_on(&mut *conn, id).await
    }

    /// Finalized assessments matching `filters`, oldest first.
    pub async fn list_assessments(&self, filters: &AssessmentFilters) -> Result<Vec<Assessment>> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            "SELECT id, markup_id, user_id, is_prior, hash, created_at, updated_at
             FROM assessments
             WHERE hash IS NOT NULL
               AND ($1::BIGINT IS NULL OR markup_id = $1)
               AND ($2::BIGINT IS NULL OR user_id = $2)
             ORDER BY id ASC",
        )
        .bind(filters.markup_id.map(|id| id.0))
        .bind(filters.user_id.map(|id| id.0))
        .fetch_all(self.pool())
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let field_rows: Vec<(i64, i64, Option<String>)> = sqlx::query_as(
            "SELECT assessment_id, markup_type_field_id, text
             FROM assessment_fields
             WHERE assessment_id = ANY($1)
             ORDER BY assessment_id, position",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        let mut by_assessment: HashMap<i64, Vec<AssessmentField>> = HashMap::new();
        for (aid, field_id, text) in field_rows {
            by_assessment.entry(aid).or_default().push(AssessmentField {
                markup_type_field_id: MarkupTypeFieldId(field_id),
                text,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let fields = by_assessment.remove(&row.id).unwrap_or_default();
                row.into_assessment(fields)
            })
            .collect())
    }

    /// How many of a user's finalized answers match their markup's settled
    /// fingerprint. Answers on pending markups count as not correct.
    pub async fn user_stats(&self, user_id: UserId) -> Result<UserStats> {
        let (assessment_count, correct_assessment_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE a.hash = m.correct_hash)
             FROM assessments a
             JOIN markups m ON m.id = a.markup_id
             WHERE a.user_id = $1 AND a.hash IS NOT NULL",
        )
        .bind(user_id.0)
        .fetch_one(self.pool())
        .await?;

        Ok(UserStats {
            assessment_count,
            correct_assessment_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Transaction steps
// ---------------------------------------------------------------------------

/// Write `fields` into `current`, stamp its fingerprint, and resolve the
/// markup. The caller holds the markup row lock.
async fn finalize_on(
    conn: &mut PgConnection,
    markup: &Markup,
    current: &Assessment,
    fields: &[AssessmentField],
    now: DateTime<Utc>,
    span: &tracing::Span,
) -> Result<SubmitOutcome> {
    validate_fields_on(&mut *conn, markup.batch_id, fields).await?;
    let hash = fingerprint(fields);

    replace_fields_on(&mut *conn, current.id, fields).await?;
    sqlx::query("UPDATE assessments SET hash = $1, updated_at = $2 WHERE id = $3")
        .bind(&hash)
        .bind(now)
        .bind(current.id.0)
        .execute(&mut *conn)
        .await?;

    let verdict = resolve_on(&mut *conn, markup, Some(&hash), span).await?;

    Ok(SubmitOutcome {
        assessment_id: current.id,
        hash,
        markup_processed: verdict.is_processed(),
        correct_hash: verdict.correct_hash().map(str::to_string),
    })
}

/// Every answered field must belong to a markup type of the markup's batch.
async fn validate_fields_on(
    conn: &mut PgConnection,
    batch_id: BatchId,
    fields: &[AssessmentField],
) -> Result<()> {
    let known: HashSet<MarkupTypeFieldId> = field_catalogue_on(&mut *conn, batch_id)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let mut unknown: Vec<String> = fields
        .iter()
        .map(|f| f.markup_type_field_id)
        .filter(|id| !known.contains(id))
        .map(|id| id.to_string())
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort();
    unknown.dedup();
    Err(Error::Validation(format!(
        "fields [{}] do not belong to batch {batch_id}",
        unknown.join(", ")
    )))
}

async fn replace_fields_on(
    conn: &mut PgConnection,
    assessment_id: AssessmentId,
    fields: &[AssessmentField],
) -> Result<()> {
    sqlx::query("DELETE FROM assessment_fields WHERE assessment_id = $1")
        .bind(assessment_id.0)
        .execute(&mut *conn)
        .await?;

    for (position, field) in fields.iter().enumerate() {
        sqlx::query(
            "INSERT INTO assessment_fields (assessment_id, markup_type_field_id, position, text)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(assessment_id.0)
        .bind(field.markup_type_field_id.0)
        .bind(position as i32)
        .bind(&field.text)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Recompute and store a markup's consensus from its committed answers.
///
/// Works in both directions: a markup may become processed, switch to a
/// different winning fingerprint, or fall back to pending.
pub(crate) async fn resolve_on(
    conn: &mut PgConnection,
    markup: &Markup,
    preferred: Option<&str>,
    span: &tracing::Span,
) -> Result<Verdict> {
    let batch = get_batch_on(&mut *conn, markup.batch_id).await?;

    let prior: Option<String> = sqlx::query_scalar(
        "SELECT hash FROM assessments
         WHERE markup_id = $1 AND is_prior AND hash IS NOT NULL",
    )
    .bind(markup.id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let tallies: Vec<Tally> = sqlx::query_as::<_, (String, i64)>(
        "SELECT hash, COUNT(*) FROM assessments
         WHERE markup_id = $1 AND NOT is_prior AND hash IS NOT NULL
         GROUP BY hash",
    )
    .bind(markup.id.0)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(hash, count)| Tally { hash, count })
    .collect();

    let verdict = consensus::decide(prior.as_deref(), &tallies, batch.overlap, preferred);
    let status = if verdict.is_processed() {
        MarkupStatus::Processed
    } else {
        MarkupStatus::Pending
    };

    sqlx::query("UPDATE markups SET status = $1, correct_hash = $2 WHERE id = $3")
        .bind(status.to_string())
        .bind(verdict.correct_hash())
        .bind(markup.id.0)
        .execute(&mut *conn)
        .await?;

    if status != markup.status || verdict.correct_hash() != markup.correct_hash.as_deref() {
        let from = markup.status.to_string();
        let to = status.to_string();
        record_status_transition(span, &from, &to);
        info!(
            markup_id = %markup.id,
            from = %from,
            to = %to,
            correct_hash = verdict.correct_hash(),
            "markup consensus changed"
        );
        metrics::markup_transitions()
            .add(1, &[KeyValue::new("from", from), KeyValue::new("to", to)]);
    }

    Ok(verdict)
}

fn record_submission(identity: &Identity, outcome: &SubmitOutcome) {
    let role = if identity.is_admin { "admin" } else { "assessor" };
    let result = if outcome.markup_processed {
        "processed"
    } else {
        "pending"
    };
    metrics::assessments_submitted().add(
        1,
        &[KeyValue::new("role", role), KeyValue::new("markup", result)],
    );
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub(crate) async fn load_assessment_on(
    conn: &mut PgConnection,
    id: AssessmentId,
) -> Result<Assessment> {
    let row: Option<AssessmentRow> = sqlx::query_as(
        "SELECT id, markup_id, user_id, is_prior, hash, created_at, updated_at
         FROM assessments WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;
    let row = row.ok_or_else(|| Error::NotFound(format!("assessment {id}")))?;

    let fields: Vec<(i64, Option<String>)> = sqlx::query_as(
        "SELECT markup_type_field_id, text
         FROM assessment_fields
         WHERE assessment_id = $1
         ORDER BY position",
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?;

    Ok(row.into_assessment(
        fields
            .into_iter()
            .map(|(field_id, text)| AssessmentField {
                markup_type_field_id: MarkupTypeFieldId(field_id),
                text,
            })
            .collect(),
    ))
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: i64,
    markup_id: i64,
    user_id: i64,
    is_prior: bool,
    hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AssessmentRow {
    fn into_assessment(self, fields: Vec<AssessmentField>) -> Assessment {
        Assessment {
            id: AssessmentId(self.id),
            markup_id: MarkupId(self.markup_id),
            user_id: UserId(self.user_id),
            is_prior: self.is_prior,
            hash: self.hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
            fields,
        }
    }
}
