//! Batch and markup administration: creation, settings, progress, lookup.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{Instrument, info};

use super::assessment::{load_assessment_on, resolve_on};
use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::spans::start_batch_span;

impl super::Db {
    /// Create a batch with one markup type carrying the given fields.
    pub async fn create_batch(&self, new: NewBatch) -> Result<(Batch, Vec<MarkupTypeField>)> {
        new.validate()?;

        let now = self.now();
        let mut tx = self.pool().begin().await?;

        let row: BatchRow = sqlx::query_as(
            "INSERT INTO batches (name, priority, overlap, is_active, is_honeypot, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, name, priority, overlap, is_active, is_honeypot, created_at",
        )
        .bind(&new.name)
        .bind(new.priority)
        .bind(new.overlap)
        .bind(new.is_active)
        .bind(new.is_honeypot)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let (type_id,): (i64,) =
            sqlx::query_as("INSERT INTO markup_types (batch_id, name) VALUES ($1, $2) RETURNING id")
                .bind(row.id)
                .bind(&new.markup_type)
                .fetch_one(&mut *tx)
                .await?;

        let mut fields = Vec::with_capacity(new.fields.len());
        for label in &new.fields {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO markup_type_fields (markup_type_id, label) VALUES ($1, $2) RETURNING id",
            )
            .bind(type_id)
            .bind(label)
            .fetch_one(&mut *tx)
            .await?;
            fields.push(MarkupTypeField {
                id: MarkupTypeFieldId(id),
                label: label.clone(),
            });
        }

        tx.commit().await?;

        let batch = Batch::from(row);
        info!(
            batch_id = %batch.id,
            priority = batch.priority,
            overlap = batch.overlap,
            honeypot = batch.is_honeypot,
            fields = fields.len(),
            "batch created"
        );
        Ok((batch, fields))
    }

    pub async fn get_batch(&self, id: BatchId) -> Result<Batch> {
        let mut conn = self.pool().acquire().await?;
        get_batch_on(&mut *conn, id).await
    }

    /// Flip a batch between active and inactive. Returns the new state.
    ///
    /// Inactive batches hand out no work; reservations already made stay
    /// valid and can still be submitted.
    pub async fn toggle_batch_active(&self, id: BatchId) -> Result<bool> {
        let active: Option<bool> = sqlx::query_scalar(
            "UPDATE batches SET is_active = NOT is_active WHERE id = $1 RETURNING is_active",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        let active = active.ok_or_else(|| Error::NotFound(format!("batch {id}")))?;
        info!(batch_id = %id, active, "batch activation toggled");
        Ok(active)
    }

    /// Change a batch's name, priority, overlap and activation.
    ///
    /// A new overlap applies to existing markups at once: each markup of the
    /// batch is re-resolved under its row lock in the same transaction, so
    /// lowering it can settle pending markups and raising it can return
    /// processed ones to pending. A markup that stays settled keeps its
    /// winner while that still has support.
    pub async fn update_batch(&self, id: BatchId, settings: BatchSettings) -> Result<Batch> {
        settings.validate()?;
        let span = start_batch_span(id);

        async {
            let mut tx = self.pool().begin().await?;

            let row: Option<BatchRow> = sqlx::query_as(
                "SELECT id, name, priority, overlap, is_active, is_honeypot, created_at
                 FROM batches WHERE id = $1 FOR UPDATE",
            )
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
            let before = Batch::from(row.ok_or_else(|| Error::NotFound(format!("batch {id}")))?);

            let row: BatchRow = sqlx::query_as(
                "UPDATE batches SET name = $1, priority = $2, overlap = $3, is_active = $4
                 WHERE id = $5
                 RETURNING id, name, priority, overlap, is_active, is_honeypot, created_at",
            )
            .bind(&settings.name)
            .bind(settings.priority)
            .bind(settings.overlap)
            .bind(settings.is_active)
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;

            let mut changed = 0usize;
            if before.overlap != settings.overlap {
                let markup_ids: Vec<i64> =
                    sqlx::query_scalar("SELECT id FROM markups WHERE batch_id = $1 ORDER BY id")
                        .bind(id.0)
                        .fetch_all(&mut *tx)
                        .await?;
                for markup_id in markup_ids {
                    let markup = get_markup_on(&mut *tx, MarkupId(markup_id), true).await?;
                    let verdict =
                        resolve_on(&mut *tx, &markup, markup.correct_hash.as_deref(), &span).await?;
                    if verdict.correct_hash() != markup.correct_hash.as_deref() {
                        changed += 1;
                    }
                }
            }

            tx.commit().await?;

            let batch = Batch::from(row);
            info!(
                batch_id = %batch.id,
                priority = batch.priority,
                overlap = batch.overlap,
                active = batch.is_active,
                markups_changed = changed,
                "batch updated"
            );
            Ok::<_, Error>(batch)
        }
        .instrument(span.clone())
        .await
    }

    pub async fn batch_stats(&self, id: BatchId) -> Result<BatchStats> {
        // Fails with NotFound before counting zeroes for a missing batch.
        self.get_batch(id).await?;

        let (markup_count, processed_markup_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'processed')
             FROM markups WHERE batch_id = $1",
        )
        .bind(id.0)
        .fetch_one(self.pool())
        .await?;

        let (assessment_count, correct_assessment_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE a.hash = m.correct_hash)
             FROM assessments a
             JOIN markups m ON m.id = a.markup_id
             WHERE m.batch_id = $1 AND a.hash IS NOT NULL",
        )
        .bind(id.0)
        .fetch_one(self.pool())
        .await?;

        Ok(BatchStats {
            markup_count,
            processed_markup_count,
            assessment_count,
            correct_assessment_count,
        })
    }

    /// Answerable fields of a batch, in creation order.
    pub async fn batch_fields(&self, id: BatchId) -> Result<Vec<MarkupTypeField>> {
        let mut conn = self.pool().acquire().await?;
        field_catalogue_on(&mut *conn, id).await
    }

    /// Add a pending markup to a batch.
    pub async fn add_markup(&self, batch_id: BatchId, data: impl Into<String>) -> Result<Markup> {
        self.get_batch(batch_id).await?;

        let row: MarkupRow = sqlx::query_as(
            "INSERT INTO markups (batch_id, status, data, created_at)
             VALUES ($1, 'pending', $2, $3)
             RETURNING id, batch_id, status, data, correct_hash, created_at",
        )
        .bind(batch_id.0)
        .bind(data.into())
        .bind(self.now())
        .fetch_one(self.pool())
        .await?;

        row.try_into_markup()
    }

    /// A markup plus, once processed, the assessment that settled it.
    ///
    /// When both an admin answer and crowd answers carry the settled
    /// fingerprint, the admin answer is returned.
    pub async fn get_markup(&self, id: MarkupId) -> Result<MarkupView> {
        let mut conn = self.pool().acquire().await?;
        let markup = get_markup_on(&mut *conn, id, false).await?;

        let correct_assessment = match markup.correct_hash {
            Some(ref hash) if markup.status == MarkupStatus::Processed => {
                let settled: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM assessments
                     WHERE markup_id = $1 AND hash = $2
                     ORDER BY is_prior DESC, id ASC
                     LIMIT 1",
                )
                .bind(id.0)
                .bind(hash)
                .fetch_optional(&mut *conn)
                .await?;
                match settled {
                    Some(aid) => Some(load_assessment_on(&mut *conn, AssessmentId(aid)).await?),
                    None => None,
                }
            }
            _ => None,
        };

        Ok(MarkupView {
            markup,
            correct_assessment,
        })
    }
}

// ---------------------------------------------------------------------------
// Shared helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

/// Fetch a markup, optionally taking its row lock for the transaction.
pub(crate) async fn get_markup_on(
    conn: &mut PgConnection,
    id: MarkupId,
    for_update: bool,
) -> Result<Markup> {
    let sql = if for_update {
        "SELECT id, batch_id, status, data, correct_hash, created_at
         FROM markups WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, batch_id, status, data, correct_hash, created_at
         FROM markups WHERE id = $1"
    };
    let row: Option<MarkupRow> = sqlx::query_as(sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.ok_or_else(|| Error::NotFound(format!("markup {id}")))?
        .try_into_markup()
}

pub(crate) async fn get_batch_on(conn: &mut PgConnection, id: BatchId) -> Result<Batch> {
    let row: Option<BatchRow> = sqlx::query_as(
        "SELECT id, name, priority, overlap, is_active, is_honeypot, created_at
         FROM batches WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Batch::from)
        .ok_or_else(|| Error::NotFound(format!("batch {id}")))
}

pub(crate) async fn field_catalogue_on(
    conn: &mut PgConnection,
    batch_id: BatchId,
) -> Result<Vec<MarkupTypeField>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT f.id, f.label
         FROM markup_type_fields f
         JOIN markup_types t ON t.id = f.markup_type_id
         WHERE t.batch_id = $1
         ORDER BY f.id ASC",
    )
    .bind(batch_id.0)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, label)| MarkupTypeField {
            id: MarkupTypeFieldId(id),
            label,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    name: String,
    priority: i32,
    overlap: i32,
    is_active: bool,
    is_honeypot: bool,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: BatchId(row.id),
            name: row.name,
            priority: row.priority,
            overlap: row.overlap,
            is_active: row.is_active,
            is_honeypot: row.is_honeypot,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MarkupRow {
    id: i64,
    batch_id: i64,
    status: String,
    data: String,
    correct_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl MarkupRow {
    fn try_into_markup(self) -> Result<Markup> {
        Ok(Markup {
            id: MarkupId(self.id),
            batch_id: BatchId(self.batch_id),
            status: self.status.parse()?,
            data: self.data,
            correct_hash: self.correct_hash,
            created_at: self.created_at,
        })
    }
}
