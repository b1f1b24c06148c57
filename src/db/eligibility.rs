//! The "markup is eligible for this user" predicate.
//!
//! A markup is eligible when it is pending, its batch is active, nobody holds
//! an open reservation on it, and the user has never answered or reserved it.
//! Tier discovery, candidate picking and re-validation all go through
//! [`EligibleMarkups`], so they always agree on what "eligible" means.
//!
//! Every query binds the user id as `$1`.

use sqlx::PgConnection;

use crate::error::Result;
use crate::model::{MarkupId, UserId};

const PREDICATE: &str = "m.status = 'pending'
    AND b.is_active
    AND NOT EXISTS (
        SELECT 1 FROM assessments a_open
        WHERE a_open.markup_id = m.id AND a_open.hash IS NULL
    )
    AND NOT EXISTS (
        SELECT 1 FROM assessments a_mine
        WHERE a_mine.markup_id = m.id AND a_mine.user_id = $1
    )";

/// Markups a given user may be assigned right now.
#[derive(Debug, Clone, Copy)]
pub struct EligibleMarkups {
    user_id: UserId,
}

impl EligibleMarkups {
    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id }
    }

    fn sql(columns: &str, tail: &str) -> String {
        format!(
            "SELECT {columns}
             FROM markups m
             JOIN batches b ON b.id = m.batch_id
             WHERE {PREDICATE}
             {tail}"
        )
    }

    /// Distinct priorities of active batches holding at least one eligible
    /// markup, highest first.
    pub async fn priorities(&self, conn: &mut PgConnection) -> Result<Vec<i32>> {
        let sql = Self::sql("DISTINCT b.priority", "ORDER BY b.priority DESC");
        let tiers: Vec<i32> = sqlx::query_scalar(&sql)
            .bind(self.user_id.0)
            .fetch_all(&mut *conn)
            .await?;
        Ok(tiers)
    }

    /// Lowest-id eligible markup in `priority`, row-locked for the rest of
    /// the transaction. Rows locked by concurrent reservations are skipped.
    pub async fn first_in_tier(
        &self,
        conn: &mut PgConnection,
        priority: i32,
    ) -> Result<Option<MarkupId>> {
        let sql = Self::sql(
            "m.id",
            "AND b.priority = $2
             ORDER BY m.id ASC
             LIMIT 1
             FOR UPDATE OF m SKIP LOCKED",
        );
        let id: Option<i64> = sqlx::query_scalar(&sql)
            .bind(self.user_id.0)
            .bind(priority)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id.map(MarkupId))
    }

    /// Re-check a single markup, seeing everything committed so far.
    pub async fn contains(&self, conn: &mut PgConnection, markup_id: MarkupId) -> Result<bool> {
        let sql = Self::sql("m.id", "AND m.id = $2");
        let found: Option<i64> = sqlx::query_scalar(&sql)
            .bind(self.user_id.0)
            .bind(markup_id.0)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_query_embeds_the_same_predicate() {
        for sql in [
            EligibleMarkups::sql("DISTINCT b.priority", ""),
            EligibleMarkups::sql("m.id", "AND b.priority = $2"),
            EligibleMarkups::sql("m.id", "AND m.id = $2"),
        ] {
            assert!(sql.contains(PREDICATE));
            assert!(sql.contains("JOIN batches b ON b.id = m.batch_id"));
        }
    }
}
