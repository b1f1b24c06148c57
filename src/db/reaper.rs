//! Reclaiming abandoned reservations.

use opentelemetry::KeyValue;
use tracing::info;

use crate::error::{Error, Result};
use crate::telemetry::metrics;

impl super::Db {
    /// Delete every open reservation created before `now - reservation_grace`.
    /// Returns the number of reservations removed.
    ///
    /// The markups they held become eligible again immediately; eligibility
    /// is derived from live rows.
    pub async fn run_reaper_pass(&self) -> Result<u64> {
        let grace = chrono::Duration::from_std(self.timing().reservation_grace)
            .map_err(|e| Error::Config(format!("reservation grace out of range: {e}")))?;
        let cutoff = self.now() - grace;

        let started = std::time::Instant::now();
        let deleted = sqlx::query("DELETE FROM assessments WHERE hash IS NULL AND created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?
            .rows_affected();

        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "reaped abandoned reservations");
            metrics::reservations_reaped().add(deleted, &[]);
        }
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "reaper.pass")],
        );
        Ok(deleted)
    }
}
