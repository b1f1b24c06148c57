//! Batches, markups and the field catalogue of a batch's markup type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assessment::Assessment;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkupId(pub i64);

/// Identifies one answerable field of a markup type. Fingerprints are built
/// from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkupTypeFieldId(pub i64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MarkupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MarkupTypeFieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Lowest and highest accepted batch priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub name: String,
    /// Tier weight used by work selection, 1..=10.
    pub priority: i32,
    /// Number of agreeing crowd answers needed to settle a markup.
    pub overlap: i32,
    pub is_active: bool,
    pub is_honeypot: bool,
    pub created_at: DateTime<Utc>,
}

/// Builder for a new batch with its markup type and answerable fields.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) overlap: i32,
    pub(crate) is_active: bool,
    pub(crate) is_honeypot: bool,
    pub(crate) markup_type: String,
    pub(crate) fields: Vec<String>,
}

impl NewBatch {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            markup_type: name.clone(),
            name,
            priority: 1,
            overlap: 1,
            is_active: true,
            is_honeypot: false,
            fields: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn overlap(mut self, overlap: i32) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Mark the batch as a quality-control batch of known answers.
    pub fn honeypot(mut self) -> Self {
        self.is_honeypot = true;
        self
    }

    pub fn markup_type(mut self, name: impl Into<String>) -> Self {
        self.markup_type = name.into();
        self
    }

    /// Add an answerable field, identified to assessors by its label.
    pub fn field(mut self, label: impl Into<String>) -> Self {
        self.fields.push(label.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_settings(&self.name, self.priority, self.overlap)
    }
}

/// Editable settings of an existing batch. Start from [`Batch::settings`]
/// and change what is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub name: String,
    pub priority: i32,
    pub overlap: i32,
    pub is_active: bool,
}

impl BatchSettings {
    pub fn validate(&self) -> Result<()> {
        validate_settings(&self.name, self.priority, self.overlap)
    }
}

impl Batch {
    pub fn settings(&self) -> BatchSettings {
        BatchSettings {
            name: self.name.clone(),
            priority: self.priority,
            overlap: self.overlap,
            is_active: self.is_active,
        }
    }
}

fn validate_settings(name: &str, priority: i32, overlap: i32) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("batch name must not be empty".to_string()));
    }
    if !PRIORITY_RANGE.contains(&priority) {
        return Err(Error::Validation(format!(
            "priority must be within {}..={}, got {priority}",
            PRIORITY_RANGE.start(),
            PRIORITY_RANGE.end(),
        )));
    }
    if overlap < 1 {
        return Err(Error::Validation(format!(
            "overlap must be at least 1, got {overlap}"
        )));
    }
    Ok(())
}

/// Progress counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub markup_count: i64,
    pub processed_markup_count: i64,
    /// Finalized assessments across the batch.
    pub assessment_count: i64,
    /// Finalized assessments whose fingerprint matches their markup's
    /// settled answer.
    pub correct_assessment_count: i64,
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupStatus {
    /// Still collecting answers.
    Pending,
    /// Settled by overlap or by an admin answer.
    Processed,
}

impl std::fmt::Display for MarkupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarkupStatus::Pending => "pending",
            MarkupStatus::Processed => "processed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MarkupStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(MarkupStatus::Pending),
            "processed" => Ok(MarkupStatus::Processed),
            _ => Err(Error::Other(format!("unknown markup status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Markup {
    pub id: MarkupId,
    pub batch_id: BatchId,
    pub status: MarkupStatus,
    /// Raw payload shown to assessors. Opaque to the core.
    pub data: String,
    /// Fingerprint of the settled answer; set only while processed.
    pub correct_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A markup together with the assessment that settled it, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupView {
    pub markup: Markup,
    pub correct_assessment: Option<Assessment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupTypeField {
    pub id: MarkupTypeFieldId,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [MarkupStatus::Pending, MarkupStatus::Processed] {
            assert_eq!(status.to_string().parse::<MarkupStatus>().unwrap(), status);
        }
        assert!("settled".parse::<MarkupStatus>().is_err());
    }

    #[test]
    fn new_batch_rejects_out_of_range_settings() {
        assert!(NewBatch::new("b").priority(0).validate().is_err());
        assert!(NewBatch::new("b").priority(11).validate().is_err());
        assert!(NewBatch::new("b").overlap(0).validate().is_err());
        assert!(NewBatch::new("  ").validate().is_err());
        assert!(NewBatch::new("b").priority(10).overlap(3).validate().is_ok());
    }

    #[test]
    fn settings_share_batch_validation() {
        let batch = Batch {
            id: BatchId(1),
            name: "b".to_string(),
            priority: 3,
            overlap: 2,
            is_active: true,
            is_honeypot: false,
            created_at: Utc::now(),
        };
        let settings = batch.settings();
        assert!(settings.validate().is_ok());
        assert!(BatchSettings { overlap: 0, ..settings.clone() }.validate().is_err());
        assert!(BatchSettings { priority: 11, ..settings.clone() }.validate().is_err());
        assert!(BatchSettings { name: String::new(), ..settings }.validate().is_err());
    }

    #[test]
    fn honeypot_is_opt_in() {
        assert!(!NewBatch::new("b").is_honeypot);
        assert!(NewBatch::new("b").honeypot().is_honeypot);
    }
}
