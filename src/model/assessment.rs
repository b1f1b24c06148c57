//! Assessments: one user's answer set for one markup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::batch::{MarkupId, MarkupTypeFieldId};
use super::identity::Identity;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssessmentId(pub i64);

/// Identity of an assessor or admin, issued by the external identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub markup_id: MarkupId,
    pub user_id: UserId,
    /// Authored by an admin; overrides crowd consensus.
    pub is_prior: bool,
    /// Fingerprint of `fields`. `None` while the assessment is a reservation
    /// that has not been submitted yet.
    pub hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Vec<AssessmentField>,
}

/// One populated field of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentField {
    pub markup_type_field_id: MarkupTypeFieldId,
    pub text: Option<String>,
}

impl AssessmentField {
    pub fn new(markup_type_field_id: i64) -> Self {
        Self {
            markup_type_field_id: MarkupTypeFieldId(markup_type_field_id),
            text: None,
        }
    }

    pub fn with_text(markup_type_field_id: i64, text: impl Into<String>) -> Self {
        Self {
            markup_type_field_id: MarkupTypeFieldId(markup_type_field_id),
            text: Some(text.into()),
        }
    }
}

/// Filters for listing finalized assessments. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentFilters {
    pub markup_id: Option<MarkupId>,
    pub user_id: Option<UserId>,
}

impl AssessmentFilters {
    pub fn markup(markup_id: MarkupId) -> Self {
        Self {
            markup_id: Some(markup_id),
            user_id: None,
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            markup_id: None,
            user_id: Some(user_id),
        }
    }
}

/// Accuracy counters for one user across all batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Finalized assessments by the user.
    pub assessment_count: i64,
    /// Those whose fingerprint matches their markup's settled answer.
    pub correct_assessment_count: i64,
}

impl Assessment {
    pub fn is_finalized(&self) -> bool {
        self.hash.is_some()
    }

    /// Check that `editor` may replace this assessment's fields at `now`.
    ///
    /// Owners may edit while `updated_at + edit_window` has not passed;
    /// admins may edit their own assessments without a time limit.
    pub fn ensure_editable_by(
        &self,
        editor: &Identity,
        now: DateTime<Utc>,
        edit_window: Duration,
    ) -> Result<()> {
        if self.user_id != editor.user_id {
            return Err(Error::Conflict(format!(
                "assessment {} belongs to another user",
                self.id
            )));
        }
        if editor.is_admin {
            return Ok(());
        }
        let window = chrono::Duration::from_std(edit_window)
            .map_err(|e| Error::Other(format!("edit window out of range: {e}")))?;
        if self.updated_at + window < now {
            return Err(Error::Conflict(format!(
                "edit window of {}s for assessment {} has elapsed",
                edit_window.as_secs(),
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(user: i64, updated_at: DateTime<Utc>) -> Assessment {
        Assessment {
            id: AssessmentId(7),
            markup_id: MarkupId(1),
            user_id: UserId(user),
            is_prior: false,
            hash: Some("1,2".to_string()),
            created_at: updated_at,
            updated_at,
            fields: vec![AssessmentField::new(1), AssessmentField::new(2)],
        }
    }

    const WINDOW: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn owner_can_edit_inside_window() {
        let t0 = Utc::now();
        let a = assessment(3, t0);
        let owner = Identity::assessor(UserId(3));
        assert!(
            a.ensure_editable_by(&owner, t0 + chrono::Duration::minutes(29), WINDOW)
                .is_ok()
        );
    }

    #[test]
    fn owner_cannot_edit_after_window() {
        let t0 = Utc::now();
        let a = assessment(3, t0);
        let owner = Identity::assessor(UserId(3));
        let err = a
            .ensure_editable_by(&owner, t0 + chrono::Duration::minutes(31), WINDOW)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn admin_owner_has_no_time_limit() {
        let t0 = Utc::now();
        let a = assessment(3, t0);
        let admin = Identity::admin(UserId(3));
        assert!(
            a.ensure_editable_by(&admin, t0 + chrono::Duration::days(30), WINDOW)
                .is_ok()
        );
    }

    #[test]
    fn nobody_edits_someone_elses_assessment() {
        let t0 = Utc::now();
        let a = assessment(3, t0);
        let err = a
            .ensure_editable_by(&Identity::admin(UserId(4)), t0, WINDOW)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
