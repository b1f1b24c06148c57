//! Caller identity with the capabilities the core checks.
//!
//! Resolved by the embedding service (session, token, ...) and passed into
//! every core operation explicitly.

use serde::{Deserialize, Serialize};

use super::assessment::UserId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub is_admin: bool,
    pub is_assessor: bool,
}

impl Identity {
    pub fn assessor(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
            is_assessor: true,
        }
    }

    /// Admins answer with authority and are also allowed to take work.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
            is_assessor: true,
        }
    }

    pub fn require_assessor(&self) -> Result<()> {
        if self.is_assessor {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "user {} lacks the assessor capability",
                self.user_id
            )))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "user {} lacks the admin capability",
                self.user_id
            )))
        }
    }

    /// Anyone allowed to submit answers: assessors and admins.
    pub(crate) fn require_answerer(&self) -> Result<()> {
        if self.is_admin || self.is_assessor {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "user {} may not submit assessments",
                self.user_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_may_also_take_work() {
        let admin = Identity::admin(UserId(1));
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_assessor().is_ok());
        assert!(admin.require_answerer().is_ok());
    }

    #[test]
    fn assessors_are_not_admins() {
        let assessor = Identity::assessor(UserId(2));
        assert!(matches!(assessor.require_admin(), Err(Error::Forbidden(_))));
        assert!(assessor.require_answerer().is_ok());
    }

    #[test]
    fn no_capabilities_no_answers() {
        let nobody = Identity {
            user_id: UserId(3),
            is_admin: false,
            is_assessor: false,
        };
        assert!(matches!(nobody.require_assessor(), Err(Error::Forbidden(_))));
        assert!(matches!(nobody.require_answerer(), Err(Error::Forbidden(_))));
    }
}
