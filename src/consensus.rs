//! Consensus rule: when is a markup settled, and on which answer.
//!
//! The rule is evaluated from scratch after every finalization or edit, so a
//! markup can move from processed back to pending when an edit withdraws the
//! support that settled it. A plurality below the overlap threshold never
//! settles anything; the markup waits for more answers or an admin.

use serde::{Deserialize, Serialize};

/// Number of finalized crowd answers sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub hash: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Processed {
        correct_hash: String,
        authority: Authority,
    },
    Pending,
}

/// Why a markup counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// An admin answered; the crowd is not consulted.
    Admin,
    /// `support` crowd answers share the winning fingerprint.
    Overlap { support: i64 },
}

impl Verdict {
    pub fn is_processed(&self) -> bool {
        matches!(self, Verdict::Processed { .. })
    }

    pub fn correct_hash(&self) -> Option<&str> {
        match self {
            Verdict::Processed { correct_hash, .. } => Some(correct_hash),
            Verdict::Pending => None,
        }
    }
}

/// Decide a markup's state.
///
/// * `prior` is the admin answer's fingerprint, if an admin answered.
/// * `tallies` count finalized non-admin answers per fingerprint.
/// * `preferred` is the fingerprint that triggered this evaluation, or the
///   current winner when a settings change triggered it. With threshold
///   support it wins.
///
/// Otherwise any fingerprint holding threshold support wins, preferring the
/// largest tally and then the smallest hash.
pub fn decide(
    prior: Option<&str>,
    tallies: &[Tally],
    overlap: i32,
    preferred: Option<&str>,
) -> Verdict {
    if let Some(hash) = prior {
        return Verdict::Processed {
            correct_hash: hash.to_string(),
            authority: Authority::Admin,
        };
    }

    let threshold = i64::from(overlap.max(1));

    if let Some(t) = tallies
        .iter()
        .find(|t| Some(t.hash.as_str()) == preferred && t.count >= threshold)
    {
        return Verdict::Processed {
            correct_hash: t.hash.clone(),
            authority: Authority::Overlap { support: t.count },
        };
    }

    tallies
        .iter()
        .filter(|t| t.count >= threshold)
        .min_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hash.cmp(&b.hash)))
        .map(|t| Verdict::Processed {
            correct_hash: t.hash.clone(),
            authority: Authority::Overlap { support: t.count },
        })
        .unwrap_or(Verdict::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(hash: &str, count: i64) -> Tally {
        Tally {
            hash: hash.to_string(),
            count,
        }
    }

    #[test]
    fn below_overlap_stays_pending() {
        let v = decide(None, &[tally("1,2", 1)], 2, Some("1,2"));
        assert_eq!(v, Verdict::Pending);
    }

    #[test]
    fn reaching_overlap_processes_on_submitted_hash() {
        let v = decide(None, &[tally("1,2", 2), tally("3", 1)], 2, Some("1,2"));
        assert_eq!(
            v,
            Verdict::Processed {
                correct_hash: "1,2".to_string(),
                authority: Authority::Overlap { support: 2 },
            }
        );
    }

    #[test]
    fn admin_always_wins() {
        let v = decide(Some("5"), &[tally("1,2", 9)], 2, Some("1,2"));
        assert_eq!(v.correct_hash(), Some("5"));
        assert!(matches!(
            v,
            Verdict::Processed {
                authority: Authority::Admin,
                ..
            }
        ));
    }

    #[test]
    fn split_vote_is_not_resolved() {
        let v = decide(None, &[tally("1", 1), tally("2", 1)], 2, Some("2"));
        assert_eq!(v, Verdict::Pending);
    }

    #[test]
    fn edit_away_from_winner_keeps_other_supported_hash() {
        // Three answers agreed on "1"; one of them was edited to "2".
        let v = decide(None, &[tally("1", 2), tally("2", 1)], 2, Some("2"));
        assert_eq!(v.correct_hash(), Some("1"));
    }

    #[test]
    fn edit_that_breaks_support_returns_to_pending() {
        let v = decide(None, &[tally("1", 1), tally("2", 1)], 2, Some("2"));
        assert!(!v.is_processed());
    }

    #[test]
    fn competing_supported_hashes_prefer_larger_then_smaller_hash() {
        let v = decide(None, &[tally("2", 2), tally("1", 2), tally("3", 3)], 2, Some("9"));
        assert_eq!(v.correct_hash(), Some("3"));
        let v = decide(None, &[tally("2", 2), tally("1", 2)], 2, Some("9"));
        assert_eq!(v.correct_hash(), Some("1"));
    }

    #[test]
    fn overlap_of_one_settles_on_first_answer() {
        let v = decide(None, &[tally("", 1)], 1, Some(""));
        assert_eq!(v.correct_hash(), Some(""));
    }

    #[test]
    fn current_winner_is_kept_when_it_still_has_support() {
        // Overlap lowered from 3 to 1: both hashes now qualify.
        let tallies = [tally("1", 1), tally("2", 2)];
        assert_eq!(decide(None, &tallies, 1, Some("1")).correct_hash(), Some("1"));
        assert_eq!(decide(None, &tallies, 1, None).correct_hash(), Some("2"));
    }
}
