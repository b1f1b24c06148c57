//! Answer fingerprints.
//!
//! # Agreement is field presence, not field content
//!
//! Two assessments agree when they populated **the same set of markup type
//! fields**. The free text typed into those fields takes no part in the
//! fingerprint: "cat" and "dog" in field 4 fingerprint identically. Consensus,
//! admin overrides and the batch correctness counters all compare
//! fingerprints, so this is the contract for every one of them.
//!
//! The format is the distinct field ids in ascending numeric order joined by
//! [`SEPARATOR`], e.g. `"1,2,10"`. An answer with no fields fingerprints as
//! the empty string, which is still a finalized answer.

use std::collections::BTreeSet;

use crate::model::{AssessmentField, MarkupTypeFieldId};

pub const SEPARATOR: &str = ",";

/// Fingerprint an answer from its fields. Order and repetition are ignored.
pub fn fingerprint(fields: &[AssessmentField]) -> String {
    fingerprint_ids(fields.iter().map(|f| f.markup_type_field_id))
}

/// Fingerprint a bare collection of field ids.
pub fn fingerprint_ids(ids: impl IntoIterator<Item = MarkupTypeFieldId>) -> String {
    let distinct: BTreeSet<i64> = ids.into_iter().map(|id| id.0).collect();
    distinct
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(ids: &[i64]) -> Vec<AssessmentField> {
        ids.iter().map(|&id| AssessmentField::new(id)).collect()
    }

    #[test]
    fn sorts_numerically_not_lexically() {
        assert_eq!(fingerprint(&fields(&[10, 2, 1])), "1,2,10");
    }

    #[test]
    fn every_permutation_agrees() {
        let base = [3, 1, 2];
        let expected = fingerprint(&fields(&base));
        let perms = [[1, 2, 3], [1, 3, 2], [2, 1, 3], [2, 3, 1], [3, 2, 1]];
        for p in perms {
            assert_eq!(fingerprint(&fields(&p)), expected, "permutation {p:?}");
        }
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(fingerprint(&fields(&[5, 5, 2, 5])), "2,5");
    }

    #[test]
    fn text_is_ignored() {
        let a = vec![
            AssessmentField::with_text(1, "cat"),
            AssessmentField::new(2),
        ];
        let b = vec![
            AssessmentField::with_text(1, "dog"),
            AssessmentField::with_text(2, "something else"),
        ];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn empty_answer_is_empty_string() {
        assert_eq!(fingerprint(&[]), "");
    }

    #[test]
    fn different_sets_differ() {
        assert_ne!(fingerprint(&fields(&[1, 2])), fingerprint(&fields(&[1, 2, 3])));
        assert_ne!(fingerprint(&fields(&[1, 23])), fingerprint(&fields(&[12, 3])));
    }
}
