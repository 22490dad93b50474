//! Incremental merge of freshly built records into a persisted table.
//!
//! Records are keyed by publication identifier, which is read back out of the
//! `PubMed` link column. The link is built by [`crate::record::publication_url`],
//! so the two must stay in step.

use crate::record::PublicationRecord;
use std::collections::HashSet;

/// Marker preceding the identifier in a publication URL
const TERM_MARKER: &str = "term=";

/// Identifier embedded after `term=` in a publication URL
pub fn publication_id_from_url(url: &str) -> Option<&str> {
    let (_, id) = url.split_once(TERM_MARKER)?;
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Comparison key for a record; falls back to the whole URL when no identifier is embedded
fn record_key(record: &PublicationRecord) -> &str {
    record
        .publication_id()
        .unwrap_or(record.publication_url.as_str())
}

/// Identifiers already present in a persisted table
pub fn persisted_ids(existing: &[PublicationRecord]) -> HashSet<&str> {
    existing.iter().map(record_key).collect()
}

/// Identifiers from a search result that are not yet in the table, in search order
pub fn new_publication_ids(candidates: &[String], existing: &[PublicationRecord]) -> Vec<String> {
    let persisted = persisted_ids(existing);
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|id| !persisted.contains(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Fresh records whose identifier is absent from the persisted set.
///
/// Pure set difference: neither input is touched and order of `fresh` is kept.
pub fn merge_new(
    fresh: &[PublicationRecord],
    existing: &[PublicationRecord],
) -> Vec<PublicationRecord> {
    if existing.is_empty() {
        return fresh.to_vec();
    }

    let persisted = persisted_ids(existing);
    fresh
        .iter()
        .filter(|record| !persisted.contains(record_key(record)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{publication_url, NOT_REVIEWED};

    fn record(id: &str) -> PublicationRecord {
        PublicationRecord {
            organizational_unit_id: String::new(),
            consortium_label: String::new(),
            publication_url: publication_url(id),
            journal: "Cell".to_string(),
            year: "2016".to_string(),
            title: format!("Paper {}", id),
            authors: "A".to_string(),
            grant_label: String::new(),
            external_dataset_links: String::new(),
            reviewed_flag: NOT_REVIEWED.to_string(),
            keywords: String::new(),
        }
    }

    #[test]
    fn test_id_round_trips_through_url() {
        assert_eq!(publication_id_from_url(&publication_url("28481362")), Some("28481362"));
        assert_eq!(publication_id_from_url("https://example.org/"), None);
        assert_eq!(publication_id_from_url("https://example.org/?term="), None);
    }

    #[test]
    fn test_merge_against_empty_returns_everything() {
        let fresh = vec![record("1"), record("2")];
        assert_eq!(merge_new(&fresh, &[]), fresh);
    }

    #[test]
    fn test_merge_against_self_returns_nothing() {
        let fresh = vec![record("1"), record("2")];
        assert!(merge_new(&fresh, &fresh).is_empty());
    }

    #[test]
    fn test_merge_keeps_only_new_in_order() {
        let fresh = vec![record("3"), record("1"), record("5")];
        let existing = vec![record("1"), record("2")];
        let snapshot = (fresh.clone(), existing.clone());

        let merged = merge_new(&fresh, &existing);
        let ids: Vec<_> = merged.iter().filter_map(|r| r.publication_id()).collect();
        assert_eq!(ids, vec!["3", "5"]);
        assert_eq!((fresh, existing), snapshot);
    }

    #[test]
    fn test_new_publication_ids() {
        let candidates: Vec<String> = ["4", "1", "4", "7"].iter().map(|s| s.to_string()).collect();
        let existing = vec![record("1")];
        assert_eq!(new_publication_ids(&candidates, &existing), vec!["4", "7"]);
    }
}
