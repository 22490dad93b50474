//! Grant registry snapshot and matcher.
//!
//! The registry is the exported consortium grant view: one row per grant
//! number with the owning center and its consortium label. It is loaded once
//! per run and only read afterwards.

use crate::error::{CsbcError, Result};
use crate::grant::GrantCitation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Column holding the grant number in the exported view
pub const GRANT_NUMBER_COLUMN: &str = "grantNumber";

/// One registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRegistryEntry {
    pub grant_number: String,
    /// Platform identifier of the owning center
    pub organizational_unit_id: String,
    pub consortium_label: String,
}

/// Raw row as exported; the grant number column may be empty
#[derive(Debug, Deserialize)]
struct RegistryRow {
    #[serde(rename = "grantNumber", default)]
    grant_number: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    consortium: Option<String>,
}

/// Result of matching one publication's citations against the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantMatch {
    /// `"<type> <number>"` for every matched citation, `", "`-joined
    pub grant_label: String,
    pub organizational_unit_id: String,
    /// Deduplicated consortium labels of all matched rows, `","`-joined
    pub consortium_label: String,
}

impl GrantMatch {
    pub fn is_linked(&self) -> bool {
        !self.grant_label.is_empty()
    }
}

/// Immutable registry view for one run
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    known_grants: BTreeSet<String>,
    entries: Vec<GrantRegistryEntry>,
}

impl RegistrySnapshot {
    /// Snapshot whose known-grant set is every entry's grant number
    pub fn new(entries: Vec<GrantRegistryEntry>) -> Self {
        let known_grants = entries.iter().map(|e| e.grant_number.clone()).collect();
        Self {
            known_grants,
            entries,
        }
    }

    /// Snapshot with an explicitly supplied known-grant set
    pub fn with_known_grants(
        known_grants: impl IntoIterator<Item = String>,
        entries: Vec<GrantRegistryEntry>,
    ) -> Self {
        Self {
            known_grants: known_grants.into_iter().collect(),
            entries,
        }
    }

    /// Read the exported view (`grantNumber`, `id`, `consortium` columns).
    ///
    /// Rows without a grant number are dropped. An empty registry is an error:
    /// there is nothing to search for.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr.headers()?.clone();
        if !headers.iter().any(|h| h == GRANT_NUMBER_COLUMN) {
            return Err(CsbcError::Registry(format!(
                "registry has no '{}' column",
                GRANT_NUMBER_COLUMN
            )));
        }

        let mut entries = Vec::new();
        for row in rdr.deserialize::<RegistryRow>() {
            let row = row?;
            let grant_number = match row.grant_number.map(|g| g.trim().to_string()) {
                Some(g) if !g.is_empty() => g,
                _ => continue,
            };
            entries.push(GrantRegistryEntry {
                grant_number,
                organizational_unit_id: row.id.unwrap_or_default().trim().to_string(),
                consortium_label: row.consortium.unwrap_or_default().trim().to_string(),
            });
        }

        if entries.is_empty() {
            return Err(CsbcError::Registry(
                "registry contains no grant numbers".to_string(),
            ));
        }

        let snapshot = Self::new(entries);
        info!(
            entries = snapshot.entries.len(),
            known_grants = snapshot.known_grants.len(),
            "Loaded grant registry"
        );
        Ok(snapshot)
    }

    /// Load the registry from a CSV export on disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            CsbcError::Registry(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn known_grants(&self) -> &BTreeSet<String> {
        &self.known_grants
    }

    pub fn entries(&self) -> &[GrantRegistryEntry] {
        &self.entries
    }

    pub fn is_known(&self, grant_number: &str) -> bool {
        self.known_grants.contains(grant_number)
    }

    /// Search query: every known grant number, `" or "`-joined
    pub fn grant_query(&self) -> String {
        self.known_grants
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" or ")
    }

    /// Link a publication's (deduplicated) citations to a center.
    ///
    /// The center comes from the first registry row that matches, in registry
    /// order. If one grant number is listed under several centers the pick
    /// therefore depends on export order.
    pub fn match_citations(&self, citations: &[GrantCitation]) -> GrantMatch {
        let matched: Vec<&GrantCitation> = citations
            .iter()
            .filter(|c| self.is_known(&c.grant_number))
            .collect();

        if matched.is_empty() {
            return GrantMatch::default();
        }

        let numbers: HashSet<&str> = matched.iter().map(|c| c.grant_number.as_str()).collect();
        let rows: Vec<&GrantRegistryEntry> = self
            .entries
            .iter()
            .filter(|e| numbers.contains(e.grant_number.as_str()))
            .collect();

        let organizational_unit_id = rows
            .first()
            .map(|e| e.organizational_unit_id.clone())
            .unwrap_or_default();

        let mut labels: Vec<&str> = Vec::new();
        for row in &rows {
            let label = row.consortium_label.as_str();
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }

        let grant_label = matched
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        debug!(grants = %grant_label, center = %organizational_unit_id, "Matched registry grants");

        GrantMatch {
            grant_label,
            organizational_unit_id,
            consortium_label: labels.join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number: &str, unit: &str, label: &str) -> GrantRegistryEntry {
        GrantRegistryEntry {
            grant_number: number.to_string(),
            organizational_unit_id: unit.to_string(),
            consortium_label: label.to_string(),
        }
    }

    fn cite(grant_type: &str, number: &str) -> GrantCitation {
        GrantCitation {
            grant_type: grant_type.to_string(),
            grant_number: number.to_string(),
        }
    }

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::new(vec![
            entry("CA209997", "syn7248585", "CSBC"),
            entry("CA184898", "syn7315805", "PS-ON"),
            entry("CA215709", "syn9772917", "CSBC"),
        ])
    }

    #[test]
    fn test_no_match_returns_empty_strings() {
        let result = snapshot().match_citations(&[cite("U54", "CA000001")]);
        assert_eq!(result, GrantMatch::default());
        assert!(!result.is_linked());
        assert_eq!(snapshot().match_citations(&[]), GrantMatch::default());
    }

    #[test]
    fn test_single_match() {
        let result = snapshot().match_citations(&[cite("U54", "CA209997")]);
        assert_eq!(result.grant_label, "U54 CA209997");
        assert_eq!(result.organizational_unit_id, "syn7248585");
        assert_eq!(result.consortium_label, "CSBC");
    }

    #[test]
    fn test_multiple_matches_union_labels() {
        let result = snapshot().match_citations(&[
            cite("U01", "CA184898"),
            cite("R01", "XX000000"),
            cite("U54", "CA209997"),
            cite("U54", "CA215709"),
        ]);
        assert_eq!(result.grant_label, "U01 CA184898, U54 CA209997, U54 CA215709");
        // first matching row in registry order, not citation order
        assert_eq!(result.organizational_unit_id, "syn7248585");
        assert_eq!(result.consortium_label, "CSBC,PS-ON");
    }

    #[test]
    fn test_known_set_is_authoritative() {
        let registry = RegistrySnapshot::with_known_grants(
            vec!["CA184898".to_string()],
            vec![
                entry("CA209997", "syn7248585", "CSBC"),
                entry("CA184898", "syn7315805", "PS-ON"),
            ],
        );
        assert!(!registry.match_citations(&[cite("U54", "CA209997")]).is_linked());
        assert!(registry.match_citations(&[cite("U01", "CA184898")]).is_linked());
    }

    #[test]
    fn test_from_reader_drops_blank_grants() {
        let data = "id,name,grantNumber,consortium\n\
                    syn1,Center A,CA209997,CSBC\n\
                    syn2,Center B,,PS-ON\n\
                    syn3,Center C,CA184898,PS-ON\n";
        let registry = RegistrySnapshot::from_reader(data.as_bytes()).expect("load");
        assert_eq!(registry.entries().len(), 2);
        assert!(registry.is_known("CA184898"));
        assert_eq!(registry.grant_query(), "CA184898 or CA209997");
    }

    #[test]
    fn test_from_reader_requires_grant_column() {
        let data = "id,consortium\nsyn1,CSBC\n";
        assert!(matches!(
            RegistrySnapshot::from_reader(data.as_bytes()),
            Err(CsbcError::Registry(_))
        ));
        let empty = "id,grantNumber,consortium\nsyn1,,CSBC\n";
        assert!(RegistrySnapshot::from_reader(empty.as_bytes()).is_err());
    }
}
