//! Publication record construction.
//!
//! Turns the raw fields scraped from one publication page into the row shape
//! of the consortium publication table. No I/O happens here: dataset
//! accessions and page fields are fetched before a [`RawPublication`] exists.

use crate::date::resolve_citation_date;
use crate::error::{CsbcError, Result};
use crate::grant::{GrantNormalizer, GrantRejection};
use crate::registry::RegistrySnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Legacy PubMed search URL; the identifier follows `term=`
pub const PUBMED_TERM_URL: &str = "https://www.ncbi.nlm.nih.gov/pubmed/?term=";

/// GEO accession landing page; the accession follows `acc=`
pub const GEO_ACCESSION_URL: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=";

/// Value of the reviewed flag until a curator has looked at the row
pub const NOT_REVIEWED: &str = "No";

/// Fields scraped from one publication page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPublication {
    /// PubMed identifier
    pub id: String,
    pub title: String,
    pub journal: String,
    /// Full citation line, e.g. `"Nature. 2015 Jun 3;521(7553):..."`
    pub citation: String,
    pub authors: Vec<String>,
    /// Raw grant tokens as listed on the page
    pub grants: Vec<String>,
    /// External dataset accessions linked to the publication
    pub dataset_accessions: Vec<String>,
}

/// One row of the publication table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    #[serde(rename = "CSBC PSON Center")]
    pub organizational_unit_id: String,
    #[serde(rename = "Consortium")]
    pub consortium_label: String,
    #[serde(rename = "PubMed")]
    pub publication_url: String,
    #[serde(rename = "Journal")]
    pub journal: String,
    #[serde(rename = "Publication Year")]
    pub year: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Grant")]
    pub grant_label: String,
    #[serde(rename = "Data Location")]
    pub external_dataset_links: String,
    #[serde(rename = "Synapse Location")]
    pub reviewed_flag: String,
    #[serde(rename = "Keywords")]
    pub keywords: String,
}

impl PublicationRecord {
    /// Publication identifier embedded in the URL
    pub fn publication_id(&self) -> Option<&str> {
        crate::merge::publication_id_from_url(&self.publication_url)
    }
}

/// Table URL for a publication identifier
pub fn publication_url(id: &str) -> String {
    format!("{}{}", PUBMED_TERM_URL, id)
}

/// Strip citation-style trailing periods and surrounding whitespace
fn strip_trailing_periods(text: &str) -> String {
    text.trim().trim_end_matches('.').trim_end().to_string()
}

fn join_authors(authors: &[String]) -> Result<String> {
    let authors: Vec<&str> = authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();

    match authors.as_slice() {
        [] => Err(CsbcError::IncompleteExtraction { field: "authors" }),
        [single] => Ok(single.to_string()),
        many => Ok(many.join(", ")),
    }
}

fn dataset_links(accessions: &[String]) -> String {
    accessions
        .iter()
        .map(|acc| acc.trim())
        .filter(|acc| !acc.is_empty())
        .map(|acc| format!("{}{}", GEO_ACCESSION_URL, acc))
        .collect::<Vec<_>>()
        .join(" , ")
}

/// Grant token dropped while building a record, kept for manual audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedGrant {
    pub publication_id: String,
    pub token: String,
    pub reason: GrantRejection,
}

/// Publication that produced no record, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPublication {
    pub publication_id: String,
    pub reason: String,
}

/// Builds records against one registry snapshot
pub struct RecordBuilder<'a> {
    registry: &'a RegistrySnapshot,
    normalizer: GrantNormalizer,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(registry: &'a RegistrySnapshot) -> Self {
        Self {
            registry,
            normalizer: GrantNormalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: GrantNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Build one record; dropped grant tokens that need review are returned alongside.
    pub fn build(&self, raw: &RawPublication) -> Result<(PublicationRecord, Vec<DroppedGrant>)> {
        let title = strip_trailing_periods(&raw.title);
        if title.is_empty() {
            return Err(CsbcError::IncompleteExtraction { field: "title" });
        }

        let date = resolve_citation_date(&raw.citation)?;
        let authors = join_authors(&raw.authors)?;

        let grants = self.normalizer.normalize_tokens(&raw.grants);
        let matched = self.registry.match_citations(&grants.citations);

        let dropped = grants
            .rejected
            .into_iter()
            .filter(|(_, reason)| reason.needs_review())
            .map(|(token, reason)| DroppedGrant {
                publication_id: raw.id.clone(),
                token,
                reason,
            })
            .collect();

        let record = PublicationRecord {
            organizational_unit_id: matched.organizational_unit_id,
            consortium_label: matched.consortium_label,
            publication_url: publication_url(&raw.id),
            journal: strip_trailing_periods(&raw.journal),
            year: date.year.to_string(),
            title,
            authors,
            grant_label: matched.grant_label,
            external_dataset_links: dataset_links(&raw.dataset_accessions),
            reviewed_flag: NOT_REVIEWED.to_string(),
            keywords: String::new(),
        };

        Ok((record, dropped))
    }
}

/// Build a single record with the default normalizer
pub fn build_record(raw: &RawPublication, registry: &RegistrySnapshot) -> Result<PublicationRecord> {
    RecordBuilder::new(registry).build(raw).map(|(record, _)| record)
}

/// Outcome of extracting a batch of publications
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Built records, in input order
    pub records: Vec<PublicationRecord>,
    pub skipped: Vec<SkippedPublication>,
    pub dropped_grants: Vec<DroppedGrant>,
}

/// Build records for a batch.
///
/// A publication that fails is skipped and reported; the rest of the batch
/// still goes through.
pub fn extract_publications(
    raw_publications: &[RawPublication],
    registry: &RegistrySnapshot,
) -> ExtractionReport {
    let builder = RecordBuilder::new(registry);
    let mut report = ExtractionReport::default();

    for raw in raw_publications {
        match builder.build(raw) {
            Ok((record, dropped)) => {
                debug!(pmid = %raw.id, grant = %record.grant_label, "Built record");
                for d in &dropped {
                    warn!(pmid = %raw.id, token = %d.token, reason = %d.reason, "Grant token needs manual review");
                }
                report.records.push(record);
                report.dropped_grants.extend(dropped);
            }
            Err(e) => {
                warn!(pmid = %raw.id, error = %e, "Skipping publication");
                report.skipped.push(SkippedPublication {
                    publication_id: raw.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        total = raw_publications.len(),
        built = report.records.len(),
        skipped = report.skipped.len(),
        "Extraction complete"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GrantRegistryEntry;

    fn registry() -> RegistrySnapshot {
        RegistrySnapshot::new(vec![GrantRegistryEntry {
            grant_number: "CA209997".to_string(),
            organizational_unit_id: "syn7248585".to_string(),
            consortium_label: "CSBC".to_string(),
        }])
    }

    fn raw(id: &str) -> RawPublication {
        RawPublication {
            id: id.to_string(),
            title: "Tumor evolution in space and time.".to_string(),
            journal: "Nature.".to_string(),
            citation: "Nature. 2015 Jun 3;521(7553):E1-2. doi: 10.1038/nature14000.".to_string(),
            authors: vec!["A".to_string(), "B".to_string()],
            grants: vec!["U54 CA209997/CA/NCI NIH HHS/United States".to_string()],
            dataset_accessions: Vec::new(),
        }
    }

    #[test]
    fn test_end_to_end_known_grant() {
        let record = build_record(&raw("26000001"), &registry()).expect("build");
        assert_eq!(record.year, "2015");
        assert_eq!(record.authors, "A, B");
        assert_eq!(record.grant_label, "U54 CA209997");
        assert_eq!(record.organizational_unit_id, "syn7248585");
        assert_eq!(record.consortium_label, "CSBC");
        assert_eq!(record.title, "Tumor evolution in space and time");
        assert_eq!(record.journal, "Nature");
        assert_eq!(record.publication_url, "https://www.ncbi.nlm.nih.gov/pubmed/?term=26000001");
        assert_eq!(record.publication_id(), Some("26000001"));
        assert_eq!(record.reviewed_flag, NOT_REVIEWED);
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn test_end_to_end_unknown_grant() {
        let record = build_record(&raw("26000001"), &RegistrySnapshot::default()).expect("build");
        assert_eq!(record.grant_label, "");
        assert_eq!(record.organizational_unit_id, "");
        assert_eq!(record.consortium_label, "");
    }

    #[test]
    fn test_single_author_used_as_is() {
        let mut publication = raw("1");
        publication.authors = vec!["Smith J".to_string()];
        let record = build_record(&publication, &registry()).expect("build");
        assert_eq!(record.authors, "Smith J");
    }

    #[test]
    fn test_zero_authors_is_incomplete() {
        let mut publication = raw("1");
        publication.authors.clear();
        assert!(matches!(
            build_record(&publication, &registry()),
            Err(CsbcError::IncompleteExtraction { field: "authors" })
        ));
    }

    #[test]
    fn test_dataset_links() {
        let mut publication = raw("1");
        publication.dataset_accessions = vec!["GSE1".to_string()];
        let record = build_record(&publication, &registry()).expect("build");
        assert_eq!(
            record.external_dataset_links,
            "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE1"
        );

        publication.dataset_accessions = vec!["GSE1".to_string(), "GSE2".to_string()];
        let record = build_record(&publication, &registry()).expect("build");
        assert_eq!(
            record.external_dataset_links,
            "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE1 , \
             https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE2"
        );
    }

    #[test]
    fn test_batch_skips_bad_publication() {
        let mut undated = raw("2");
        undated.citation = "Nature. ;521(7553):E1-2.".to_string();
        let mut no_authors = raw("3");
        no_authors.authors.clear();

        let batch = vec![raw("1"), undated, no_authors, raw("4")];
        let report = extract_publications(&batch, &registry());

        let built: Vec<_> = report
            .records
            .iter()
            .filter_map(|r| r.publication_id())
            .collect();
        assert_eq!(built, vec!["1", "4"]);

        let skipped: Vec<_> = report
            .skipped
            .iter()
            .map(|s| s.publication_id.as_str())
            .collect();
        assert_eq!(skipped, vec!["2", "3"]);
    }

    #[test]
    fn test_dropped_grants_reported() {
        let mut publication = raw("7");
        publication.grants.push("U54 CA209997/CA/NCI".to_string());
        publication.grants.push("R01 GM000001/GM/NIGMS NIH HHS/United States".to_string());

        let report = extract_publications(&[publication], &registry());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.dropped_grants.len(), 1);
        assert_eq!(report.dropped_grants[0].token, "U54 CA209997/CA/NCI");
        assert_eq!(report.dropped_grants[0].publication_id, "7");
    }
}
