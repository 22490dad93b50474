//! End-to-end publication run.
//!
//! search → drop already persisted ids → fetch pages and dataset links →
//! build records → keep only rows the table does not have yet.
//!
//! Fetching runs with bounded concurrency but results are collected in search
//! order, so the output is deterministic for a given search result.

use crate::error::{CsbcError, Result};
use crate::merge::{merge_new, new_publication_ids, persisted_ids};
use std::collections::HashSet;
use crate::record::{
    extract_publications, ExtractionReport, PublicationRecord, RawPublication, SkippedPublication,
};
use crate::registry::RegistrySnapshot;
use crate::source::{DatasetSource, PublicationSource};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Run options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Publications fetched at the same time
    pub concurrency: usize,
    /// Skip fetching publications already in the persisted table
    pub skip_persisted: bool,
    /// Only process the first N candidates (after skipping persisted ones)
    pub limit: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            skip_persisted: true,
            limit: None,
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Identifiers returned by the search
    pub searched: usize,
    /// Identifiers not fetched because the table already has them
    pub already_persisted: usize,
    /// Publications fetched successfully
    pub fetched: usize,
    /// Publications that could not be fetched
    pub fetch_failures: Vec<SkippedPublication>,
    /// Records built from the fetched publications
    pub extraction: ExtractionReport,
    /// Records not yet in the table, ready to persist
    pub new_records: Vec<PublicationRecord>,
}

impl RunSummary {
    /// Every skipped publication, fetch failures first
    pub fn skipped(&self) -> impl Iterator<Item = &SkippedPublication> {
        self.fetch_failures.iter().chain(self.extraction.skipped.iter())
    }

    pub fn skipped_count(&self) -> usize {
        self.fetch_failures.len() + self.extraction.skipped.len()
    }
}

async fn fetch_one<S, D>(source: &S, datasets: &D, id: &str) -> Result<RawPublication>
where
    S: PublicationSource,
    D: DatasetSource,
{
    let mut raw = source.fetch_publication(id).await?;
    raw.dataset_accessions = datasets.dataset_accessions(id).await?;
    Ok(raw)
}

/// Fetch publications, keeping input order.
///
/// Per-publication failures only drop that publication; any other provider
/// error (e.g. rejected credentials) aborts the whole batch.
pub async fn collect_publications<S, D>(
    source: &S,
    datasets: &D,
    ids: &[String],
    concurrency: usize,
) -> Result<(Vec<RawPublication>, Vec<SkippedPublication>)>
where
    S: PublicationSource,
    D: DatasetSource,
{
    let mut results = stream::iter(ids)
        .map(|id| async move { (id, fetch_one(source, datasets, id).await) })
        .buffered(concurrency.max(1));

    let mut publications = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();

    // Dropping the stream on a fatal error cancels the fetches still queued
    while let Some((id, result)) = results.next().await {
        match result {
            Ok(raw) => publications.push(raw),
            Err(e) if !e.is_per_publication() => return Err(e),
            Err(e) => {
                warn!(pmid = %id, error = %e, "Skipping publication, fetch failed");
                failures.push(SkippedPublication {
                    publication_id: id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok((publications, failures))
}

/// Run the whole pipeline against an already loaded registry and table.
///
/// Search and provider-level failures are fatal; per-publication problems end
/// up in the summary.
pub async fn run<S, D>(
    source: &S,
    datasets: &D,
    registry: &RegistrySnapshot,
    existing: &[PublicationRecord],
    options: &PipelineOptions,
) -> Result<RunSummary>
where
    S: PublicationSource,
    D: DatasetSource,
{
    let query = registry.grant_query();
    if query.is_empty() {
        return Err(CsbcError::Registry(
            "registry has no grant numbers to search for".to_string(),
        ));
    }

    let found = source.search(&query).await?;
    let searched = found.len();

    let persisted: &[PublicationRecord] = if options.skip_persisted { existing } else { &[] };
    let already_persisted = {
        let known = persisted_ids(persisted);
        found
            .iter()
            .map(String::as_str)
            .filter(|id| known.contains(id))
            .collect::<HashSet<_>>()
            .len()
    };
    let mut candidates = new_publication_ids(&found, persisted);
    if let Some(limit) = options.limit {
        candidates.truncate(limit);
    }

    info!(
        searched,
        already_persisted,
        to_fetch = candidates.len(),
        "Fetching publications"
    );

    let (publications, fetch_failures) =
        collect_publications(source, datasets, &candidates, options.concurrency).await?;
    let fetched = publications.len();

    let extraction = extract_publications(&publications, registry);
    let new_records = merge_new(&extraction.records, existing);

    info!(
        fetched,
        built = extraction.records.len(),
        skipped = fetch_failures.len() + extraction.skipped.len(),
        new = new_records.len(),
        "Run complete"
    );

    Ok(RunSummary {
        searched,
        already_persisted,
        fetched,
        fetch_failures,
        extraction,
        new_records,
    })
}
