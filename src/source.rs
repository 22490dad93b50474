//! Collaborator seams for scraping.
//!
//! The pipeline only talks to these traits, so a run can be driven by the
//! NCBI client in [`crate::pubmed`] or by an in-memory source in tests.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::record::RawPublication;

/// Scrape provider: finds publications and reads their pages
pub trait PublicationSource {
    /// Publication identifiers matching a grant query, in relevance order
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Scrape one publication page.
    ///
    /// Dataset accessions are left empty; they come from a [`DatasetSource`].
    async fn fetch_publication(&self, id: &str) -> Result<RawPublication>;
}

/// External-dataset provider
pub trait DatasetSource {
    /// Accessions of public datasets linked to a publication (possibly none)
    async fn dataset_accessions(&self, id: &str) -> Result<Vec<String>>;
}
