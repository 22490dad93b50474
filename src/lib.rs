//! # rustcsbc
//!
//! Consortium publication tracker: finds PubMed publications funded by
//! consortium grants, turns their pages into table rows, and links each row to
//! the owning center through the grant registry.
//!
//! ## Modules
//!
//! - [`grant`] - Grant token normalization
//! - [`date`] - Partial citation date resolution
//! - [`registry`] - Grant registry snapshot and matcher
//! - [`record`] - Publication record builder
//! - [`merge`] - Incremental merge against the persisted table
//! - [`pubmed`] - NCBI search, page and GEO scraping
//! - [`table`] - CSV publication table
//! - [`pipeline`] - End-to-end run
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustcsbc::{pipeline, pubmed, registry::RegistrySnapshot};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = RegistrySnapshot::load("grants.csv".as_ref())?;
//!     let client = pubmed::PubMedClient::new(Default::default())?;
//!     let summary = pipeline::run(&client, &client, &registry, &[], &Default::default()).await?;
//!     println!("{} new publications", summary.new_records.len());
//!     Ok(())
//! }
//! ```

pub mod date;
pub mod error;
pub mod grant;
pub mod merge;
pub mod pipeline;
pub mod pubmed;
pub mod record;
pub mod registry;
pub mod source;
pub mod table;

pub use error::{CsbcError, Result};
pub use merge::merge_new;
pub use record::{extract_publications, PublicationRecord, RawPublication};
