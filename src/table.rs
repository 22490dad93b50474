//! Publication table persistence.
//!
//! The table is a CSV file whose header is the fixed column schema below.
//! It is either created from scratch or grown by appending rows; existing rows
//! are never rewritten.

use crate::error::{CsbcError, Result};
use crate::record::PublicationRecord;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Column value type as understood by the hosting table service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    EntityId,
    String,
    Link,
    Date,
}

/// One column of the publication table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub maximum_size: Option<usize>,
}

const fn column(name: &'static str, column_type: ColumnType, maximum_size: Option<usize>) -> ColumnSpec {
    ColumnSpec {
        name,
        column_type,
        maximum_size,
    }
}

/// Column order matches the field order of [`PublicationRecord`]
pub const TABLE_SCHEMA: [ColumnSpec; 11] = [
    column("CSBC PSON Center", ColumnType::EntityId, Some(50)),
    column("Consortium", ColumnType::String, Some(100)),
    column("PubMed", ColumnType::Link, Some(100)),
    column("Journal", ColumnType::String, Some(100)),
    column("Publication Year", ColumnType::Date, None),
    column("Title", ColumnType::String, Some(500)),
    column("Authors", ColumnType::String, Some(990)),
    column("Grant", ColumnType::String, Some(50)),
    column("Data Location", ColumnType::Link, Some(1000)),
    column("Synapse Location", ColumnType::String, Some(10)),
    column("Keywords", ColumnType::String, Some(250)),
];

fn record_values(record: &PublicationRecord) -> [&str; 11] {
    [
        &record.organizational_unit_id,
        &record.consortium_label,
        &record.publication_url,
        &record.journal,
        &record.year,
        &record.title,
        &record.authors,
        &record.grant_label,
        &record.external_dataset_links,
        &record.reviewed_flag,
        &record.keywords,
    ]
}

/// Columns whose value is longer than the schema allows.
///
/// Sizes are advisory here; the hosting service is the one that enforces them.
pub fn oversized_columns(record: &PublicationRecord) -> Vec<&'static str> {
    TABLE_SCHEMA
        .iter()
        .zip(record_values(record))
        .filter(|(spec, value)| {
            spec.maximum_size
                .is_some_and(|max| value.chars().count() > max)
        })
        .map(|(spec, _)| spec.name)
        .collect()
}

fn warn_oversized(records: &[PublicationRecord]) {
    for record in records {
        let columns = oversized_columns(record);
        if !columns.is_empty() {
            warn!(
                url = %record.publication_url,
                columns = ?columns,
                "Values exceed column maximum size"
            );
        }
    }
}

/// CSV-backed publication table
#[derive(Debug, Clone)]
pub struct PublicationTable {
    path: PathBuf,
}

impl PublicationTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read every persisted row; a missing table reads as empty.
    pub fn load(&self) -> Result<Vec<PublicationRecord>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;

        let headers = rdr.headers()?.clone();
        let expected = TABLE_SCHEMA.iter().map(|c| c.name);
        if !headers.iter().eq(expected) {
            return Err(CsbcError::Table(format!(
                "{} does not have the publication table header",
                self.path.display()
            )));
        }

        let records = rdr
            .deserialize::<PublicationRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(path = %self.path.display(), rows = records.len(), "Loaded publication table");
        Ok(records)
    }

    /// Write a new table. Refuses to overwrite an existing file.
    pub fn create(&self, records: &[PublicationRecord]) -> Result<usize> {
        if self.exists() {
            return Err(CsbcError::Table(format!(
                "{} already exists; append to it instead",
                self.path.display()
            )));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        warn_oversized(records);

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        wtr.write_record(TABLE_SCHEMA.iter().map(|c| c.name))?;
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;

        info!(path = %self.path.display(), rows = records.len(), "Created publication table");
        Ok(records.len())
    }

    /// Append rows to the table, creating it if it does not exist yet
    pub fn append(&self, records: &[PublicationRecord]) -> Result<usize> {
        if !self.exists() {
            return self.create(records);
        }
        if records.is_empty() {
            info!(path = %self.path.display(), "Nothing to append");
            return Ok(0);
        }

        warn_oversized(records);

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;

        info!(path = %self.path.display(), rows = records.len(), "Appended to publication table");
        Ok(records.len())
    }
}
