use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use vastwatch_core::{InMemorySnapshotStore, SnapshotRecord};

use crate::models::OfferSnapshotRecord;

pub struct CsvStorage;

impl CsvStorage {
    /// Writes offer snapshots to a CSV file with a header row.
    ///
    /// Rows are sorted by `(timestamp, offer_id)`. Columns follow the
    /// `offer_snapshots` table.
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_snapshots(path: impl AsRef<Path>, records: &[OfferSnapshotRecord]) -> Result<usize> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        Self::write_to(file, records)
    }

    /// Writes offer snapshots as CSV to any writer.
    ///
    /// # Errors
    /// Returns error if serialization or writing fails
    pub fn write_to<W: Write>(writer: W, records: &[OfferSnapshotRecord]) -> Result<usize> {
        let mut writer = Writer::from_writer(writer);

        let mut sorted: Vec<&OfferSnapshotRecord> = records.iter().collect();
        sorted.sort_by_key(|r| (r.timestamp, r.offer_id));

        for record in &sorted {
            writer
                .serialize(record)
                .with_context(|| format!("Failed to write offer {}", record.offer_id))?;
        }

        writer.flush()?;
        Ok(sorted.len())
    }

    /// Reads offer snapshots from a CSV file written by `write_snapshots`.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a row fails to parse
    pub fn read_snapshots(path: impl AsRef<Path>) -> Result<Vec<OfferSnapshotRecord>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::read_from(file)
    }

    /// Reads offer snapshots as CSV from any reader.
    ///
    /// # Errors
    /// Returns error if a row fails to parse; the message names the line
    pub fn read_from<R: Read>(reader: R) -> Result<Vec<OfferSnapshotRecord>> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<OfferSnapshotRecord>().enumerate() {
            // Line 1 is the header.
            let record = row.with_context(|| format!("Invalid snapshot row at line {}", idx + 2))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Loads a CSV file into an in-memory snapshot store.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_store(path: impl AsRef<Path>) -> Result<InMemorySnapshotStore> {
        let records = Self::read_snapshots(path)?;
        tracing::info!(rows = records.len(), "Loaded snapshots from CSV");
        Ok(InMemorySnapshotStore::new(
            records.into_iter().map(SnapshotRecord::from),
        ))
    }
}
