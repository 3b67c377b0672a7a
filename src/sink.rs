use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::models::ListingRecord;

/// Append-only table of quotes for one run, persisted as CSV
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultSink {
    records: Vec<ListingRecord>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ListingRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ListingRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ListingRecord> {
        self.records
    }

    /// Write the whole table to `path`, replacing any existing file.
    ///
    /// The header row is written even when the table is empty.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        writer.write_record(ListingRecord::COLUMNS)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        debug!("Wrote {} rows to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Read a table previously written by [`ResultSink::flush`]
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut sink = Self::new();

        for row in reader.deserialize::<ListingRecord>() {
            let mut record = row?;
            if record.note.as_deref().is_some_and(|n| n.trim().is_empty()) {
                record.note = None;
            }
            sink.append(record);
        }

        Ok(sink)
    }
}
