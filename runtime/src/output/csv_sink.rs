//! Product CSV shared by every worker of a run.

use crate::error::Result;
use crate::extraction::{headers, Columns, ProductRecord};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct CsvSink {
    path: PathBuf,
    columns: Columns,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    /// Create (truncating) `path` and write the header row.
    pub fn create(path: impl Into<PathBuf>, columns: Columns) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(headers(columns))?;
        writer.flush()?;
        Ok(Self {
            path,
            columns,
            writer: Mutex::new(writer),
        })
    }

    /// `{dir}/{site}_products_chunk_{offset}.csv`
    pub fn chunk_path(dir: &Path, site: &str, offset: usize) -> PathBuf {
        dir.join(format!("{site}_products_chunk_{offset}.csv"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush.
    pub fn write(&self, record: &ProductRecord) -> Result<()> {
        let mut w = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        w.write_record(record.row(self.columns))?;
        w.flush()?;
        Ok(())
    }

    /// Append several records under one lock.
    pub fn write_all(&self, records: &[ProductRecord]) -> Result<usize> {
        let mut w = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for record in records {
            w.write_record(record.row(self.columns))?;
        }
        w.flush()?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::STANDARD_COLUMNS;
    use std::sync::Arc;

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = CsvSink::chunk_path(dir.path(), "walmart", 3);
        assert!(path.ends_with("walmart_products_chunk_3.csv"));

        let sink = CsvSink::create(&path, STANDARD_COLUMNS).unwrap();
        let record = ProductRecord {
            product_url: "https://w/ip/1".to_string(),
            name: "Desk, oak".to_string(),
            ..Default::default()
        };
        sink.write(&record).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header = rdr.headers().unwrap().clone();
        assert_eq!(&header[0], "Ref Product URL");
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][6], "Desk, oak");
    }

    #[test]
    fn test_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(CsvSink::create(dir.path().join("x.csv"), STANDARD_COLUMNS).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        let r = ProductRecord {
                            product_id: format!("{i}-{j}"),
                            ..Default::default()
                        };
                        sink.write(&r).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let rdr = csv::Reader::from_path(sink.path()).unwrap();
        assert_eq!(rdr.into_records().count(), 100);
    }
}
