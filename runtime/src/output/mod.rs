//! Run outputs: product CSVs, failure logs and JSON summaries.
//!
//! Every writer flushes per row so a job killed mid-run still leaves a
//! usable partial file behind.

pub mod csv_sink;
pub mod failures;
pub mod summary;

pub use csv_sink::CsvSink;
pub use failures::{FailureLog, SkippedLog};
pub use summary::RunSummary;

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Open `path` for appending, writing `header` first if the file is new or
/// empty.
pub fn open_append(path: &Path, header: &[&str]) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if size == 0 {
        w.write_record(header)?;
        w.flush()?;
    }
    Ok(w)
}

/// Read the first column of a CSV URL list, skipping a `url` header and
/// blank lines.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut urls = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let value = record.get(0).unwrap_or("").trim();
        if value.is_empty() || (i == 0 && value.eq_ignore_ascii_case("url")) {
            continue;
        }
        urls.push(value.to_string());
    }
    Ok(urls)
}

/// Write a URL list with a `url` header, replacing any existing file.
pub fn write_url_list(path: &Path, urls: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["url"])?;
    for url in urls {
        w.write_record([url])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        {
            let mut w = open_append(&path, &["a", "b"]).unwrap();
            w.write_record(["1", "2"]).unwrap();
            w.flush().unwrap();
        }
        {
            let mut w = open_append(&path, &["a", "b"]).unwrap();
            w.write_record(["3", "4"]).unwrap();
            w.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn test_url_list_round_trip_skips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.csv");
        let urls = vec!["https://a/p/1".to_string(), "https://a/p/2".to_string()];
        write_url_list(&path, &urls).unwrap();
        assert_eq!(read_url_list(&path).unwrap(), urls);

        std::fs::write(&path, "https://a/p/9\n\nhttps://a/p/10\n").unwrap();
        assert_eq!(read_url_list(&path).unwrap().len(), 2);
    }
}
