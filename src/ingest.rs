use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::models::Record;
use crate::period::parse_record_date;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV row in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid JSON records in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported record file {0} (expected .csv or .json)")]
    UnsupportedFormat(PathBuf),
}

/// Load records from a `.csv` or `.json` file, chosen by extension.
pub fn load_records(path: &Path) -> Result<Vec<Record>, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let file = || {
        File::open(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })
    };

    let records = match extension.as_deref() {
        Some("csv") => read_csv(file()?).map_err(|source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        })?,
        Some("json") => read_json(BufReader::new(file()?)).map_err(|source| IngestError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        _ => return Err(IngestError::UnsupportedFormat(path.to_path_buf())),
    };

    tracing::info!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Record>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let mut records = Vec::new();

    for result in reader.deserialize::<Record>() {
        records.push(result?);
    }

    Ok(normalize(records))
}

pub fn read_json<R: Read>(reader: R) -> Result<Vec<Record>, serde_json::Error> {
    let records: Vec<Record> = serde_json::from_reader(reader)?;
    Ok(normalize(records))
}

/// Give id-less rows a generated id and report rows that will miss date filters.
fn normalize(mut records: Vec<Record>) -> Vec<Record> {
    let mut generated = 0usize;
    let mut undated = 0usize;

    for record in records.iter_mut() {
        if record.id.trim().is_empty() {
            record.id = format!("import-{}", Uuid::new_v4());
            generated += 1;
        }
        if record.date.as_deref().and_then(parse_record_date).is_none() {
            undated += 1;
        }
    }

    if generated > 0 {
        tracing::debug!(generated, "assigned ids to records without one");
    }
    if undated > 0 {
        tracing::warn!(
            undated,
            "records without a usable date are excluded from date filters and period tables"
        );
    }
    records
}
