// src/session/persist.rs

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::acquisition::{Marker, Sample, CHANNEL_COUNT};
use crate::error::{P300Error, Result};

/// What to do when the target artifact already exists. Existing recordings are
/// never truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Write next to the existing file under a timestamped unique name
    #[default]
    NewFile,
    /// Append rows to the existing file after checking its header
    Append,
    /// Refuse to touch an existing file
    FailIfExists,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub path: PathBuf,
    pub rows: usize,
    pub appended: bool,
}

/// Column header of a tagged recording: index, timestamp, channels, marker.
pub fn recording_header(channel_names: &[String]) -> Vec<String> {
    let mut header = Vec::with_capacity(channel_names.len() + 3);
    header.push("index".to_string());
    header.push("timestamp".to_string());
    header.extend(channel_names.iter().cloned());
    header.push("marker".to_string());
    header
}

const MAX_CLAIM_ATTEMPTS: usize = 64;

/// Opens the file that will actually be written under `policy`. New files are
/// created with `create_new`; a name claimed by another writer in between
/// moves on to a unique sibling, fails, or appends, per policy. Returns the
/// data row count already present when appending.
fn claim_artifact(path: &Path, policy: WritePolicy, header: &[String]) -> Result<(File, PathBuf, Option<usize>)> {
    let mut candidate = path.to_path_buf();
    for _ in 0..MAX_CLAIM_ATTEMPTS {
        if policy == WritePolicy::Append && candidate.exists() {
            let existing_rows = check_existing_header(&candidate, header)?;
            let file = OpenOptions::new()
                .append(true)
                .open(&candidate)
                .map_err(|e| P300Error::file_access(&candidate, e))?;
            return Ok((file, candidate, existing_rows));
        }

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate, None)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => match policy {
                WritePolicy::Append => continue,
                WritePolicy::FailIfExists => {
                    return Err(P300Error::file_access(
                        &candidate,
                        "artifact already exists and the write policy forbids replacing it",
                    ))
                }
                WritePolicy::NewFile => candidate = unique_sibling(path),
            },
            Err(err) => return Err(P300Error::file_access(&candidate, err)),
        }
    }
    Err(P300Error::file_access(
        path,
        format!("no free artifact name after {} attempts", MAX_CLAIM_ATTEMPTS),
    ))
}

fn unique_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let mut candidate = path.with_file_name(format!("{}_{}{}", stem, stamp, extension));
    let mut counter = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}_{}_{}{}", stem, stamp, counter, extension));
        counter += 1;
    }
    candidate
}

// -----------------------------------------------------------------------------
// ARTIFACT WRITER
// -----------------------------------------------------------------------------

/// Row writer for one tagged recording artifact.
pub struct ArtifactWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    next_index: usize,
    rows: usize,
    appended: bool,
}

impl ArtifactWriter {
    /// Opens (or creates) the artifact for `path` under `policy`. The header is
    /// written only when the file is new; appending to a file with a different
    /// header is a shape error.
    pub fn open(path: &Path, policy: WritePolicy, header: &[String]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| P300Error::file_access(parent, e))?;
            }
        }

        let (file, path, existing_rows) = claim_artifact(path, policy, header)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if existing_rows.is_none() {
            writer
                .write_record(header)
                .map_err(|e| P300Error::file_access(&path, e))?;
        }

        Ok(Self {
            writer,
            path,
            next_index: existing_rows.unwrap_or(0),
            rows: 0,
            appended: existing_rows.is_some(),
        })
    }

    pub fn write_row(&mut self, timestamp: f64, channels: &[f64], marker: Marker) -> Result<()> {
        let mut record = Vec::with_capacity(channels.len() + 3);
        record.push(self.next_index.to_string());
        record.push(timestamp.to_string());
        record.extend(channels.iter().map(|value| value.to_string()));
        record.push(marker.code().to_string());

        self.writer
            .write_record(&record)
            .map_err(|e| P300Error::file_access(&self.path, e))?;
        self.next_index += 1;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PersistReport> {
        self.writer
            .flush()
            .map_err(|e| P300Error::file_access(&self.path, e))?;
        Ok(PersistReport {
            path: self.path,
            rows: self.rows,
            appended: self.appended,
        })
    }
}

/// Returns the data row count of an existing artifact with a matching header,
/// or `None` when the file is empty and still needs its header.
fn check_existing_header(path: &Path, header: &[String]) -> Result<Option<usize>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| P300Error::file_access(path, e))?;

    let mut records = reader.records();
    let existing = match records.next() {
        None => return Ok(None),
        Some(record) => record.map_err(|e| P300Error::file_access(path, e))?,
    };
    if !existing.iter().eq(header.iter().map(String::as_str)) {
        return Err(P300Error::DataShape(format!(
            "cannot append to {}: header {:?} does not match {:?}",
            path.display(),
            existing.iter().collect::<Vec<_>>(),
            header
        )));
    }

    let mut rows = 0;
    for record in records {
        record.map_err(|e| P300Error::file_access(path, e))?;
        rows += 1;
    }
    Ok(Some(rows))
}

/// Serializes the full sample sequence of a session.
pub fn persist_samples(
    samples: &[Sample],
    path: &Path,
    policy: WritePolicy,
    channel_names: &[String],
) -> Result<PersistReport> {
    if channel_names.len() != CHANNEL_COUNT {
        return Err(P300Error::DataShape(format!(
            "expected {} channel names, got {}",
            CHANNEL_COUNT,
            channel_names.len()
        )));
    }

    let mut writer = ArtifactWriter::open(path, policy, &recording_header(channel_names))?;
    for sample in samples {
        writer.write_row(sample.timestamp, &sample.channels, sample.marker)?;
    }
    let report = writer.finish()?;
    info!(
        path = %report.path.display(),
        rows = report.rows,
        appended = report.appended,
        "session log persisted"
    );
    Ok(report)
}
