// src/conditioning/reader.rs

use std::fs::File;
use std::path::Path;
use tracing::debug;

use super::layout::ColumnLayout;
use super::recording::FilteredRecording;
use crate::acquisition::{Marker, CHANNEL_COUNT};
use crate::error::{P300Error, Result};

fn shape_error(path: &Path, row: usize, what: String) -> P300Error {
    P300Error::DataShape(format!("{} row {}: {}", path.display(), row, what))
}

fn parse_marker(cell: &str) -> Option<Marker> {
    // markers may be written as floats (0.0, 1.0, 2.0)
    let value: f64 = cell.trim().parse().ok()?;
    if value.fract() != 0.0 || !(0.0..=3.0).contains(&value) {
        return None;
    }
    Marker::from_code(value as u8)
}

/// Parses a persisted recording under `layout`. The header row is skipped and
/// the leading index column is never parsed. Every row must have the width
/// of the header.
pub fn read_recording(path: &Path, layout: ColumnLayout, sampling_rate: f64) -> Result<FilteredRecording> {
    let file = File::open(path).map_err(|e| P300Error::file_access(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let width = reader
        .headers()
        .map_err(|e| P300Error::file_access(path, e))?
        .len();
    if width == 0 {
        return Err(P300Error::file_access(path, "recording has no header row"));
    }
    let map = layout.resolve(width)?;

    let mut channels: Vec<Vec<f64>> = vec![Vec::new(); CHANNEL_COUNT];
    let mut timestamps = Vec::new();
    let mut markers = map.marker.map(|_| Vec::new());

    for (row, record) in reader.records().enumerate() {
        // 1-based data rows, the header is row 0
        let row = row + 1;
        let record = record.map_err(|e| {
            if let csv::ErrorKind::UnequalLengths { len, .. } = e.kind() {
                return shape_error(
                    path,
                    row,
                    format!("{} columns where the header has {}", len, width),
                );
            }
            P300Error::file_access(path, e)
        })?;

        for (channel, column) in map.channels.clone().enumerate() {
            let cell = &record[column];
            let value: f64 = cell
                .trim()
                .parse()
                .map_err(|_| shape_error(path, row, format!("channel value {:?} is not a number", cell)))?;
            channels[channel].push(value);
        }

        let timestamp = match map.timestamp {
            Some(column) => record[column]
                .trim()
                .parse()
                .map_err(|_| shape_error(path, row, format!("timestamp {:?} is not a number", &record[column])))?,
            None => (row - 1) as f64 / sampling_rate,
        };
        timestamps.push(timestamp);

        if let (Some(column), Some(markers)) = (map.marker, markers.as_mut()) {
            let marker = parse_marker(&record[column]).ok_or_else(|| {
                shape_error(path, row, format!("marker {:?} is not one of 0, 1, 2, 3", &record[column]))
            })?;
            markers.push(marker);
        }
    }

    debug!(
        path = %path.display(),
        %layout,
        samples = timestamps.len(),
        "recording parsed"
    );
    FilteredRecording::new(channels, markers, timestamps, sampling_rate)
}
