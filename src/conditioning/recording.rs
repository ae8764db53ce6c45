// src/conditioning/recording.rs

use std::path::Path;

use crate::acquisition::{Marker, CHANNEL_COUNT};
use crate::error::{P300Error, Result};
use crate::session::persist::{recording_header, ArtifactWriter, PersistReport, WritePolicy};

/// An offline recording: 8 channel rows of T samples (µV), an optional marker
/// vector and per-sample timestamps, tagged with its sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRecording {
    channels: Vec<Vec<f64>>,
    markers: Option<Vec<Marker>>,
    timestamps: Vec<f64>,
    sampling_rate: f64,
}

/// Borrowed view of one second of a recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    pub start: usize,
    pub channels: [&'a [f64]; CHANNEL_COUNT],
    pub markers: Option<&'a [Marker]>,
    pub timestamps: &'a [f64],
}

impl FilteredRecording {
    /// Builds a recording after checking every vector has the same length.
    pub fn new(
        channels: Vec<Vec<f64>>,
        markers: Option<Vec<Marker>>,
        timestamps: Vec<f64>,
        sampling_rate: f64,
    ) -> Result<Self> {
        if channels.len() != CHANNEL_COUNT {
            return Err(P300Error::DataShape(format!(
                "expected {} channels, got {}",
                CHANNEL_COUNT,
                channels.len()
            )));
        }
        let samples = timestamps.len();
        let consistent = channels.iter().all(|c| c.len() == samples)
            && markers.as_ref().map_or(true, |m| m.len() == samples);
        if !consistent {
            return Err(P300Error::DataShape(
                "channel, marker and timestamp vectors differ in length".into(),
            ));
        }
        // windows are whole seconds of at least one sample
        if !(sampling_rate.round() >= 1.0) {
            return Err(P300Error::DataShape(format!(
                "sampling rate must be at least 1 Hz, got {}",
                sampling_rate
            )));
        }
        Ok(Self {
            channels,
            markers,
            timestamps,
            sampling_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.channels
    }

    pub fn markers(&self) -> Option<&[Marker]> {
        self.markers.as_deref()
    }

    pub fn markers_mut(&mut self) -> Option<&mut [Marker]> {
        self.markers.as_deref_mut()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Value counts of markers 0..=3, `None` for layouts without markers.
    pub fn marker_counts(&self) -> Option<[usize; 4]> {
        let markers = self.markers.as_ref()?;
        let mut counts = [0; 4];
        for marker in markers {
            counts[marker.code() as usize] += 1;
        }
        Some(counts)
    }

    /// The `second`-th one-second window (0-indexed) and whether it was
    /// recorded completely.
    ///
    /// # Arguments
    ///
    /// * `second` - Window index; negative or past the end is an error
    pub fn second(&self, second: i64) -> Result<(Window<'_>, bool)> {
        let per_second = self.sampling_rate.round() as usize;
        if second < 0 {
            return Err(P300Error::DataShape(format!(
                "requested second {} is negative",
                second
            )));
        }
        let start = usize::try_from(second)
            .ok()
            .and_then(|second| second.checked_mul(per_second))
            .filter(|start| *start < self.len());
        let Some(start) = start else {
            return Err(P300Error::DataShape(format!(
                "requested second {} is not in the recording ({} samples)",
                second,
                self.len()
            )));
        };
        let end = start.saturating_add(per_second).min(self.len());

        let mut channels: [&[f64]; CHANNEL_COUNT] = [&[][..]; CHANNEL_COUNT];
        for (slot, channel) in channels.iter_mut().zip(&self.channels) {
            *slot = &channel[start..end];
        }
        let window = Window {
            start,
            channels,
            markers: self.markers.as_ref().map(|m| &m[start..end]),
            timestamps: &self.timestamps[start..end],
        };
        Ok((window, end - start == per_second))
    }

    /// Writes the recording in the `train` layout with its timestamp column
    /// (index, timestamp, channels, marker); unmarked recordings get 0s.
    pub fn write_csv(&self, path: &Path, policy: WritePolicy, channel_names: &[String]) -> Result<PersistReport> {
        if channel_names.len() != CHANNEL_COUNT {
            return Err(P300Error::DataShape(format!(
                "expected {} channel names, got {}",
                CHANNEL_COUNT,
                channel_names.len()
            )));
        }
        let mut writer = ArtifactWriter::open(path, policy, &recording_header(channel_names))?;
        let mut row = [0.0; CHANNEL_COUNT];
        for i in 0..self.len() {
            for (value, channel) in row.iter_mut().zip(&self.channels) {
                *value = channel[i];
            }
            let marker = self.markers.as_ref().map_or(Marker::None, |m| m[i]);
            writer.write_row(self.timestamps[i], &row, marker)?;
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::layout::ColumnLayout;
    use crate::conditioning::reader::read_recording;

    fn recording(samples: usize) -> FilteredRecording {
        let channels = (0..CHANNEL_COUNT)
            .map(|c| (0..samples).map(|i| (c * 1000 + i) as f64).collect())
            .collect();
        let markers = (0..samples)
            .map(|i| if i % 10 == 0 { Marker::Target } else { Marker::None })
            .collect();
        let timestamps = (0..samples).map(|i| i as f64 / 256.0).collect();
        FilteredRecording::new(channels, Some(markers), timestamps, 256.0).unwrap()
    }

    #[test]
    fn second_windows_and_completeness() {
        let recording = recording(600);
        let (first, complete) = recording.second(0).unwrap();
        assert!(complete);
        assert_eq!(first.channels[1].len(), 256);
        assert_eq!(first.channels[1][0], 1000.0);

        let (third, complete) = recording.second(2).unwrap();
        assert!(!complete);
        assert_eq!(third.start, 512);
        assert_eq!(third.timestamps.len(), 88);
        assert_eq!(third.markers.unwrap()[8], Marker::Target);

        assert!(recording.second(3).is_err());
        assert!(recording.second(-1).is_err());
        assert!(matches!(recording.second(1 << 56), Err(P300Error::DataShape(_))));
        assert!(matches!(recording.second(i64::MAX), Err(P300Error::DataShape(_))));
    }

    #[test]
    fn sampling_rate_below_one_sample_per_second_is_rejected() {
        let channels = vec![vec![0.0; 3]; CHANNEL_COUNT];
        for rate in [0.0, 0.4, f64::NAN] {
            let result = FilteredRecording::new(channels.clone(), None, vec![0.0; 3], rate);
            assert!(matches!(result, Err(P300Error::DataShape(_))), "rate {}", rate);
        }
        let slow = FilteredRecording::new(channels, None, vec![0.0, 1.0, 2.0], 1.0).unwrap();
        let (window, complete) = slow.second(2).unwrap();
        assert!(complete);
        assert_eq!(window.start, 2);
    }

    #[test]
    fn marker_counts_cover_every_code() {
        let recording = recording(100);
        assert_eq!(recording.marker_counts(), Some([90, 0, 10, 0]));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let channels = vec![vec![0.0; 3]; CHANNEL_COUNT];
        let result = FilteredRecording::new(channels, Some(vec![Marker::None; 2]), vec![0.0; 3], 256.0);
        assert!(matches!(result, Err(P300Error::DataShape(_))));
    }

    #[test]
    fn written_recording_reads_back_in_train_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balanced.csv");
        let names: Vec<String> = (1..=CHANNEL_COUNT).map(|i| format!("ch{}", i)).collect();
        let original = recording(20);
        let report = original.write_csv(&path, WritePolicy::NewFile, &names).unwrap();
        assert_eq!(report.rows, 20);

        let back = read_recording(&path, ColumnLayout::Train, 256.0).unwrap();
        assert_eq!(back, original);
    }
}
