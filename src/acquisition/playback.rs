// src/acquisition/playback.rs

use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::{AcquisitionGateway, Marker, RawFrame, CHANNEL_COUNT};
use crate::conditioning::layout::ColumnLayout;
use crate::conditioning::reader::read_recording;
use crate::conditioning::recording::FilteredRecording;
use crate::error::{P300Error, Result};

// -----------------------------------------------------------------------------
// SENDING DATA FROM CSV
// -----------------------------------------------------------------------------

/// Replays a recorded CSV as if it were streaming live: frames become
/// available at the recording's sampling rate from `start_stream` on, and
/// polls past the end return empty batches. Recorded markers travel on the
/// device marker channel.
pub struct PlaybackGateway {
    path: PathBuf,
    layout: ColumnLayout,
    sampling_rate: f64,
    recording: Option<FilteredRecording>,
    started: Option<Instant>,
    cursor: usize,
    pending_marker: Marker,
    streaming: bool,
}

impl PlaybackGateway {
    pub fn new(path: impl Into<PathBuf>, layout: ColumnLayout, sampling_rate: f64) -> Self {
        Self {
            path: path.into(),
            layout,
            sampling_rate,
            recording: None,
            started: None,
            cursor: 0,
            pending_marker: Marker::None,
            streaming: false,
        }
    }

    /// Hands out frames up to `target` (exclusive), clamped to the recording.
    fn frames_until(&mut self, target: usize) -> Vec<RawFrame> {
        let Some(recording) = self.recording.as_ref() else {
            return Vec::new();
        };
        let end = target.min(recording.len());
        let mut frames = Vec::with_capacity(end.saturating_sub(self.cursor));
        for i in self.cursor..end {
            let mut channels = [0.0; CHANNEL_COUNT];
            for (value, channel) in channels.iter_mut().zip(recording.channels()) {
                *value = channel[i];
            }
            let recorded = recording.markers().map_or(Marker::None, |m| m[i]);
            let marker = if self.pending_marker.is_none() {
                recorded
            } else {
                std::mem::take(&mut self.pending_marker)
            };
            frames.push(RawFrame {
                timestamp: None,
                channels,
                marker,
            });
        }
        self.cursor = self.cursor.max(end);
        frames
    }
}

impl AcquisitionGateway for PlaybackGateway {
    fn prepare_session(&mut self) -> Result<()> {
        if self.recording.is_some() {
            return Err(P300Error::hardware("prepare_session", "session already prepared"));
        }
        let recording = read_recording(&self.path, self.layout, self.sampling_rate)
            .map_err(|e| P300Error::hardware("prepare_session", e))?;
        info!(
            path = %self.path.display(),
            samples = recording.len(),
            "playback recording loaded"
        );
        self.recording = Some(recording);
        Ok(())
    }

    fn start_stream(&mut self, _buffer_size: usize) -> Result<()> {
        if self.recording.is_none() || self.streaming {
            return Err(P300Error::hardware("start_stream", "no prepared session to stream"));
        }
        self.started = Some(Instant::now());
        self.cursor = 0;
        self.streaming = true;
        Ok(())
    }

    fn poll_buffer(&mut self) -> Result<Vec<RawFrame>> {
        if !self.streaming {
            return Err(P300Error::hardware("poll_buffer", "stream not started"));
        }
        let elapsed = self.started.map_or(0.0, |s| s.elapsed().as_secs_f64());
        let target = (elapsed * self.sampling_rate).floor() as usize;
        Ok(self.frames_until(target))
    }

    fn insert_marker(&mut self, marker: Marker) -> Result<()> {
        if !self.streaming {
            return Err(P300Error::hardware("insert_marker", "stream not started"));
        }
        self.pending_marker = marker;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        if !self.streaming {
            return Err(P300Error::hardware("stop_stream", "stream not started"));
        }
        self.streaming = false;
        Ok(())
    }

    fn release_session(&mut self) -> Result<()> {
        if self.recording.take().is_none() {
            return Err(P300Error::hardware("release_session", "no prepared session"));
        }
        self.streaming = false;
        Ok(())
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn is_exhausted(&self) -> bool {
        self.streaming
            && self
                .recording
                .as_ref()
                .map_or(false, |recording| self.cursor >= recording.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_recording(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("replay.csv");
        let mut contents = String::from(",a,b,c,d,e,f,g,h,marker\n");
        for i in 0..rows {
            let marker = if i == 2 { 2 } else { 0 };
            contents.push_str(&format!("{},{},1,1,1,1,1,1,1,{}\n", i, i, marker));
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn replays_rows_in_order_then_runs_dry() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = PlaybackGateway::new(write_recording(dir.path(), 5), ColumnLayout::Train, 256.0);
        gateway.prepare_session().unwrap();
        gateway.start_stream(100).unwrap();

        let first = gateway.frames_until(3);
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].channels[0], 1.0);
        assert_eq!(first[2].marker, Marker::Target);

        let rest = gateway.frames_until(100);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].channels[0], 3.0);
        assert!(gateway.is_exhausted());
        assert!(gateway.poll_buffer().unwrap().is_empty());
    }

    #[test]
    fn inserted_marker_overrides_the_next_recorded_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = PlaybackGateway::new(write_recording(dir.path(), 3), ColumnLayout::Train, 256.0);
        gateway.prepare_session().unwrap();
        gateway.start_stream(100).unwrap();
        gateway.insert_marker(Marker::NonTarget).unwrap();
        let frames = gateway.frames_until(3);
        let markers: Vec<Marker> = frames.iter().map(|f| f.marker).collect();
        assert_eq!(markers, vec![Marker::NonTarget, Marker::None, Marker::Target]);
    }

    #[test]
    fn missing_file_fails_prepare_as_hardware_io() {
        let mut gateway = PlaybackGateway::new("/nonexistent/replay.csv", ColumnLayout::Train, 256.0);
        assert!(matches!(
            gateway.prepare_session(),
            Err(P300Error::HardwareIo { operation: "prepare_session", .. })
        ));
        assert!(gateway.poll_buffer().is_err());
    }
}
