// src/session/log.rs

use parking_lot::Mutex;

use crate::acquisition::{Marker, Sample};

/// Append-only, ordered record of every tagged sample of one session. The
/// acquisition loop is the only writer; the full sequence is read back once
/// at teardown.
#[derive(Debug, Default)]
pub struct SessionLog {
    samples: Mutex<Vec<Sample>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<I>(&self, batch: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut samples = self.samples.lock();
        for sample in batch {
            debug_assert!(
                samples
                    .last()
                    .map_or(true, |last| last.timestamp <= sample.timestamp),
                "session log timestamps must not decrease"
            );
            samples.push(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Copy of the whole log, taken under the lock.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    /// Sample counts per label, indexed by marker code.
    pub fn marker_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for sample in self.samples.lock().iter() {
            counts[sample.marker.code() as usize] += 1;
        }
        counts
    }

    pub fn count(&self, marker: Marker) -> usize {
        self.marker_counts()[marker.code() as usize]
    }
}
