// src/acquisition/acquisition_loop.rs

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::marker::MarkerRegister;
use super::{Marker, RawFrame, Sample, SessionClock, SharedGateway};
use crate::config::AcquisitionConfig;
use crate::error::{P300Error, Result};
use crate::session::log::SessionLog;
use crate::utils::periodic::{spawn_periodic, PeriodicTask, StopReason, StopSignal};

/// How one tick's label is spread over the frames drained on that tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelingPolicy {
    /// Only the first frame of the batch carries the label, the rest are NONE
    #[default]
    StampFirst,
    /// Every frame of the batch carries the label
    StampAll,
}

impl LabelingPolicy {
    pub fn label_for(self, label: Marker, position: usize) -> Marker {
        match self {
            LabelingPolicy::StampAll => label,
            LabelingPolicy::StampFirst if position == 0 => label,
            LabelingPolicy::StampFirst => Marker::None,
        }
    }
}

/// Where labels get attached to samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaggingMode {
    /// The loop stamps drained frames itself
    #[default]
    Software,
    /// The loop forwards labels to `insert_marker` and keeps the device's marker channel
    Hardware,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionReport {
    pub ticks: u64,
    pub frames: usize,
    pub failures: usize,
    pub labels_drained: usize,
    pub aborted: bool,
    /// The gateway reported its last frame handed out
    pub source_exhausted: bool,
}

/// Background loop draining the gateway into the session log.
pub struct AcquisitionLoop {
    gateway: SharedGateway,
    register: Arc<MarkerRegister>,
    log: Arc<SessionLog>,
    clock: SessionClock,
    labeling: LabelingPolicy,
    tagging: TaggingMode,
    sampling_rate: f64,
    max_consecutive_failures: usize,
    poll_deadline: Duration,
    // label drained on a tick with an empty batch, waiting for the next frames
    carried: Marker,
    consecutive_failures: usize,
    last_timestamp: f64,
    report: AcquisitionReport,
    stop: Option<StopSignal>,
}

impl AcquisitionLoop {
    pub fn new(
        gateway: SharedGateway,
        register: Arc<MarkerRegister>,
        log: Arc<SessionLog>,
        clock: SessionClock,
        config: &AcquisitionConfig,
    ) -> Self {
        let sampling_rate = gateway.lock().sampling_rate();
        Self {
            gateway,
            register,
            log,
            clock,
            labeling: config.labeling,
            tagging: config.tagging,
            sampling_rate,
            max_consecutive_failures: config.max_consecutive_failures,
            poll_deadline: Duration::from_millis(config.poll_deadline_ms),
            carried: Marker::None,
            consecutive_failures: 0,
            last_timestamp: 0.0,
            report: AcquisitionReport::default(),
            stop: None,
        }
    }

    pub fn report(&self) -> &AcquisitionReport {
        &self.report
    }

    /// One poll cycle stamped with the session clock.
    pub fn tick(&mut self) -> ControlFlow<()> {
        let now = self.clock.elapsed_secs();
        self.tick_at(now)
    }

    /// One poll cycle at session time `now` (seconds): poll, drain the register
    /// exactly once, tag, append. Breaks once the failure budget is spent or a
    /// poll outlives its deadline.
    pub fn tick_at(&mut self, now: f64) -> ControlFlow<()> {
        self.report.ticks += 1;

        let started = Instant::now();
        let (polled, exhausted) = {
            let mut gateway = self.gateway.lock();
            let polled = gateway.poll_buffer();
            (polled, gateway.is_exhausted())
        };
        let elapsed = started.elapsed();

        let label = self.register.read_and_clear();
        if !label.is_none() {
            self.report.labels_drained += 1;
            if !self.carried.is_none() {
                warn!(
                    carried = self.carried.code(),
                    label = label.code(),
                    "newer marker replaces one still waiting for frames"
                );
            }
            self.carried = label;
        }

        if elapsed > self.poll_deadline {
            let err = P300Error::ConcurrencyTimeout {
                operation: "poll_buffer",
                deadline: self.poll_deadline,
            };
            error!(error = %err, ?elapsed, "aborting acquisition");
            self.report.failures += 1;
            self.report.aborted = true;
            return ControlFlow::Break(());
        }

        let frames = match polled {
            Ok(frames) => {
                self.consecutive_failures = 0;
                frames
            }
            Err(err) => {
                self.consecutive_failures += 1;
                self.report.failures += 1;
                warn!(
                    error = %err,
                    consecutive = self.consecutive_failures,
                    limit = self.max_consecutive_failures,
                    "gateway poll failed"
                );
                if self.consecutive_failures >= self.max_consecutive_failures {
                    error!("consecutive poll failures exhausted, stopping acquisition");
                    self.report.aborted = true;
                    return ControlFlow::Break(());
                }
                return ControlFlow::Continue(());
            }
        };

        if self.tagging == TaggingMode::Hardware && !self.carried.is_none() {
            let label = std::mem::take(&mut self.carried);
            if let Err(err) = self.gateway.lock().insert_marker(label) {
                self.report.failures += 1;
                warn!(error = %err, label = label.code(), "hardware marker insertion failed");
            }
        }

        if !frames.is_empty() {
            let samples = self.tag_batch(&frames, now);
            self.report.frames += samples.len();
            self.log.append(samples);
            debug!(frames = frames.len(), now, "drained batch");
        }

        if exhausted {
            if !self.carried.is_none() {
                warn!(label = self.carried.code(), "source ran dry with a marker still waiting for frames");
            }
            info!(frames = self.report.frames, "acquisition source exhausted");
            self.report.source_exhausted = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn tag_batch(&mut self, frames: &[RawFrame], now: f64) -> Vec<Sample> {
        let label = std::mem::take(&mut self.carried);
        let period = 1.0 / self.sampling_rate;
        let count = frames.len();

        frames
            .iter()
            .enumerate()
            .map(|(position, frame)| {
                // frames without a device timestamp are spread back from `now`
                let stamped = frame
                    .timestamp
                    .unwrap_or_else(|| now - (count - 1 - position) as f64 * period);
                let timestamp = stamped.max(self.last_timestamp);
                self.last_timestamp = timestamp;

                let marker = match self.tagging {
                    TaggingMode::Software => self.labeling.label_for(label, position),
                    TaggingMode::Hardware => frame.marker,
                };
                Sample {
                    timestamp,
                    channels: frame.channels,
                    marker,
                }
            })
            .collect()
    }

    /// Moves the loop onto its own thread, polling every `interval` until
    /// `stop` is set. The loop comes back through the join handle so its
    /// counters survive teardown.
    pub fn spawn(mut self, interval: Duration, stop: StopSignal) -> Result<JoinHandle<Self>> {
        self.stop = Some(stop.clone());
        spawn_periodic("acquisition", interval, stop, self)
            .map_err(|e| P300Error::hardware("spawn acquisition thread", e))
    }
}

impl PeriodicTask for AcquisitionLoop {
    fn run_once(&mut self) -> ControlFlow<()> {
        let flow = self.tick();
        if flow.is_break() {
            // a finished loop tears the whole session down
            let reason = if self.report.aborted {
                StopReason::AcquisitionFailed
            } else {
                StopReason::RecordingEnded
            };
            if let Some(stop) = &self.stop {
                stop.trigger(reason);
            }
        }
        flow
    }
}
