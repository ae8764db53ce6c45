// src/session/mod.rs

pub mod log;
pub mod persist;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::acquisition::acquisition_loop::{AcquisitionLoop, AcquisitionReport};
use crate::acquisition::marker::MarkerRegister;
use crate::acquisition::{share_gateway, AcquisitionGateway, SessionClock, SharedGateway};
use crate::config::{AcquisitionConfig, PersistenceConfig};
use crate::error::{P300Error, Result};
use crate::stimulus::scheduler::SchedulerStats;
use crate::utils::log::log_csv;
use crate::utils::periodic::{join_with_deadline, StopReason, StopSignal};

use self::log::SessionLog;
use self::persist::persist_samples;

const JOURNAL_FILE: &str = "sessions.csv";
const JOURNAL_HEADER: [&str; 8] = [
    "finished_at",
    "output",
    "samples",
    "targets",
    "nontargets",
    "acquisition_failures",
    "stop_reason",
    "errors",
];

/// Everything that happened to one session, assembled at teardown.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub output: Option<PathBuf>,
    pub samples: usize,
    /// Sample counts indexed by marker code
    pub marker_counts: [usize; 4],
    pub acquisition: AcquisitionReport,
    /// Filled in by the foreground runner once the scheduler has stopped
    pub scheduler: SchedulerStats,
    pub register_overwrites: usize,
    pub stop_reason: Option<StopReason>,
    /// Non-fatal failures collected while tearing down
    pub errors: Vec<P300Error>,
}

impl SessionReport {
    /// True when the session ended because acquisition gave up.
    pub fn acquisition_failed(&self) -> bool {
        self.acquisition.aborted || self.stop_reason == Some(StopReason::AcquisitionFailed)
    }
}

/// One hardware session from prepare to release. Owns the gateway handle, the
/// marker register and the session log, and hands the register (never the
/// log) to the foreground side.
pub struct Session {
    gateway: SharedGateway,
    register: Arc<MarkerRegister>,
    log: Arc<SessionLog>,
    stop: StopSignal,
    clock: SessionClock,
    acquisition_config: AcquisitionConfig,
    persistence: PersistenceConfig,
    acquisition: Option<JoinHandle<AcquisitionLoop>>,
}

impl Session {
    /// Prepares the hardware session and starts streaming. A stream that fails
    /// to start still gets its session released.
    pub fn open(
        gateway: Box<dyn AcquisitionGateway>,
        acquisition_config: &AcquisitionConfig,
        persistence: &PersistenceConfig,
    ) -> Result<Self> {
        let gateway = share_gateway(gateway);
        {
            let mut device = gateway.lock();
            device.prepare_session()?;
            if let Err(err) = device.start_stream(acquisition_config.buffer_size) {
                if let Err(release_err) = device.release_session() {
                    warn!(error = %release_err, "release after failed stream start also failed");
                }
                return Err(err);
            }
        }
        info!(
            buffer_size = acquisition_config.buffer_size,
            "hardware session prepared and streaming"
        );

        Ok(Self {
            gateway,
            register: Arc::new(MarkerRegister::new()),
            log: Arc::new(SessionLog::new()),
            stop: StopSignal::new(),
            clock: SessionClock::start(),
            acquisition_config: acquisition_config.clone(),
            persistence: persistence.clone(),
            acquisition: None,
        })
    }

    pub fn register(&self) -> Arc<MarkerRegister> {
        Arc::clone(&self.register)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    /// Starts the background acquisition loop.
    pub fn start_acquisition(&mut self) -> Result<()> {
        if self.acquisition.is_some() {
            return Ok(());
        }
        let acquisition = AcquisitionLoop::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.register),
            Arc::clone(&self.log),
            self.clock,
            &self.acquisition_config,
        );
        let interval = Duration::from_millis(self.acquisition_config.poll_interval_ms);
        self.acquisition = Some(acquisition.spawn(interval, self.stop.clone())?);
        Ok(())
    }

    /// Fixed-order teardown: signal stop, join acquisition, flush the log,
    /// stop the stream, release the session. Every step runs even when an
    /// earlier one failed; failures end up in the report.
    pub fn teardown(mut self, reason: StopReason) -> SessionReport {
        self.stop.trigger(reason);
        let mut report = SessionReport::default();

        let deadline = Duration::from_millis(self.acquisition_config.join_timeout_ms);
        if let Some(handle) = self.acquisition.take() {
            match join_with_deadline(handle, deadline) {
                Ok(Ok(acquisition)) => report.acquisition = acquisition.report().clone(),
                Ok(Err(_)) => report
                    .errors
                    .push(P300Error::hardware("join acquisition", "acquisition thread panicked")),
                Err(_still_running) => {
                    let err = P300Error::ConcurrencyTimeout {
                        operation: "join acquisition",
                        deadline,
                    };
                    error!(error = %err, "acquisition loop did not finish, continuing teardown");
                    report.errors.push(err);
                }
            }
        }

        let samples = self.log.snapshot();
        report.samples = samples.len();
        report.marker_counts = self.log.marker_counts();
        report.register_overwrites = self.register.overwrites();
        match persist_samples(
            &samples,
            &self.persistence.output_path,
            self.persistence.write_policy,
            &self.persistence.channel_names,
        ) {
            Ok(persisted) => report.output = Some(persisted.path),
            Err(err) => {
                error!(error = %err, "failed to persist session log");
                report.errors.push(err);
            }
        }

        match self.gateway.try_lock_for(deadline) {
            Some(mut device) => {
                if let Err(err) = device.stop_stream() {
                    warn!(error = %err, "stop_stream failed");
                    report.errors.push(err);
                }
                if let Err(err) = device.release_session() {
                    warn!(error = %err, "release_session failed");
                    report.errors.push(err);
                }
            }
            None => {
                let err = P300Error::ConcurrencyTimeout {
                    operation: "release hardware session",
                    deadline,
                };
                error!(error = %err, "gateway still busy, session not released");
                report.errors.push(err);
            }
        }

        report.stop_reason = self.stop.reason();
        self.write_journal(&report);
        info!(
            samples = report.samples,
            targets = report.marker_counts[2],
            nontargets = report.marker_counts[1],
            errors = report.errors.len(),
            "session torn down"
        );
        report
    }

    fn write_journal(&self, report: &SessionReport) {
        let Some(dir) = &self.persistence.journal_dir else {
            return;
        };
        let row = [
            chrono::Local::now().to_rfc3339(),
            report
                .output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            report.samples.to_string(),
            report.marker_counts[2].to_string(),
            report.marker_counts[1].to_string(),
            report.acquisition.failures.to_string(),
            report
                .stop_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            report.errors.len().to_string(),
        ];
        if let Err(err) = log_csv(dir, JOURNAL_FILE, &JOURNAL_HEADER, &row) {
            warn!(error = %err, "failed to append session journal");
        }
    }
}
