use colored::Colorize;
use std::io::{self, BufRead};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::acquisition::AcquisitionGateway;
use crate::config::Config;
use crate::error::{P300Error, Result};
use crate::session::{Session, SessionReport};
use crate::stimulus::build_policy;
use crate::stimulus::display::StimulusDisplay;
use crate::stimulus::scheduler::StimulusScheduler;
use crate::utils::periodic::{StopReason, StopSignal};

/// Runs one recording session in the foreground: opens the hardware session,
/// starts acquisition in the background, drives the stimulus scheduler at the
/// display frame rate until something asks to stop, then tears down.
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `gateway` - Acquisition hardware (or a stand-in)
/// * `display` - Presentation surface driven once per frame
/// * `on_open` - Called with the session's stop signal right after it opens
///
/// # Returns
///
/// * `Result<SessionReport>` - The teardown report; a presentation failure is
///   returned as an error once the recording has been flushed
pub fn run_session(
    config: &Config,
    gateway: Box<dyn AcquisitionGateway>,
    display: &mut dyn StimulusDisplay,
    on_open: impl FnOnce(StopSignal),
) -> Result<SessionReport> {
    let policy = build_policy(&config.stimulus)?;
    let mut session = Session::open(gateway, &config.acquisition, &config.persistence)?;
    let stop = session.stop_signal();
    on_open(stop.clone());

    if let Err(err) = session.start_acquisition() {
        error!(error = %err, "could not start acquisition");
        session.teardown(StopReason::AcquisitionFailed);
        return Err(err);
    }

    let mut scheduler = StimulusScheduler::new(
        policy,
        session.register(),
        Duration::from_millis(config.stimulus.inter_stimulus_interval_ms),
    );
    let clock = session.clock();
    let frame = Duration::from_secs_f64(1.0 / config.stimulus.frame_rate.max(1) as f64);
    let limit = config
        .stimulus
        .session_limit_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
    let mut failure: Option<P300Error> = None;

    info!(
        frame_rate = config.stimulus.frame_rate,
        isi_ms = config.stimulus.inter_stimulus_interval_ms,
        "stimulus loop started"
    );
    while !stop.is_set() {
        let started = Instant::now();

        if display.quit_requested() {
            stop.trigger(StopReason::UserQuit);
            break;
        }
        let now = clock.elapsed();
        if limit.map_or(false, |limit| now >= limit) {
            stop.trigger(StopReason::TimeLimit);
            break;
        }

        let state = scheduler.update(now);
        if let Err(err) = display.present(state, scheduler.current()) {
            error!(error = %err, "stimulus presentation failed, ending session");
            stop.trigger(StopReason::SchedulerFailed);
            failure = Some(err);
            break;
        }
        if scheduler.is_finished() {
            stop.trigger(StopReason::SequenceExhausted);
            break;
        }

        if let Some(remaining) = frame.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
    scheduler.terminate();

    let reason = stop.reason().unwrap_or(StopReason::UserQuit);
    let mut report = session.teardown(reason);
    report.scheduler = scheduler.stats();

    match failure {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

/// Lets the operator end the session by pressing Enter. The listener thread
/// is detached; it exits with the process.
pub fn spawn_enter_listener(stop: StopSignal) {
    println!("{}", "Press Enter to stop the session".yellow());
    let spawned = thread::Builder::new()
        .name("stdin-stop".to_string())
        .spawn(move || {
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).is_ok() {
                stop.trigger(StopReason::Interactive);
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "interactive stop unavailable");
    }
}

/// Operator summary printed after a session.
pub fn print_report(report: &SessionReport) {
    let [none, nontargets, targets, _] = report.marker_counts;
    println!("{}", "Session finished".green().bold());
    if let Some(output) = &report.output {
        println!("  output       {}", output.display());
    }
    println!(
        "  samples      {} ({} target, {} non-target, {} unlabeled)",
        report.samples, targets, nontargets, none
    );
    println!(
        "  stimuli      {} target, {} non-target, {} secondary",
        report.scheduler.targets, report.scheduler.nontargets, report.scheduler.secondary
    );
    if let Some(reason) = report.stop_reason {
        println!("  stopped by   {}", reason);
    }
    if report.acquisition.failures > 0 || report.register_overwrites > 0 {
        println!(
            "  {} poll failures, {} overwritten markers",
            report.acquisition.failures.to_string().red(),
            report.register_overwrites.to_string().red()
        );
    }
    for err in &report.errors {
        println!("  {} {}", "error:".red(), err);
    }
}
