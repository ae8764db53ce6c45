// src/utils/periodic.rs

use parking_lot::Mutex;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// -----------------------------------------------------------------------------
// STOP SIGNAL
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserQuit,
    SequenceExhausted,
    Interactive,
    TimeLimit,
    AcquisitionFailed,
    SchedulerFailed,
    /// A finite acquisition source ran out of frames
    RecordingEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::UserQuit => "user_quit",
            StopReason::SequenceExhausted => "sequence_exhausted",
            StopReason::Interactive => "interactive",
            StopReason::TimeLimit => "time_limit",
            StopReason::AcquisitionFailed => "acquisition_failed",
            StopReason::SchedulerFailed => "scheduler_failed",
            StopReason::RecordingEnded => "recording_ended",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation shared by both loops. Only the first reason is
/// recorded; later triggers are no-ops.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self, reason: StopReason) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
            info!(%reason, "stop requested");
        }
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }
}

// -----------------------------------------------------------------------------
// PERIODIC TASK
// -----------------------------------------------------------------------------

/// Work executed once per interval by `spawn_periodic`.
pub trait PeriodicTask: Send + 'static {
    fn run_once(&mut self) -> ControlFlow<()>;
}

/// Runs `task` on its own thread once per `interval` until `stop` is set or the
/// task breaks, then hands the task back through the join handle. The stop
/// flag is checked once per iteration, so shutdown latency is bounded by one
/// interval plus the task's own run time.
pub fn spawn_periodic<T: PeriodicTask>(
    name: &str,
    interval: Duration,
    stop: StopSignal,
    mut task: T,
) -> std::io::Result<JoinHandle<T>> {
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        let mut iterations: u64 = 0;
        while !stop.is_set() {
            let started = Instant::now();
            iterations += 1;
            if task.run_once().is_break() {
                debug!(task = %thread_name, iterations, "periodic task finished");
                return task;
            }
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
        debug!(task = %thread_name, iterations, "periodic task stopped");
        task
    })
}

/// Waits for `handle` until `deadline` elapses. Returns the handle back when
/// the thread is still running.
pub fn join_with_deadline<T>(
    handle: JoinHandle<T>,
    deadline: Duration,
) -> Result<thread::Result<T>, JoinHandle<T>> {
    let started = Instant::now();
    while !handle.is_finished() {
        if started.elapsed() >= deadline {
            return Err(handle);
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(handle.join())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        count: usize,
        limit: Option<usize>,
        work: Duration,
    }

    impl Counter {
        fn new(limit: Option<usize>, work: Duration) -> Self {
            Self {
                count: 0,
                limit,
                work,
            }
        }
    }

    impl PeriodicTask for Counter {
        fn run_once(&mut self) -> ControlFlow<()> {
            self.count += 1;
            thread::sleep(self.work);
            match self.limit {
                Some(limit) if self.count >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    #[test]
    fn first_stop_reason_wins() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
        stop.trigger(StopReason::SequenceExhausted);
        stop.trigger(StopReason::UserQuit);
        assert!(stop.is_set());
        assert_eq!(stop.reason(), Some(StopReason::SequenceExhausted));
    }

    #[test]
    fn periodic_task_stops_on_break() {
        let task = Counter::new(Some(5), Duration::ZERO);
        let handle = spawn_periodic("counter", Duration::from_millis(1), StopSignal::new(), task)
            .unwrap();
        assert_eq!(handle.join().unwrap().count, 5);
    }

    #[test]
    fn periodic_task_stops_on_signal_and_returns_its_state() {
        let stop = StopSignal::new();
        let task = Counter::new(None, Duration::ZERO);
        let handle = spawn_periodic("ticker", Duration::from_millis(5), stop.clone(), task).unwrap();

        thread::sleep(Duration::from_millis(30));
        stop.trigger(StopReason::Interactive);
        match join_with_deadline(handle, Duration::from_millis(500)) {
            Ok(Ok(task)) => assert!(task.count > 0),
            _ => panic!("ticker did not stop within one interval"),
        }
    }

    #[test]
    fn join_with_deadline_hands_back_a_running_thread() {
        let stop = StopSignal::new();
        let task = Counter::new(None, Duration::from_millis(50));
        let handle = spawn_periodic("sleeper", Duration::from_millis(1), stop.clone(), task).unwrap();

        let handle = match join_with_deadline(handle, Duration::from_millis(1)) {
            Err(handle) => handle,
            Ok(_) => panic!("thread finished before the deadline"),
        };
        stop.trigger(StopReason::UserQuit);
        assert!(handle.join().is_ok());
    }
}
