// src/stimulus/scheduler.rs

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{SequencePolicy, StimulusEvent, StimulusKind};
use crate::acquisition::marker::MarkerRegister;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Fixation cross on screen
    Idle,
    Target,
    NonTarget,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub targets: usize,
    pub nontargets: usize,
    /// Non-targets that wrote the balancing secondary marker
    pub secondary: usize,
    /// Opportunities where the policy kept the fixation up
    pub skipped: usize,
}

/// Foreground stimulus state machine. Driven by elapsed session time, not by
/// how often `update` is called, and the only writer of the marker register.
pub struct StimulusScheduler {
    policy: Box<dyn SequencePolicy>,
    register: Arc<MarkerRegister>,
    inter_stimulus_interval: Duration,
    state: SchedulerState,
    last_transition: Duration,
    current: Option<StimulusEvent>,
    terminated: bool,
    stats: SchedulerStats,
}

impl StimulusScheduler {
    pub fn new(
        policy: Box<dyn SequencePolicy>,
        register: Arc<MarkerRegister>,
        inter_stimulus_interval: Duration,
    ) -> Self {
        Self {
            policy,
            register,
            inter_stimulus_interval,
            state: SchedulerState::Idle,
            last_transition: Duration::ZERO,
            current: None,
            terminated: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Advances the state machine to session time `now` and returns the state
    /// to render.
    pub fn update(&mut self, now: Duration) -> SchedulerState {
        if self.terminated {
            return self.state;
        }

        match self.state {
            SchedulerState::Idle => {
                if now.saturating_sub(self.last_transition) > self.inter_stimulus_interval
                    && self.policy.has_more()
                {
                    self.begin(now);
                }
            }
            SchedulerState::Target | SchedulerState::NonTarget => {
                let expired = self
                    .current
                    .as_ref()
                    .map_or(true, |event| now.saturating_sub(event.onset) > event.duration);
                if expired {
                    self.end(now);
                }
            }
        }
        self.state
    }

    fn begin(&mut self, now: Duration) {
        // idle draws restart the interval too, one draw per opportunity
        self.last_transition = now;
        let Some(event) = self.policy.next_event(now) else {
            self.stats.skipped += 1;
            return;
        };

        if !event.marker.is_none() {
            self.register.set(event.marker);
        }
        self.state = match event.kind {
            StimulusKind::Target => {
                self.stats.targets += 1;
                SchedulerState::Target
            }
            StimulusKind::NonTarget | StimulusKind::Fixation => {
                self.stats.nontargets += 1;
                if event.secondary_marker {
                    self.stats.secondary += 1;
                }
                SchedulerState::NonTarget
            }
        };
        debug!(
            state = ?self.state,
            marker = event.marker.code(),
            onset = ?event.onset,
            duration = ?event.duration,
            "stimulus onset"
        );
        self.current = Some(event);
    }

    fn end(&mut self, now: Duration) {
        self.register.set_idle();
        self.state = SchedulerState::Idle;
        self.current = None;
        self.last_transition = now;
    }

    /// Stops the scheduler for good; no marker is written afterwards.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if self.state != SchedulerState::Idle {
            self.register.set_idle();
            self.state = SchedulerState::Idle;
            self.current = None;
        }
        info!(
            targets = self.stats.targets,
            nontargets = self.stats.nontargets,
            secondary = self.stats.secondary,
            "stimulus scheduler terminated"
        );
    }

    /// True once the sequence ran out and the last stimulus has ended.
    pub fn is_finished(&self) -> bool {
        self.terminated || (!self.policy.has_more() && self.state == SchedulerState::Idle)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn current(&self) -> Option<&StimulusEvent> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Marker;
    use std::collections::VecDeque;

    /// Plays back a fixed list of (kind, marker, duration) events.
    struct ScriptedPolicy {
        script: VecDeque<Option<(StimulusKind, Marker, u64)>>,
    }

    impl ScriptedPolicy {
        fn boxed(script: Vec<Option<(StimulusKind, Marker, u64)>>) -> Box<dyn SequencePolicy> {
            Box::new(Self {
                script: script.into(),
            })
        }
    }

    impl SequencePolicy for ScriptedPolicy {
        fn next_event(&mut self, now: Duration) -> Option<StimulusEvent> {
            let (kind, marker, duration_ms) = self.script.pop_front()??;
            Some(StimulusEvent {
                kind,
                onset: now,
                duration: Duration::from_millis(duration_ms),
                marker,
                secondary_marker: false,
                payload: None,
            })
        }

        fn has_more(&self) -> bool {
            !self.script.is_empty()
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn waits_for_the_interval_then_shows_and_hides() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![Some((StimulusKind::Target, Marker::Target, 100))]);
        let mut scheduler = StimulusScheduler::new(policy, Arc::clone(&register), ms(300));

        assert_eq!(scheduler.update(ms(300)), SchedulerState::Idle);
        assert!(register.peek().is_none());

        assert_eq!(scheduler.update(ms(301)), SchedulerState::Target);
        assert_eq!(register.peek(), Marker::Target);
        assert_eq!(scheduler.current().unwrap().onset, ms(301));

        assert_eq!(scheduler.update(ms(400)), SchedulerState::Target);
        assert_eq!(register.read_and_clear(), Marker::Target);
        assert_eq!(scheduler.update(ms(402)), SchedulerState::Idle);
        assert!(scheduler.is_finished());
    }

    #[test]
    fn transitions_follow_elapsed_time_not_call_rate() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![
            Some((StimulusKind::NonTarget, Marker::NonTarget, 200)),
            Some((StimulusKind::Target, Marker::Target, 50)),
        ]);
        let mut scheduler = StimulusScheduler::new(policy, register, ms(100));

        // a single late call still makes one transition, never two
        assert_eq!(scheduler.update(ms(5_000)), SchedulerState::NonTarget);
        assert_eq!(scheduler.update(ms(5_100)), SchedulerState::NonTarget);
        assert_eq!(scheduler.update(ms(5_201)), SchedulerState::Idle);
        assert_eq!(scheduler.update(ms(5_250)), SchedulerState::Idle);
        assert_eq!(scheduler.update(ms(5_302)), SchedulerState::Target);
    }

    #[test]
    fn idle_draws_restart_the_interval() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![
            None,
            Some((StimulusKind::Target, Marker::Target, 50)),
        ]);
        let mut scheduler = StimulusScheduler::new(policy, Arc::clone(&register), ms(100));

        assert_eq!(scheduler.update(ms(101)), SchedulerState::Idle);
        assert_eq!(scheduler.stats().skipped, 1);
        assert_eq!(scheduler.update(ms(150)), SchedulerState::Idle);
        assert_eq!(scheduler.update(ms(202)), SchedulerState::Target);
    }

    #[test]
    fn unlabeled_nontarget_leaves_the_register_alone() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![Some((StimulusKind::NonTarget, Marker::None, 50))]);
        let mut scheduler = StimulusScheduler::new(policy, Arc::clone(&register), Duration::ZERO);

        assert_eq!(scheduler.update(ms(1)), SchedulerState::NonTarget);
        assert!(register.peek().is_none());
        assert_eq!(register.overwrites(), 0);
    }

    #[test]
    fn no_writes_after_termination() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![
            Some((StimulusKind::Target, Marker::Target, 50)),
            Some((StimulusKind::Target, Marker::Target, 50)),
        ]);
        let mut scheduler = StimulusScheduler::new(policy, Arc::clone(&register), Duration::ZERO);

        scheduler.update(ms(1));
        assert_eq!(register.read_and_clear(), Marker::Target);
        scheduler.terminate();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        for t in 2..1_000 {
            assert_eq!(scheduler.update(ms(t)), SchedulerState::Idle);
        }
        assert!(register.peek().is_none());
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.stats().targets, 1);
    }

    #[test]
    fn stimulus_end_keeps_an_undrained_marker() {
        let register = Arc::new(MarkerRegister::new());
        let policy = ScriptedPolicy::boxed(vec![Some((StimulusKind::Target, Marker::Target, 10))]);
        let mut scheduler = StimulusScheduler::new(policy, Arc::clone(&register), Duration::ZERO);

        scheduler.update(ms(1));
        scheduler.update(ms(20));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(register.read_and_clear(), Marker::Target);
    }
}
