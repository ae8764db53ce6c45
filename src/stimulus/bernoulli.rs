// src/stimulus/bernoulli.rs

use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

use super::{PayloadFactory, SequencePolicy, StimulusEvent};
use crate::error::{P300Error, Result};

/// Independent draw per opportunity: target with `p_target`, tagged
/// non-target with `p_flash`, otherwise the fixation stays up. Never exhausts.
pub struct BernoulliPolicy {
    p_target: f64,
    p_flash: f64,
    payloads: PayloadFactory,
    rng: StdRng,
}

impl BernoulliPolicy {
    pub fn new(p_target: f64, p_flash: f64, payloads: PayloadFactory, rng: StdRng) -> Result<Self> {
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        if !in_unit(p_target) || !in_unit(p_flash) || p_target + p_flash > 1.0 {
            return Err(P300Error::Scheduler(format!(
                "invalid bernoulli probabilities: p_target {}, p_flash {}",
                p_target, p_flash
            )));
        }
        Ok(Self {
            p_target,
            p_flash,
            payloads,
            rng,
        })
    }
}

impl SequencePolicy for BernoulliPolicy {
    fn next_event(&mut self, now: Duration) -> Option<StimulusEvent> {
        let r: f64 = self.rng.gen();
        if r < self.p_target {
            Some(self.payloads.target(&mut self.rng, now))
        } else if r < self.p_target + self.p_flash {
            Some(self.payloads.nontarget(now, true, false))
        } else {
            None
        }
    }

    fn has_more(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Marker;
    use crate::config::StimulusConfig;
    use crate::stimulus::StimulusKind;
    use rand::SeedableRng;

    fn policy(p_target: f64, p_flash: f64, seed: u64) -> Result<BernoulliPolicy> {
        BernoulliPolicy::new(
            p_target,
            p_flash,
            PayloadFactory::new(&StimulusConfig::default()),
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn frequencies_track_the_configured_probabilities() {
        let mut policy = policy(0.5, 0.2, 11).unwrap();
        let draws = 20_000;
        let (mut targets, mut flashes, mut idle) = (0, 0, 0);
        for _ in 0..draws {
            match policy.next_event(Duration::ZERO) {
                Some(event) if event.kind == StimulusKind::Target => targets += 1,
                Some(event) => {
                    assert_eq!(event.marker, Marker::NonTarget);
                    flashes += 1
                }
                None => idle += 1,
            }
        }
        let share = |n: i32| n as f64 / draws as f64;
        assert!((share(targets) - 0.5).abs() < 0.02);
        assert!((share(flashes) - 0.2).abs() < 0.02);
        assert!((share(idle) - 0.3).abs() < 0.02);
        assert!(policy.has_more());
    }

    #[test]
    fn zero_probabilities_always_idle() {
        let mut policy = policy(0.0, 0.0, 1).unwrap();
        assert!((0..100).all(|_| policy.next_event(Duration::ZERO).is_none()));
    }

    #[test]
    fn rejects_probabilities_summing_above_one() {
        assert!(matches!(policy(0.7, 0.4, 1), Err(P300Error::Scheduler(_))));
        assert!(policy(-0.1, 0.2, 1).is_err());
    }

    #[test]
    fn events_carry_the_requested_onset() {
        let mut policy = policy(1.0, 0.0, 5).unwrap();
        let event = policy.next_event(Duration::from_millis(750)).unwrap();
        assert_eq!(event.onset, Duration::from_millis(750));
    }
}
