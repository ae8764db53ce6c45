// src/stimulus/mod.rs

pub mod bernoulli;
pub mod display;
pub mod scheduler;
pub mod shuffled;

use rand::Rng;
use std::time::Duration;

use crate::acquisition::Marker;
use crate::config::{SequencePolicyConfig, StimulusConfig};
use crate::error::{P300Error, Result};
use crate::utils::seeded_rng;

use self::bernoulli::BernoulliPolicy;
use self::shuffled::ShuffledPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StimulusKind {
    Fixation,
    Target,
    NonTarget,
}

/// Visual parameters of one presentation, drawn once when the event is built.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusPayload {
    pub letter: char,
    pub color: [u8; 3],
    pub size: u32,
    pub position: (u32, u32),
}

/// One presentation. Only `marker` leaves the foreground side, through the
/// marker register.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusEvent {
    pub kind: StimulusKind,
    pub onset: Duration,
    pub duration: Duration,
    pub marker: Marker,
    /// Non-targets picked to be tagged so tagged classes come out balanced
    pub secondary_marker: bool,
    pub payload: Option<StimulusPayload>,
}

/// Decides what, if anything, to show each time the fixation interval runs out.
pub trait SequencePolicy: Send {
    /// Next stimulus to present at `now`, or `None` to stay on fixation.
    fn next_event(&mut self, now: Duration) -> Option<StimulusEvent>;

    /// False once a finite sequence is exhausted.
    fn has_more(&self) -> bool;
}

// PAYLOADS --------------------------------------------------------------------

const NONTARGET_LETTER: char = 'O';
const NONTARGET_COLOR: [u8; 3] = [0, 0, 255];
const NONTARGET_SIZE: u32 = 50;
const SCREEN_MARGIN: u32 = 50;
const TARGET_CLEARANCE: u32 = 150;

/// Draws payloads and durations for targets and non-targets.
pub struct PayloadFactory {
    letters: Vec<char>,
    colors: Vec<[u8; 3]>,
    size: (u32, u32),
    screen: (u32, u32),
    target_duration_ms: (u64, u64),
    nontarget_duration: Duration,
}

impl PayloadFactory {
    pub fn new(config: &StimulusConfig) -> Self {
        Self {
            letters: config.target_letters.clone(),
            colors: config.target_colors.clone(),
            size: (config.target_size.min, config.target_size.max),
            screen: (config.screen.width, config.screen.height),
            target_duration_ms: (config.target_duration_ms.min, config.target_duration_ms.max),
            nontarget_duration: Duration::from_millis(config.nontarget_duration_ms),
        }
    }

    pub fn target<R: Rng>(&self, rng: &mut R, onset: Duration) -> StimulusEvent {
        let index = rng.gen_range(0..self.letters.len());
        let (width, height) = self.screen;
        let x_max = width.saturating_sub(TARGET_CLEARANCE).max(SCREEN_MARGIN);
        let y_max = height.saturating_sub(TARGET_CLEARANCE).max(SCREEN_MARGIN);
        let payload = StimulusPayload {
            letter: self.letters[index],
            color: self.colors[index],
            size: rng.gen_range(self.size.0..=self.size.1),
            position: (
                rng.gen_range(SCREEN_MARGIN..=x_max),
                rng.gen_range(SCREEN_MARGIN..=y_max),
            ),
        };
        let duration_ms = rng.gen_range(self.target_duration_ms.0..=self.target_duration_ms.1);

        StimulusEvent {
            kind: StimulusKind::Target,
            onset,
            duration: Duration::from_millis(duration_ms),
            marker: Marker::Target,
            secondary_marker: false,
            payload: Some(payload),
        }
    }

    /// Non-target event; `tagged` decides whether it writes a label at all.
    pub fn nontarget(&self, onset: Duration, tagged: bool, secondary_marker: bool) -> StimulusEvent {
        let (width, height) = self.screen;
        StimulusEvent {
            kind: StimulusKind::NonTarget,
            onset,
            duration: self.nontarget_duration,
            marker: if tagged { Marker::NonTarget } else { Marker::None },
            secondary_marker,
            payload: Some(StimulusPayload {
                letter: NONTARGET_LETTER,
                color: NONTARGET_COLOR,
                size: NONTARGET_SIZE,
                position: (width / 2, height / 2),
            }),
        }
    }
}

/// Builds the configured sequence policy.
pub fn build_policy(config: &StimulusConfig) -> Result<Box<dyn SequencePolicy>> {
    if config.target_letters.is_empty() || config.target_letters.len() != config.target_colors.len() {
        return Err(P300Error::Config(
            "every target letter needs exactly one color".into(),
        ));
    }
    let payloads = PayloadFactory::new(config);
    let rng = seeded_rng(config.seed);
    let policy: Box<dyn SequencePolicy> = match config.policy {
        SequencePolicyConfig::Bernoulli { p_target, p_flash } => {
            Box::new(BernoulliPolicy::new(p_target, p_flash, payloads, rng)?)
        }
        SequencePolicyConfig::Shuffled {
            total,
            target_ratio,
        } => Box::new(ShuffledPolicy::new(total, target_ratio, payloads, rng)?),
    };
    Ok(policy)
}
