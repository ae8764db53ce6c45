// src/stimulus/shuffled.rs

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use std::time::Duration;
use tracing::info;

use super::{PayloadFactory, SequencePolicy, StimulusEvent};
use crate::error::{P300Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Target,
    /// Non-target, tagged when picked for the balanced secondary marker
    NonTarget { tagged: bool },
}

/// Finite pre-shuffled sequence with an exact target count. As many
/// non-targets as there are targets get tagged so both classes come out
/// balanced; the rest stay unlabeled.
pub struct ShuffledPolicy {
    slots: Vec<Slot>,
    cursor: usize,
    payloads: PayloadFactory,
    rng: StdRng,
}

impl ShuffledPolicy {
    pub fn new(total: usize, target_ratio: f64, payloads: PayloadFactory, mut rng: StdRng) -> Result<Self> {
        if total == 0 || !(0.0..=1.0).contains(&target_ratio) {
            return Err(P300Error::Scheduler(format!(
                "invalid shuffled sequence: total {}, target_ratio {}",
                total, target_ratio
            )));
        }

        let num_target = (total as f64 * target_ratio).floor() as usize;
        let num_nontarget = total - num_target;
        let num_tagged = num_target.min(num_nontarget);

        let tagged = index::sample(&mut rng, num_nontarget, num_tagged);
        let mut is_tagged = vec![false; num_nontarget];
        for i in tagged.iter() {
            is_tagged[i] = true;
        }

        let mut slots: Vec<Slot> = std::iter::repeat(Slot::Target)
            .take(num_target)
            .chain(is_tagged.into_iter().map(|tagged| Slot::NonTarget { tagged }))
            .collect();
        slots.shuffle(&mut rng);

        info!(
            total,
            targets = num_target,
            nontargets = num_nontarget,
            tagged_nontargets = num_tagged,
            "shuffled sequence built"
        );

        Ok(Self {
            slots,
            cursor: 0,
            payloads,
            rng,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn remaining(&self) -> usize {
        self.slots.len() - self.cursor
    }
}

impl SequencePolicy for ShuffledPolicy {
    fn next_event(&mut self, now: Duration) -> Option<StimulusEvent> {
        let slot = *self.slots.get(self.cursor)?;
        self.cursor += 1;
        let event = match slot {
            Slot::Target => self.payloads.target(&mut self.rng, now),
            Slot::NonTarget { tagged } => self.payloads.nontarget(now, tagged, tagged),
        };
        Some(event)
    }

    fn has_more(&self) -> bool {
        self.cursor < self.slots.len()
    }
}
