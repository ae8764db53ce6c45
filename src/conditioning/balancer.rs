// src/conditioning/balancer.rs

use rand::seq::index;
use tracing::info;

use crate::acquisition::Marker;
use crate::utils::seeded_rng;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceReport {
    pub targets: usize,
    pub nontargets_before: usize,
    /// Positions relabeled from NONTARGET to EXCLUDED
    pub excluded: usize,
}

/// Relabels surplus NONTARGET positions to EXCLUDED until NONTARGET and
/// TARGET counts match. Positions are drawn uniformly without replacement
/// from the NONTARGET set; everything else is left untouched, including
/// EXCLUDED labels from an earlier pass. No-op when there are no more
/// NONTARGETs than TARGETs.
pub fn balance_markers(markers: &mut [Marker], seed: Option<u64>) -> BalanceReport {
    let targets = markers.iter().filter(|m| **m == Marker::Target).count();
    let candidates: Vec<usize> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| **m == Marker::NonTarget)
        .map(|(i, _)| i)
        .collect();

    let mut report = BalanceReport {
        targets,
        nontargets_before: candidates.len(),
        excluded: 0,
    };
    if candidates.len() <= targets {
        info!(
            targets,
            nontargets = candidates.len(),
            "classes already balanced, markers unchanged"
        );
        return report;
    }

    let surplus = candidates.len() - targets;
    let mut rng = seeded_rng(seed);
    for pick in index::sample(&mut rng, candidates.len(), surplus).iter() {
        markers[candidates[pick]] = Marker::Excluded;
    }
    report.excluded = surplus;

    info!(targets, excluded = surplus, "surplus non-targets excluded");
    report
}
