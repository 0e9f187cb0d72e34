//! Cycle-to-cycle render-state diffing.
//!
//! Each cycle produces a fresh map of `{rank, position}` per entity key. The
//! previous cycle's map is consulted once to derive `degraded` / `moved`
//! signals and is then discarded in favour of the new one.

use serde::Serialize;
use std::collections::HashMap;

use crate::health::HealthRank;
use crate::logging::log_render_signal;
use crate::status::NormalizedStatus;

/// Whether moving from `prev` to `self` counts as getting worse.
pub trait Degradation {
    fn degraded_from(&self, prev: &Self) -> bool;
}

impl Degradation for HealthRank {
    fn degraded_from(&self, prev: &Self) -> bool {
        self > prev
    }
}

/// Pipelines only degrade by entering `failed`.
impl Degradation for NormalizedStatus {
    fn degraded_from(&self, prev: &Self) -> bool {
        *self == NormalizedStatus::Failed && *prev != NormalizedStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState<R> {
    pub rank: R,
    pub position: usize,
}

pub type RenderStateMap<R> = HashMap<String, RenderState<R>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RenderSignal {
    pub degraded: bool,
    pub moved: bool,
}

/// Signal for a single entity given its previous state, if any.
pub fn signal_for<R: Degradation>(
    prev: Option<&RenderState<R>>,
    rank: &R,
    position: usize,
) -> RenderSignal {
    let Some(prev) = prev else {
        return RenderSignal::default();
    };
    let degraded = rank.degraded_from(&prev.rank);
    RenderSignal {
        degraded,
        moved: !degraded && prev.position != position,
    }
}

/// Diff an already-sorted cycle against the previous map.
///
/// `current` yields `(key, rank)` in display order; position is the index.
/// Returns one signal per input entry (same order) and the replacement map.
pub fn diff_cycle<R, I>(prev: &RenderStateMap<R>, current: I) -> (Vec<RenderSignal>, RenderStateMap<R>)
where
    R: Degradation + Copy,
    I: IntoIterator<Item = (String, R)>,
{
    let mut signals = Vec::new();
    let mut next = RenderStateMap::new();
    for (position, (key, rank)) in current.into_iter().enumerate() {
        let prior = prev.get(&key);
        let signal = signal_for(prior, &rank, position);
        if let Some(prior) = prior {
            if signal.degraded {
                log_render_signal(&key, "degraded", prior.position, position);
            } else if signal.moved {
                log_render_signal(&key, "moved", prior.position, position);
            }
        }
        signals.push(signal);
        next.insert(key, RenderState { rank, position });
    }
    (signals, next)
}
