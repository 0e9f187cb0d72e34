//! SLO error-budget math.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SLO_TARGET: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SloConfig {
    pub target: f64,
}

impl SloConfig {
    /// Accepts any candidate target; falls back to the default when it is
    /// missing, non-finite, or outside (0, 1].
    pub fn from_target(target: Option<f64>) -> Self {
        Self {
            target: sanitize_target(target),
        }
    }

    pub fn remaining(&self, observed: Option<f64>) -> Option<f64> {
        remaining(observed, self.target)
    }
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_SLO_TARGET,
        }
    }
}

pub fn sanitize_target(target: Option<f64>) -> f64 {
    target_or(target, DEFAULT_SLO_TARGET)
}

/// `target` when it is finite and in (0, 1], `fallback` otherwise.
pub fn target_or(target: Option<f64>, fallback: f64) -> f64 {
    match target {
        Some(t) if t.is_finite() && t > 0.0 && t <= 1.0 => t,
        _ => fallback,
    }
}

/// Remaining error budget in percent, or `None` when nothing was observed.
pub fn remaining(observed: Option<f64>, target: f64) -> Option<f64> {
    let observed = observed.filter(|o| o.is_finite())?;
    let target = sanitize_target(Some(target));
    if observed >= target {
        return Some(100.0);
    }
    let error_budget = 1.0 - target;
    if error_budget <= 0.0 {
        return Some(0.0);
    }
    let consumed = target - observed;
    Some((100.0 * (1.0 - consumed / error_budget)).clamp(0.0, 100.0))
}
