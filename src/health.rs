//! Unified repository health rank.
//!
//! One rank system serves both the render-state differ and any caller that
//! needs a single "how bad is this repository" answer. Order is from best to
//! worst; a strictly greater rank is a degradation.

use serde::{Deserialize, Serialize};

use crate::model::Repository;
use crate::status::NormalizedStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthRank {
    Healthy = 0,
    Unknown = 1,
    Degraded = 2,
    Warning = 3,
    Failing = 4,
    RunnerIssue = 5,
}

impl HealthRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthRank::Healthy => "healthy",
            HealthRank::Unknown => "unknown",
            HealthRank::Degraded => "degraded",
            HealthRank::Warning => "warning",
            HealthRank::Failing => "failing",
            HealthRank::RunnerIssue => "runner_issue",
        }
    }
}

pub fn repo_health(repo: &Repository, slo_target: f64) -> HealthRank {
    if repo.runner_issue() {
        return HealthRank::RunnerIssue;
    }
    let status = repo.status();
    if repo.consecutive_failures() > 0 || status == NormalizedStatus::Failed {
        return HealthRank::Failing;
    }
    if repo.failing_jobs() {
        return HealthRank::Warning;
    }
    if matches!(repo.recent_success_rate, Some(rate) if rate < slo_target) {
        return HealthRank::Degraded;
    }
    if status == NormalizedStatus::Other && repo.recent_success_rate.is_none() {
        return HealthRank::Unknown;
    }
    HealthRank::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository {
            id: Some(1),
            name: Some("r".into()),
            last_pipeline_status: Some("success".into()),
            recent_success_rate: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_cascade() {
        let mut r = repo();
        assert_eq!(repo_health(&r, 0.99), HealthRank::Healthy);
        r.recent_success_rate = Some(0.9);
        assert_eq!(repo_health(&r, 0.99), HealthRank::Degraded);
        r.has_failing_jobs = Some(true);
        assert_eq!(repo_health(&r, 0.99), HealthRank::Warning);
        r.consecutive_default_branch_failures = Some(1);
        assert_eq!(repo_health(&r, 0.99), HealthRank::Failing);
        r.has_runner_issues = Some(true);
        assert_eq!(repo_health(&r, 0.99), HealthRank::RunnerIssue);
    }

    #[test]
    fn test_no_data_is_unknown() {
        let r = Repository {
            name: Some("bare".into()),
            ..Default::default()
        };
        assert_eq!(repo_health(&r, 0.99), HealthRank::Unknown);
    }

    #[test]
    fn test_rank_order() {
        assert!(HealthRank::Healthy < HealthRank::Unknown);
        assert!(HealthRank::Unknown < HealthRank::Degraded);
        assert!(HealthRank::Degraded < HealthRank::Warning);
        assert!(HealthRank::Warning < HealthRank::Failing);
        assert!(HealthRank::Failing < HealthRank::RunnerIssue);
    }
}
