//! Status normalization.
//!
//! Upstream CI systems report pipeline state with a sprawling, inconsistent
//! vocabulary. Everything is folded into [`NormalizedStatus`] before any
//! sorting, diffing or attention logic looks at it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedStatus {
    Success,
    Failed,
    Running,
    Pending,
    Canceled,
    Skipped,
    Manual,
    Other,
}

impl NormalizedStatus {
    pub const ALL: [NormalizedStatus; 8] = [
        NormalizedStatus::Success,
        NormalizedStatus::Failed,
        NormalizedStatus::Running,
        NormalizedStatus::Pending,
        NormalizedStatus::Canceled,
        NormalizedStatus::Skipped,
        NormalizedStatus::Manual,
        NormalizedStatus::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizedStatus::Success => "success",
            NormalizedStatus::Failed => "failed",
            NormalizedStatus::Running => "running",
            NormalizedStatus::Pending => "pending",
            NormalizedStatus::Canceled => "canceled",
            NormalizedStatus::Skipped => "skipped",
            NormalizedStatus::Manual => "manual",
            NormalizedStatus::Other => "other",
        }
    }

    /// Display priority: lower sorts first (worse / more urgent).
    pub fn rank(&self) -> u8 {
        match self {
            NormalizedStatus::Failed => 0,
            NormalizedStatus::Running => 1,
            NormalizedStatus::Pending => 2,
            NormalizedStatus::Manual => 3,
            NormalizedStatus::Success => 4,
            NormalizedStatus::Canceled => 5,
            NormalizedStatus::Skipped => 6,
            NormalizedStatus::Other => 7,
        }
    }
}

fn fold(raw: &str) -> String {
    raw.to_lowercase().replace(['_', '-'], " ").trim().to_string()
}

pub fn normalize(raw: Option<&str>) -> NormalizedStatus {
    let Some(raw) = raw else {
        return NormalizedStatus::Other;
    };
    match fold(raw).as_str() {
        "success" | "passed" => NormalizedStatus::Success,
        "failed" | "failure" => NormalizedStatus::Failed,
        "running" | "in progress" => NormalizedStatus::Running,
        "pending"
        | "created"
        | "scheduled"
        | "preparing"
        | "waiting for resource"
        | "waiting for callback" => NormalizedStatus::Pending,
        "canceled" | "cancelled" => NormalizedStatus::Canceled,
        "skipped" => NormalizedStatus::Skipped,
        "manual" => NormalizedStatus::Manual,
        _ => NormalizedStatus::Other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceHealth {
    Up,
    Down,
    Unknown,
}

impl ServiceHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceHealth::Up => "UP",
            ServiceHealth::Down => "DOWN",
            ServiceHealth::Unknown => "UNKNOWN",
        }
    }
}

pub fn normalize_service_health(raw: Option<&str>) -> ServiceHealth {
    let Some(raw) = raw else {
        return ServiceHealth::Unknown;
    };
    match fold(raw).as_str() {
        "up" | "healthy" | "ok" | "online" => ServiceHealth::Up,
        "down" | "unhealthy" | "error" | "offline" => ServiceHealth::Down,
        _ => ServiceHealth::Unknown,
    }
}

/// Hex color for a status badge.
pub fn status_color(status: NormalizedStatus) -> &'static str {
    match status {
        NormalizedStatus::Success => "#2da44e",
        NormalizedStatus::Failed => "#cf222e",
        NormalizedStatus::Running => "#0969da",
        NormalizedStatus::Pending => "#bf8700",
        NormalizedStatus::Manual => "#8250df",
        NormalizedStatus::Canceled | NormalizedStatus::Skipped | NormalizedStatus::Other => "#6e7781",
    }
}

pub fn service_health_color(health: ServiceHealth) -> &'static str {
    match health {
        ServiceHealth::Up => "#2da44e",
        ServiceHealth::Down => "#cf222e",
        ServiceHealth::Unknown => "#6e7781",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms() {
        assert_eq!(normalize(Some("passed")), NormalizedStatus::Success);
        assert_eq!(normalize(Some("FAILURE")), NormalizedStatus::Failed);
        assert_eq!(normalize(Some("in_progress")), NormalizedStatus::Running);
        assert_eq!(normalize(Some("in-progress")), NormalizedStatus::Running);
        assert_eq!(normalize(Some("waiting_for_resource")), NormalizedStatus::Pending);
        assert_eq!(normalize(Some("Waiting-For-Callback")), NormalizedStatus::Pending);
        assert_eq!(normalize(Some("created")), NormalizedStatus::Pending);
        assert_eq!(normalize(Some("scheduled")), NormalizedStatus::Pending);
        assert_eq!(normalize(Some("preparing")), NormalizedStatus::Pending);
        assert_eq!(normalize(Some("cancelled")), NormalizedStatus::Canceled);
        assert_eq!(normalize(Some("  skipped  ")), NormalizedStatus::Skipped);
        assert_eq!(normalize(Some("manual")), NormalizedStatus::Manual);
    }

    #[test]
    fn test_empty_and_missing_are_other() {
        assert_eq!(normalize(None), NormalizedStatus::Other);
        assert_eq!(normalize(Some("")), NormalizedStatus::Other);
        assert_eq!(normalize(Some("   ")), NormalizedStatus::Other);
        assert_eq!(normalize(Some("exploded")), NormalizedStatus::Other);
    }

    #[test]
    fn test_idempotent_over_own_names() {
        for status in NormalizedStatus::ALL {
            assert_eq!(normalize(Some(status.as_str())), status);
        }
    }

    #[test]
    fn test_rank_table() {
        let ranks: Vec<u8> = [
            NormalizedStatus::Failed,
            NormalizedStatus::Running,
            NormalizedStatus::Pending,
            NormalizedStatus::Manual,
            NormalizedStatus::Success,
            NormalizedStatus::Canceled,
            NormalizedStatus::Skipped,
            NormalizedStatus::Other,
        ]
        .iter()
        .map(|s| s.rank())
        .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_service_health() {
        assert_eq!(normalize_service_health(Some("healthy")), ServiceHealth::Up);
        assert_eq!(normalize_service_health(Some("OK")), ServiceHealth::Up);
        assert_eq!(normalize_service_health(Some("online")), ServiceHealth::Up);
        assert_eq!(normalize_service_health(Some("unhealthy")), ServiceHealth::Down);
        assert_eq!(normalize_service_health(Some("error")), ServiceHealth::Down);
        assert_eq!(normalize_service_health(Some("offline")), ServiceHealth::Down);
        assert_eq!(normalize_service_health(Some("degraded")), ServiceHealth::Unknown);
        assert_eq!(normalize_service_health(None), ServiceHealth::Unknown);
        // pipeline synonyms do not leak into the service table
        assert_eq!(normalize_service_health(Some("success")), ServiceHealth::Unknown);
    }
}
