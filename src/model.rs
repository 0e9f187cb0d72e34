//! Feed documents and entities.
//!
//! Every field is optional on the wire. Numeric and boolean fields go through
//! lenient deserializers so a single malformed field degrades to "absent"
//! instead of failing the whole feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::status::{normalize, normalize_service_health, NormalizedStatus, ServiceHealth};

pub const UNKNOWN_KEY: &str = "unknown";

/// Stable identity: numeric id, then namespaced path, then display name.
pub fn identity_key(id: Option<u64>, path: Option<&str>, name: Option<&str>) -> String {
    if let Some(id) = id {
        return id.to_string();
    }
    [path, name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_KEY.to_string())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_as_f64))
}

pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_array<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    #[serde(deserialize_with = "lenient_u64")]
    pub total_repositories: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub successful_pipelines: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub failed_pipelines: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub running_pipelines: Option<u64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pipeline_slo_target_default_branch_success_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pipeline_slo_observed_default_branch_success_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pipeline_error_budget_remaining_pct: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_mock: Option<bool>,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient_string")]
    pub path_with_namespace: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub default_branch: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub last_pipeline_status: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_runner_issues: Option<bool>,
    #[serde(deserialize_with = "lenient_u64")]
    pub consecutive_default_branch_failures: Option<u64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_failing_jobs: Option<bool>,
    #[serde(deserialize_with = "lenient_f64")]
    pub recent_success_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub web_url: Option<String>,
}

impl Repository {
    pub fn key(&self) -> String {
        identity_key(self.id, self.path_with_namespace.as_deref(), self.name.as_deref())
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.path_with_namespace.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.key())
    }

    pub fn status(&self) -> NormalizedStatus {
        normalize(self.last_pipeline_status.as_deref())
    }

    pub fn runner_issue(&self) -> bool {
        self.has_runner_issues.unwrap_or(false)
    }

    pub fn failing_jobs(&self) -> bool {
        self.has_failing_jobs.unwrap_or(false)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_default_branch_failures.unwrap_or(0)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub project_id: Option<u64>,
    #[serde(deserialize_with = "lenient_string")]
    pub project_path: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub project_name: Option<String>,
    #[serde(rename = "ref", deserialize_with = "lenient_string")]
    pub git_ref: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_default_branch: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub default_branch: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub web_url: Option<String>,
}

impl Pipeline {
    pub fn key(&self) -> String {
        identity_key(self.id, self.project_path.as_deref(), self.project_name.as_deref())
    }

    pub fn display_name(&self) -> String {
        let project = self
            .project_name
            .as_deref()
            .or(self.project_path.as_deref())
            .unwrap_or(UNKNOWN_KEY);
        match (&self.git_ref, self.id) {
            (Some(r), Some(id)) => format!("{} #{} ({})", project, id, r),
            (Some(r), None) => format!("{} ({})", project, r),
            (None, Some(id)) => format!("{} #{}", project, id),
            (None, None) => project.to_string(),
        }
    }

    pub fn status(&self) -> NormalizedStatus {
        normalize(self.status.as_deref())
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    /// Explicit flag wins; otherwise compare the ref with the declared default branch.
    pub fn on_default_branch(&self) -> bool {
        if let Some(flag) = self.is_default_branch {
            return flag;
        }
        match (&self.git_ref, &self.default_branch) {
            (Some(r), Some(d)) => r == d,
            _ => false,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub latency_ms: Option<f64>,
    /// Rolling samples computed server side; replaces local history when non-empty.
    #[serde(deserialize_with = "lenient_array")]
    pub latency_samples: Vec<Value>,
}

impl Service {
    pub fn key(&self) -> String {
        identity_key(self.id, self.url.as_deref(), self.name.as_deref())
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.key())
    }

    pub fn health(&self) -> ServiceHealth {
        normalize_service_health(self.status.as_deref())
    }

    pub fn server_samples(&self) -> Vec<Option<f64>> {
        self.latency_samples.iter().map(value_as_f64).collect()
    }
}

// =============================================================================
// Feed envelopes
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReposDoc {
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelinesDoc {
    pub pipelines: Vec<Pipeline>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesDoc {
    pub services: Vec<Service>,
}

// =============================================================================
// Job analytics
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartDataPoint {
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_duration: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub p95_duration: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub p99_duration: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_default_branch: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_merge_request: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAnalytics {
    pub data: Vec<ChartDataPoint>,
    #[serde(deserialize_with = "lenient_u64")]
    pub window_days: Option<u64>,
    #[serde(deserialize_with = "lenient_string")]
    pub computed_at: Option<String>,
}
