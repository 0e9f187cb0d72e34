//! On-demand job analytics for a single repository.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{decode, timed, FeedTransport, FetchError};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::model::JobAnalytics;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("analytics have not been computed yet")]
    NotComputed,
    #[error("an analytics refresh is already in progress")]
    AlreadyRefreshing,
    #[error("analytics computation failed")]
    Failed,
    #[error("job analytics are disabled")]
    Disabled,
    #[error(transparent)]
    Request(FetchError),
}

impl From<FetchError> for AnalyticsError {
    fn from(err: FetchError) -> Self {
        match err.status() {
            Some(404) => AnalyticsError::NotComputed,
            Some(409) => AnalyticsError::AlreadyRefreshing,
            Some(500) => AnalyticsError::Failed,
            Some(503) => AnalyticsError::Disabled,
            _ => AnalyticsError::Request(err),
        }
    }
}

/// What the modal should show for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remediation {
    pub message: String,
    pub offer_retry: bool,
}

impl AnalyticsError {
    pub fn remediation(&self) -> Remediation {
        let (message, offer_retry) = match self {
            AnalyticsError::NotComputed => (
                "Analytics have not been computed for this repository yet. Refresh to compute them.".to_string(),
                true,
            ),
            AnalyticsError::AlreadyRefreshing => (
                "A refresh is already running. Check back in a moment.".to_string(),
                false,
            ),
            AnalyticsError::Failed => (
                "Computing analytics failed on the server.".to_string(),
                true,
            ),
            AnalyticsError::Disabled => (
                "Job analytics are disabled on this server.".to_string(),
                false,
            ),
            AnalyticsError::Request(FetchError::Timeout { .. }) => (
                "The analytics request timed out.".to_string(),
                true,
            ),
            AnalyticsError::Request(FetchError::Decode(_)) => (
                "The server returned malformed analytics data.".to_string(),
                false,
            ),
            AnalyticsError::Request(FetchError::Cancelled) => ("Request cancelled.".to_string(), false),
            AnalyticsError::Request(err) => (format!("Failed to load analytics ({})", err), true),
        };
        Remediation { message, offer_retry }
    }
}

fn encode_key(key: &str) -> String {
    url::form_urlencoded::byte_serialize(key.as_bytes()).collect()
}

pub fn analytics_path(repo_key: &str) -> String {
    format!("/api/repos/{}/job-analytics", encode_key(repo_key))
}

pub fn refresh_path(repo_key: &str) -> String {
    format!("{}/refresh", analytics_path(repo_key))
}

fn log_failure(repo_key: &str, op: &str, err: &AnalyticsError) {
    log(
        Level::Warn,
        Domain::Feed,
        "analytics_failed",
        obj(&[
            ("feed", v_str("job_analytics")),
            ("entity", v_str(repo_key)),
            ("op", v_str(op)),
            ("error", v_str(&err.to_string())),
        ]),
    );
}

pub async fn fetch_job_analytics(
    transport: &dyn FeedTransport,
    repo_key: &str,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<JobAnalytics, AnalyticsError> {
    let result = timed(transport.get(&analytics_path(repo_key)), budget, cancel)
        .await
        .and_then(|body| decode::<JobAnalytics>(&body))
        .map_err(AnalyticsError::from);
    if let Err(err) = &result {
        log_failure(repo_key, "fetch", err);
    }
    result
}

/// Ask the backend to recompute analytics.
pub async fn request_refresh(
    transport: &dyn FeedTransport,
    repo_key: &str,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<(), AnalyticsError> {
    let result = timed(transport.post(&refresh_path(repo_key)), budget, cancel)
        .await
        .map(|_| ())
        .map_err(AnalyticsError::from);
    if let Err(err) = &result {
        log_failure(repo_key, "refresh", err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticTransport;

    #[test]
    fn test_status_mapping() {
        let map = |s: u16| AnalyticsError::from(FetchError::Http { status: s });
        assert_eq!(map(404), AnalyticsError::NotComputed);
        assert_eq!(map(409), AnalyticsError::AlreadyRefreshing);
        assert_eq!(map(500), AnalyticsError::Failed);
        assert_eq!(map(503), AnalyticsError::Disabled);
        assert_eq!(map(502), AnalyticsError::Request(FetchError::Http { status: 502 }));
    }

    #[test]
    fn test_remediation_is_distinct_per_status() {
        let all = [
            AnalyticsError::NotComputed,
            AnalyticsError::AlreadyRefreshing,
            AnalyticsError::Failed,
            AnalyticsError::Disabled,
        ];
        let messages: std::collections::HashSet<String> =
            all.iter().map(|e| e.remediation().message).collect();
        assert_eq!(messages.len(), all.len());
        assert!(AnalyticsError::NotComputed.remediation().offer_retry);
        assert!(!AnalyticsError::AlreadyRefreshing.remediation().offer_retry);
        assert!(AnalyticsError::Failed.remediation().offer_retry);
        assert!(!AnalyticsError::Disabled.remediation().offer_retry);
    }

    #[test]
    fn test_paths_encode_namespaced_keys() {
        assert_eq!(analytics_path("42"), "/api/repos/42/job-analytics");
        assert_eq!(refresh_path("group/app"), "/api/repos/group%2Fapp/job-analytics/refresh");
    }

    #[tokio::test]
    async fn test_fetch_and_refresh() {
        let t = StaticTransport::new();
        t.respond(
            "/api/repos/7/job-analytics",
            r#"{"data": [{"created_at": "2024-05-01T10:00:00Z", "avg_duration": 120, "is_default_branch": true}], "window_days": 30}"#,
        );
        t.fail("/api/repos/7/job-analytics/refresh", FetchError::Http { status: 409 });
        let cancel = CancellationToken::new();
        let analytics = fetch_job_analytics(&t, "7", Duration::from_secs(8), &cancel).await.unwrap();
        assert_eq!(analytics.data.len(), 1);
        assert_eq!(analytics.window_days, Some(30));
        let err = request_refresh(&t, "7", Duration::from_secs(8), &cancel).await.unwrap_err();
        assert_eq!(err, AnalyticsError::AlreadyRefreshing);
        let missing = fetch_job_analytics(&t, "8", Duration::from_secs(8), &cancel).await.unwrap_err();
        assert_eq!(missing, AnalyticsError::NotComputed);
    }
}
