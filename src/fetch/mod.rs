use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod analytics;
pub mod cache;
pub mod transport;

pub use cache::{CycleOutcome, CycleStatus, FeedCache, FeedView};
pub use transport::{timed, FeedTransport, HttpTransport, StaticTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Health,
    Summary,
    Repos,
    Pipelines,
    Services,
}

impl FeedKind {
    /// Feeds that carry data and count toward cycle status.
    pub const DATA: [FeedKind; 4] = [
        FeedKind::Summary,
        FeedKind::Repos,
        FeedKind::Pipelines,
        FeedKind::Services,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Health => "health",
            FeedKind::Summary => "summary",
            FeedKind::Repos => "repos",
            FeedKind::Pipelines => "pipelines",
            FeedKind::Services => "services",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            FeedKind::Health => "/api/health",
            FeedKind::Summary => "/api/summary",
            FeedKind::Repos => "/api/repos",
            FeedKind::Pipelines => "/api/pipelines",
            FeedKind::Services => "/api/services",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {budget_ms} ms")]
    Timeout { budget_ms: u64 },
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn timeout(budget: Duration) -> Self {
        FetchError::Timeout {
            budget_ms: budget.as_millis() as u64,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Http { .. } => "http",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
            FetchError::Cancelled => "cancelled",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status } => Some(*status),
            _ => None,
        }
    }
}

pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReposDoc;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errs = [
            FetchError::timeout(Duration::from_secs(8)),
            FetchError::Http { status: 502 },
            FetchError::Transport("connection refused".into()),
            FetchError::Decode("eof".into()),
            FetchError::Cancelled,
        ];
        let kinds: std::collections::HashSet<_> = errs.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errs.len());
        assert_eq!(errs[0].to_string(), "request timed out after 8000 ms");
        assert_eq!(errs[1].status(), Some(502));
    }

    #[test]
    fn test_decode_error() {
        let err = decode::<ReposDoc>("{not json").unwrap_err();
        assert_eq!(err.kind(), "decode");
        let ok = decode::<ReposDoc>(r#"{"repositories": [{"id": 1}]}"#).unwrap();
        assert_eq!(ok.repositories.len(), 1);
    }
}
