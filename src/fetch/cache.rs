//! Per-feed last-known-good cache and refresh cycles.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::{decode, timed, FeedKind, FeedTransport, FetchError};
use crate::logging::{log_cycle, log_feed_failure, log_feed_success, ProfileScope};
use crate::model::{Pipeline, PipelinesDoc, Repository, ReposDoc, Service, ServicesDoc, Summary};

fn fingerprint(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Last successful payload for a feed.
#[derive(Debug, Clone)]
struct LastGood<T> {
    data: T,
    fetched_at: DateTime<Utc>,
    fingerprint: String,
}

/// Cached state for a single feed with failure tracking.
#[derive(Debug, Clone)]
pub struct FeedSlot<T> {
    kind: FeedKind,
    last_good: Option<LastGood<T>>,
    consecutive_failures: u32,
    last_error: Option<FetchError>,
}

impl<T: Clone> FeedSlot<T> {
    fn new(kind: FeedKind) -> Self {
        Self {
            kind,
            last_good: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn has_cache(&self) -> bool {
        self.last_good.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn record_success(&mut self, data: T, fingerprint: String, elapsed_ms: f64) -> FeedView<T> {
        let unchanged = self
            .last_good
            .as_ref()
            .is_some_and(|c| c.fingerprint == fingerprint);
        log_feed_success(self.kind.as_str(), elapsed_ms, &fingerprint, unchanged);
        let fetched_at = Utc::now();
        self.last_good = Some(LastGood {
            data: data.clone(),
            fetched_at,
            fingerprint,
        });
        self.consecutive_failures = 0;
        self.last_error = None;
        FeedView::Fresh { data, fetched_at }
    }

    fn record_failure(&mut self, error: FetchError) -> FeedView<T> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.clone());
        log_feed_failure(
            self.kind.as_str(),
            error.kind(),
            error.status(),
            &error.to_string(),
            self.has_cache(),
            self.consecutive_failures,
        );
        match &self.last_good {
            Some(cached) => FeedView::Stale {
                data: cached.data.clone(),
                fetched_at: cached.fetched_at,
                error,
                consecutive_failures: self.consecutive_failures,
            },
            None => FeedView::Unavailable { error },
        }
    }

    fn apply(&mut self, result: Result<(T, String, f64), FetchError>) -> FeedView<T> {
        match result {
            Ok((data, fp, elapsed_ms)) => self.record_success(data, fp, elapsed_ms),
            Err(err) => self.record_failure(err),
        }
    }
}

/// What a feed contributes to the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedView<T> {
    Fresh {
        data: T,
        fetched_at: DateTime<Utc>,
    },
    Stale {
        data: T,
        fetched_at: DateTime<Utc>,
        error: FetchError,
        consecutive_failures: u32,
    },
    Unavailable {
        error: FetchError,
    },
}

impl<T> FeedView<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            FeedView::Fresh { data, .. } | FeedView::Stale { data, .. } => Some(data),
            FeedView::Unavailable { .. } => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, FeedView::Fresh { .. })
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FeedView::Fresh { .. } => None,
            FeedView::Stale { error, .. } | FeedView::Unavailable { error } => Some(error),
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            FeedView::Fresh { .. } => "fresh",
            FeedView::Stale { .. } => "stale",
            FeedView::Unavailable { .. } => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Fresh,
    Partial,
    Stale,
    Unavailable,
}

impl CycleStatus {
    /// `feeds` holds `(succeeded, has_cache)` per data feed.
    pub fn classify(feeds: &[(bool, bool)]) -> Self {
        let succeeded = feeds.iter().filter(|(ok, _)| *ok).count();
        if succeeded == feeds.len() {
            CycleStatus::Fresh
        } else if succeeded > 0 {
            CycleStatus::Partial
        } else if feeds.iter().any(|(_, cached)| *cached) {
            CycleStatus::Stale
        } else {
            CycleStatus::Unavailable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Fresh => "fresh",
            CycleStatus::Partial => "partial",
            CycleStatus::Stale => "stale",
            CycleStatus::Unavailable => "unavailable",
        }
    }
}

/// Everything one refresh cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle_id: u64,
    pub status: CycleStatus,
    pub health: Result<(), FetchError>,
    pub summary: FeedView<Summary>,
    pub repos: FeedView<Vec<Repository>>,
    pub pipelines: FeedView<Vec<Pipeline>>,
    pub services: FeedView<Vec<Service>>,
    pub completed_at: DateTime<Utc>,
}

impl CycleOutcome {
    pub fn failed_feeds(&self) -> Vec<FeedKind> {
        let mut failed = Vec::new();
        if !self.summary.is_fresh() {
            failed.push(FeedKind::Summary);
        }
        if !self.repos.is_fresh() {
            failed.push(FeedKind::Repos);
        }
        if !self.pipelines.is_fresh() {
            failed.push(FeedKind::Pipelines);
        }
        if !self.services.is_fresh() {
            failed.push(FeedKind::Services);
        }
        failed
    }

    pub fn message(&self) -> String {
        match self.status {
            CycleStatus::Fresh => "All feeds up to date".to_string(),
            CycleStatus::Partial => {
                let names: Vec<&str> = self.failed_feeds().iter().map(FeedKind::as_str).collect();
                format!(
                    "Partially stale: {} failed to refresh; showing last known data where available",
                    names.join(", ")
                )
            }
            CycleStatus::Stale => "All feeds failed to refresh; showing last known data".to_string(),
            CycleStatus::Unavailable => "Dashboard data unavailable: no feed could be loaded".to_string(),
        }
    }
}

/// Owns last-known-good state for every feed.
pub struct FeedCache {
    timeout: Duration,
    cycles: u64,
    summary: FeedSlot<Summary>,
    repos: FeedSlot<Vec<Repository>>,
    pipelines: FeedSlot<Vec<Pipeline>>,
    services: FeedSlot<Vec<Service>>,
}

async fn fetch_body(
    transport: &dyn FeedTransport,
    kind: FeedKind,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<(String, f64), FetchError> {
    let started = Instant::now();
    let body = timed(transport.get(kind.path()), budget, cancel).await?;
    Ok((body, started.elapsed().as_secs_f64() * 1000.0))
}

fn decode_feed<D, T>(
    raw: Result<(String, f64), FetchError>,
    extract: impl FnOnce(D) -> T,
) -> Result<(T, String, f64), FetchError>
where
    D: serde::de::DeserializeOwned,
{
    let (body, elapsed_ms) = raw?;
    let doc: D = decode(&body)?;
    Ok((extract(doc), fingerprint(&body), elapsed_ms))
}

impl FeedCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cycles: 0,
            summary: FeedSlot::new(FeedKind::Summary),
            repos: FeedSlot::new(FeedKind::Repos),
            pipelines: FeedSlot::new(FeedKind::Pipelines),
            services: FeedSlot::new(FeedKind::Services),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_any_cache(&self) -> bool {
        self.summary.has_cache()
            || self.repos.has_cache()
            || self.pipelines.has_cache()
            || self.services.has_cache()
    }

    /// Run one cycle: every feed concurrently, wait for all, then classify.
    pub async fn refresh(&mut self, transport: &dyn FeedTransport, cancel: &CancellationToken) -> CycleOutcome {
        self.cycles += 1;
        let cycle_id = self.cycles;
        let _scope = ProfileScope::with_context("refresh_cycle", &[("cycle_id", serde_json::json!(cycle_id))]);
        let budget = self.timeout;

        let (health, summary, repos, pipelines, services) = tokio::join!(
            fetch_body(transport, FeedKind::Health, budget, cancel),
            fetch_body(transport, FeedKind::Summary, budget, cancel),
            fetch_body(transport, FeedKind::Repos, budget, cancel),
            fetch_body(transport, FeedKind::Pipelines, budget, cancel),
            fetch_body(transport, FeedKind::Services, budget, cancel),
        );

        let health = health.map(|_| ());
        if let Err(err) = &health {
            log_feed_failure(FeedKind::Health.as_str(), err.kind(), err.status(), &err.to_string(), false, 0);
        }

        let summary = self.summary.apply(decode_feed(summary, |s: Summary| s));
        let repos = self.repos.apply(decode_feed(repos, |d: ReposDoc| d.repositories));
        let pipelines = self.pipelines.apply(decode_feed(pipelines, |d: PipelinesDoc| d.pipelines));
        let services = self.services.apply(decode_feed(services, |d: ServicesDoc| d.services));

        let status = CycleStatus::classify(&[
            (summary.is_fresh(), self.summary.has_cache()),
            (repos.is_fresh(), self.repos.has_cache()),
            (pipelines.is_fresh(), self.pipelines.has_cache()),
            (services.is_fresh(), self.services.has_cache()),
        ]);

        let outcome = CycleOutcome {
            cycle_id,
            status,
            health,
            summary,
            repos,
            pipelines,
            services,
            completed_at: Utc::now(),
        };
        let failed: Vec<&str> = outcome.failed_feeds().iter().map(FeedKind::as_str).collect();
        log_cycle(cycle_id, status.as_str(), &outcome.message(), &failed);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticTransport;

    fn healthy_backend() -> StaticTransport {
        let t = StaticTransport::new();
        t.respond("/api/health", "ok");
        t.respond("/api/summary", r#"{"total_repositories": 2}"#);
        t.respond("/api/repos", r#"{"repositories": [{"id": 1, "name": "api"}]}"#);
        t.respond("/api/pipelines", r#"{"pipelines": []}"#);
        t.respond("/api/services", r#"{"services": [{"name": "registry", "status": "ok"}]}"#);
        t
    }

    #[test]
    fn test_classify() {
        assert_eq!(CycleStatus::classify(&[(true, true), (true, true)]), CycleStatus::Fresh);
        assert_eq!(CycleStatus::classify(&[(true, true), (false, false)]), CycleStatus::Partial);
        assert_eq!(CycleStatus::classify(&[(false, true), (false, false)]), CycleStatus::Stale);
        assert_eq!(CycleStatus::classify(&[(false, false), (false, false)]), CycleStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_fresh_cycle() {
        let t = healthy_backend();
        let mut cache = FeedCache::new(Duration::from_secs(8));
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Fresh);
        assert!(out.health.is_ok());
        assert_eq!(out.repos.data().map(Vec::len), Some(1));
        assert_eq!(out.cycle_id, 1);
    }

    #[tokio::test]
    async fn test_all_fail_without_cache_is_unavailable() {
        let t = StaticTransport::new();
        for kind in FeedKind::DATA {
            t.fail(kind.path(), FetchError::Transport("connection refused".into()));
        }
        let mut cache = FeedCache::new(Duration::from_secs(8));
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Unavailable);
        assert!(matches!(out.repos, FeedView::Unavailable { .. }));
        assert!(!cache.has_any_cache());
    }

    #[tokio::test]
    async fn test_failure_after_success_serves_stale() {
        let t = healthy_backend();
        let mut cache = FeedCache::new(Duration::from_secs(8));
        cache.refresh(&t, &CancellationToken::new()).await;

        t.fail("/api/repos", FetchError::Http { status: 502 });
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Partial);
        match &out.repos {
            FeedView::Stale { data, error, consecutive_failures, .. } => {
                assert_eq!(data.len(), 1);
                assert_eq!(error.status(), Some(502));
                assert_eq!(*consecutive_failures, 1);
            }
            other => panic!("expected stale, got {:?}", other),
        }
        assert!(out.services.is_fresh());

        for kind in FeedKind::DATA {
            t.fail(kind.path(), FetchError::Transport("down".into()));
        }
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Stale);
        assert!(out.message().contains("last known data"));
    }

    #[tokio::test]
    async fn test_decode_failure_is_isolated() {
        let t = healthy_backend();
        t.respond("/api/pipelines", "<html>gateway</html>");
        let mut cache = FeedCache::new(Duration::from_secs(8));
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Partial);
        assert_eq!(out.pipelines.error().map(FetchError::kind), Some("decode"));
        assert!(out.repos.is_fresh());
        assert_eq!(out.failed_feeds(), vec![FeedKind::Pipelines]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feed_times_out_without_blocking_others() {
        let t = healthy_backend();
        t.respond_after("/api/services", r#"{"services": []}"#, Duration::from_secs(30));
        let mut cache = FeedCache::new(Duration::from_secs(8));
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Partial);
        assert_eq!(out.services.error(), Some(&FetchError::Timeout { budget_ms: 8000 }));
        assert!(out.repos.is_fresh());
    }

    #[tokio::test]
    async fn test_health_failure_does_not_affect_status() {
        let t = healthy_backend();
        t.fail("/api/health", FetchError::Http { status: 503 });
        let mut cache = FeedCache::new(Duration::from_secs(8));
        let out = cache.refresh(&t, &CancellationToken::new()).await;
        assert_eq!(out.status, CycleStatus::Fresh);
        assert_eq!(out.health, Err(FetchError::Http { status: 503 }));
    }
}
