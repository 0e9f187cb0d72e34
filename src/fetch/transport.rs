use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::FetchError;

#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// GET `path`; a 2xx yields the body text, anything else a `FetchError`.
    async fn get(&self, path: &str) -> Result<String, FetchError>;
    async fn post(&self, path: &str) -> Result<String, FetchError>;
}

/// Race `fut` against the time budget and the cancellation token.
///
/// Whichever finishes first wins; the losers are dropped along with their
/// timers. Cancelling after completion has no effect on the returned value.
pub async fn timed<T, F>(fut: F, budget: Duration, cancel: &CancellationToken) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = tokio::time::timeout(budget, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(FetchError::timeout(budget)),
        },
    }
}

pub struct HttpTransport {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        // A base without a trailing slash would lose its last segment on join.
        let base = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{}/", base))?
        };
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base,
            token,
        })
    }

    pub fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| FetchError::Transport(format!("bad url {}: {}", path, e)))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, FetchError> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.map_err(map_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(map_reqwest)
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_decode() || err.is_body() {
        FetchError::Decode(err.to_string())
    } else if let Some(status) = err.status().filter(|s| *s != StatusCode::OK) {
        FetchError::Http {
            status: status.as_u16(),
        }
    } else {
        // Strip the URL so query strings never reach the logs.
        FetchError::Transport(err.without_url().to_string())
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(&self, path: &str) -> Result<String, FetchError> {
        let url = self.url_for(path)?;
        self.send(self.client.get(url)).await
    }

    async fn post(&self, path: &str) -> Result<String, FetchError> {
        let url = self.url_for(path)?;
        self.send(self.client.post(url)).await
    }
}

// =============================================================================
// In-memory transport
// =============================================================================

#[derive(Debug, Clone)]
struct Route {
    response: Result<String, FetchError>,
    delay: Option<Duration>,
}

/// Transport answering from a fixed route table. Unknown paths are 404s.
/// Used to run the reconciliation core without a backend.
#[derive(Debug, Default)]
pub struct StaticTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, body: &str) -> &Self {
        self.set(path, Ok(body.to_string()), None)
    }

    pub fn fail(&self, path: &str, err: FetchError) -> &Self {
        self.set(path, Err(err), None)
    }

    pub fn respond_after(&self, path: &str, body: &str, delay: Duration) -> &Self {
        self.set(path, Ok(body.to_string()), Some(delay))
    }

    fn set(&self, path: &str, response: Result<String, FetchError>, delay: Option<Duration>) -> &Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(path.to_string(), Route { response, delay });
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn answer(&self, method: &str, path: &str) -> Result<String, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{} {}", method, path));
        }
        let route = self
            .routes
            .lock()
            .ok()
            .and_then(|r| r.get(path).cloned());
        let Some(route) = route else {
            return Err(FetchError::Http { status: 404 });
        };
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }
        route.response
    }
}

#[async_trait]
impl FeedTransport for StaticTransport {
    async fn get(&self, path: &str) -> Result<String, FetchError> {
        self.answer("GET", path).await
    }

    async fn post(&self, path: &str) -> Result<String, FetchError> {
        self.answer("POST", path).await
    }
}
