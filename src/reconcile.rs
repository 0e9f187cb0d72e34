//! Turns one refresh cycle plus the previous cross-cycle state into a
//! dashboard view and the next state.
//!
//! `CoreState` is owned by the caller and threaded through `reconcile`; every
//! map in it is rebuilt from the current cycle and swapped in whole.

use serde::Serialize;

use crate::attention::{bounded_cap, collect_attention, AttentionState, DEFAULT_ATTENTION_CAP};
use crate::config::Config;
use crate::differ::{diff_cycle, RenderSignal, RenderStateMap};
use crate::fetch::{CycleOutcome, CycleStatus, FeedView};
use crate::health::{repo_health, HealthRank};
use crate::history::{HistoryBuffer, Sparkline, DEFAULT_WINDOW};
use crate::logging::{log, obj, Domain, Level};
use crate::model::{Pipeline, Repository, Service, Summary};
use crate::priority::{sort_pipelines, sort_repositories};
use crate::slo::{remaining, sanitize_target, target_or, DEFAULT_SLO_TARGET};
use crate::status::{service_health_color, status_color, NormalizedStatus, ServiceHealth};

/// Memory carried from one cycle to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreState {
    pub repo_render: RenderStateMap<HealthRank>,
    pub pipeline_render: RenderStateMap<NormalizedStatus>,
    /// Recent success rate per repository.
    pub repo_history: HistoryBuffer,
    /// Latency per service, in milliseconds.
    pub service_history: HistoryBuffer,
}

impl CoreState {
    pub fn new(window: usize) -> Self {
        Self {
            repo_render: RenderStateMap::new(),
            pipeline_render: RenderStateMap::new(),
            repo_history: HistoryBuffer::new(window),
            service_history: HistoryBuffer::new(window),
        }
    }
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendVisibility {
    pub repos: bool,
    pub services: bool,
}

impl Default for TrendVisibility {
    fn default() -> Self {
        Self {
            repos: true,
            services: true,
        }
    }
}

// =============================================================================
// View types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPanel<T> {
    pub state: &'static str,
    pub content: Option<T>,
    pub error: Option<String>,
    pub consecutive_failures: u32,
    /// RFC 3339 time of the data being shown.
    pub fetched_at: Option<String>,
}

impl<T> FeedPanel<T> {
    fn from_view<S>(view: &FeedView<S>, content: Option<T>) -> Self {
        let (consecutive_failures, fetched_at) = match view {
            FeedView::Fresh { fetched_at, .. } => (0, Some(fetched_at.to_rfc3339())),
            FeedView::Stale {
                fetched_at,
                consecutive_failures,
                ..
            } => (*consecutive_failures, Some(fetched_at.to_rfc3339())),
            FeedView::Unavailable { .. } => (0, None),
        };
        Self {
            state: view.state(),
            content,
            error: view.error().map(ToString::to_string),
            consecutive_failures,
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub total_repositories: Option<u64>,
    pub successful_pipelines: Option<u64>,
    pub failed_pipelines: Option<u64>,
    pub running_pipelines: Option<u64>,
    pub is_mock: bool,
    pub slo_target: f64,
    pub slo_observed: Option<f64>,
    pub error_budget_remaining_pct: Option<f64>,
}

impl SummaryView {
    /// Prefers the server's budget figure; computes it otherwise. The server
    /// target wins when usable, else `fallback_target`.
    pub fn from_summary(summary: &Summary, fallback_target: f64) -> Self {
        let target = target_or(summary.pipeline_slo_target_default_branch_success_rate, fallback_target);
        let observed = summary.pipeline_slo_observed_default_branch_success_rate;
        let budget = summary
            .pipeline_error_budget_remaining_pct
            .map(|pct| pct.clamp(0.0, 100.0))
            .or_else(|| remaining(observed, target));
        Self {
            total_repositories: summary.total_repositories,
            successful_pipelines: summary.successful_pipelines,
            failed_pipelines: summary.failed_pipelines,
            running_pipelines: summary.running_pipelines,
            is_mock: summary.is_mock.unwrap_or(false),
            slo_target: target,
            slo_observed: observed,
            error_budget_remaining_pct: budget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoCard {
    pub key: String,
    pub name: String,
    pub status: NormalizedStatus,
    pub status_color: &'static str,
    pub health: HealthRank,
    pub success_rate: Option<f64>,
    pub consecutive_failures: u64,
    pub signal: RenderSignal,
    pub sparkline: Option<Sparkline>,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRow {
    pub key: String,
    pub name: String,
    pub status: NormalizedStatus,
    pub status_color: &'static str,
    pub git_ref: Option<String>,
    pub created_at: Option<String>,
    pub on_default_branch: bool,
    pub duration: Option<f64>,
    pub signal: RenderSignal,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRow {
    pub key: String,
    pub name: String,
    pub health: ServiceHealth,
    pub color: &'static str,
    pub latency_ms: Option<f64>,
    pub sparkline: Option<Sparkline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub cycle_id: u64,
    pub status: CycleStatus,
    pub message: String,
    pub backend_reachable: bool,
    pub summary: FeedPanel<SummaryView>,
    pub repos: FeedPanel<Vec<RepoCard>>,
    pub pipelines: FeedPanel<Vec<PipelineRow>>,
    pub services: FeedPanel<Vec<ServiceRow>>,
    pub attention: AttentionState,
}

// =============================================================================
// Reconciler
// =============================================================================

#[derive(Debug, Clone)]
pub struct Reconciler {
    default_slo_target: f64,
    attention_cap: usize,
    trends: TrendVisibility,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            default_slo_target: DEFAULT_SLO_TARGET,
            attention_cap: DEFAULT_ATTENTION_CAP,
            trends: TrendVisibility::default(),
        }
    }
}

impl Reconciler {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_slo_target: sanitize_target(Some(config.slo_target)),
            attention_cap: bounded_cap(config.attention_cap),
            trends: TrendVisibility::default(),
        }
    }

    pub fn set_trends(&mut self, trends: TrendVisibility) {
        self.trends = trends;
    }

    pub fn trends(&self) -> TrendVisibility {
        self.trends
    }

    /// Server-declared target when the summary carries a usable one.
    fn slo_target(&self, outcome: &CycleOutcome) -> f64 {
        target_or(
            outcome
                .summary
                .data()
                .and_then(|s| s.pipeline_slo_target_default_branch_success_rate),
            self.default_slo_target,
        )
    }

    pub fn reconcile(&self, outcome: &CycleOutcome, prev: CoreState) -> (DashboardView, CoreState) {
        let slo_target = self.slo_target(outcome);
        let CoreState {
            repo_render,
            pipeline_render,
            mut repo_history,
            mut service_history,
        } = prev;

        // History only advances on fresh data; a stale redisplay is not a new sample.
        if let FeedView::Fresh { data, .. } = &outcome.repos {
            for repo in data {
                repo_history.append(&repo.key(), repo.recent_success_rate);
            }
            let live: Vec<String> = data.iter().map(Repository::key).collect();
            repo_history.retain_keys(live.iter().map(String::as_str));
        }
        if let FeedView::Fresh { data, .. } = &outcome.services {
            for service in data {
                let key = service.key();
                if !service_history.seed(&key, &service.server_samples()) {
                    service_history.append(&key, service.latency_ms);
                }
            }
            let live: Vec<String> = data.iter().map(Service::key).collect();
            service_history.retain_keys(live.iter().map(String::as_str));
        }

        let (repo_cards, repo_render) = match outcome.repos.data() {
            Some(repos) => {
                let (cards, next) = self.repo_cards(repos, &repo_render, &repo_history, slo_target);
                (Some(cards), next)
            }
            None => (None, repo_render),
        };
        let (pipeline_rows, pipeline_render) = match outcome.pipelines.data() {
            Some(pipelines) => {
                let (rows, next) = pipeline_rows(pipelines, &pipeline_render);
                (Some(rows), next)
            }
            None => (None, pipeline_render),
        };
        let service_rows = outcome
            .services
            .data()
            .map(|services| self.service_rows(services, &service_history));

        let attention = collect_attention(
            outcome.repos.data().map(Vec::as_slice),
            outcome.services.data().map(Vec::as_slice),
            outcome.pipelines.data().map(Vec::as_slice),
            slo_target,
            self.attention_cap,
        );
        log_attention(outcome.cycle_id, &attention);

        let view = DashboardView {
            cycle_id: outcome.cycle_id,
            status: outcome.status,
            message: outcome.message(),
            backend_reachable: outcome.health.is_ok(),
            summary: FeedPanel::from_view(
                &outcome.summary,
                outcome.summary.data().map(|s| SummaryView::from_summary(s, slo_target)),
            ),
            repos: FeedPanel::from_view(&outcome.repos, repo_cards),
            pipelines: FeedPanel::from_view(&outcome.pipelines, pipeline_rows),
            services: FeedPanel::from_view(&outcome.services, service_rows),
            attention,
        };
        let next = CoreState {
            repo_render,
            pipeline_render,
            repo_history,
            service_history,
        };
        (view, next)
    }

    fn repo_cards(
        &self,
        repos: &[Repository],
        prev: &RenderStateMap<HealthRank>,
        history: &HistoryBuffer,
        slo_target: f64,
    ) -> (Vec<RepoCard>, RenderStateMap<HealthRank>) {
        let mut sorted = repos.to_vec();
        sort_repositories(&mut sorted);
        let ranks: Vec<HealthRank> = sorted.iter().map(|r| repo_health(r, slo_target)).collect();
        let (signals, next) = diff_cycle(prev, sorted.iter().map(Repository::key).zip(ranks.iter().copied()));
        let cards = sorted
            .iter()
            .zip(ranks)
            .zip(signals)
            .map(|((repo, health), signal)| {
                let key = repo.key();
                let status = repo.status();
                RepoCard {
                    sparkline: if self.trends.repos {
                        Sparkline::from_samples(history.get(&key))
                    } else {
                        None
                    },
                    key,
                    name: repo.display_name(),
                    status,
                    status_color: status_color(status),
                    health,
                    success_rate: repo.recent_success_rate,
                    consecutive_failures: repo.consecutive_failures(),
                    signal,
                    web_url: repo.web_url.clone(),
                }
            })
            .collect();
        (cards, next)
    }

    fn service_rows(&self, services: &[Service], history: &HistoryBuffer) -> Vec<ServiceRow> {
        services
            .iter()
            .map(|service| {
                let key = service.key();
                let health = service.health();
                ServiceRow {
                    sparkline: if self.trends.services {
                        Sparkline::from_samples(history.get(&key))
                    } else {
                        None
                    },
                    key,
                    name: service.display_name(),
                    health,
                    color: service_health_color(health),
                    latency_ms: service.latency_ms,
                }
            })
            .collect()
    }
}

fn pipeline_rows(
    pipelines: &[Pipeline],
    prev: &RenderStateMap<NormalizedStatus>,
) -> (Vec<PipelineRow>, RenderStateMap<NormalizedStatus>) {
    let mut sorted = pipelines.to_vec();
    sort_pipelines(&mut sorted);
    let (signals, next) = diff_cycle(prev, sorted.iter().map(|p| (p.key(), p.status())));
    let rows = sorted
        .iter()
        .zip(signals)
        .map(|(p, signal)| {
            let status = p.status();
            PipelineRow {
                key: p.key(),
                name: p.display_name(),
                status,
                status_color: status_color(status),
                git_ref: p.git_ref.clone(),
                created_at: p.created_at.clone(),
                on_default_branch: p.on_default_branch(),
                duration: p.duration,
                signal,
                web_url: p.web_url.clone(),
            }
        })
        .collect();
    (rows, next)
}

fn log_attention(cycle_id: u64, attention: &AttentionState) {
    let (state, count) = match attention {
        AttentionState::NoData => ("no_data", 0),
        AttentionState::AllClear => ("all_clear", 0),
        AttentionState::Items(items) => ("items", items.len()),
    };
    log(
        Level::Debug,
        Domain::Attention,
        "attention_collected",
        obj(&[
            ("cycle_id", serde_json::json!(cycle_id)),
            ("state", serde_json::json!(state)),
            ("count", serde_json::json!(count)),
        ]),
    );
}
