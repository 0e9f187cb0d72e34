use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use pipewatch::attention::AttentionState;
use pipewatch::config::Config;
use pipewatch::fetch::{FeedCache, HttpTransport};
use pipewatch::logging::{log, obj, v_num, v_str, Domain, Level};
use pipewatch::prefs::{open_store, TrendPanel, TrendPanels};
use pipewatch::reconcile::{CoreState, DashboardView, Reconciler, TrendVisibility};
use pipewatch::scheduler::{RefreshScheduler, RefreshTask};

struct Dashboard {
    transport: HttpTransport,
    cache: FeedCache,
    reconciler: Reconciler,
    panels: TrendPanels,
    state: Option<CoreState>,
    window: usize,
}

impl Dashboard {
    fn report(&self, view: &DashboardView) {
        let attention = match &view.attention {
            AttentionState::NoData => json!("no_data"),
            AttentionState::AllClear => json!("all_clear"),
            AttentionState::Items(items) => json!(items
                .iter()
                .map(|i| format!("{:?} {}: {}", i.severity, i.name, i.reason))
                .collect::<Vec<_>>()),
        };
        let count = |n: Option<usize>| n.map_or(json!(null), |n| json!(n));
        log(
            Level::Info,
            Domain::Cycle,
            "dashboard_view",
            obj(&[
                ("cycle_id", json!(view.cycle_id)),
                ("status", v_str(view.status.as_str())),
                ("msg", v_str(&view.message)),
                ("backend_reachable", json!(view.backend_reachable)),
                ("repos", count(view.repos.content.as_ref().map(Vec::len))),
                ("pipelines", count(view.pipelines.content.as_ref().map(Vec::len))),
                ("services", count(view.services.content.as_ref().map(Vec::len))),
                (
                    "error_budget_remaining_pct",
                    view.summary
                        .content
                        .as_ref()
                        .and_then(|s| s.error_budget_remaining_pct)
                        .map_or(json!(null), v_num),
                ),
                ("attention", attention),
            ]),
        );
    }
}

#[async_trait]
impl RefreshTask for Dashboard {
    async fn run_cycle(&mut self, cancel: &CancellationToken) {
        let outcome = self.cache.refresh(&self.transport, cancel).await;
        if cancel.is_cancelled() {
            return;
        }
        self.reconciler.set_trends(TrendVisibility {
            repos: self.panels.is_visible(TrendPanel::Repos),
            services: self.panels.is_visible(TrendPanel::Services),
        });
        let prev = self.state.take().unwrap_or_else(|| CoreState::new(self.window));
        let (view, next) = self.reconciler.reconcile(&outcome, prev);
        self.state = Some(next);
        self.report(&view);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let transport = HttpTransport::new(&cfg.api_base, cfg.api_token.clone())?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("refresh_secs", json!(cfg.refresh_secs)),
            ("feed_timeout_ms", json!(cfg.feed_timeout_ms)),
            ("prefs_path", cfg.prefs_path.as_deref().map_or(json!(null), v_str)),
        ]),
    );

    let dashboard = Dashboard {
        transport,
        cache: FeedCache::new(cfg.feed_timeout()),
        reconciler: Reconciler::from_config(&cfg),
        panels: TrendPanels::new(open_store(cfg.prefs_path.as_deref())),
        state: None,
        window: cfg.history_window,
    };

    let mut scheduler = RefreshScheduler::new(cfg.refresh_interval());
    let shutdown = async {
        let reason = match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt".to_string(),
            Err(err) => format!("signal listener failed: {}", err),
        };
        log(Level::Info, Domain::System, "shutdown", obj(&[("reason", v_str(&reason))]));
    };
    scheduler.run_until(dashboard, shutdown).await;
    Ok(())
}
