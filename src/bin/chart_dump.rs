//! Render job analytics and print the chart scene as JSON.
//!
//! Usage:
//!   chart_dump <analytics.json> [width height]
//!   chart_dump --repo <repo-key> [width height]

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use pipewatch::chart::{render_chart, ChartLayout};
use pipewatch::config::Config;
use pipewatch::fetch::analytics::fetch_job_analytics;
use pipewatch::fetch::{decode, HttpTransport};
use pipewatch::model::JobAnalytics;

async fn load(source: &str, args: &mut impl Iterator<Item = String>) -> Result<JobAnalytics> {
    if source == "--repo" {
        let key = args.next().ok_or_else(|| anyhow!("--repo needs a repository key"))?;
        let cfg = Config::from_env();
        let transport = HttpTransport::new(&cfg.api_base, cfg.api_token.clone())?;
        return fetch_job_analytics(&transport, &key, cfg.feed_timeout(), &CancellationToken::new())
            .await
            .map_err(|err| anyhow!("{}", err.remediation().message));
    }
    let body = std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source))?;
    decode(&body).with_context(|| format!("failed to parse {}", source))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let source = args.next().unwrap_or_else(|| "analytics.json".to_string());
    let analytics = load(&source, &mut args).await?;

    let width = args.next().and_then(|v| v.parse().ok());
    let height = args.next().and_then(|v| v.parse().ok());
    let layout = match (width, height) {
        (Some(w), Some(h)) => ChartLayout::with_size(w, h),
        _ => ChartLayout::default(),
    };
    let scene = render_chart(&analytics.data, &layout, Utc::now());
    println!("{}", serde_json::to_string_pretty(&scene)?);
    Ok(())
}
