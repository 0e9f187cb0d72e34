//! "Needs attention" aggregation across repositories, services and pipelines.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::{Pipeline, Repository, Service};
use crate::status::{NormalizedStatus, ServiceHealth};

pub const DEFAULT_ATTENTION_CAP: usize = 8;

/// Caps outside `1..=8` are pulled back into range.
pub fn bounded_cap(cap: usize) -> usize {
    cap.clamp(1, DEFAULT_ATTENTION_CAP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Repo,
    Service,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionItem {
    pub kind: SourceKind,
    pub id: String,
    pub name: String,
    pub reason: String,
    pub severity: Severity,
}

/// Distinguishes "nothing wrong" from "nothing loaded".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "items", rename_all = "snake_case")]
pub enum AttentionState {
    NoData,
    AllClear,
    Items(Vec<AttentionItem>),
}

fn pct(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// First matching condition wins: runner issue, consecutive failures, below
/// SLO, failing jobs.
pub fn repo_attention(repo: &Repository, slo_target: f64) -> Option<AttentionItem> {
    let (severity, reason) = if repo.runner_issue() {
        (Severity::Critical, "Runner issue detected".to_string())
    } else if repo.consecutive_failures() > 0 {
        let n = repo.consecutive_failures();
        (
            Severity::High,
            format!(
                "{} consecutive default-branch failure{}",
                n,
                if n == 1 { "" } else { "s" }
            ),
        )
    } else if let Some(rate) = repo.recent_success_rate.filter(|r| *r < slo_target) {
        (
            Severity::Medium,
            format!("Success rate {} below SLO target {}", pct(rate), pct(slo_target)),
        )
    } else if repo.failing_jobs() {
        (Severity::Low, "Failing jobs in recent pipelines".to_string())
    } else {
        return None;
    };
    Some(AttentionItem {
        kind: SourceKind::Repo,
        id: repo.key(),
        name: repo.display_name(),
        reason,
        severity,
    })
}

pub fn service_attention(service: &Service) -> Option<AttentionItem> {
    let (severity, reason) = match service.health() {
        ServiceHealth::Down => (Severity::Critical, "Service is down"),
        ServiceHealth::Unknown => (Severity::Low, "Service health is unknown"),
        ServiceHealth::Up => return None,
    };
    Some(AttentionItem {
        kind: SourceKind::Service,
        id: service.key(),
        name: service.display_name(),
        reason: reason.to_string(),
        severity,
    })
}

fn pipeline_issue(pipeline: &Pipeline) -> Option<(Severity, &'static str)> {
    match pipeline.status() {
        NormalizedStatus::Failed => Some((Severity::High, "Latest default-branch pipeline failed")),
        NormalizedStatus::Canceled => Some((Severity::Low, "Latest default-branch pipeline was canceled")),
        _ => None,
    }
}

/// Only the most recently created default-branch pipeline with an issue is
/// reported, so a burst of failures yields one item.
pub fn pipeline_attention(pipelines: &[Pipeline]) -> Option<AttentionItem> {
    let (pipeline, (severity, reason)) = pipelines
        .iter()
        .filter(|p| p.on_default_branch())
        .filter_map(|p| pipeline_issue(p).map(|issue| (p, issue)))
        // Undated pipelines lose to dated ones; ties keep the first seen.
        .reduce(|best, cand| if cand.0.created() > best.0.created() { cand } else { best })?;
    Some(AttentionItem {
        kind: SourceKind::Pipeline,
        id: pipeline.key(),
        name: pipeline.display_name(),
        reason: reason.to_string(),
        severity,
    })
}

/// Merge every source, one item per (kind, id), severity then name, capped.
pub fn collect_attention(
    repos: Option<&[Repository]>,
    services: Option<&[Service]>,
    pipelines: Option<&[Pipeline]>,
    slo_target: f64,
    cap: usize,
) -> AttentionState {
    if repos.is_none() && services.is_none() && pipelines.is_none() {
        return AttentionState::NoData;
    }

    let mut items: Vec<AttentionItem> = Vec::new();
    items.extend(
        repos
            .unwrap_or_default()
            .iter()
            .filter_map(|r| repo_attention(r, slo_target)),
    );
    items.extend(services.unwrap_or_default().iter().filter_map(service_attention));
    items.extend(pipelines.and_then(pipeline_attention));

    items.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });

    // Sorted by severity first, so the first occurrence of a pair is its worst.
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert((item.kind, item.id.clone())));
    items.truncate(bounded_cap(cap));

    if items.is_empty() {
        AttentionState::AllClear
    } else {
        AttentionState::Items(items)
    }
}
