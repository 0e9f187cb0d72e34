//! Job-duration chart: classification, scaling, series and hit-testing.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Serialize;

use super::scale::{DurationUnit, LinearScale, TimeScale};
use crate::logging::log_chart_diagnostics;
use crate::model::{parse_timestamp, ChartDataPoint};

pub const DEFAULT_HIT_RADIUS_PX: f64 = 20.0;
pub const TICK_COUNT: usize = 5;
const MAX_TIMESTAMP_SKEW_DAYS: i64 = 3652;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Avg,
    P95,
    P99,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Avg, Metric::P95, Metric::P99];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Avg => "avg",
            Metric::P95 => "p95",
            Metric::P99 => "p99",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Avg => "Average",
            Metric::P95 => "P95",
            Metric::P99 => "P99",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Metric::Avg => "#1f77b4",
            Metric::P95 => "#ff7f0e",
            Metric::P99 => "#d62728",
        }
    }

    pub fn value(&self, point: &ChartDataPoint) -> Option<f64> {
        match self {
            Metric::Avg => point.avg_duration,
            Metric::P95 => point.p95_duration,
            Metric::P99 => point.p99_duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchClass {
    DefaultBranch,
    MergeRequest,
}

impl BranchClass {
    pub const ALL: [BranchClass; 2] = [BranchClass::DefaultBranch, BranchClass::MergeRequest];

    pub fn label(&self) -> &'static str {
        match self {
            BranchClass::DefaultBranch => "default branch",
            BranchClass::MergeRequest => "merge request",
        }
    }

    pub fn stroke(&self) -> StrokeStyle {
        match self {
            BranchClass::DefaultBranch => StrokeStyle::Solid,
            BranchClass::MergeRequest => StrokeStyle::Dashed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeStyle {
    Solid,
    Dashed,
}

/// Exactly one flag set classifies the point; neither or both leave it
/// unclassified.
pub fn classify(point: &ChartDataPoint) -> Option<BranchClass> {
    match (
        point.is_default_branch.unwrap_or(false),
        point.is_merge_request.unwrap_or(false),
    ) {
        (true, false) => Some(BranchClass::DefaultBranch),
        (false, true) => Some(BranchClass::MergeRequest),
        _ => None,
    }
}

/// Parse a point timestamp, rejecting anything more than ten years from `now`.
pub fn valid_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let ts = parse_timestamp(raw?)?;
    let skew = ChronoDuration::days(MAX_TIMESTAMP_SKEW_DAYS);
    if ts < now - skew || ts > now + skew {
        return None;
    }
    Some(ts)
}

fn valid_duration(v: Option<f64>) -> Option<f64> {
    v.filter(|d| d.is_finite() && *d >= 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartLayout {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 300.0,
            margin_top: 20.0,
            margin_right: 20.0,
            margin_bottom: 40.0,
            margin_left: 60.0,
        }
    }
}

impl ChartLayout {
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.margin_left, (self.width - self.margin_right).max(self.margin_left))
    }

    /// Screen y grows downward, so the range runs bottom to top.
    pub fn y_range(&self) -> (f64, f64) {
        let bottom = (self.height - self.margin_bottom).max(self.margin_top);
        (bottom, self.margin_top)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
    pub point_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub metric: Metric,
    pub branch: BranchClass,
    pub color: &'static str,
    pub stroke: StrokeStyle,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitTarget {
    pub x: f64,
    pub y: f64,
    pub point_index: usize,
    pub metric: Metric,
    pub branch: BranchClass,
    /// Duration in seconds as reported.
    pub value: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartDiagnostics {
    pub total: usize,
    pub rendered: usize,
    pub unclassified: usize,
    pub corrupt_timestamps: usize,
    pub invalid_values: usize,
    /// Classified, dated points with no usable metric value.
    pub no_values: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub title: String,
    pub metric: &'static str,
    pub branch: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartScene {
    pub layout: ChartLayout,
    pub unit: DurationUnit,
    pub x_ticks: Vec<Tick>,
    pub y_ticks: Vec<Tick>,
    pub series: Vec<Series>,
    pub hit_targets: Vec<HitTarget>,
    pub diagnostics: ChartDiagnostics,
}

impl ChartScene {
    pub fn is_empty(&self) -> bool {
        self.hit_targets.is_empty()
    }

    /// Closest hit target within `radius` pixels of `(x, y)`.
    pub fn nearest(&self, x: f64, y: f64, radius: f64) -> Option<&HitTarget> {
        let limit = radius * radius;
        self.hit_targets
            .iter()
            .map(|t| (t, (t.x - x).powi(2) + (t.y - y).powi(2)))
            .filter(|(_, d2)| *d2 <= limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t)
    }

    pub fn tooltip(&self, target: &HitTarget) -> Tooltip {
        let title = Utc
            .timestamp_millis_opt(target.timestamp_ms)
            .single()
            .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        Tooltip {
            title,
            metric: target.metric.label(),
            branch: target.branch.label(),
            value: self.unit.format(self.unit.convert(target.value)),
        }
    }
}

struct Accepted {
    index: usize,
    branch: BranchClass,
    ts: DateTime<Utc>,
    values: Vec<(Metric, f64)>,
}

/// Build the chart scene for `points` relative to `now`.
pub fn render_chart(points: &[ChartDataPoint], layout: &ChartLayout, now: DateTime<Utc>) -> ChartScene {
    let mut diagnostics = ChartDiagnostics {
        total: points.len(),
        ..Default::default()
    };

    let mut accepted = Vec::new();
    for (index, point) in points.iter().enumerate() {
        let Some(branch) = classify(point) else {
            diagnostics.unclassified += 1;
            continue;
        };
        let Some(ts) = valid_timestamp(point.created_at.as_deref(), now) else {
            diagnostics.corrupt_timestamps += 1;
            continue;
        };
        let mut values = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            match valid_duration(metric.value(point)) {
                Some(v) => values.push((metric, v)),
                None if metric.value(point).is_some() => diagnostics.invalid_values += 1,
                None => {}
            }
        }
        if values.is_empty() {
            diagnostics.no_values += 1;
            continue;
        }
        accepted.push(Accepted {
            index,
            branch,
            ts,
            values,
        });
    }
    diagnostics.rendered = accepted.len();

    let max_seconds = accepted
        .iter()
        .flat_map(|a| a.values.iter().map(|(_, v)| *v))
        .fold(0.0_f64, f64::max);
    let unit = DurationUnit::for_max_seconds(max_seconds);

    let (t_min, t_max) = accepted
        .iter()
        .map(|a| a.ts)
        .fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, ts| match acc {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
        .unwrap_or((now, now));
    let x_scale = TimeScale::new(t_min, t_max, layout.x_range());

    let y_domain = LinearScale::extent(
        accepted
            .iter()
            .flat_map(|a| a.values.iter().map(|(_, v)| unit.convert(*v))),
    )
    .unwrap_or((0.0, 0.0));
    let y_scale = LinearScale::new(y_domain, layout.y_range());

    let mut series = Vec::new();
    let mut hit_targets = Vec::new();
    for branch in BranchClass::ALL {
        for metric in Metric::ALL {
            let mut line = Vec::new();
            for a in accepted.iter().filter(|a| a.branch == branch) {
                let Some((_, seconds)) = a.values.iter().find(|(m, _)| *m == metric) else {
                    continue;
                };
                let x = x_scale.map(a.ts);
                let y = y_scale.map(unit.convert(*seconds));
                line.push(SeriesPoint {
                    x,
                    y,
                    point_index: a.index,
                });
                hit_targets.push(HitTarget {
                    x,
                    y,
                    point_index: a.index,
                    metric,
                    branch,
                    value: *seconds,
                    timestamp_ms: a.ts.timestamp_millis(),
                });
            }
            if !line.is_empty() {
                series.push(Series {
                    metric,
                    branch,
                    color: metric.color(),
                    stroke: branch.stroke(),
                    points: line,
                });
            }
        }
    }

    let (x_ticks, y_ticks) = if accepted.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        let x_ticks = x_scale
            .ticks(TICK_COUNT)
            .into_iter()
            .map(|ts| Tick {
                position: x_scale.map(ts),
                label: x_scale.label(ts),
            })
            .collect();
        let y_ticks = y_scale
            .ticks(TICK_COUNT)
            .into_iter()
            .map(|v| Tick {
                position: y_scale.map(v),
                label: unit.format(v),
            })
            .collect();
        (x_ticks, y_ticks)
    };

    log_chart_diagnostics(
        diagnostics.unclassified,
        diagnostics.corrupt_timestamps,
        diagnostics.no_values,
        diagnostics.rendered,
    );

    ChartScene {
        layout: *layout,
        unit,
        x_ticks,
        y_ticks,
        series,
        hit_targets,
        diagnostics,
    }
}
