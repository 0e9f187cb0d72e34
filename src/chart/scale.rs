//! Axis scales and display units.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    /// Pick the unit from the largest duration (in seconds) on the chart.
    pub fn for_max_seconds(max: f64) -> Self {
        if max >= 3600.0 {
            DurationUnit::Hours
        } else if max >= 300.0 {
            DurationUnit::Minutes
        } else {
            DurationUnit::Seconds
        }
    }

    pub fn divisor(&self) -> f64 {
        match self {
            DurationUnit::Seconds => 1.0,
            DurationUnit::Minutes => 60.0,
            DurationUnit::Hours => 3600.0,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "min",
            DurationUnit::Hours => "h",
        }
    }

    pub fn convert(&self, seconds: f64) -> f64 {
        seconds / self.divisor()
    }

    pub fn format(&self, value: f64) -> String {
        format!("{:.1} {}", value, self.suffix())
    }
}

/// Linear map from a data domain onto a pixel range.
///
/// A zero-width (or non-finite) domain maps every value to the middle of the
/// range instead of dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearScale {
    pub domain: (f64, f64),
    pub range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    /// Domain spanning the extent of `values`; `None` when there are none.
    pub fn extent(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
        values.into_iter().filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    pub fn is_degenerate(&self) -> bool {
        let span = self.domain.1 - self.domain.0;
        !span.is_finite() || span == 0.0
    }

    pub fn midpoint(&self) -> f64 {
        (self.range.0 + self.range.1) / 2.0
    }

    pub fn map(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return self.midpoint();
        }
        let t = (value - self.domain.0) / (self.domain.1 - self.domain.0);
        self.range.0 + t * (self.range.1 - self.range.0)
    }

    /// `count` evenly spaced domain values including both ends. A degenerate
    /// domain yields its single value.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        if self.is_degenerate() || count < 2 {
            return vec![self.domain.0];
        }
        let step = (self.domain.1 - self.domain.0) / (count - 1) as f64;
        (0..count).map(|i| self.domain.0 + step * i as f64).collect()
    }
}

/// Time axis over epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeScale {
    pub linear: LinearScale,
}

impl TimeScale {
    pub fn new(min: DateTime<Utc>, max: DateTime<Utc>, range: (f64, f64)) -> Self {
        Self {
            linear: LinearScale::new(
                (min.timestamp_millis() as f64, max.timestamp_millis() as f64),
                range,
            ),
        }
    }

    pub fn map(&self, ts: DateTime<Utc>) -> f64 {
        self.linear.map(ts.timestamp_millis() as f64)
    }

    pub fn ticks(&self, count: usize) -> Vec<DateTime<Utc>> {
        self.linear
            .ticks(count)
            .into_iter()
            .filter_map(|ms| Utc.timestamp_millis_opt(ms.round() as i64).single())
            .collect()
    }

    /// Label format adapts to the visible span.
    pub fn label(&self, ts: DateTime<Utc>) -> String {
        let span_ms = self.linear.domain.1 - self.linear.domain.0;
        let fmt = if span_ms > 2.0 * 86_400_000.0 {
            "%b %d"
        } else if span_ms > 0.0 {
            "%b %d %H:%M"
        } else {
            "%Y-%m-%d %H:%M"
        };
        ts.format(fmt).to_string()
    }
}
