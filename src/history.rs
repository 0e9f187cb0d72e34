//! Bounded per-entity sample history for sparklines.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_WINDOW: usize = 20;

/// Sliding window of recent finite samples, keyed by entity.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    window: usize,
    series: HashMap<String, VecDeque<f64>>,
}

impl HistoryBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            series: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a sample. Missing or non-finite values are dropped; returns
    /// whether the sample was stored.
    pub fn append(&mut self, key: &str, value: Option<f64>) -> bool {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            return false;
        };
        let window = self.window;
        let buf = self
            .series
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(window));
        buf.push_back(value);
        while buf.len() > window {
            buf.pop_front();
        }
        true
    }

    /// Replace a key's buffer with externally supplied samples. Only the
    /// newest `window` finite samples are kept. An empty or all-invalid
    /// input leaves local history untouched; returns whether it replaced.
    pub fn seed(&mut self, key: &str, samples: &[Option<f64>]) -> bool {
        let finite: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.filter(|v| v.is_finite()))
            .collect();
        if finite.is_empty() {
            return false;
        }
        let skip = finite.len().saturating_sub(self.window);
        self.series
            .insert(key.to_string(), finite.into_iter().skip(skip).collect());
        true
    }

    pub fn get(&self, key: &str) -> Vec<f64> {
        self.series
            .get(key)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &str) -> usize {
        self.series.get(key).map_or(0, VecDeque::len)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Drop every key not in `live`.
    pub fn retain_keys<'a>(&mut self, live: impl IntoIterator<Item = &'a str>) {
        let live: std::collections::HashSet<&str> = live.into_iter().collect();
        self.series.retain(|k, _| live.contains(k.as_str()));
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// Compact description of a series for a sparkline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sparkline {
    pub samples: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub trend: Trend,
}

impl Sparkline {
    /// `None` for an empty series.
    pub fn from_samples(samples: Vec<f64>) -> Option<Self> {
        let first = *samples.first()?;
        let last = *samples.last()?;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // Changes within 1% of the observed range read as flat.
        let tolerance = (max - min).abs() * 0.01;
        let delta = last - first;
        let trend = if samples.len() < 2 || delta.abs() <= tolerance {
            Trend::Flat
        } else if delta > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        };
        Some(Self {
            samples,
            min,
            max,
            last,
            trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_exceeded() {
        let mut h = HistoryBuffer::new(5);
        for i in 0..50 {
            h.append("a", Some(i as f64));
            assert!(h.len("a") <= 5);
        }
        assert_eq!(h.get("a"), vec![45.0, 46.0, 47.0, 48.0, 49.0]);
    }

    #[test]
    fn test_invalid_samples_are_skipped() {
        let mut h = HistoryBuffer::new(3);
        assert!(h.append("a", Some(1.0)));
        assert!(!h.append("a", Some(f64::NAN)));
        assert!(!h.append("a", None));
        assert!(!h.append("a", Some(f64::INFINITY)));
        assert_eq!(h.len("a"), 1);
        assert!(!h.append("b", None));
        assert_eq!(h.keys().count(), 1);
    }

    #[test]
    fn test_seed_replaces_and_truncates() {
        let mut h = HistoryBuffer::new(3);
        h.append("svc", Some(99.0));
        let seeded = h.seed("svc", &[Some(1.0), None, Some(2.0), Some(3.0), Some(4.0)]);
        assert!(seeded);
        assert_eq!(h.get("svc"), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_empty_seed_keeps_local_history() {
        let mut h = HistoryBuffer::new(3);
        h.append("svc", Some(5.0));
        assert!(!h.seed("svc", &[]));
        assert!(!h.seed("svc", &[None, Some(f64::NAN)]));
        assert_eq!(h.get("svc"), vec![5.0]);
    }

    #[test]
    fn test_retain_keys() {
        let mut h = HistoryBuffer::new(3);
        h.append("a", Some(1.0));
        h.append("b", Some(1.0));
        h.retain_keys(["b"]);
        assert_eq!(h.len("a"), 0);
        assert_eq!(h.len("b"), 1);
    }

    #[test]
    fn test_sparkline_trend() {
        let up = Sparkline::from_samples(vec![0.5, 0.7, 0.9]).unwrap();
        assert_eq!(up.trend, Trend::Up);
        assert_eq!(up.min, 0.5);
        assert_eq!(up.max, 0.9);
        let down = Sparkline::from_samples(vec![200.0, 150.0, 100.0]).unwrap();
        assert_eq!(down.trend, Trend::Down);
        let flat = Sparkline::from_samples(vec![1.0]).unwrap();
        assert_eq!(flat.trend, Trend::Flat);
        assert!(Sparkline::from_samples(vec![]).is_none());
    }
}
