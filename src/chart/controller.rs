//! Stateful chart host: owns the current scene, its listener subscription and
//! the debounced pointer/resize work.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::engine::{render_chart, ChartLayout, ChartScene, Tooltip};
use super::subscription::{ListenerKind, ListenerRegistry, SubscriptionId};
use crate::logging::{log, obj, Domain, Level};
use crate::model::ChartDataPoint;
use crate::scheduler::Debouncer;

/// Work accumulated while the debounce is pending. A later event of the same
/// kind overwrites an earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PendingWork {
    pointer: Option<Option<(f64, f64)>>,
    resize: Option<(f64, f64)>,
}

/// What changed after a debounced flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartUpdate {
    pub rerendered: bool,
    pub hover: Option<Tooltip>,
}

pub struct ChartController {
    layout: ChartLayout,
    hit_radius: f64,
    debounce: Debouncer,
    registry: ListenerRegistry,
    subscription: Option<SubscriptionId>,
    points: Vec<ChartDataPoint>,
    scene: Option<ChartScene>,
    pending: PendingWork,
    hover: Option<Tooltip>,
}

impl ChartController {
    pub fn new(layout: ChartLayout, hit_radius: f64, debounce: Duration) -> Self {
        Self {
            layout,
            hit_radius,
            debounce: Debouncer::new(debounce),
            registry: ListenerRegistry::new(),
            subscription: None,
            points: Vec::new(),
            scene: None,
            pending: PendingWork::default(),
            hover: None,
        }
    }

    pub fn scene(&self) -> Option<&ChartScene> {
        self.scene.as_ref()
    }

    pub fn hover(&self) -> Option<&Tooltip> {
        self.hover.as_ref()
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Render `points` and attach fresh listeners. Any previous subscription
    /// and pending debounced work are dropped first.
    pub fn render(&mut self, points: Vec<ChartDataPoint>, now: DateTime<Utc>) -> SubscriptionId {
        if let Some(prev) = self.subscription.take() {
            self.registry.dispose(prev);
        }
        self.debounce.clear();
        self.pending = PendingWork::default();
        self.hover = None;
        self.points = points;
        self.scene = Some(render_chart(&self.points, &self.layout, now));
        let id = self.registry.attach(&ListenerKind::ALL);
        self.subscription = Some(id);
        id
    }

    /// Detach `id`. Disposing twice, or disposing a superseded handle, is a no-op.
    pub fn dispose(&mut self, id: SubscriptionId) {
        if !self.registry.dispose(id) {
            return;
        }
        if self.subscription == Some(id) {
            self.subscription = None;
            self.debounce.clear();
            self.pending = PendingWork::default();
            log(Level::Debug, Domain::Chart, "chart_disposed", obj(&[]));
        }
    }

    fn listening(&self) -> bool {
        self.subscription.is_some_and(|id| self.registry.is_active(id))
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64, at: Instant) -> bool {
        if !self.listening() {
            return false;
        }
        self.pending.pointer = Some(Some((x, y)));
        self.debounce.schedule(at);
        true
    }

    pub fn pointer_left(&mut self, at: Instant) -> bool {
        if !self.listening() {
            return false;
        }
        self.pending.pointer = Some(None);
        self.debounce.schedule(at);
        true
    }

    pub fn resized(&mut self, width: f64, height: f64, at: Instant) -> bool {
        if !self.listening() {
            return false;
        }
        self.pending.resize = Some((width, height));
        self.debounce.schedule(at);
        true
    }

    /// Flush pending work if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant, wall: DateTime<Utc>) -> Option<ChartUpdate> {
        let token = self.debounce.due(now)?;
        if !self.debounce.fire(token, now) {
            return None;
        }
        let work = std::mem::take(&mut self.pending);

        let rerendered = match work.resize {
            Some((width, height)) => {
                self.layout = ChartLayout::with_size(width, height);
                self.scene = Some(render_chart(&self.points, &self.layout, wall));
                self.hover = None;
                true
            }
            None => false,
        };

        if let Some(pointer) = work.pointer {
            self.hover = match (pointer, &self.scene) {
                (Some((x, y)), Some(scene)) => scene
                    .nearest(x, y, self.hit_radius)
                    .map(|target| scene.tooltip(target)),
                _ => None,
            };
        }

        Some(ChartUpdate {
            rerendered,
            hover: self.hover.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wall() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn points() -> Vec<ChartDataPoint> {
        vec![
            ChartDataPoint {
                created_at: Some("2024-05-01T10:00:00Z".into()),
                avg_duration: Some(30.0),
                is_default_branch: Some(true),
                ..Default::default()
            },
            ChartDataPoint {
                created_at: Some("2024-05-02T10:00:00Z".into()),
                avg_duration: Some(60.0),
                is_default_branch: Some(true),
                ..Default::default()
            },
        ]
    }

    fn controller() -> ChartController {
        ChartController::new(ChartLayout::default(), 20.0, Duration::from_millis(200))
    }

    #[test]
    fn test_rerender_disposes_previous_listeners() {
        let mut c = controller();
        let first = c.render(points(), wall());
        let second = c.render(points(), wall());
        assert_ne!(first, second);
        assert_eq!(c.registry().subscription_count(), 1);
        assert_eq!(c.registry().listener_count(ListenerKind::PointerMove), 1);
        // Stale handle disposal does not detach the live one.
        c.dispose(first);
        assert!(c.registry().is_active(second));
        c.dispose(second);
        c.dispose(second);
        assert_eq!(c.registry().subscription_count(), 0);
    }

    #[test]
    fn test_pointer_hover_is_debounced() {
        let mut c = controller();
        c.render(points(), wall());
        let target = c.scene().unwrap().hit_targets[1].clone();
        let t0 = Instant::now();
        assert!(c.pointer_moved(0.0, 0.0, t0));
        assert!(c.pointer_moved(target.x + 2.0, target.y, t0 + Duration::from_millis(150)));
        assert_eq!(c.poll(t0 + Duration::from_millis(250), wall()), None);
        let update = c.poll(t0 + Duration::from_millis(350), wall()).unwrap();
        assert!(!update.rerendered);
        assert_eq!(update.hover.map(|t| t.value), Some("60.0 s".to_string()));
        // Nothing left to flush.
        assert_eq!(c.poll(t0 + Duration::from_secs(2), wall()), None);

        assert!(c.pointer_left(t0 + Duration::from_secs(3)));
        let update = c.poll(t0 + Duration::from_secs(4), wall()).unwrap();
        assert_eq!(update.hover, None);
    }

    #[test]
    fn test_resize_and_pointer_merge_into_one_flush() {
        let mut c = controller();
        c.render(points(), wall());
        let t0 = Instant::now();
        c.resized(400.0, 200.0, t0);
        c.pointer_moved(-100.0, -100.0, t0 + Duration::from_millis(50));
        let update = c.poll(t0 + Duration::from_millis(300), wall()).unwrap();
        assert!(update.rerendered);
        assert_eq!(c.scene().unwrap().layout.width, 400.0);
        assert_eq!(update.hover, None);
    }

    #[test]
    fn test_events_ignored_after_dispose() {
        let mut c = controller();
        let id = c.render(points(), wall());
        let t0 = Instant::now();
        c.pointer_moved(10.0, 10.0, t0);
        c.dispose(id);
        assert!(!c.pointer_moved(10.0, 10.0, t0));
        assert_eq!(c.poll(t0 + Duration::from_secs(1), wall()), None);
    }
}
