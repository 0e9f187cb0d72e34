pub mod controller;
pub mod engine;
pub mod scale;
pub mod subscription;

pub use controller::{ChartController, ChartUpdate};
pub use engine::{
    classify, render_chart, BranchClass, ChartDiagnostics, ChartLayout, ChartScene, HitTarget, Metric, Series,
    StrokeStyle, Tooltip, DEFAULT_HIT_RADIUS_PX,
};
pub use scale::{DurationUnit, LinearScale, TimeScale};
pub use subscription::{ListenerKind, ListenerRegistry, SubscriptionId};
