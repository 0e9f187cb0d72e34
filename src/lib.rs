pub mod attention;
pub mod chart;
pub mod config;
pub mod differ;
pub mod fetch;
pub mod health;
pub mod history;
pub mod logging;
pub mod model;
pub mod prefs;
pub mod priority;
pub mod reconcile;
pub mod scheduler;
pub mod slo;
pub mod status;
