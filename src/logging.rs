//! Structured logging for the dashboard reconciliation core.
//!
//! Every record is a single JSON line carrying a run id, a monotonically
//! increasing sequence number, a level and a domain. Records go to stdout
//! and to per-run files under `LOG_DIR/<run_id>/`.
//!
//! Filtering:
//! - `LOG_LEVEL` sets the minimum level (default `info`)
//! - `LOG_DOMAINS` is a comma-separated list of domains, or `all`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Feed,      // Per-feed requests, cache hits, failures
    Cycle,     // Refresh cycle status and scheduling
    Attention, // Attention aggregation results
    Render,    // Render-state diffing (degraded / moved)
    Chart,     // Chart rendering diagnostics
    Prefs,     // Preference store
    System,    // Startup, shutdown
    Profile,   // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Feed => "feed",
            Domain::Cycle => "cycle",
            Domain::Attention => "attention",
            Domain::Render => "render",
            Domain::Chart => "chart",
            Domain::Prefs => "prefs",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        // File output is opt-in so library consumers and tests only get stdout.
        let Ok(base) = std::env::var("LOG_DIR") else {
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        };
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

const REDACTED_KEYS: [&str; 6] = [
    "authorization",
    "Authorization",
    "token",
    "private_token",
    "api_key",
    "api_token",
];

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in REDACTED_KEYS {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["feed", "cycle_id", "entity", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = Value::Object(build_entry(&ctx.run_id, level, component, event, fields)).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

fn build_entry(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> Map<String, Value> {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    entry
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_feed_success(feed: &str, elapsed_ms: f64, fingerprint: &str, unchanged: bool) {
    log(
        if unchanged { Level::Debug } else { Level::Info },
        Domain::Feed,
        if unchanged { "feed_unchanged" } else { "feed_ok" },
        obj(&[
            ("feed", v_str(feed)),
            ("elapsed_ms", v_num(elapsed_ms)),
            ("fingerprint", v_str(fingerprint)),
        ]),
    );
}

pub fn log_feed_failure(
    feed: &str,
    kind: &str,
    status: Option<u16>,
    detail: &str,
    has_cache: bool,
    consecutive_failures: u32,
) {
    log(
        Level::Warn,
        Domain::Feed,
        "feed_failed",
        obj(&[
            ("feed", v_str(feed)),
            ("error_kind", v_str(kind)),
            ("status", status.map(|s| json!(s)).unwrap_or(Value::Null)),
            ("detail", v_str(detail)),
            ("serving_cache", Value::Bool(has_cache)),
            ("consecutive_failures", json!(consecutive_failures)),
        ]),
    );
}

pub fn log_cycle(cycle_id: u64, status: &str, message: &str, failed_feeds: &[&str]) {
    let level = match status {
        "fresh" => Level::Info,
        "unavailable" => Level::Error,
        _ => Level::Warn,
    };
    log(
        level,
        Domain::Cycle,
        "cycle_complete",
        obj(&[
            ("cycle_id", json!(cycle_id)),
            ("status", v_str(status)),
            ("msg", v_str(message)),
            (
                "failed_feeds",
                Value::Array(failed_feeds.iter().map(|f| v_str(f)).collect()),
            ),
        ]),
    );
}

pub fn log_render_signal(entity: &str, signal: &str, prev_position: usize, position: usize) {
    log(
        Level::Debug,
        Domain::Render,
        signal,
        obj(&[
            ("entity", v_str(entity)),
            ("prev_position", json!(prev_position)),
            ("position", json!(position)),
        ]),
    );
}

pub fn log_chart_diagnostics(unclassified: usize, corrupt_timestamps: usize, no_values: usize, rendered: usize) {
    log(
        if unclassified + corrupt_timestamps + no_values > 0 {
            Level::Warn
        } else {
            Level::Debug
        },
        Domain::Chart,
        "chart_points",
        obj(&[
            ("rendered", json!(rendered)),
            ("unclassified", json!(unclassified)),
            ("corrupt_timestamps", json!(corrupt_timestamps)),
            ("no_values", json!(no_values)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: Some(obj(fields)),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let fields = obj(&[
            ("feed", v_str("repos")),
            ("private_token", v_str("glpat-abc")),
            ("authorization", v_str("Bearer xyz")),
        ]);
        let entry = build_entry("r-test", Level::Warn, "feed", "feed_failed", fields);
        assert_eq!(entry["feed"], "repos");
        assert_eq!(entry["data"]["private_token"], "[REDACTED]");
        assert_eq!(entry["data"]["authorization"], "[REDACTED]");
        assert_eq!(entry["lvl"], "WARN");
    }

    #[test]
    fn test_promoted_fields_leave_data() {
        let fields = obj(&[("msg", v_str("hello")), ("status", v_str("fresh"))]);
        let entry = build_entry("r-test", Level::Info, "cycle", "cycle_complete", fields);
        assert_eq!(entry["msg"], "hello");
        assert!(entry["data"].get("msg").is_none());
        assert_eq!(entry["data"]["status"], "fresh");
    }
}
