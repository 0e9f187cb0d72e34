//! Key-value preference storage for trend panel visibility.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::logging::{log, obj, v_str, Domain, Level};

pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        let mut store = Self {
            conn: Connection::open(path)?,
        };
        store.init()?;
        Ok(store)
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }
}

impl PreferenceStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Open the SQLite store at `path`, or fall back to memory when no path is
/// configured or the database cannot be opened.
pub fn open_store(path: Option<&str>) -> Box<dyn PreferenceStore> {
    let Some(path) = path else {
        return Box::new(MemoryStore::new());
    };
    match SqliteStore::new(path) {
        Ok(store) => {
            log(Level::Info, Domain::Prefs, "prefs_opened", obj(&[("path", v_str(path))]));
            Box::new(store)
        }
        Err(err) => {
            log(
                Level::Warn,
                Domain::Prefs,
                "prefs_fallback_memory",
                obj(&[("path", v_str(path)), ("error", v_str(&err.to_string()))]),
            );
            Box::new(MemoryStore::new())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPanel {
    Repos,
    Services,
}

impl TrendPanel {
    pub fn key(&self) -> &'static str {
        match self {
            TrendPanel::Repos => "trend_panel.repos.visible",
            TrendPanel::Services => "trend_panel.services.visible",
        }
    }
}

/// Visibility toggles for the sparkline panels. Panels are visible unless a
/// stored preference says otherwise; store errors read as the default.
pub struct TrendPanels {
    store: Box<dyn PreferenceStore>,
}

impl TrendPanels {
    pub fn new(store: Box<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub fn is_visible(&self, panel: TrendPanel) -> bool {
        match self.store.get(panel.key()) {
            Ok(Some(v)) => v != "false",
            Ok(None) => true,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Prefs,
                    "prefs_read_failed",
                    obj(&[("key", v_str(panel.key())), ("error", v_str(&err.to_string()))]),
                );
                true
            }
        }
    }

    pub fn set_visible(&mut self, panel: TrendPanel, visible: bool) -> Result<()> {
        self.store
            .set(panel.key(), if visible { "true" } else { "false" })
    }

    /// Flip a panel and return its new visibility.
    pub fn toggle(&mut self, panel: TrendPanel) -> Result<bool> {
        let next = !self.is_visible(panel);
        self.set_visible(panel, next)?;
        Ok(next)
    }
}

impl Default for TrendPanels {
    fn default() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }
}
