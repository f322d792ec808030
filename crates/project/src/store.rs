//! Load/save of serialized documents by opaque project id.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("cutline")
}

pub fn default_store_path() -> PathBuf { app_data_dir().join("projects.sqlite3") }

#[derive(Debug, Clone, PartialEq)]
pub struct StoredProject {
    pub id: String,
    pub name: String,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

/// Persistence collaborator. Documents are opaque strings here; parsing and
/// schema checks happen in [`crate::load`].
pub trait ProjectStore {
    fn save(&mut self, id: &str, name: &str, schema_version: &str, document: &str) -> Result<()>;
    fn load(&self, id: &str) -> Result<Option<String>>;
    fn list(&self) -> Result<Vec<StoredProject>>;
    fn delete(&mut self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    rows: HashMap<String, (StoredProject, String)>,
}

impl MemoryProjectStore {
    pub fn new() -> Self { Self::default() }
}

impl ProjectStore for MemoryProjectStore {
    fn save(&mut self, id: &str, name: &str, schema_version: &str, document: &str) -> Result<()> {
        let meta = StoredProject { id: id.to_string(), name: name.to_string(), schema_version: schema_version.to_string(), updated_at: Utc::now() };
        self.rows.insert(id.to_string(), (meta, document.to_string()));
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<String>> { Ok(self.rows.get(id).map(|(_, doc)| doc.clone())) }

    fn list(&self) -> Result<Vec<StoredProject>> {
        let mut out: Vec<StoredProject> = self.rows.values().map(|(meta, _)| meta.clone()).collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn delete(&mut self, id: &str) -> Result<bool> { Ok(self.rows.remove(id).is_some()) }
}

pub struct SqliteProjectStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteProjectStore {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_migrations(&conn)?;
        debug!(path = %path.display(), "project store opened");
        Ok(Self { conn, path: path.to_path_buf() })
    }

    pub fn open_default() -> Result<Self> { Self::open_or_create(&default_store_path()) }

    pub fn path(&self) -> &Path { &self.path }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).single().unwrap_or_default() }

impl ProjectStore for SqliteProjectStore {
    fn save(&mut self, id: &str, name: &str, schema_version: &str, document: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO projects(id, name, schema_version, document, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, ?5, ?5) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, schema_version = excluded.schema_version, document = excluded.document, updated_at = excluded.updated_at",
            params![id, name, schema_version, document, now],
        )?;
        debug!(project_id = id, bytes = document.len(), "document stored");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<String>> {
        let doc = self
            .conn
            .query_row("SELECT document FROM projects WHERE id = ?1", params![id], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(doc)
    }

    fn list(&self) -> Result<Vec<StoredProject>> {
        let mut stmt = self.conn.prepare("SELECT id, name, schema_version, updated_at FROM projects ORDER BY updated_at DESC, id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredProject { id: row.get(0)?, name: row.get(1)?, schema_version: row.get(2)?, updated_at: from_timestamp(row.get(3)?) })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn delete(&mut self, id: &str) -> Result<bool> { Ok(self.conn.execute("DELETE FROM projects WHERE id = ?1", params![id])? > 0) }
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute("INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))", params!["V0001__init"])?;
    Ok(())
}
