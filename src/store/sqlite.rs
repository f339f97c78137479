use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, TankobonError};
use crate::domain::HistoryEntry;
use crate::store::HistoryStore;

const COLUMNS: &str = "id, provider, manga_id, manga_name, manga_url, chapter_id, chapter_name, \
                       chapter_index, updated_at";

pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| TankobonError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            TankobonError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            id: row.get(0)?,
            provider: row.get(1)?,
            manga_id: row.get(2)?,
            manga_name: row.get(3)?,
            manga_url: row.get(4)?,
            chapter_id: row.get(5)?,
            chapter_name: row.get(6)?,
            chapter_index: row.get::<_, i64>(7)?.max(0) as usize,
            updated_at: row
                .get::<_, String>(8)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn record(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                COLUMNS
            ),
            params![
                entry.id,
                entry.provider,
                entry.manga_id,
                entry.manga_name,
                entry.manga_url,
                entry.chapter_id,
                entry.chapter_name,
                entry.chapter_index as i64,
                entry.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM history ORDER BY updated_at DESC",
            COLUMNS
        ))?;

        let entries = stmt
            .query_map([], Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(())
    }
}
