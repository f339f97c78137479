pub mod sqlite;

use crate::app::Result;
use crate::domain::HistoryEntry;

pub use sqlite::SqliteHistoryStore;

pub trait HistoryStore {
    /// Inserts the entry or replaces the one for the same manga.
    fn record(&self, entry: &HistoryEntry) -> Result<()>;
    /// Most recently updated first.
    fn list(&self) -> Result<Vec<HistoryEntry>>;
    fn remove(&self, id: &str) -> Result<()>;
}
