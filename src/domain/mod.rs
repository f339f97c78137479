pub mod history;
pub mod manga;
pub mod selection;

pub use history::HistoryEntry;
pub use manga::{Chapter, ChapterContent, Manga, Page};
pub use selection::SelectionSet;
