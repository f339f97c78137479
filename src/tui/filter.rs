use crate::domain::{Chapter, HistoryEntry, Manga};

/// Text a list item is matched against.
pub trait Labelled {
    fn label(&self) -> &str;
}

impl Labelled for (String, String) {
    fn label(&self) -> &str {
        &self.1
    }
}

impl Labelled for HistoryEntry {
    fn label(&self) -> &str {
        &self.manga_name
    }
}

impl Labelled for Manga {
    fn label(&self) -> &str {
        &self.name
    }
}

impl Labelled for Chapter {
    fn label(&self) -> &str {
        &self.name
    }
}

/// Case-insensitive substring filter of a list screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub query: String,
    /// Keys go to the query instead of the list.
    pub editing: bool,
}

impl ListFilter {
    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    pub fn matches(&self, label: &str) -> bool {
        self.query.is_empty() || label.to_lowercase().contains(&self.query.to_lowercase())
    }

    /// Items that pass, in list order.
    pub fn visible<'a, T: Labelled>(&self, items: &'a [T]) -> Vec<&'a T> {
        items.iter().filter(|item| self.matches(item.label())).collect()
    }

    /// The visible item at `cursor` together with its index in `items`.
    pub fn nth<'a, T: Labelled>(&self, items: &'a [T], cursor: usize) -> Option<(usize, &'a T)> {
        items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.matches(item.label()))
            .nth(cursor)
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.editing = false;
    }
}
