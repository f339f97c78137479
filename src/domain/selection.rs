use std::collections::HashSet;

use crate::domain::manga::{digits, Chapter};

/// Chapters marked for download, in the order they were marked.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    ids: HashSet<String>,
    order: Vec<Chapter>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, chapter: &Chapter) {
        if self.ids.remove(&chapter.id) {
            self.order.retain(|c| c.id != chapter.id);
        } else {
            self.ids.insert(chapter.id.clone());
            self.order.push(chapter.clone());
        }
    }

    /// Adds every chapter not already selected, keeping the given order.
    pub fn select_all<'a>(&mut self, visible: impl IntoIterator<Item = &'a Chapter>) {
        for chapter in visible {
            if self.ids.insert(chapter.id.clone()) {
                self.order.push(chapter.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    /// Insertion order. Batch numbering is derived from this order.
    pub fn ordered(&self) -> &[Chapter] {
        &self.order
    }

    pub fn contains(&self, chapter_id: &str) -> bool {
        self.ids.contains(chapter_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Digits needed for the largest ordinal in this selection.
    pub fn padding_width(&self) -> usize {
        digits(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Manga;

    fn chapters(n: usize) -> Vec<Chapter> {
        let manga = Manga::new("test", "m", "Manga");
        (0..n)
            .map(|i| Chapter::new(&manga, format!("c{}", i), format!("Chapter {}", i + 1), i))
            .collect()
    }

    #[test]
    fn test_toggle_twice_is_noop() {
        let chs = chapters(3);
        let mut selection = SelectionSet::new();
        selection.toggle(&chs[0]);
        selection.toggle(&chs[1]);
        selection.toggle(&chs[1]);
        assert!(selection.contains("c0"));
        assert!(!selection.contains("c1"));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_select_all_is_idempotent() {
        let chs = chapters(4);
        let mut selection = SelectionSet::new();
        selection.toggle(&chs[2]);
        selection.select_all(&chs);
        selection.select_all(&chs);
        assert_eq!(selection.len(), 4);
    }

    #[test]
    fn test_select_all_then_clear_is_empty() {
        let chs = chapters(5);
        let mut selection = SelectionSet::new();
        selection.toggle(&chs[3]);
        selection.select_all(&chs);
        selection.clear();
        assert!(selection.is_empty());
        assert!(!selection.contains("c3"));
    }

    #[test]
    fn test_ordered_keeps_insertion_order() {
        let chs = chapters(3);
        let mut selection = SelectionSet::new();
        selection.toggle(&chs[2]);
        selection.toggle(&chs[0]);
        selection.select_all(&chs);
        let ids: Vec<&str> = selection.ordered().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c0", "c1"]);
    }

    #[test]
    fn test_padding_width() {
        let chs = chapters(12);
        let mut selection = SelectionSet::new();
        selection.select_all(&chs[..9]);
        assert_eq!(selection.padding_width(), 1);
        selection.select_all(&chs);
        assert_eq!(selection.padding_width(), 2);
    }
}
