use std::collections::BTreeSet;

use crate::PageNumber;

/// The set of pages admitted for materialization. Admission only ever grows
/// while a document stays open; scrolling away from a page does not tear its
/// surface down.
#[derive(Debug, Default)]
pub struct RenderWindow {
    buffer: u32,
    page_count: u32,
    admitted: BTreeSet<PageNumber>,
}

impl RenderWindow {
    pub fn new(buffer: u32) -> Self {
        Self {
            buffer,
            page_count: 0,
            admitted: BTreeSet::new(),
        }
    }

    /// Resets for a new document and seeds the head of it, plus the anchor's
    /// neighborhood when resuming somewhere deeper. Returns what got admitted.
    pub fn initialize(
        &mut self,
        page_count: u32,
        anchor: Option<PageNumber>,
    ) -> Vec<PageNumber> {
        self.page_count = page_count;
        self.admitted.clear();
        if page_count == 0 {
            return Vec::new();
        }

        let mut fresh = Vec::new();
        let head_end = (self.buffer + 1).min(page_count);
        for page in 1..=head_end {
            if self.admitted.insert(page) {
                fresh.push(page);
            }
        }
        if let Some(anchor) = anchor {
            fresh.extend(self.admit(anchor));
        }
        fresh.sort_unstable();
        fresh
    }

    /// Admits `page` and its neighborhood, returning only the pages that are
    /// new to the set.
    pub fn admit(&mut self, page: PageNumber) -> Vec<PageNumber> {
        if self.page_count == 0 || page < 1 || page > self.page_count {
            return Vec::new();
        }
        let start = page.saturating_sub(self.buffer).max(1);
        let end = (page + self.buffer).min(self.page_count);

        let mut fresh = Vec::new();
        for candidate in start..=end {
            if self.admitted.insert(candidate) {
                fresh.push(candidate);
            }
        }
        fresh
    }

    pub fn is_admitted(&self, page: PageNumber) -> bool {
        self.admitted.contains(&page)
    }

    pub fn pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.admitted.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(window: &RenderWindow) -> Vec<PageNumber> {
        window.pages().collect()
    }

    #[test]
    fn initialize_seeds_the_document_head() {
        let mut window = RenderWindow::new(2);
        let fresh = window.initialize(20, None);
        assert_eq!(fresh, vec![1, 2, 3]);
        assert_eq!(admitted(&window), vec![1, 2, 3]);
    }

    #[test]
    fn initialize_with_anchor_also_seeds_its_neighborhood() {
        let mut window = RenderWindow::new(2);
        let fresh = window.initialize(20, Some(10));
        assert_eq!(fresh, vec![1, 2, 3, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn short_documents_are_seeded_whole() {
        let mut window = RenderWindow::new(2);
        let fresh = window.initialize(2, None);
        assert_eq!(fresh, vec![1, 2]);
    }

    #[test]
    fn admission_covers_the_buffered_neighborhood() {
        let mut window = RenderWindow::new(2);
        window.initialize(20, None);

        let fresh = window.admit(10);
        assert_eq!(fresh, vec![8, 9, 10, 11, 12]);
        for page in 8..=12 {
            assert!(window.is_admitted(page));
        }
    }

    #[test]
    fn admission_clamps_at_document_edges() {
        let mut window = RenderWindow::new(2);
        window.initialize(5, None);

        assert_eq!(window.admit(1), Vec::<PageNumber>::new());
        let fresh = window.admit(5);
        assert_eq!(fresh, vec![4, 5]);
    }

    #[test]
    fn admission_never_shrinks_the_set() {
        let mut window = RenderWindow::new(2);
        window.initialize(30, None);
        window.admit(20);
        let before = window.len();

        window.admit(3);
        assert!(window.len() >= before);
        assert!(window.is_admitted(20));
    }

    #[test]
    fn readmission_reports_nothing_new() {
        let mut window = RenderWindow::new(2);
        window.initialize(20, None);
        window.admit(10);
        assert!(window.admit(10).is_empty());
    }

    #[test]
    fn out_of_range_pages_are_ignored() {
        let mut window = RenderWindow::new(2);
        window.initialize(5, None);
        assert!(window.admit(0).is_empty());
        assert!(window.admit(6).is_empty());
    }
}
