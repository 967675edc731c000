use std::collections::BTreeMap;

use crate::{PageNumber, Size};

/// Page count plus whatever intrinsic page sizes have been reported so far.
/// Geometry arrives out of order as pages materialize and only grows; a page's
/// size never changes within one document.
#[derive(Debug, Default)]
pub struct PageSet {
    page_count: u32,
    geometry: BTreeMap<PageNumber, Size>,
}

impl PageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything; used when a document is opened or closed.
    pub fn reset(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.geometry.clear();
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        page >= 1 && page <= self.page_count
    }

    /// Clamps into the valid page range, or None when no document is open.
    pub fn clamp(&self, page: PageNumber) -> Option<PageNumber> {
        if self.page_count == 0 {
            return None;
        }
        Some(page.clamp(1, self.page_count))
    }

    /// Records an intrinsic size. Out-of-range pages and degenerate sizes are
    /// rejected; re-reporting a known page is fine.
    pub fn record_geometry(&mut self, page: PageNumber, size: Size) -> bool {
        if !self.contains(page) || size.is_degenerate() {
            return false;
        }
        self.geometry.insert(page, size);
        true
    }

    pub fn geometry(&self, page: PageNumber) -> Option<Size> {
        self.geometry.get(&page).copied()
    }

    pub fn geometry_len(&self) -> usize {
        self.geometry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_document_bounds() {
        let mut pages = PageSet::new();
        assert_eq!(pages.clamp(3), None);

        pages.reset(10);
        assert_eq!(pages.clamp(0), Some(1));
        assert_eq!(pages.clamp(7), Some(7));
        assert_eq!(pages.clamp(99), Some(10));
    }

    #[test]
    fn geometry_rejects_bad_input() {
        let mut pages = PageSet::new();
        pages.reset(5);

        assert!(!pages.record_geometry(0, Size::new(612.0, 792.0)));
        assert!(!pages.record_geometry(6, Size::new(612.0, 792.0)));
        assert!(!pages.record_geometry(2, Size::new(0.0, 792.0)));
        assert_eq!(pages.geometry_len(), 0);

        assert!(pages.record_geometry(2, Size::new(612.0, 792.0)));
        assert_eq!(pages.geometry(2), Some(Size::new(612.0, 792.0)));
    }

    #[test]
    fn reset_discards_accumulated_geometry() {
        let mut pages = PageSet::new();
        pages.reset(5);
        assert!(pages.record_geometry(1, Size::new(600.0, 800.0)));

        pages.reset(3);
        assert_eq!(pages.geometry(1), None);
        assert_eq!(pages.page_count(), 3);
    }
}
