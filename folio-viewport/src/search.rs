use std::collections::BTreeMap;

use crate::PageNumber;

/// One extracted text run. `item_index` is the run's position in the page's
/// reading order and is what highlight lookups key on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub item_index: usize,
    pub text: String,
}

impl TextRun {
    pub fn new(item_index: usize, text: impl Into<String>) -> Self {
        Self {
            item_index,
            text: text.into(),
        }
    }
}

/// A query hit. Offsets are character positions within the run's text,
/// end-exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub page: PageNumber,
    pub item_index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Highlight flags for one run: does any match touch it, and does the
/// currently selected match live in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunHighlight {
    pub matched: bool,
    pub current: bool,
}

/// Text index over the pages that have materialized so far. Searches only see
/// indexed pages; results grow as later pages report their text and the query
/// is resubmitted.
#[derive(Debug, Default)]
pub struct SearchIndex {
    runs: BTreeMap<PageNumber, Vec<TextRun>>,
    query: String,
    matches: Vec<SearchMatch>,
    current: Option<usize>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the text index and any active query; used on document close.
    pub fn clear(&mut self) {
        self.runs.clear();
        self.clear_state();
    }

    /// Drops the query and its matches but keeps the indexed text.
    pub fn clear_state(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.current = None;
    }

    /// Replaces the runs for one page. Re-rendering a page re-extracts its
    /// text, so replacement has to be idempotent.
    pub fn index_page(&mut self, page: PageNumber, mut runs: Vec<TextRun>) {
        runs.sort_by_key(|run| run.item_index);
        self.runs.insert(page, runs);
    }

    pub fn indexed_pages(&self) -> usize {
        self.runs.len()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.current.and_then(|index| self.matches.get(index))
    }

    /// Runs a case-insensitive scan over every indexed run. A query with no
    /// visible characters clears the active search instead of matching
    /// everything.
    pub fn search(&mut self, query: &str) {
        self.matches.clear();
        self.current = None;
        if query.trim().is_empty() {
            self.query.clear();
            return;
        }
        self.query = query.to_owned();

        let needle = fold_chars(query);
        for (page, runs) in &self.runs {
            for run in runs {
                scan_run(*page, run, &needle, &mut self.matches);
            }
        }
        if !self.matches.is_empty() {
            self.current = Some(0);
        }
    }

    /// Advances the selection, wrapping past the last match.
    pub fn next(&mut self) -> Option<usize> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let next = match self.current {
            None => 0,
            Some(index) => (index + 1) % len,
        };
        self.current = Some(next);
        self.current
    }

    /// Moves the selection back, wrapping before the first match.
    pub fn previous(&mut self) -> Option<usize> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let previous = match self.current {
            None | Some(0) => len - 1,
            Some(index) => index - 1,
        };
        self.current = Some(previous);
        self.current
    }

    pub fn run_highlight(&self, page: PageNumber, item_index: usize) -> RunHighlight {
        let mut highlight = RunHighlight::default();
        for (index, found) in self.matches.iter().enumerate() {
            if found.page == page && found.item_index == item_index {
                highlight.matched = true;
                if self.current == Some(index) {
                    highlight.current = true;
                }
            }
        }
        highlight
    }
}

fn fold_chars(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

/// Case folding that never changes the character count, so match offsets stay
/// valid against the original run text.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn scan_run(page: PageNumber, run: &TextRun, needle: &[char], out: &mut Vec<SearchMatch>) {
    if needle.is_empty() {
        return;
    }
    let haystack: Vec<char> = run.text.chars().collect();
    if haystack.len() < needle.len() {
        return;
    }

    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        let window = &haystack[start..start + needle.len()];
        if window
            .iter()
            .zip(needle)
            .all(|(have, want)| fold_char(*have) == *want)
        {
            out.push(SearchMatch {
                page,
                item_index: run.item_index,
                text: window.iter().collect(),
                start,
                end: start + needle.len(),
            });
        }
        // Resume one character past the match start, so overlaps are found.
        start += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(page: PageNumber, runs: &[(usize, &str)]) -> SearchIndex {
        let mut index = SearchIndex::new();
        index.index_page(
            page,
            runs.iter()
                .map(|(item, text)| TextRun::new(*item, *text))
                .collect(),
        );
        index
    }

    #[test]
    fn finds_every_occurrence_with_character_offsets() {
        let mut index = indexed(1, &[(0, "concatenate cats")]);
        index.search("cat");

        let offsets: Vec<(usize, usize)> =
            index.matches().iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(offsets, vec![(3, 6), (12, 15)]);
        assert_eq!(index.current_index(), Some(0));
    }

    #[test]
    fn matching_ignores_case_but_reports_original_text() {
        let mut index = indexed(1, &[(0, "The Cathedral")]);
        index.search("CAT");

        let found = &index.matches()[0];
        assert_eq!(found.text, "Cat");
        assert_eq!((found.start, found.end), (4, 7));
    }

    #[test]
    fn overlapping_occurrences_are_all_reported() {
        let mut index = indexed(1, &[(0, "aaa")]);
        index.search("aa");

        let offsets: Vec<usize> = index.matches().iter().map(|m| m.start).collect();
        assert_eq!(offsets, vec![0, 1]);
    }

    #[test]
    fn blank_query_clears_the_active_search() {
        let mut index = indexed(1, &[(0, "concatenate cats")]);
        index.search("cat");
        assert_eq!(index.matches().len(), 2);

        index.search("   ");
        assert!(index.matches().is_empty());
        assert_eq!(index.current_index(), None);
        assert_eq!(index.query(), "");
    }

    #[test]
    fn matches_are_ordered_by_page_then_run_then_offset() {
        let mut index = SearchIndex::new();
        index.index_page(
            2,
            vec![TextRun::new(0, "a cat appears"), TextRun::new(1, "cat cat")],
        );
        index.index_page(1, vec![TextRun::new(3, "the cat sat")]);
        index.search("cat");

        let keys: Vec<(PageNumber, usize, usize)> = index
            .matches()
            .iter()
            .map(|m| (m.page, m.item_index, m.start))
            .collect();
        assert_eq!(keys, vec![(1, 3, 4), (2, 0, 2), (2, 1, 0), (2, 1, 4)]);
    }

    #[test]
    fn navigation_wraps_in_both_directions() {
        let mut index = indexed(1, &[(0, "cat cat cat")]);
        index.search("cat");
        assert_eq!(index.current_index(), Some(0));

        assert_eq!(index.next(), Some(1));
        assert_eq!(index.next(), Some(2));
        assert_eq!(index.next(), Some(0));
        assert_eq!(index.previous(), Some(2));
    }

    #[test]
    fn navigation_without_matches_is_a_no_op() {
        let mut index = indexed(1, &[(0, "nothing here")]);
        index.search("cat");
        assert_eq!(index.next(), None);
        assert_eq!(index.previous(), None);
    }

    #[test]
    fn run_highlight_distinguishes_the_current_match() {
        let mut index = SearchIndex::new();
        index.index_page(1, vec![TextRun::new(0, "cat"), TextRun::new(1, "cat")]);
        index.search("cat");

        assert_eq!(
            index.run_highlight(1, 0),
            RunHighlight {
                matched: true,
                current: true
            }
        );
        assert_eq!(
            index.run_highlight(1, 1),
            RunHighlight {
                matched: true,
                current: false
            }
        );
        assert_eq!(index.run_highlight(2, 0), RunHighlight::default());

        index.next();
        assert!(index.run_highlight(1, 1).current);
        assert!(!index.run_highlight(1, 0).current);
    }

    #[test]
    fn reindexing_a_page_replaces_its_runs() {
        let mut index = indexed(1, &[(0, "cat")]);
        index.index_page(1, vec![TextRun::new(0, "dog")]);
        index.search("cat");
        assert!(index.matches().is_empty());
    }

    #[test]
    fn clear_state_keeps_the_text_index() {
        let mut index = indexed(1, &[(0, "cat")]);
        index.search("cat");
        index.clear_state();

        assert_eq!(index.indexed_pages(), 1);
        assert!(index.matches().is_empty());

        index.search("cat");
        assert_eq!(index.matches().len(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut index = indexed(1, &[(0, "cat")]);
        index.search("cat");
        index.clear();

        assert_eq!(index.indexed_pages(), 0);
        index.search("cat");
        assert!(index.matches().is_empty());
    }
}
