#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumDocumentSource;

use folio_viewport::TextRun;

/// Splits raw extracted page text into indexed runs. Lines are the run
/// granularity; blank lines carry nothing searchable and are dropped, and the
/// remaining lines are numbered in reading order.
pub fn text_runs_from_page(raw: &str) -> Vec<TextRun> {
    raw.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(item_index, line)| TextRun::new(item_index, line))
        .collect()
}
