use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::pages::PageSet;
use crate::scale::{self, ScaleOutcome, ZoomIntent};
use crate::scroll::{ScrollAlign, ScrollCoordinator, ScrollPhase};
use crate::search::{RunHighlight, SearchIndex, SearchMatch, TextRun};
use crate::source::{DocumentSource, LoadedDocument, VisibilityEntry};
use crate::timer::OneShotTimer;
use crate::window::RenderWindow;
use crate::{document_id_for_bytes, DocumentId, PageNumber, Size, ViewportError};

/// Monotonic token identifying which document async completions belong to.
/// Completions carrying a stale generation are discarded.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub page_count: u32,
}

/// State changes the host reacts to. Handlers queue these; the host drains
/// them after each call into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    PageCountChanged(u32),
    CurrentPageChanged(PageNumber),
    ScaleResolved(f32),
    SearchResultsChanged {
        total: usize,
        current: Option<usize>,
    },
    /// Pages newly admitted for materialization, in ascending order.
    RenderSetChanged { admitted: Vec<PageNumber> },
    /// The host should scroll so `page` is positioned per `align`.
    ScrollRequested {
        page: PageNumber,
        align: ScrollAlign,
    },
}

/// The viewport engine proper. Single-threaded: every handler takes
/// `&mut self`, takes the caller's clock as an argument, and finishes by
/// queueing events rather than calling back into the host.
pub struct ViewportEngine {
    source: Arc<dyn DocumentSource>,
    config: EngineConfig,
    document: Option<Arc<dyn LoadedDocument>>,
    info: Option<DocumentInfo>,
    generation: Generation,
    pages: PageSet,
    window: RenderWindow,
    scroll: ScrollCoordinator,
    search: SearchIndex,
    container: Size,
    current_page: Option<PageNumber>,
    scale: f32,
    intent: ZoomIntent,
    pending_fit: Option<ZoomIntent>,
    geometry_retry: OneShotTimer,
    events: Vec<ViewportEvent>,
}

impl ViewportEngine {
    pub fn new(source: Arc<dyn DocumentSource>, config: EngineConfig) -> Self {
        let window = RenderWindow::new(config.preload_buffer);
        let scroll = ScrollCoordinator::new(&config);
        Self {
            source,
            config,
            document: None,
            info: None,
            generation: 0,
            pages: PageSet::new(),
            window,
            scroll,
            search: SearchIndex::new(),
            container: Size::new(0.0, 0.0),
            current_page: None,
            scale: 1.0,
            intent: ZoomIntent::Explicit(100.0),
            pending_fit: None,
            geometry_retry: OneShotTimer::new(),
            events: Vec::new(),
        }
    }

    /// Parses `bytes` through the document source and replaces whatever was
    /// open. All prior viewport state is gone even if the load fails.
    #[instrument(skip(self, bytes))]
    pub async fn open_document(
        &mut self,
        bytes: Bytes,
        anchor: Option<PageNumber>,
    ) -> Result<u32, ViewportError> {
        self.generation = self.generation.wrapping_add(1);
        self.reset_document_state();

        let document = self
            .source
            .load(bytes.clone())
            .await
            .map_err(ViewportError::DocumentLoad)?;

        let id = document_id_for_bytes(&bytes);
        let page_count = document.page_count();
        self.document = Some(document);
        self.info = Some(DocumentInfo { id, page_count });
        self.pages.reset(page_count);
        self.emit(ViewportEvent::PageCountChanged(page_count));

        if page_count > 0 {
            let anchor = anchor.and_then(|page| self.pages.clamp(page));
            let admitted = self.window.initialize(page_count, anchor);
            if !admitted.is_empty() {
                self.emit(ViewportEvent::RenderSetChanged { admitted });
            }
            let current = anchor.unwrap_or(1);
            self.current_page = Some(current);
            self.emit(ViewportEvent::CurrentPageChanged(current));
        }

        info!(%id, page_count, "document opened");
        Ok(page_count)
    }

    pub fn close_document(&mut self) {
        if self.document.is_none() {
            return;
        }
        self.generation = self.generation.wrapping_add(1);
        self.reset_document_state();
        self.emit(ViewportEvent::PageCountChanged(0));
    }

    fn reset_document_state(&mut self) {
        self.document = None;
        self.info = None;
        self.pages.reset(0);
        self.window.initialize(0, None);
        self.search.clear();
        self.scroll.reset();
        self.geometry_retry.cancel();
        self.pending_fit = None;
        self.current_page = None;
        self.scale = 1.0;
        self.intent = ZoomIntent::Explicit(100.0);
    }

    /// Navigates to `page` (clamped into range). The page becomes current
    /// immediately and its neighborhood is admitted before any scrolling, so
    /// the target exists by the time the host moves the viewport. `explicit`
    /// marks deliberate jumps, which scroll to the page top; tracking moves
    /// pass false and defer to the scroll arbiter.
    pub fn go_to_page(&mut self, page: PageNumber, explicit: bool, now: Instant) {
        let Some(target) = self.pages.clamp(page) else {
            debug!(page, "navigation ignored, no document open");
            return;
        };

        if self.current_page != Some(target) {
            self.current_page = Some(target);
            self.emit(ViewportEvent::CurrentPageChanged(target));
        }

        let admitted = self.window.admit(target);
        if !admitted.is_empty() {
            self.emit(ViewportEvent::RenderSetChanged { admitted });
        }
        if explicit {
            self.dispatch_scroll(target, true, now);
        }
    }

    /// Ingests a host visibility report. Intersecting pages admit their
    /// neighborhoods first; then the topmost page showing at least the
    /// configured ratio becomes the debounced current-page candidate.
    pub fn on_visibility_batch(&mut self, entries: &[VisibilityEntry], now: Instant) {
        if self.pages.is_empty() {
            return;
        }

        let mut fresh = Vec::new();
        for entry in entries.iter().filter(|entry| entry.is_intersecting) {
            if !self.pages.contains(entry.page) {
                debug!(page = entry.page, "visibility for unknown page ignored");
                continue;
            }
            fresh.extend(self.window.admit(entry.page));
        }
        if !fresh.is_empty() {
            fresh.sort_unstable();
            self.emit(ViewportEvent::RenderSetChanged { admitted: fresh });
        }

        let candidate = entries
            .iter()
            .filter(|entry| {
                entry.is_intersecting
                    && entry.visible_ratio >= self.config.visibility_threshold
                    && self.pages.contains(entry.page)
            })
            .min_by(|a, b| a.top_offset.total_cmp(&b.top_offset))
            .map(|entry| entry.page);
        if let Some(page) = candidate {
            self.scroll.observe_visible(page, now);
        }
    }

    pub fn on_user_scroll(&mut self, now: Instant) {
        self.scroll.on_user_scroll(now);
    }

    /// Fires any due deadlines: quiet-period expiry, scroll-target reset,
    /// debounced current-page reports, and the geometry retry for a pending
    /// fit. Hosts call this from their frame or timer loop.
    pub fn tick(&mut self, now: Instant) {
        if self.geometry_retry.fire_if_due(now) {
            self.finish_pending_fit();
        }
        if let Some(page) = self.scroll.tick(now) {
            if self.pages.contains(page) && self.current_page != Some(page) {
                self.current_page = Some(page);
                self.emit(ViewportEvent::CurrentPageChanged(page));
            }
        }
    }

    /// Records a page's intrinsic size from a finished render. Stale
    /// generations are discarded; a pending fit waiting on this page resolves
    /// right away.
    pub fn on_page_rendered(&mut self, generation: Generation, page: PageNumber, intrinsic: Size) {
        if generation != self.generation {
            debug!(generation, current = self.generation, page, "stale render discarded");
            return;
        }
        if !self.pages.record_geometry(page, intrinsic) {
            warn!(
                page,
                width = intrinsic.width,
                height = intrinsic.height,
                "unusable page geometry ignored"
            );
            return;
        }
        if self.pending_fit.is_some() && page == self.reference_page() {
            self.geometry_retry.cancel();
            self.finish_pending_fit();
        }
    }

    /// Feeds a page's extracted text into the search index.
    pub fn on_page_text(&mut self, generation: Generation, page: PageNumber, runs: Vec<TextRun>) {
        if generation != self.generation {
            debug!(generation, current = self.generation, page, "stale text discarded");
            return;
        }
        if !self.pages.contains(page) {
            return;
        }
        self.search.index_page(page, runs);
    }

    /// Requests a zoom change. Explicit percentages resolve immediately. Fit
    /// intents need the reference page's intrinsic size; when it is missing
    /// the fit stays pending for one bounded retry and then falls back to
    /// actual size. A new intent supersedes any pending fit.
    pub fn set_zoom_intent(&mut self, intent: ZoomIntent, now: Instant) {
        self.pending_fit = None;
        self.geometry_retry.cancel();
        self.intent = intent;

        match self.try_resolve(intent) {
            Ok(scale) => self.apply_scale(scale),
            Err(error) => {
                debug!(%error, "fit deferred until geometry arrives");
                self.pending_fit = Some(intent);
                self.geometry_retry.arm(now, self.config.geometry_retry_delay);
            }
        }
    }

    pub fn set_container_size(&mut self, size: Size) {
        self.container = size;
    }

    /// Runs a search over the indexed text. When there are matches the first
    /// one becomes current and the viewport moves to it.
    pub fn search(&mut self, query: &str, now: Instant) {
        self.search.search(query);
        self.emit_search_results();
        if self.search.current_index().is_some() {
            self.scroll_to_current_match(now);
        }
    }

    pub fn next_match(&mut self, now: Instant) {
        if self.search.next().is_some() {
            self.emit_search_results();
            self.scroll_to_current_match(now);
        }
    }

    pub fn previous_match(&mut self, now: Instant) {
        if self.search.previous().is_some() {
            self.emit_search_results();
            self.scroll_to_current_match(now);
        }
    }

    pub fn close_search(&mut self) {
        self.search.clear_state();
        self.emit_search_results();
    }

    pub fn drain_events(&mut self) -> Vec<ViewportEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn document(&self) -> Option<DocumentInfo> {
        self.info
    }

    /// Handle for the host's render workers. The engine never renders; it
    /// only decides what should be rendered.
    pub fn document_handle(&self) -> Option<Arc<dyn LoadedDocument>> {
        self.document.clone()
    }

    pub fn page_count(&self) -> u32 {
        self.pages.page_count()
    }

    pub fn current_page(&self) -> Option<PageNumber> {
        self.current_page
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_intent(&self) -> ZoomIntent {
        self.intent
    }

    pub fn scroll_phase(&self) -> ScrollPhase {
        self.scroll.phase()
    }

    pub fn render_set(&self) -> Vec<PageNumber> {
        self.window.pages().collect()
    }

    pub fn is_admitted(&self, page: PageNumber) -> bool {
        self.window.is_admitted(page)
    }

    pub fn search_matches(&self) -> &[SearchMatch] {
        self.search.matches()
    }

    pub fn current_match_index(&self) -> Option<usize> {
        self.search.current_index()
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.search.current_match()
    }

    pub fn search_query(&self) -> &str {
        self.search.query()
    }

    pub fn indexed_pages(&self) -> usize {
        self.search.indexed_pages()
    }

    pub fn run_highlight(&self, page: PageNumber, item_index: usize) -> RunHighlight {
        self.search.run_highlight(page, item_index)
    }

    fn emit(&mut self, event: ViewportEvent) {
        self.events.push(event);
    }

    fn emit_search_results(&mut self) {
        self.emit(ViewportEvent::SearchResultsChanged {
            total: self.search.matches().len(),
            current: self.search.current_index(),
        });
    }

    fn reference_page(&self) -> PageNumber {
        self.current_page.unwrap_or(1)
    }

    fn try_resolve(&self, intent: ZoomIntent) -> Result<f32, ViewportError> {
        let reference = self.pages.geometry(self.reference_page());
        match scale::resolve(intent, reference, self.container, &self.config) {
            ScaleOutcome::Resolved(scale) => Ok(scale),
            ScaleOutcome::Pending => Err(ViewportError::GeometryUnavailable {
                page: self.reference_page(),
            }),
        }
    }

    fn finish_pending_fit(&mut self) {
        let Some(intent) = self.pending_fit.take() else {
            return;
        };
        match self.try_resolve(intent) {
            Ok(scale) => self.apply_scale(scale),
            Err(error) => {
                warn!(%error, "fit falling back to actual size");
                self.apply_scale(scale::FALLBACK_SCALE);
            }
        }
    }

    /// Fits collapse into the percentage they resolved to; nothing re-fits on
    /// later container resizes.
    fn apply_scale(&mut self, scale: f32) {
        self.scale = scale;
        self.intent = ZoomIntent::Explicit(scale * 100.0);
        self.emit(ViewportEvent::ScaleResolved(scale));
    }

    fn scroll_to_current_match(&mut self, now: Instant) {
        let Some(page) = self.search.current_match().map(|found| found.page) else {
            return;
        };
        let admitted = self.window.admit(page);
        if !admitted.is_empty() {
            self.emit(ViewportEvent::RenderSetChanged { admitted });
        }
        self.dispatch_scroll(page, false, now);
    }

    fn dispatch_scroll(&mut self, page: PageNumber, explicit: bool, now: Instant) {
        match self
            .scroll
            .request_scroll(page, explicit, self.window.is_admitted(page), now)
        {
            Ok(Some(command)) => self.emit(ViewportEvent::ScrollRequested {
                page: command.page,
                align: command.align,
            }),
            Ok(None) => {}
            Err(error) => debug!(%error, "scroll request dropped"),
        }
    }
}
