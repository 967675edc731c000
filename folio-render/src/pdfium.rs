use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use folio_viewport::{
    DocumentSource, LoadedDocument, PageNumber, RenderedPage, Size, TextRun,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{instrument, warn};

use crate::text_runs_from_page;

/// Document source backed by a Pdfium dynamic library. Binding order: the
/// build-provided library, then one next to the executable, then the system.
pub struct PdfiumDocumentSource {
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocumentSource {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentSource for PdfiumDocumentSource {
    async fn load(&self, bytes: Bytes) -> Result<Arc<dyn LoadedDocument>> {
        let document = PdfiumDocument::parse(Arc::clone(&self.pdfium), bytes)?;
        Ok(Arc::new(document))
    }
}

struct RenderCacheEntry {
    page: PageNumber,
    scale: f32,
    image: RenderedPage,
}

struct PdfiumDocument {
    // Declared first: struct fields drop in declaration order, so the cached
    // document is gone before the bindings and buffer it borrows.
    document: Mutex<Option<PdfDocument<'static>>>,
    bytes: Bytes,
    pdfium: Arc<Pdfium>,
    page_count: u32,
    cache: Mutex<Option<RenderCacheEntry>>,
}

impl PdfiumDocument {
    fn parse(pdfium: Arc<Pdfium>, bytes: Bytes) -> Result<Self> {
        let mut parsed = Self {
            document: Mutex::new(None),
            bytes,
            pdfium,
            page_count: 0,
            cache: Mutex::new(None),
        };
        // Parse eagerly so a corrupt document fails the load rather than the
        // first page operation.
        parsed.page_count =
            parsed.with_document(|document| Ok(u32::from(document.pages().len())))?;
        Ok(parsed)
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(self.bytes.as_ref(), None)
            .context("failed to parse document bytes")?;
        // SAFETY: the returned PdfDocument borrows the Pdfium bindings and the
        // byte buffer, both owned by self and alive for as long as the cached
        // document is. The field order above guarantees the document drops
        // before either of them.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            let document = self.open_document()?;
            *guard = Some(document);
        }
        let document = guard.as_ref().expect("document must be loaded");
        f(document)
    }
}

impl LoadedDocument for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_size(&self, page: PageNumber) -> Result<Size> {
        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {page} out of range"))?;
            Ok(Size::new(pdf_page.width().value, pdf_page.height().value))
        })
    }

    fn page_text(&self, page: PageNumber) -> Result<Vec<TextRun>> {
        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {page} out of range"))?;
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {page}"))?;
            Ok(text_runs_from_page(&text.all()))
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, page: PageNumber, scale: f32) -> Result<RenderedPage> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page == page && (entry.scale - scale).abs() < f32::EPSILON {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {page} out of range"))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = pdf_page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {page}"))?;
            let rgba = bitmap.as_image().to_rgba8();
            Ok(RenderedPage {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels: rgba.into_raw(),
            })
        })?;

        let mut cache = self.cache.lock();
        *cache = Some(RenderCacheEntry {
            page,
            scale,
            image: image.clone(),
        });

        Ok(image)
    }
}

fn page_index(page: PageNumber) -> Result<PdfPageIndex> {
    page.checked_sub(1)
        .and_then(|index| PdfPageIndex::try_from(index).ok())
        .ok_or_else(|| anyhow!("page {page} is out of supported range"))
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("FOLIO_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load Pdfium from build-provided path {}: {}",
                    path, err
                );
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
