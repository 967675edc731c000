use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::search::TextRun;
use crate::{PageNumber, Size};

/// RGBA pixels for one rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One page's slice of a host visibility report. `top_offset` is the page
/// top's distance from the viewport top, in the host's own units.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityEntry {
    pub page: PageNumber,
    pub is_intersecting: bool,
    pub visible_ratio: f32,
    pub top_offset: f32,
}

impl VisibilityEntry {
    pub fn visible(page: PageNumber, visible_ratio: f32, top_offset: f32) -> Self {
        Self {
            page,
            is_intersecting: true,
            visible_ratio,
            top_offset,
        }
    }

    pub fn hidden(page: PageNumber) -> Self {
        Self {
            page,
            is_intersecting: false,
            visible_ratio: 0.0,
            top_offset: 0.0,
        }
    }
}

/// A parsed document the engine can query. Implementations sit in front of the
/// actual rendering library and stay oblivious to viewport state.
pub trait LoadedDocument: Send + Sync {
    fn page_count(&self) -> u32;
    fn page_size(&self, page: PageNumber) -> Result<Size>;
    fn page_text(&self, page: PageNumber) -> Result<Vec<TextRun>>;
    fn render_page(&self, page: PageNumber, scale: f32) -> Result<RenderedPage>;
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, bytes: Bytes) -> Result<Arc<dyn LoadedDocument>>;
}
