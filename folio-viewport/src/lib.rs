pub mod config;
pub mod engine;
pub mod pages;
pub mod scale;
pub mod scroll;
pub mod search;
pub mod source;
pub mod timer;
pub mod window;

use once_cell::sync::Lazy;
use thiserror::Error;
use uuid::Uuid;

pub use config::EngineConfig;
pub use engine::{DocumentInfo, Generation, ViewportEngine, ViewportEvent};
pub use scale::{ScaleOutcome, ZoomIntent};
pub use scroll::{ScrollAlign, ScrollPhase};
pub use search::{RunHighlight, SearchMatch, TextRun};
pub use source::{DocumentSource, LoadedDocument, RenderedPage, VisibilityEntry};

/// Pages are numbered from 1, matching what a viewer shows in its page indicator.
pub type PageNumber = u32;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1a6c2d-8e4b-5b7f-9d02-c41a97b0d6ee").expect("valid namespace UUID")
});

/// Stable identity for a document derived from its raw bytes, so reopening the
/// same file yields the same id regardless of where it came from.
pub fn document_id_for_bytes(bytes: &[u8]) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, bytes)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !self.width.is_finite()
            || !self.height.is_finite()
    }
}

#[derive(Debug, Error)]
pub enum ViewportError {
    #[error("failed to load document")]
    DocumentLoad(#[source] anyhow::Error),
    #[error("page {page} is not materialized yet")]
    ScrollTargetNotReady { page: PageNumber },
    #[error("intrinsic size of page {page} is not known yet")]
    GeometryUnavailable { page: PageNumber },
}
