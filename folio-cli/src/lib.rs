use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use folio_render::PdfiumDocumentSource;
use folio_viewport::{
    EngineConfig, LoadedDocument, PageNumber, RenderedPage, SearchMatch, Size, ViewportEngine,
    ZoomIntent,
};

#[derive(Parser)]
#[command(name = "folio", version, about = "Inspect, search, and render paged documents")]
struct Cli {
    /// Engine settings file (TOML). A missing file falls back to defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print page count and first-page geometry.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Emit machine-readable JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Render one page to an image file.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Page to render, counted from 1.
        #[arg(long, value_name = "PAGE", default_value_t = 1)]
        page: PageNumber,
        /// Zoom percentage applied to the page's intrinsic size.
        #[arg(long, value_name = "PERCENT", default_value_t = 100.0)]
        zoom: f32,
        /// Where to write the image. Format follows the file extension.
        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Search the document text and list every match.
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Query text. Matching is case-insensitive.
        #[arg(value_name = "QUERY")]
        query: String,
        /// Emit machine-readable JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Resolve a fit-width or fit-page zoom for a container size.
    Fit {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Which fit rule to apply.
        #[arg(long, value_enum, default_value_t = FitMode::Width)]
        mode: FitMode,
        /// Container width in pixels.
        #[arg(long, value_name = "PX", default_value_t = 800.0)]
        width: f32,
        /// Container height in pixels.
        #[arg(long, value_name = "PX", default_value_t = 600.0)]
        height: f32,
        /// Page whose geometry drives the fit.
        #[arg(long, value_name = "PAGE", default_value_t = 1)]
        page: PageNumber,
        /// Emit machine-readable JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print the version.
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FitMode {
    Width,
    Page,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Width => f.write_str("width"),
            FitMode::Page => f.write_str("page"),
        }
    }
}

#[derive(Serialize)]
struct InfoOutput {
    path: String,
    pages: u32,
    page_width: Option<f32>,
    page_height: Option<f32>,
}

#[derive(Serialize)]
struct SearchOutput {
    query: String,
    total: usize,
    matches: Vec<MatchOutput>,
}

#[derive(Serialize)]
struct MatchOutput {
    page: PageNumber,
    item: usize,
    start: usize,
    end: usize,
    text: String,
}

impl From<&SearchMatch> for MatchOutput {
    fn from(hit: &SearchMatch) -> Self {
        Self {
            page: hit.page,
            item: hit.item_index,
            start: hit.start,
            end: hit.end,
            text: hit.text.clone(),
        }
    }
}

#[derive(Serialize)]
struct FitOutput {
    mode: String,
    page: PageNumber,
    container_width: f32,
    container_height: f32,
    scale: f32,
    zoom_percent: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let _guard = init_logging()?;

    let config = match cli.config.as_deref() {
        Some(path) => EngineConfig::load_or_default(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Commands::Info { file, json } => info_command(&runtime, &file, config, json),
        Commands::Render { file, page, zoom, output } => {
            render_command(&runtime, &file, config, page, zoom, &output)
        }
        Commands::Search { file, query, json } => {
            search_command(&runtime, &file, config, &query, json)
        }
        Commands::Fit { file, mode, width, height, page, json } => {
            fit_command(&runtime, &file, config, mode, Size::new(width, height), page, json)
        }
        Commands::Version => {
            println!("folio {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct OpenedDocument {
    engine: ViewportEngine,
    document: Arc<dyn LoadedDocument>,
}

/// The path is checked and read before pdfium is bound, so a bad path fails
/// without the native library.
fn open_engine(
    runtime: &tokio::runtime::Runtime,
    path: &Path,
    config: EngineConfig,
    anchor: Option<PageNumber>,
) -> Result<OpenedDocument> {
    let bytes = read_document_bytes(path)?;
    let source = Arc::new(PdfiumDocumentSource::new()?);
    let mut engine = ViewportEngine::new(source, config);
    let pages = runtime
        .block_on(engine.open_document(bytes, anchor))
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!(path = %path.display(), pages, "opened document");
    let document = engine
        .document_handle()
        .context("no document handle after open")?;
    engine.drain_events();
    Ok(OpenedDocument { engine, document })
}

fn read_document_bytes(path: &Path) -> Result<Bytes> {
    if !path.exists() {
        bail!("file does not exist: {}", path.display());
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bytes::from(bytes))
}

fn info_command(
    runtime: &tokio::runtime::Runtime,
    file: &Path,
    config: EngineConfig,
    json: bool,
) -> Result<()> {
    let opened = open_engine(runtime, file, config, None)?;
    let pages = opened.engine.page_count();
    let first = if pages > 0 {
        Some(
            opened
                .document
                .page_size(1)
                .context("failed to read first page geometry")?,
        )
    } else {
        None
    };

    let output = InfoOutput {
        path: file.display().to_string(),
        pages,
        page_width: first.map(|size| size.width),
        page_height: first.map(|size| size.height),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}: {} pages", output.path, output.pages);
        if let Some(size) = first {
            println!("first page: {:.1} x {:.1} pt", size.width, size.height);
        }
    }
    Ok(())
}

fn render_command(
    runtime: &tokio::runtime::Runtime,
    file: &Path,
    config: EngineConfig,
    page: PageNumber,
    zoom: f32,
    output: &Path,
) -> Result<()> {
    let scale = config.clamp_percent(zoom) / 100.0;
    let opened = open_engine(runtime, file, config, Some(page))?;
    ensure_page_in_range(page, opened.engine.page_count())?;

    let rendered = opened
        .document
        .render_page(page, scale)
        .with_context(|| format!("failed to render page {page}"))?;
    save_page_image(&rendered, output)?;
    println!("render: page {page} at {:.1}% -> {}", scale * 100.0, output.display());
    Ok(())
}

fn search_command(
    runtime: &tokio::runtime::Runtime,
    file: &Path,
    config: EngineConfig,
    query: &str,
    json: bool,
) -> Result<()> {
    let mut opened = open_engine(runtime, file, config, None)?;
    let generation = opened.engine.generation();
    for page in 1..=opened.engine.page_count() {
        let runs = opened
            .document
            .page_text(page)
            .with_context(|| format!("failed to extract text from page {page}"))?;
        opened.engine.on_page_text(generation, page, runs);
    }
    opened.engine.search(query, Instant::now());

    let matches = opened.engine.search_matches();
    if json {
        let output = SearchOutput {
            query: query.to_owned(),
            total: matches.len(),
            matches: matches.iter().map(MatchOutput::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if matches.is_empty() {
        println!("no matches for {query:?}");
    } else {
        for hit in matches {
            println!("page {:>4}  {}", hit.page, hit.text);
        }
        println!("{} match(es)", matches.len());
    }
    Ok(())
}

fn fit_command(
    runtime: &tokio::runtime::Runtime,
    file: &Path,
    config: EngineConfig,
    mode: FitMode,
    container: Size,
    page: PageNumber,
    json: bool,
) -> Result<()> {
    let mut opened = open_engine(runtime, file, config, Some(page))?;
    ensure_page_in_range(page, opened.engine.page_count())?;

    let intrinsic = opened
        .document
        .page_size(page)
        .with_context(|| format!("failed to read geometry for page {page}"))?;
    let generation = opened.engine.generation();
    let now = Instant::now();
    opened.engine.on_page_rendered(generation, page, intrinsic);
    opened.engine.set_container_size(container);
    let intent = match mode {
        FitMode::Width => ZoomIntent::FitWidth,
        FitMode::Page => ZoomIntent::FitPage(None),
    };
    opened.engine.set_zoom_intent(intent, now);
    opened.engine.tick(now);

    let scale = opened.engine.scale();
    let output = FitOutput {
        mode: mode.to_string(),
        page,
        container_width: container.width,
        container_height: container.height,
        scale,
        zoom_percent: scale * 100.0,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "fit-{}: page {page} in {:.0}x{:.0} -> {:.1}% (scale {:.3})",
            output.mode, container.width, container.height, output.zoom_percent, scale
        );
    }
    Ok(())
}

fn ensure_page_in_range(page: PageNumber, pages: u32) -> Result<()> {
    if page == 0 || page > pages {
        bail!("page {page} is out of range (document has {pages} pages)");
    }
    Ok(())
}

fn save_page_image(page: &RenderedPage, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(page.width, page.height, page.pixels.clone())
        .context("rendered page buffer has unexpected length")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn init_logging() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    match log_file_writer() {
        Some((file_writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            registry.with(file_layer).try_init().map_err(|err| anyhow!(err))?;
            Ok(Some(guard))
        }
        None => {
            registry.try_init().map_err(|err| anyhow!(err))?;
            Ok(None)
        }
    }
}

fn log_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let project_dirs = ProjectDirs::from("", "", "folio")?;
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir).ok()?;
    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    Some(tracing_appender::non_blocking(file_appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_defaults_cover_page_and_zoom() {
        let cli =
            Cli::try_parse_from(["folio", "render", "doc.pdf", "--output", "page.png"]).unwrap();
        match cli.command {
            Commands::Render { page, zoom, .. } => {
                assert_eq!(page, 1);
                assert_eq!(zoom, 100.0);
            }
            _ => panic!("expected render command"),
        }
    }

    #[test]
    fn config_flag_is_accepted_after_the_subcommand() {
        let cli =
            Cli::try_parse_from(["folio", "info", "doc.pdf", "--config", "folio.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("folio.toml")));
    }

    #[test]
    fn fit_mode_parses_from_kebab_names() {
        let cli = Cli::try_parse_from(["folio", "fit", "doc.pdf", "--mode", "page"]).unwrap();
        match cli.command {
            Commands::Fit { mode, .. } => assert_eq!(mode, FitMode::Page),
            _ => panic!("expected fit command"),
        }
    }

    #[test]
    fn page_range_guard_rejects_zero_and_past_the_end() {
        assert!(ensure_page_in_range(0, 5).is_err());
        assert!(ensure_page_in_range(6, 5).is_err());
        assert!(ensure_page_in_range(1, 5).is_ok());
        assert!(ensure_page_in_range(5, 5).is_ok());
    }
}
