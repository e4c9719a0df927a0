use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tokio::runtime::Handle;

use doc_browser::browser::{DocumentBrowser, IndexPath, Presenter, Section};
use doc_browser::config::BrowserConfig;
use doc_browser::error::Result;
use doc_browser::query::edit::{self, EditOperation};
use doc_browser::query::engine::{QueryEngine, SourceMode};
use doc_browser::query::local::free_document_location;
use doc_browser::state::catalog::Catalog;
use doc_browser::state::document::DocumentIdentity;
use doc_browser::state::results::ResultSet;
use doc_browser::thumbnail::cache::{ThumbnailCache, ThumbnailState};
use doc_browser::thumbnail::render::ImageThumbnailRenderer;

/// Longest wait for outstanding thumbnails
const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// List the documents in a directory the way the browser sees them
#[derive(Parser, Debug)]
#[command(name = "doc-browser", version, about)]
struct Args {
    /// Configuration file (JSON); defaults apply when it does not exist
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to list instead of the configured one
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Allowed extension (repeatable); replaces the configured list
    #[arg(long = "ext")]
    extensions: Vec<String>,

    /// Render thumbnails for every listed document and wait for them
    #[arg(long)]
    thumbnails: bool,
}

/// Prints every change to stdout
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn documents_changed(&mut self, documents: &ResultSet, edits: &[EditOperation]) {
        if edit::is_reload(edits) {
            println!("{} documents", documents.len());
            for document in documents {
                print_document(document);
            }
        } else {
            println!("{edits:?}");
        }
    }

    fn recents_changed(&mut self, recents: &[DocumentIdentity], edits: &[EditOperation]) {
        println!("recents ({}): {edits:?}", recents.len());
    }

    fn thumbnails_ready(&mut self, paths: &[IndexPath]) {
        println!("thumbnails ready for {} rows", paths.len());
    }

    fn thumbnails_failed(&mut self, paths: &[IndexPath]) {
        println!("thumbnails failed for {} rows", paths.len());
    }
}

fn print_document(document: &DocumentIdentity) {
    let accessed = document.last_accessed_label();
    if document.subtitle().is_empty() {
        println!("  {:<40} {accessed}", document.display_name());
    } else {
        println!("  {:<40} {accessed}  ({})", document.display_name(), document.subtitle());
    }
}

fn load_config(args: &Args) -> Result<BrowserConfig> {
    let mut config = match &args.config {
        Some(path) => BrowserConfig::load(path)?,
        None => BrowserConfig::default(),
    };
    if let Some(dir) = &args.dir {
        config.documents_dir = dir.clone();
    }
    if !args.extensions.is_empty() {
        config.allowed_extensions = args.extensions.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    info!("Listing {}", config.documents_dir.display());

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::open(path)?,
        None => Catalog::open_default()?,
    };

    // No external source here, so the engine starts in local mode
    let engine = QueryEngine::spawn(
        config.engine_config(SourceMode::Local),
        Arc::new(config.allowed_extensions.clone()),
    );
    let cache = ThumbnailCache::new(
        config.thumbnails,
        Arc::new(ImageThumbnailRenderer::new()),
        Handle::current(),
    );
    let mut browser = DocumentBrowser::new(&engine, cache, config.recents_capacity, Some(catalog))?;
    let mut presenter = ConsolePresenter;

    // The first delivery is the directory snapshot
    if !browser.step(&mut presenter).await {
        warn!("Query engine stopped before delivering a snapshot");
        return Ok(());
    }

    if !browser.recents().is_empty() {
        println!("recent:");
        for document in browser.recents() {
            print_document(document);
        }
    }

    let new_location = free_document_location(&config.documents_dir, &config.filter())?;
    println!("next new document: {}", new_location.display());

    if args.thumbnails {
        wait_for_thumbnails(&mut browser, &mut presenter).await;
    }

    engine.shutdown().await;
    Ok(())
}

async fn wait_for_thumbnails(browser: &mut DocumentBrowser, presenter: &mut ConsolePresenter) {
    let rows = browser.row_count(Section::Documents);
    for row in 0..rows {
        browser.thumbnail_at(IndexPath::new(Section::Documents, row));
    }

    let pending = |browser: &DocumentBrowser| {
        browser
            .documents()
            .ids()
            .filter(|id| browser.thumbnails().state(id) == ThumbnailState::Loading)
            .count()
    };

    let wait = async {
        while pending(&*browser) > 0 {
            if !browser.step(presenter).await {
                break;
            }
        }
    };
    if tokio::time::timeout(THUMBNAIL_TIMEOUT, wait).await.is_err() {
        warn!("Gave up waiting for {} thumbnails", pending(&*browser));
    }

    for document in browser.documents() {
        if let Some(reason) = browser.thumbnails().failure(document.id()) {
            println!("  no thumbnail for {}: {reason}", document.display_name());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("doc-browser: {err}");
            ExitCode::FAILURE
        }
    }
}
