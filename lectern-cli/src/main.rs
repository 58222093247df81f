use std::sync::Arc;

use clap::Parser;
use error::AppError;
use lectern_engine::{BundledStore, ContentSource, HttpSource, LoadError, ProgressiveLoader};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod error;
mod progress;

use cli::CliArgs;
use progress::{CollectionSummary, ProgressReporter};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // JSON lines own stdout; logs go to stderr then.
    let result = if args.json {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .finish(),
        )
    };
    result.map_err(|e| AppError::Initialization(e.to_string()))?;

    let config = config::loader_config(&args)?;

    let source: Arc<dyn ContentSource> = match (&args.store, &args.url) {
        (Some(dir), _) => {
            info!(store = %dir.display(), "Using bundled store");
            Arc::new(BundledStore::open(dir.clone()).await?)
        }
        (None, Some(url)) => {
            info!(url = %url, "Using HTTP catalog");
            let source = HttpSource::new(url, config.profile.fetch_timeout)?;
            if !source.health_check().await {
                warn!(url = %url, "Catalog health check failed");
            }
            Arc::new(source)
        }
        (None, None) => {
            return Err(AppError::InvalidInput(
                "either --store or --url is required".to_string(),
            ));
        }
    };

    let loader = ProgressiveLoader::new(source, config);
    let reporter = ProgressReporter::new(args.json);

    let mut summaries = Vec::with_capacity(args.keys.len());
    let mut last_error: Option<LoadError> = None;
    for key in &args.keys {
        if !loader.is_known(key) {
            warn!(key = %key, "Collection is not listed by the source");
        }

        let _subscription = reporter.track(&loader, key);
        match loader.load_collection(key).await {
            Ok(items) => {
                let total = loader
                    .loading_state(key)
                    .map_or(items.len(), |state| state.total);
                summaries.push(CollectionSummary::loaded(key, items.len(), total));
            }
            Err(e) => {
                summaries.push(CollectionSummary::failed(key, &e));
                last_error = Some(e);
            }
        }
    }

    reporter.print_summary(&summaries);

    let stats = loader.cache_stats();
    info!(
        collections = stats.collections_cached,
        items = stats.items_cached,
        "Finished"
    );

    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
