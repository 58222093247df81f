use clap::{ArgGroup, Parser};
use lectern_engine::Platform;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Progressive collection loader",
    long_about = "Loads content collections from a bundled store directory or an HTTP catalog.\n\
                  \n\
                  Items are fetched in platform-sized batches with a pause between batches,\n\
                  failing items are retried with backoff and skipped once retries run out.\n\
                  Progress is shown per collection, followed by a summary.",
    group(ArgGroup::new("source").required(true).args(["store", "url"]))
)]
pub struct CliArgs {
    /// Collection keys to load, in order
    #[arg(required = true, help = "Collection keys to load, one after another")]
    pub keys: Vec<String>,

    /// Bundled store directory
    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Directory holding catalog.json, items/ and collections/"
    )]
    pub store: Option<PathBuf>,

    /// HTTP catalog endpoint
    #[arg(short, long, value_name = "URL", help = "Base URL of the lessons API")]
    pub url: Option<String>,

    /// Platform profile (detected when omitted)
    #[arg(short, long, value_enum, help = "Platform profile used for batching")]
    pub platform: Option<Platform>,

    #[arg(short, long, help = "Items fetched concurrently per batch")]
    pub batch_size: Option<usize>,

    #[arg(long, value_name = "MS", help = "Pause between batches in milliseconds")]
    pub delay_ms: Option<u64>,

    #[arg(short, long, help = "Attempts per item, the first one included")]
    pub retries: Option<u32>,

    #[arg(long, value_name = "SECS", help = "Timeout per fetch attempt in seconds")]
    pub timeout: Option<u64>,

    /// Emit JSON lines instead of progress bars
    #[arg(long, help = "Print progress snapshots and the summary as JSON lines")]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
