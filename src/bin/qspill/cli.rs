use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для QuiverSpill: прогон и диагностика disk-backed буфера
#[derive(Parser, Debug)]
#[command(name = "qspill", version, about = "QuiverSpill CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run a fast producer into a slow consumer through the file buffer
    ///
    /// Примеры:
    ///   qspill pump --items 1000000 --item-size 128 --page-size 1048576
    ///   qspill pump --items 50000 --consumer-delay-us 20 --push --json
    Pump {
        /// Number of items to produce
        #[arg(long, default_value_t = 100_000)]
        items: u64,
        /// Item size in bytes (>= 8, the first 8 bytes carry the sequence number)
        #[arg(long, default_value_t = 64)]
        item_size: usize,
        /// Page size in bytes (soft ceiling per page file)
        #[arg(long, default_value_t = 1024 * 1024)]
        page_size: usize,
        /// Directory for page files (default: QS_SPILL_DIR or temp dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Consumer demand per request()
        #[arg(long, default_value_t = 16)]
        request_batch: u64,
        /// Artificial consumer delay per item, microseconds
        #[arg(long, default_value_t = 0)]
        consumer_delay_us: u64,
        /// Push-only producer on its own thread (ignores demand)
        #[arg(long, default_value_t = false)]
        push: bool,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration (defaults + QS_* env)
    Config {
        /// JSON output
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
