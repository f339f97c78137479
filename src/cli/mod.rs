pub mod commands;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tankobon")]
#[command(about = "Search, read and download manga from the terminal", long_about = None)]
pub struct Cli {
    /// Open the history screen to continue reading
    #[arg(short, long = "continue")]
    pub continue_reading: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List enabled sources
    Sources,
    /// List available output formats
    Formats,
    /// Show where tankobon keeps its files
    Where(WhereArgs),
    /// Print the reading history
    History,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Download chapters without the TUI
    Download(DownloadArgs),
}

#[derive(Args, Default)]
pub struct WhereArgs {
    /// Configuration directory
    #[arg(long)]
    pub config: bool,
    /// Log directory
    #[arg(long)]
    pub logs: bool,
    /// History database
    #[arg(long)]
    pub history: bool,
    /// Download directory
    #[arg(long)]
    pub downloads: bool,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Clone)]
pub struct DownloadArgs {
    /// Source to search; defaults to downloader.default_source or the first enabled one
    #[arg(short, long)]
    pub source: Option<String>,

    /// Search query
    #[arg(short, long)]
    pub query: String,

    /// Which search result to use, starting at 1
    #[arg(short, long, default_value_t = 1)]
    pub manga: usize,

    /// Chapters to download: "all", "5", "1-3" or "1-3,7,10-12"
    #[arg(short, long, default_value = "all")]
    pub chapters: String,

    /// Output format; defaults to formats.use
    #[arg(short, long)]
    pub format: Option<String>,
}
