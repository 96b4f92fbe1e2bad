use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mapleads")]
#[command(about = "Extracts business leads from a map search and repairs lead CSV files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/mapleads.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the map page and export the leads found
    Scrape(ScrapeArgs),

    /// Fix rows whose name is the not-found sentinel, writing a new file
    Repair(RepairArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Search query, e.g. "padarias em São Paulo"
    #[arg(short, long)]
    pub query: String,

    /// Maximum number of distinct leads to collect
    #[arg(short = 'n', long, default_value = "20")]
    pub max_results: usize,

    /// Output format: 'csv' (default) or 'json'
    #[arg(short = 'f', long, default_value = "csv")]
    pub format: String,

    /// Output directory for the leads file (defaults to Desktop)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Log result nodes that matched no strategy to a separate CSV file
    #[arg(long)]
    pub log_rejections: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RepairArgs {
    /// Lead CSV file to repair (left untouched)
    pub input: PathBuf,

    /// Directory for the repaired file (defaults to the input's directory)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl ScrapeArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("Query cannot be empty".to_string());
        }
        if self.max_results == 0 {
            return Err("Max results must be greater than 0".to_string());
        }
        if !["csv", "json"].contains(&self.format.as_str()) {
            return Err("Output format must be 'csv' or 'json'".to_string());
        }
        Ok(())
    }

    pub fn get_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }
}

/// Desktop when it exists, otherwise the current directory.
pub fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .filter(|d| d.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}
