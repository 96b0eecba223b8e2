use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convertforge")]
#[command(author, version, about = "Bulk file conversion with bundled delivery")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a batch of files and write the deliveries to a directory
    Convert {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Adapter kind: document, image, raw-image, audio, video
        #[arg(short, long)]
        kind: String,

        /// Conversion options as a JSON object
        #[arg(short, long)]
        options: Option<String>,

        /// Delivery policy: pack10 or all
        #[arg(long)]
        policy: Option<String>,

        /// Maximum concurrent conversions
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Directory deliveries are written to
        #[arg(long)]
        output_dir: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
