use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::providers::Category;

#[derive(Parser)]
#[command(
    name = "reelforge",
    about = "Reelforge - Generate short-video scripts, images and voiceovers with automatic provider fallback",
    version,
    long_about = "Generates video scripts, images and narration through external AI providers. Each content category keeps a prioritized provider list; when a provider fails the next one is tried."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./reelforge.yaml or the user config directory)
    #[arg(short, long, global = true, env = "REELFORGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a script, image or voiceover
    Generate {
        /// Content category
        #[arg(value_enum)]
        category: Category,

        /// Topic for scripts, description for images, narration text for voice
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Output file path (scripts print to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Try at most this many providers
        #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..))]
        max_attempts: Option<u64>,

        /// Give up on the whole request after this many seconds
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Send a script prompt as-is instead of wrapping it in the narration template
        #[arg(long)]
        verbatim: bool,

        /// Voice identifier or voice name (voice category)
        #[arg(long)]
        voice: Option<String>,

        /// Image aspect ratio such as 16:9 or 9:16 (image category)
        #[arg(long, value_name = "RATIO")]
        aspect_ratio: Option<String>,

        /// Maximum tokens for script generation
        #[arg(long, value_name = "TOKENS")]
        max_tokens: Option<u32>,

        /// Substitute a local placeholder asset when no provider succeeds
        #[arg(long)]
        placeholder: bool,
    },

    /// Show configuration and connectivity of every provider
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List providers in the order they are tried, without network checks
    Providers,

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration to the config path
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
