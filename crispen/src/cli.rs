//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::api::SizeToken;

/// Crispen - AI upscale and restore for images
#[derive(Parser)]
#[command(
    name = "crispen",
    about = "Upscale or restore images through the OpenAI image edit API",
    version,
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upscale and restore detail without changing content
    Upscale(RunArgs),

    /// Make the image look shot on a modern professional camera
    Restore(RunArgs),

    /// Edit the image with a custom prompt
    Generate {
        /// Prompt sent with the image
        #[arg(short, long)]
        prompt: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
}

/// Arguments shared by every generation command
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Image to send (PNG or JPEG)
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Output size: auto or WIDTHxHEIGHT (overrides config)
    #[arg(short, long)]
    pub size: Option<SizeToken>,

    /// Where to write the result (default: <IMAGE stem>-crispenator.png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format for progress and status
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Key subcommands
#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Save the API key to the work folder
    Set {
        /// The key to store
        key: String,
    },

    /// Show the stored API key (masked)
    Show,
}

/// Output format for run events
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crispen")
        .join("logs")
        .join("crispen.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}
