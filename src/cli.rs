use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // Release builds carry the tag at HEAD
    if let Some(tag) = option_env!("FFPROVISION_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("FFPROVISION_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("FFPROVISION_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "ffprovision")]
#[command(about = "Locate, download and install the ffmpeg binary used for waveform rendering")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether ffmpeg is available in PATH or in the install folder
    ///
    /// Exits with status 1 only when the configured binary path is missing.
    Check,

    /// Download a known-compatible ffmpeg build and record its path
    #[command(
        after_help = "Examples:\n  ffprovision install\n  ffprovision install --yes --url https://example.com/ffmpeg-win64.zip"
    )]
    Install {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Release archive to install from instead of the pinned build
        #[arg(long)]
        url: Option<String>,
        /// Install folder instead of the configured one
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show where to download ffmpeg manually
    DownloadPage,

    /// Print the ffmpeg binary the waveform pipeline should use
    Path,

    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a setting (if omitted, shows all settings)
    Get { key: Option<String> },
    /// Set a setting (e.g., 'wave-detail=high' or 'wave-detail high')
    Set {
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
    /// Reset a setting to its default
    Unset { key: String },
    /// Show full configuration
    Show {
        /// Output format (json, yaml, plain)
        #[arg(long, default_value = "json")]
        format: String,
    },
}
