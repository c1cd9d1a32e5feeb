//! fsbridge CLI - files, bundled assets and downloads from the terminal

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fsbridge_core::FsBridge;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// fsbridge - file system bridge with background downloads
#[derive(Parser)]
#[command(name = "fsb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file to use
    #[arg(long, global = true, env = "FSB_CONFIG")]
    config: Option<PathBuf>,

    /// Bundled assets directory (overrides the config)
    #[arg(long, global = true)]
    assets: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL to a file
    Download {
        /// URL to download
        url: String,

        /// Destination file
        dest: PathBuf,

        /// Extra request header, as 'Name: value'
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Job id to use instead of an allocated one
        #[arg(long)]
        job_id: Option<u32>,

        /// Minimum milliseconds between progress updates
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Show file metadata
    Stat { path: PathBuf },

    /// Check whether a path exists
    Exists { path: PathBuf },

    /// Print a file to stdout
    Cat { path: PathBuf },

    /// Write stdin to a file
    Write { path: PathBuf },

    /// Move or rename a file
    Mv { from: PathBuf, to: PathBuf },

    /// Delete a file or directory
    Rm {
        path: PathBuf,

        /// Don't ask before deleting a directory
        #[arg(short, long)]
        yes: bool,
    },

    /// Create a directory and its parents
    Mkdir { path: PathBuf },

    /// Bundled assets
    Assets {
        #[command(subcommand)]
        action: AssetsAction,
    },

    /// Show/reset configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum AssetsAction {
    /// List an asset directory
    Ls {
        #[arg(default_value = "")]
        dir: String,
    },

    /// Show asset metadata
    Stat { path: String },

    /// Print an asset to stdout
    Cat { path: String },

    /// Copy an asset to the file system
    Copy { asset: String, dest: PathBuf },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all config
    Show,

    /// Print the config file location
    Path,

    /// Reset to defaults
    Reset,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("fsbridge"))
            .unwrap_or_else(|| PathBuf::from(".fsbridge"))
            .join("config.json")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = config_path(cli.config);
    let format = cli.output;

    match cli.command {
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "fsb", &mut std::io::stdout());
        }
        Commands::Config { action } => {
            commands::config_action(&config_path, action, format).await?
        }
        command => {
            let mut config = fsbridge_core::config::load_config(&config_path).await?;
            if let Some(assets) = cli.assets {
                config.assets_dir = Some(assets);
            }
            let bridge = FsBridge::new(config)?;
            run(&bridge, command, format).await?;
        }
    }

    Ok(())
}

async fn run(bridge: &FsBridge, command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Download {
            url,
            dest,
            headers,
            job_id,
            interval,
        } => commands::download(bridge, url, dest, headers, job_id, interval, format).await,

        Commands::Ls { dir } => commands::list_dir(bridge, &dir, format).await,

        Commands::Stat { path } => commands::stat(bridge, &path, format).await,

        Commands::Exists { path } => commands::exists(bridge, &path, format).await,

        Commands::Cat { path } => commands::cat(bridge, &path).await,

        Commands::Write { path } => commands::write_stdin(bridge, &path, format).await,

        Commands::Mv { from, to } => commands::move_file(bridge, &from, &to, format).await,

        Commands::Rm { path, yes } => commands::remove(bridge, &path, yes, format).await,

        Commands::Mkdir { path } => commands::mkdir(bridge, &path, format).await,

        Commands::Assets { action } => commands::assets_action(bridge, action, format).await,

        // Handled in main before a bridge is opened
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
    }
}
