use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use zipinstall::commands;
use zipinstall::commands::install::InstallOptions;

#[derive(Parser)]
#[clap(name = "zipinstall")]
#[clap(about = "Download a zip archive and unpack it safely")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG takes precedence
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an archive and install it into the destination directory
    Install {
        /// Archive URL (defaults to the configured source_url)
        url: Option<String>,
        /// Destination directory (defaults to the configured destination)
        #[clap(short, long)]
        dest: Option<PathBuf>,
        /// Do not ask for confirmation
        #[clap(short, long)]
        yes: bool,
        /// Extract into a staging directory and swap it in only on success
        #[clap(long)]
        staged: bool,
        /// Apply file modes from the archive without clamping them
        #[clap(long)]
        keep_modes: bool,
    },
    /// Unpack a local zip archive with the same safety checks
    Extract {
        /// Path to the zip archive
        archive: PathBuf,
        /// Destination directory
        #[clap(short, long)]
        dest: PathBuf,
        /// Extract into a staging directory and swap it in only on success
        #[clap(long)]
        staged: bool,
        /// Apply file modes from the archive without clamping them
        #[clap(long)]
        keep_modes: bool,
    },
    /// Show or change the stored configuration
    Config {
        #[clap(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Store the default archive URL
    SetUrl {
        /// http(s) URL of the archive
        url: String,
    },
    /// Store the default destination directory
    SetDest {
        /// Directory to install into
        dest: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Install {
            url,
            dest,
            yes,
            staged,
            keep_modes,
        } => commands::install::install(InstallOptions {
            url,
            destination: dest,
            yes,
            staged,
            keep_modes,
        })
        .map_err(|e| anyhow::anyhow!(e)),
        Commands::Extract {
            archive,
            dest,
            staged,
            keep_modes,
        } => commands::extract::extract_local(&archive, &dest, staged, keep_modes)
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Config { command } => match command.unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => {
                commands::config::show_config().map_err(|e| anyhow::anyhow!(e))
            }
            ConfigCommands::SetUrl { url } => {
                commands::config::set_url(&url).map_err(|e| anyhow::anyhow!(e))
            }
            ConfigCommands::SetDest { dest } => {
                commands::config::set_destination(&dest).map_err(|e| anyhow::anyhow!(e))
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
