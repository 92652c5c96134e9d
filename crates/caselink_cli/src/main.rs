//! Caselink CLI
//!
//! Command-line tools for Caselink snapshots and peer configuration.
//!
//! # Commands
//!
//! - `export` - Produce a snapshot archive from a JSON data file
//! - `import` - Apply a snapshot archive and print merge statistics
//! - `peers` - List configured peers from a JSON config file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Caselink command-line snapshot tools.
#[derive(Parser)]
#[command(name = "caselink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a snapshot archive from a JSON data file
    Export {
        /// Path to the data file (JSON object: collection -> record array)
        #[arg(short, long)]
        data: PathBuf,

        /// Export type (mobile, system, outbreak, full)
        #[arg(short = 't', long, default_value = "full")]
        export_type: String,

        /// Restrict to these outbreak ids (repeatable; none = all)
        #[arg(short, long)]
        outbreak: Vec<String>,

        /// Encrypt batch artifacts with this passphrase
        #[arg(short, long)]
        passphrase: Option<String>,

        /// Where to write the archive (defaults to the temp directory)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Records per batch artifact
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Include soft-deleted records
        #[arg(long)]
        include_deleted: bool,

        /// Emit empty collections and allow an empty snapshot
        #[arg(long)]
        include_empty: bool,

        /// Trim outbreak data to the active subset a peer needs
        #[arg(long)]
        redact: bool,
    },

    /// Apply a snapshot archive and print merge statistics
    Import {
        /// Path to the snapshot archive
        archive: PathBuf,

        /// Pre-seed the store from this data file before applying
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Passphrase for encrypted batch artifacts
        #[arg(short, long)]
        passphrase: Option<String>,

        /// Accept only these outbreak ids (repeatable; none = all)
        #[arg(short, long)]
        outbreak: Vec<String>,

        /// Write the merged store back out as a data file
        #[arg(long)]
        save: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List configured peers from a JSON config file
    Peers {
        /// Path to the peer config file (JSON array of descriptors)
        #[arg(short, long)]
        config: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Export {
            data,
            export_type,
            outbreak,
            passphrase,
            out,
            chunk_size,
            include_deleted,
            include_empty,
            redact,
        } => {
            commands::export::run(&commands::export::ExportArgs {
                data,
                export_type,
                outbreaks: outbreak,
                passphrase,
                out,
                chunk_size,
                include_deleted,
                include_empty,
                redact,
            })?;
        }
        Commands::Import {
            archive,
            data,
            passphrase,
            outbreak,
            save,
            format,
        } => {
            commands::import::run(&archive, data.as_deref(), passphrase, outbreak, save, &format)?;
        }
        Commands::Peers { config, format } => {
            commands::peers::run(&config, &format)?;
        }
        Commands::Version => {
            println!("Caselink CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
