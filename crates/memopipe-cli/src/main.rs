//! memopipe - Cached batch transform pipeline
//!
//! Pipes a batch of input files through an expensive transform command,
//! memoizing results in a content-addressed store so identical inputs
//! are only ever computed once.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "memopipe")]
#[command(about = "Cached batch transform pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./memopipe.toml or ~/.config/memopipe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Transform a batch of inputs into one output, with caching
    Run(cmd::run::RunArgs),
    /// Manage the content-addressable store (cache)
    Store(cmd::store::StoreArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(memopipe_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  (the progress bar shows activity)
    //   non-TTY: info unless --debug          (logs are the only progress indicator)
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    memopipe_core::init_logging(quiet, cli.debug, multi);

    // Load configuration
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Store(args) => cmd::store::run(args, &config),
        Command::Config => {
            use comfy_table::{
                modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            let cache_dir = config
                .cache
                .dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(caching disabled)".to_string());
            table.add_row(vec!["Cache directory", &cache_dir]);
            table.add_row(vec![
                "Cache idle timeout",
                &format!("{}s", config.cache.timeout_secs),
            ]);
            table.add_row(vec![
                "Workers",
                &format!("{} (min: {})", config.workers.max, config.workers.min),
            ]);
            table.add_row(vec![
                "Transform timeout",
                &format!("{}s", config.workers.timeout_secs),
            ]);

            eprintln!("{table}");
            Ok(())
        }
    }
}
