//! `memopipe store` - manage the content-addressable store

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use memopipe_store::Store;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub action: StoreAction,

    /// Store directory (overrides config)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// List cached entries
    List,
    /// Verify content hashes
    Verify {
        /// Specific key to verify (default: all)
        key: Option<String>,
    },
    /// Remove leftover staging files
    Cleanup,
    /// Delete every cached entry
    Clear {
        /// Actually delete (otherwise dry-run)
        #[arg(long)]
        confirm: bool,
    },
}

pub fn run(args: StoreArgs, config: &Config) -> Result<()> {
    let dir = args
        .dir
        .or_else(|| config.cache.dir.clone())
        .context("no store directory; pass --dir or set cache.dir in the config")?;

    match args.action {
        StoreAction::List => list(&dir),
        StoreAction::Verify { key } => verify(&dir, key.as_deref()),
        StoreAction::Cleanup => cleanup(&dir),
        StoreAction::Clear { confirm } => clear(&dir, confirm),
    }
}

fn short(key: &str) -> &str {
    &key[..std::cmp::min(12, key.len())]
}

fn list(dir: &Path) -> Result<()> {
    let store = Store::new(dir)?;
    let entries = store.list()?;

    if entries.is_empty() {
        eprintln!("No cached entries.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Key").fg(Color::Cyan),
            Cell::new("Size").fg(Color::Cyan),
            Cell::new("Integrity").fg(Color::Cyan),
            Cell::new("Created").fg(Color::Cyan),
        ]);

    let mut total = 0u64;
    for entry in &entries {
        total += entry.size;
        table.add_row(vec![
            short(&entry.key),
            &entry.size.to_string(),
            short(&entry.integrity),
            &entry.created_at,
        ]);
    }

    eprintln!("{table}");
    eprintln!("{} entries, {} bytes", entries.len(), total);
    Ok(())
}

fn verify(dir: &Path, key: Option<&str>) -> Result<()> {
    let store = Store::new(dir)?;
    let results = match key {
        Some(key) => vec![store.verify(key)?],
        None => store.verify_all()?,
    };

    let mut bad = 0;
    for result in &results {
        if result.ok {
            eprintln!("ok       {}", short(&result.key));
        } else {
            bad += 1;
            eprintln!(
                "CORRUPT  {}  expected {} got {}",
                short(&result.key),
                result.expected,
                result.actual
            );
        }
    }

    if bad > 0 {
        anyhow::bail!("{bad} of {} entries corrupt", results.len());
    }
    eprintln!("{} entries verified", results.len());
    Ok(())
}

fn cleanup(dir: &Path) -> Result<()> {
    let store = Store::new(dir)?;
    let removed = store.cleanup_tmp()?;
    eprintln!("Removed {removed} staging files.");
    Ok(())
}

fn clear(dir: &Path, confirm: bool) -> Result<()> {
    let store = Store::new(dir)?;
    if !confirm {
        let entries = store.list()?;
        eprintln!(
            "Would delete {} entries. Re-run with --confirm to proceed.",
            entries.len()
        );
        return Ok(());
    }
    let removed = store.clear()?;
    eprintln!("Deleted {removed} entries.");
    Ok(())
}
