//! # mutopia - Catalog Maintenance Tool
//!
//! Keeps the Mutopia catalog database in step with the published archive.
//! Typical use is a cron job running `mutopia update` after new assets have
//! been queued with `mutopia mark-pending`.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and seed reference data
//! mutopia init-db
//! mutopia load-reference reference.toml
//!
//! # Queue a folder and reconcile it
//! mutopia mark-pending BachJS/BWV846/wtk1-prelude1
//! mutopia update
//!
//! # Monitoring
//! mutopia status
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use mutopia::cli::{self, Command};
use mutopia::config::RuntimeConfig;
use mutopia::models::{AssetFile, AssetLayout, Collection};
use mutopia::rdf::HttpSource;
use mutopia::reconcile::{self, LogSink, ReconcileSettings};
use mutopia::{completion, db, reference};
use std::fs;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=info mutopia update` - Per-asset progress
/// - `RUST_LOG=mutopia::rdf=debug mutopia update` - Descriptor fetch details
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(db_path) = args.db.as_deref() {
        config = config.with_db_path(db_path);
    }
    debug!("Using catalog at {}", config.db_path.display());

    match args.command {
        Command::InitDb { force } => {
            db::init_database(&config.db_path, force)?;
            println!("Catalog ready at {}", config.db_path.display());
        }
        Command::LoadReference { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read reference data {}", file.display()))?;
            let data = reference::ReferenceData::from_toml(&text)?;
            let mut conn = db::open(&config.db_path)?;
            let counts = reference::load_reference(&mut conn, &data)?;
            println!(
                "Loaded {} composers, {} styles, {} licenses, {} instruments, {} aliases",
                counts.composers, counts.styles, counts.licenses, counts.instruments, counts.aliases
            );
        }
        Command::Reference => {
            let conn = db::open(&config.db_path)?;
            let listing = reference::list_reference(&conn)?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::MarkPending { folder, archive } => {
            let conn = db::open(&config.db_path)?;
            let status = db::mark_pending(&conn, &folder, AssetLayout::from_has_lys(archive))?;
            let tag = match status {
                db::PendingStatus::New => "[new]   ",
                db::PendingStatus::Refreshed => "[update]",
            };
            println!("{tag} - {folder}");
        }
        Command::Update => {
            let settings = ReconcileSettings::from_config(&config)?;
            let source = HttpSource::new(config.connect_timeout(), config.read_timeout());
            let mut conn = db::open(&config.db_path)?;

            let summary = reconcile::run_pass(&mut conn, &source, &settings, &mut LogSink)
                .context("Database update aborted, no changes were saved")?;

            info!(
                "Update complete: {} published, {} still pending, {} pieces gained instruments",
                summary.published.len(),
                summary.skipped.len(),
                summary.instruments_linked
            );
            println!(
                "Published {} piece(s); {} asset(s) still pending",
                summary.published.len(),
                summary.skipped.len()
            );
        }
        Command::Status => {
            let conn = db::open(&config.db_path)?;
            let status = db::site_status(&conn)?;
            println!("{}", serde_json::to_string(&status)?);
        }
        Command::Alias { raw, instrument } => {
            let conn = db::open(&config.db_path)?;
            db::save_instrument_alias(&conn, &raw, &instrument)?;
            println!("{raw} -> {instrument}");
        }
        Command::Assets { folder } => {
            let conn = db::open(&config.db_path)?;
            let asset = db::get_asset_by_folder(&conn, folder.trim_matches('/'))?
                .ok_or_else(|| anyhow::anyhow!("No asset for folder `{folder}`"))?;
            println!("{}", asset.rdf_url(&config.base_url));
            for file in AssetFile::ALL {
                println!("{}", asset.file_url(&config.base_url, file));
            }
        }
        Command::Collection { tag, title, pieces } => {
            let conn = db::open(&config.db_path)?;
            let collection = Collection { tag, title };
            db::add_to_collection(&conn, &collection, &pieces)?;
            println!(
                "{}: {} piece(s), info file {}",
                collection.tag,
                db::collection_pieces(&conn, &collection.tag)?.len(),
                collection.user_infofile()
            );
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
