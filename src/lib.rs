//! Catalog maintenance for the Mutopia Project sheet-music archive.
//!
//! Core modules:
//! - [`reconcile`] - The database update pass
//! - [`rdf`] - RDF descriptor parsing and fetching
//! - [`instruments`] - Instrument name normalization
//! - [`mutopia_id`] - Footer identifier parsing
//! - [`db`] - Database schema and queries
//! - [`models`] - Catalog record types
//!
//! ### Supporting Modules
//!
//! - [`config`] - Configuration and data directory management
//! - [`reference`] - Reference data seeding and export
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use mutopia::{config, db, rdf, reconcile};
//!
//! let config = config::RuntimeConfig::load(None)?;
//! let mut conn = db::init_database(&config.db_path, false)?;
//!
//! db::mark_pending(&conn, "BachJS/BWV846/wtk1-prelude1", Default::default())?;
//!
//! let settings = reconcile::ReconcileSettings::from_config(&config)?;
//! let source = rdf::HttpSource::new(config.connect_timeout(), config.read_timeout());
//! let summary = reconcile::run_pass(&mut conn, &source, &settings, &mut reconcile::LogSink)?;
//! println!("Published {} pieces", summary.published.len());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Public functions return `anyhow::Result`. Conditions the update pass
//! recovers from are typed ([`rdf::FetchError`], [`rdf::DescriptorError`],
//! [`mutopia_id::FooterError`]); a [`reconcile::MissingReference`] aborts the
//! pass and rolls it back.

pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod instruments;
pub mod models;
pub mod mutopia_id;
pub mod rdf;
pub mod reconcile;
pub mod reference;
