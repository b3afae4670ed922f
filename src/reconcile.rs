//! # Catalog Reconciler
//!
//! The database update pass. Assets flagged unpublished are re-read from their
//! RDF descriptors and folded into the catalog:
//!
//! 1. [`reconcile_pending`] creates or updates one [`Piece`] per readable
//!    descriptor and marks its asset published.
//! 2. [`rebuild_instrument_associations`] links every piece with an empty
//!    instrument set to the instruments its raw text resolves to.
//!
//! [`run_pass`] runs both inside one transaction. Unreachable descriptors and
//! bad footers only skip the asset (it stays pending for the next run). A
//! composer, style or license missing from the reference tables aborts the
//! whole pass and nothing is written.

use crate::config::RuntimeConfig;
use crate::db;
use crate::instruments::{normalize_instrument_name, InstrumentTokenizer};
use crate::models::{AssetMap, Piece};
use crate::mutopia_id::parse_mutopia_id;
use crate::rdf::{parse_descriptor, DescriptorSource, PieceDescriptor};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rusqlite::Connection;
use std::collections::BTreeSet;
use thiserror::Error;

/// Inputs of a pass that do not live in the database.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Root URL of the published archive.
    pub base_url: String,
    pub tokenizer: InstrumentTokenizer,
}

impl ReconcileSettings {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            tokenizer: InstrumentTokenizer::new(
                &config.instrument_separator,
                config.min_instrument_token_len,
            )?,
        })
    }
}

/// A reference row named by a descriptor is not in the catalog.
#[derive(Debug, Error)]
#[error("{table} `{key}` required by {folder} is not in the catalog")]
pub struct MissingReference {
    pub table: &'static str,
    pub key: String,
    pub folder: String,
}

/// Whether reconciliation created a piece or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    New,
    Updated,
}

/// Progress of a pass, reported to a [`ReconcileSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    Reading { folder: String, url: String },
    FetchFailed { folder: String, reason: String },
    DescriptorUnreadable { folder: String, reason: String },
    FooterRejected { folder: String, reason: String },
    Published { folder: String, piece_id: i64, title: String, status: PieceStatus },
    StaleAssetsRemoved { piece_id: i64, count: usize },
    /// The asset was removed earlier in the pass as stale.
    Superseded { folder: String },
    InstrumentsAdded { piece_id: i64, instruments: Vec<String> },
    NoInstruments { piece_id: i64, raw_instrument: String },
}

/// Receives progress events from the reconciler.
pub trait ReconcileSink {
    fn record(&mut self, event: ReconcileEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReconcileSink for LogSink {
    fn record(&mut self, event: ReconcileEvent) {
        match event {
            ReconcileEvent::Reading { url, .. } => info!("Reading RDF {url}"),
            ReconcileEvent::FetchFailed { folder, reason } => {
                info!("Leaving {folder} pending: {reason}");
            }
            ReconcileEvent::DescriptorUnreadable { folder, reason } => {
                warn!("Unreadable descriptor for {folder}: {reason}");
            }
            ReconcileEvent::FooterRejected { folder, reason } => {
                warn!("Skipping {folder}: {reason}");
            }
            ReconcileEvent::Published { piece_id, title, status, .. } => {
                let status = match status {
                    PieceStatus::New => "new",
                    PieceStatus::Updated => "update",
                };
                info!("  {status}: {piece_id} - {title}");
            }
            ReconcileEvent::StaleAssetsRemoved { piece_id, count } => {
                info!("Removed {count} stale asset(s) of piece {piece_id}");
            }
            ReconcileEvent::Superseded { folder } => {
                info!("Skipping {folder}: replaced by a newer folder of the same piece");
            }
            ReconcileEvent::InstrumentsAdded { piece_id, instruments } => {
                info!("Added {} to {piece_id}", instruments.join(", "));
            }
            ReconcileEvent::NoInstruments { piece_id, raw_instrument } => {
                info!("No instruments added for {piece_id} (`{raw_instrument}`)");
            }
        }
    }
}

impl ReconcileSink for Vec<ReconcileEvent> {
    fn record(&mut self, event: ReconcileEvent) {
        self.push(event);
    }
}

/// Result of [`reconcile_pending`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids of the pieces published, in processing order.
    pub published: Vec<i64>,
    /// Folders left pending.
    pub skipped: Vec<String>,
}

/// Result of [`run_pass`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub published: Vec<i64>,
    pub skipped: Vec<String>,
    /// Pieces that gained instrument associations.
    pub instruments_linked: usize,
}

/// Run the full update pass in one transaction.
///
/// # Errors
///
/// Returns an error, and rolls back every change of the pass, when a
/// descriptor names reference data that does not exist ([`MissingReference`])
/// or the database fails.
pub fn run_pass(
    conn: &mut Connection,
    source: &dyn DescriptorSource,
    settings: &ReconcileSettings,
    sink: &mut dyn ReconcileSink,
) -> Result<PassSummary> {
    let tx = conn
        .transaction()
        .context("Failed to start update transaction")?;

    info!("Processing new or updated RDF files.");
    let outcome = reconcile_pending(&tx, source, settings, sink)?;
    let instruments_linked = rebuild_instrument_associations(&tx, &settings.tokenizer, sink)?;

    tx.commit().context("Commiting update transaction failed")?;

    Ok(PassSummary {
        published: outcome.published,
        skipped: outcome.skipped,
        instruments_linked,
    })
}

/// Fold every pending asset's descriptor into the catalog.
///
/// Runs on whatever connection or transaction it is given; see [`run_pass`]
/// for the atomic form.
pub fn reconcile_pending(
    conn: &Connection,
    source: &dyn DescriptorSource,
    settings: &ReconcileSettings,
    sink: &mut dyn ReconcileSink,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    for queued in db::pending_assets(conn)? {
        // An earlier asset of this pass may have replaced this one.
        let mut asset = match db::get_asset_by_folder(conn, &queued.folder)? {
            Some(asset) if !asset.published => asset,
            _ => {
                sink.record(ReconcileEvent::Superseded {
                    folder: queued.folder,
                });
                continue;
            }
        };

        let url = asset.rdf_url(&settings.base_url);
        let subject = asset.rdf_subject(&settings.base_url);
        sink.record(ReconcileEvent::Reading {
            folder: asset.folder.clone(),
            url: url.clone(),
        });

        let document = match source.fetch(&url) {
            Ok(document) => document,
            Err(error) => {
                sink.record(ReconcileEvent::FetchFailed {
                    folder: asset.folder.clone(),
                    reason: error.to_string(),
                });
                outcome.skipped.push(asset.folder);
                continue;
            }
        };

        let descriptor = match parse_descriptor(&document, &subject, &url) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                sink.record(ReconcileEvent::DescriptorUnreadable {
                    folder: asset.folder.clone(),
                    reason: error.to_string(),
                });
                outcome.skipped.push(asset.folder);
                continue;
            }
        };

        let parsed = descriptor
            .get("id")
            .ok_or_else(|| "RDF has no ID".to_string())
            .and_then(|footer| parse_mutopia_id(footer).map_err(|e| e.to_string()));
        let (date_published, piece_id) = match parsed {
            Ok(parsed) => parsed,
            Err(reason) => {
                sink.record(ReconcileEvent::FooterRejected {
                    folder: asset.folder.clone(),
                    reason,
                });
                outcome.skipped.push(asset.folder);
                continue;
            }
        };

        let (piece, status) = fill_piece(conn, &asset, &descriptor, piece_id, date_published)?;

        let stale = db::delete_stale_assets(conn, piece.piece_id, asset.id)?;
        if stale > 0 {
            sink.record(ReconcileEvent::StaleAssetsRemoved {
                piece_id: piece.piece_id,
                count: stale,
            });
        }

        asset.piece_id = Some(piece.piece_id);
        asset.published = true;
        asset.has_svg = descriptor.has_svg_preview();
        db::save_asset(conn, &asset)?;

        sink.record(ReconcileEvent::Published {
            folder: asset.folder.clone(),
            piece_id: piece.piece_id,
            title: piece.title.clone(),
            status,
        });
        outcome.published.push(piece.piece_id);
    }

    Ok(outcome)
}

fn missing(table: &'static str, key: &str, asset: &AssetMap) -> MissingReference {
    MissingReference {
        table,
        key: key.to_string(),
        folder: asset.folder.clone(),
    }
}

/// Create or update the piece described by `descriptor` and save it.
fn fill_piece(
    conn: &Connection,
    asset: &AssetMap,
    descriptor: &PieceDescriptor,
    piece_id: i64,
    date_published: NaiveDate,
) -> Result<(Piece, PieceStatus)> {
    let composer_key = descriptor.text("composer");
    let composer = db::get_composer(conn, &composer_key)?
        .ok_or_else(|| missing("composer", &composer_key, asset))?;

    let (mut piece, status, previous_instruments) = match db::get_piece(conn, piece_id)? {
        Some(existing) => {
            let previous = existing.raw_instrument.clone();
            (existing, PieceStatus::Updated, Some(previous))
        }
        None => (
            Piece::new(piece_id, &composer.composer, date_published),
            PieceStatus::New,
            None,
        ),
    };

    piece.title = descriptor.text("title");
    piece.composer = composer.composer;

    let style_key = descriptor.text("style");
    let style = db::get_style(conn, &style_key)?.ok_or_else(|| missing("style", &style_key, asset))?;
    piece.style = Some(style.style);

    piece.raw_instrument = descriptor.text("for");

    let license_key = descriptor.text("licence");
    let license = db::get_license_by_name(conn, &license_key)?
        .ok_or_else(|| missing("license", &license_key, asset))?;
    piece.license_id = Some(license.id);

    piece.maintainer_id = match descriptor.get("maintainer") {
        Some(name) => Some(
            db::find_or_create_contributor(
                conn,
                name,
                &descriptor.text("maintainerEmail"),
                &descriptor.text("maintainerWeb"),
            )?
            .id,
        ),
        None => None,
    };
    piece.version_id = descriptor
        .get("lilypondVersion")
        .map(|version| db::find_or_create_version(conn, version))
        .transpose()?
        .map(|version| version.id);

    piece.lyricist = descriptor.text("lyricist");
    piece.date_composed = descriptor.text("date");
    piece.date_published = date_published;
    piece.source = descriptor.text("source");
    piece.moreinfo = descriptor.text("moreInfo");
    piece.opus = descriptor.text("opus");

    db::save_piece(conn, &piece)?;

    // Rebuilt later by rebuild_instrument_associations.
    if previous_instruments.as_deref() != Some(piece.raw_instrument.as_str()) {
        let cleared = db::clear_piece_instruments(conn, piece_id)?;
        debug!("Cleared {cleared} instrument(s) of {piece}");
    }

    Ok((piece, status))
}

/// Link pieces that have no instruments to the instruments their raw text
/// names. Returns the number of pieces that gained associations.
pub fn rebuild_instrument_associations(
    conn: &Connection,
    tokenizer: &InstrumentTokenizer,
    sink: &mut dyn ReconcileSink,
) -> Result<usize> {
    let mut linked = 0;

    for (piece_id, raw_instrument) in db::pieces_without_instruments(conn)? {
        let mut resolved = BTreeSet::new();
        for token in tokenizer.tokenize(&raw_instrument) {
            if let Some(instrument) = normalize_instrument_name(conn, token)? {
                resolved.insert(instrument.instrument);
            }
        }

        if resolved.is_empty() {
            sink.record(ReconcileEvent::NoInstruments {
                piece_id,
                raw_instrument,
            });
            continue;
        }

        for instrument in &resolved {
            db::add_piece_instrument(conn, piece_id, instrument)?;
        }
        linked += 1;
        sink.record(ReconcileEvent::InstrumentsAdded {
            piece_id,
            instruments: resolved.into_iter().collect(),
        });
    }

    Ok(linked)
}
