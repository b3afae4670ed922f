//! # Database Module
//!
//! SQLite schema and queries for the catalog. Every function takes a plain
//! `&Connection` so it works the same on a connection or inside a
//! `rusqlite::Transaction` (which derefs to `Connection`); the caller decides
//! the transaction boundary.
//!
//! ## Tables
//!
//! - reference data: `composer`, `style`, `license`, `instrument`, `instrument_map`
//! - created on demand: `contributor`, `lp_version`
//! - catalog: `piece`, `piece_instrument`, `asset_map`, `collection`, `collection_piece`

use crate::models::{
    slugify, AssetLayout, AssetMap, Collection, Composer, Contributor, Instrument, License,
    LpVersion, Piece, Style,
};
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fs;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS composer (
    composer    TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS style (
    style      TEXT PRIMARY KEY,
    slug       TEXT NOT NULL,
    in_mutopia INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS license (
    id     INTEGER PRIMARY KEY,
    name   TEXT NOT NULL UNIQUE,
    url    TEXT NOT NULL DEFAULT '',
    badge  TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS instrument (
    instrument TEXT PRIMARY KEY,
    in_mutopia INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS instrument_map (
    raw_instrument TEXT PRIMARY KEY,
    instrument     TEXT NOT NULL REFERENCES instrument(instrument) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS contributor (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL DEFAULT '',
    url   TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS lp_version (
    id      INTEGER PRIMARY KEY,
    version TEXT NOT NULL UNIQUE,
    major   INTEGER,
    minor   INTEGER,
    edit    TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS piece (
    piece_id       INTEGER PRIMARY KEY,
    title          TEXT NOT NULL,
    composer       TEXT NOT NULL REFERENCES composer(composer),
    style          TEXT REFERENCES style(style) ON DELETE SET NULL,
    raw_instrument TEXT NOT NULL DEFAULT '',
    license_id     INTEGER REFERENCES license(id) ON DELETE SET NULL,
    maintainer_id  INTEGER REFERENCES contributor(id) ON DELETE SET NULL,
    version_id     INTEGER REFERENCES lp_version(id) ON DELETE SET NULL,
    opus           TEXT NOT NULL DEFAULT '',
    lyricist       TEXT NOT NULL DEFAULT '',
    date_composed  TEXT NOT NULL DEFAULT '',
    date_published TEXT NOT NULL,
    source         TEXT NOT NULL DEFAULT '',
    moreinfo       TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS piece_instrument (
    piece_id   INTEGER NOT NULL REFERENCES piece(piece_id) ON DELETE CASCADE,
    instrument TEXT NOT NULL REFERENCES instrument(instrument) ON DELETE CASCADE,
    PRIMARY KEY (piece_id, instrument)
);
CREATE TABLE IF NOT EXISTS asset_map (
    id        INTEGER PRIMARY KEY,
    folder    TEXT NOT NULL UNIQUE,
    name      TEXT NOT NULL DEFAULT '',
    has_lys   INTEGER NOT NULL DEFAULT 0,
    has_svg   INTEGER NOT NULL DEFAULT 0,
    piece_id  INTEGER UNIQUE REFERENCES piece(piece_id) ON DELETE SET NULL,
    published INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_asset_map_published ON asset_map(published);
CREATE TABLE IF NOT EXISTS collection (
    tag   TEXT PRIMARY KEY,
    title TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS collection_piece (
    tag      TEXT NOT NULL REFERENCES collection(tag) ON DELETE CASCADE,
    piece_id INTEGER NOT NULL REFERENCES piece(piece_id) ON DELETE CASCADE,
    PRIMARY KEY (tag, piece_id)
);
";

const PIECE_COLUMNS: &str = "piece_id, title, composer, style, raw_instrument, license_id, \
    maintainer_id, version_id, opus, lyricist, date_composed, date_published, source, moreinfo";

const ASSET_COLUMNS: &str = "id, folder, name, has_lys, has_svg, piece_id, published";

/// Open the catalog at `path` with foreign keys enforced.
///
/// The schema is not touched; use [`init_database`] for a new file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened as an SQLite database.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open catalog database at {}", path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("Failed to enable foreign keys")?;
    Ok(conn)
}

/// In-memory catalog with the schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Create every table that does not exist yet.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Invalid SQL when creating the catalog schema")
}

/// Create the catalog database at `path`.
///
/// With `force` an existing file is removed first. Without it, tables that
/// already exist are kept with their rows and only missing ones are created.
///
/// # Errors
///
/// This function will return an error if:
/// - `force` is set and the existing file cannot be removed
/// - The database cannot be opened, e.g. the parent directory is missing
/// - The schema cannot be applied to an existing, incompatible file
///
/// # Examples
///
/// ```no_run
/// use mutopia::db;
/// use std::path::Path;
///
/// let conn = db::init_database(Path::new("/srv/mutopia/catalog.db"), false)?;
/// println!("{:?}", db::site_status(&conn)?);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_database(path: &Path, force: bool) -> Result<Connection> {
    if path.exists() {
        if force {
            info!("Removing existing catalog at {}", path.display());
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            debug!("Catalog exists at {}, creating missing tables only", path.display());
        }
    }

    let conn = open(path)?;
    create_schema(&conn)?;
    info!("Catalog schema ready at {}", path.display());
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Reference data

/// Look up a composer by its compact key (`BachJS`).
///
/// Returns `Ok(None)` when the composer is not in the catalog; the reconciler
/// treats that as a missing reference.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_composer(conn: &Connection, composer: &str) -> Result<Option<Composer>> {
    conn.query_row(
        "SELECT composer, description FROM composer WHERE composer = ?1",
        [composer],
        |row| {
            Ok(Composer {
                composer: row.get(0)?,
                description: row.get(1)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("Failed to query composer `{composer}`"))
}

/// Insert or replace a composer.
pub fn save_composer(conn: &Connection, composer: &Composer) -> Result<()> {
    conn.execute(
        "INSERT INTO composer (composer, description) VALUES (?1, ?2)
         ON CONFLICT(composer) DO UPDATE SET description = excluded.description",
        params![composer.composer, composer.description],
    )
    .with_context(|| format!("Failed to save composer `{}`", composer.composer))?;
    Ok(())
}

/// Look up a style by name. `Ok(None)` when unknown.
pub fn get_style(conn: &Connection, style: &str) -> Result<Option<Style>> {
    conn.query_row(
        "SELECT style, slug, in_mutopia FROM style WHERE style = ?1",
        [style],
        |row| {
            Ok(Style {
                style: row.get(0)?,
                slug: row.get(1)?,
                in_mutopia: row.get(2)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("Failed to query style `{style}`"))
}

/// Look up a style by name, creating it on a miss.
pub fn find_or_create_style(conn: &Connection, style: &str, in_mutopia: bool) -> Result<Style> {
    if let Some(existing) = get_style(conn, style)? {
        return Ok(existing);
    }

    let created = Style {
        style: style.to_string(),
        slug: slugify(style),
        in_mutopia,
    };
    conn.execute(
        "INSERT INTO style (style, slug, in_mutopia) VALUES (?1, ?2, ?3)",
        params![created.style, created.slug, created.in_mutopia],
    )
    .with_context(|| format!("Failed to create style `{style}`"))?;
    debug!("Created style {style}");
    Ok(created)
}

/// Insert a style, or update the flag of the one with the same name.
pub fn save_style(conn: &Connection, style: &str, in_mutopia: bool) -> Result<Style> {
    let saved = Style {
        style: style.to_string(),
        slug: slugify(style),
        in_mutopia,
    };
    conn.execute(
        "INSERT INTO style (style, slug, in_mutopia) VALUES (?1, ?2, ?3)
         ON CONFLICT(style) DO UPDATE SET slug = excluded.slug, in_mutopia = excluded.in_mutopia",
        params![saved.style, saved.slug, saved.in_mutopia],
    )
    .with_context(|| format!("Failed to save style `{style}`"))?;
    Ok(saved)
}

/// Look up a license by its full name, as written in descriptors.
pub fn get_license_by_name(conn: &Connection, name: &str) -> Result<Option<License>> {
    conn.query_row(
        "SELECT id, name, url, badge, active FROM license WHERE name = ?1",
        [name],
        |row| {
            Ok(License {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                badge: row.get(3)?,
                active: row.get(4)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("Failed to query license `{name}`"))
}

/// Insert a license, or update the one with the same name. Returns its id.
pub fn save_license(conn: &Connection, name: &str, url: &str, badge: &str, active: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO license (name, url, badge, active) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET url = excluded.url, badge = excluded.badge,
             active = excluded.active",
        params![name, url, badge, active],
    )
    .with_context(|| format!("Failed to save license `{name}`"))?;

    conn.query_row("SELECT id FROM license WHERE name = ?1", [name], |row| row.get(0))
        .with_context(|| format!("Failed to read back license `{name}`"))
}

fn instrument_from_row(row: &Row<'_>) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        instrument: row.get(0)?,
        in_mutopia: row.get(1)?,
    })
}

/// Look up a canonical instrument by exact name.
pub fn get_instrument(conn: &Connection, instrument: &str) -> Result<Option<Instrument>> {
    conn.query_row(
        "SELECT instrument, in_mutopia FROM instrument WHERE instrument = ?1",
        [instrument],
        instrument_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query instrument `{instrument}`"))
}

/// Insert an instrument, or update the flag of the one with the same name.
pub fn save_instrument(conn: &Connection, instrument: &str, in_mutopia: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO instrument (instrument, in_mutopia) VALUES (?1, ?2)
         ON CONFLICT(instrument) DO UPDATE SET in_mutopia = excluded.in_mutopia",
        params![instrument, in_mutopia],
    )
    .with_context(|| format!("Failed to save instrument `{instrument}`"))?;
    Ok(())
}

/// The canonical instrument an alias points at, if the alias is known.
pub fn get_instrument_alias(conn: &Connection, raw_instrument: &str) -> Result<Option<Instrument>> {
    conn.query_row(
        "SELECT i.instrument, i.in_mutopia
         FROM instrument_map m JOIN instrument i ON i.instrument = m.instrument
         WHERE m.raw_instrument = ?1",
        [raw_instrument],
        instrument_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query instrument alias `{raw_instrument}`"))
}

/// Map `raw_instrument` to an existing canonical instrument.
pub fn save_instrument_alias(conn: &Connection, raw_instrument: &str, instrument: &str) -> Result<()> {
    if get_instrument(conn, instrument)?.is_none() {
        anyhow::bail!("Cannot alias `{raw_instrument}`: no instrument named `{instrument}`");
    }
    conn.execute(
        "INSERT INTO instrument_map (raw_instrument, instrument) VALUES (?1, ?2)
         ON CONFLICT(raw_instrument) DO UPDATE SET instrument = excluded.instrument",
        params![raw_instrument, instrument],
    )
    .with_context(|| format!("Failed to save alias `{raw_instrument}` -> `{instrument}`"))?;
    Ok(())
}

/// Every key of a reference table, sorted.
pub fn list_reference_keys(conn: &Connection, table: ReferenceTable) -> Result<Vec<String>> {
    let sql = match table {
        ReferenceTable::Composer => "SELECT composer FROM composer ORDER BY composer",
        ReferenceTable::Style => "SELECT style FROM style ORDER BY style",
        ReferenceTable::License => "SELECT name FROM license ORDER BY name",
        ReferenceTable::Instrument => "SELECT instrument FROM instrument ORDER BY instrument",
    };
    let mut stmt = conn.prepare(sql)?;
    let keys = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .with_context(|| format!("Failed to list {table:?} keys"))?;
    Ok(keys)
}

/// Tables whose rows the reconciler only looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    Composer,
    Style,
    License,
    Instrument,
}

// ---------------------------------------------------------------------------
// Find-or-create records

/// Find a contributor by name, creating one with `email` and `url` on a miss.
///
/// An existing contributor is returned unchanged even when `email` or `url`
/// differ from the stored values.
pub fn find_or_create_contributor(
    conn: &Connection,
    name: &str,
    email: &str,
    url: &str,
) -> Result<Contributor> {
    let existing = conn
        .query_row(
            "SELECT id, name, email, url FROM contributor WHERE name = ?1",
            [name],
            |row| {
                Ok(Contributor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    url: row.get(3)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query contributor `{name}`"))?;
    if let Some(contributor) = existing {
        return Ok(contributor);
    }

    conn.execute(
        "INSERT INTO contributor (name, email, url) VALUES (?1, ?2, ?3)",
        params![name, email, url],
    )
    .with_context(|| format!("Failed to create contributor `{name}`"))?;
    debug!("Created contributor {name}");

    Ok(Contributor {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        email: email.to_string(),
        url: url.to_string(),
    })
}

/// Find a LilyPond version by its exact string, creating it on a miss.
///
/// New versions are split on `.` into at most three parts. The first two are
/// stored as integers when numeric; the remainder is kept as text.
pub fn find_or_create_version(conn: &Connection, version: &str) -> Result<LpVersion> {
    let existing = conn
        .query_row(
            "SELECT id, version, major, minor, edit FROM lp_version WHERE version = ?1",
            [version],
            |row| {
                Ok(LpVersion {
                    id: row.get(0)?,
                    version: row.get(1)?,
                    major: row.get(2)?,
                    minor: row.get(3)?,
                    edit: row.get(4)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query LilyPond version `{version}`"))?;
    if let Some(found) = existing {
        return Ok(found);
    }

    let mut bits = version.splitn(3, '.');
    let major = bits.next().and_then(|b| b.trim().parse::<i64>().ok());
    let minor = bits.next().and_then(|b| b.trim().parse::<i64>().ok());
    let edit = bits.next().unwrap_or_default().to_string();

    conn.execute(
        "INSERT INTO lp_version (version, major, minor, edit) VALUES (?1, ?2, ?3, ?4)",
        params![version, major, minor, edit],
    )
    .with_context(|| format!("Failed to create LilyPond version `{version}`"))?;
    debug!("Created LilyPond version {version}");

    Ok(LpVersion {
        id: conn.last_insert_rowid(),
        version: version.to_string(),
        major,
        minor,
        edit,
    })
}

// ---------------------------------------------------------------------------
// Pieces

fn piece_from_row(row: &Row<'_>) -> rusqlite::Result<Piece> {
    Ok(Piece {
        piece_id: row.get(0)?,
        title: row.get(1)?,
        composer: row.get(2)?,
        style: row.get(3)?,
        raw_instrument: row.get(4)?,
        license_id: row.get(5)?,
        maintainer_id: row.get(6)?,
        version_id: row.get(7)?,
        opus: row.get(8)?,
        lyricist: row.get(9)?,
        date_composed: row.get(10)?,
        date_published: row.get(11)?,
        source: row.get(12)?,
        moreinfo: row.get(13)?,
    })
}

/// Retrieve a piece by its catalog id.
///
/// # Errors
///
/// Returns an error if the query fails or a stored row cannot be decoded,
/// e.g. a malformed `date_published`.
///
/// # Examples
///
/// ```
/// use mutopia::db;
///
/// let conn = db::open_in_memory()?;
/// assert!(db::get_piece(&conn, 33)?.is_none());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_piece(conn: &Connection, piece_id: i64) -> Result<Option<Piece>> {
    conn.query_row(
        &format!("SELECT {PIECE_COLUMNS} FROM piece WHERE piece_id = ?1"),
        [piece_id],
        piece_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query piece {piece_id}"))
}

/// Insert the piece, or update every mutable column of the existing row.
pub fn save_piece(conn: &Connection, piece: &Piece) -> Result<()> {
    conn.execute(
        "INSERT INTO piece (piece_id, title, composer, style, raw_instrument, license_id,
                            maintainer_id, version_id, opus, lyricist, date_composed,
                            date_published, source, moreinfo)
         VALUES (:piece_id, :title, :composer, :style, :raw_instrument, :license_id,
                 :maintainer_id, :version_id, :opus, :lyricist, :date_composed,
                 :date_published, :source, :moreinfo)
         ON CONFLICT(piece_id) DO UPDATE SET
             title = excluded.title,
             composer = excluded.composer,
             style = excluded.style,
             raw_instrument = excluded.raw_instrument,
             license_id = excluded.license_id,
             maintainer_id = excluded.maintainer_id,
             version_id = excluded.version_id,
             opus = excluded.opus,
             lyricist = excluded.lyricist,
             date_composed = excluded.date_composed,
             date_published = excluded.date_published,
             source = excluded.source,
             moreinfo = excluded.moreinfo",
        named_params! {
            ":piece_id": piece.piece_id,
            ":title": piece.title,
            ":composer": piece.composer,
            ":style": piece.style,
            ":raw_instrument": piece.raw_instrument,
            ":license_id": piece.license_id,
            ":maintainer_id": piece.maintainer_id,
            ":version_id": piece.version_id,
            ":opus": piece.opus,
            ":lyricist": piece.lyricist,
            ":date_composed": piece.date_composed,
            ":date_published": piece.date_published,
            ":source": piece.source,
            ":moreinfo": piece.moreinfo,
        },
    )
    .with_context(|| format!("Invalid SQL statement when saving piece: {piece}"))?;
    Ok(())
}

/// Names of the instruments associated with a piece, sorted.
pub fn piece_instruments(conn: &Connection, piece_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT instrument FROM piece_instrument WHERE piece_id = ?1 ORDER BY instrument",
    )?;
    let names = stmt
        .query_map([piece_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .with_context(|| format!("Failed to read instruments of piece {piece_id}"))?;
    Ok(names)
}

/// Remove every instrument association of a piece. Returns how many were removed.
pub fn clear_piece_instruments(conn: &Connection, piece_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM piece_instrument WHERE piece_id = ?1", [piece_id])
        .with_context(|| format!("Failed to clear instruments of piece {piece_id}"))
}

/// Link a piece to a canonical instrument. Existing links are left alone.
pub fn add_piece_instrument(conn: &Connection, piece_id: i64, instrument: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO piece_instrument (piece_id, instrument) VALUES (?1, ?2)",
        params![piece_id, instrument],
    )
    .with_context(|| format!("Failed to add `{instrument}` to piece {piece_id}"))?;
    Ok(())
}

/// Pieces with an empty instrument set, as `(piece_id, raw_instrument)`.
pub fn pieces_without_instruments(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT p.piece_id, p.raw_instrument FROM piece p
         WHERE NOT EXISTS (SELECT 1 FROM piece_instrument pi WHERE pi.piece_id = p.piece_id)
         ORDER BY p.piece_id",
    )?;
    let pieces = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to query pieces without instruments")?;
    Ok(pieces)
}

// ---------------------------------------------------------------------------
// Asset maps

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<AssetMap> {
    Ok(AssetMap {
        id: row.get(0)?,
        folder: row.get(1)?,
        name: row.get(2)?,
        layout: AssetLayout::from_has_lys(row.get(3)?),
        has_svg: row.get(4)?,
        piece_id: row.get(5)?,
        published: row.get(6)?,
    })
}

/// Assets whose catalog record does not reflect their descriptor yet.
pub fn pending_assets(conn: &Connection) -> Result<Vec<AssetMap>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset_map WHERE published = 0 ORDER BY folder"
    ))?;
    let assets = stmt
        .query_map([], asset_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to query pending assets")?;
    Ok(assets)
}

/// Find the asset for a folder relative to the archive root.
pub fn get_asset_by_folder(conn: &Connection, folder: &str) -> Result<Option<AssetMap>> {
    conn.query_row(
        &format!("SELECT {ASSET_COLUMNS} FROM asset_map WHERE folder = ?1"),
        [folder],
        asset_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query asset `{folder}`"))
}

/// Find the asset a piece is published from.
pub fn get_asset_by_piece(conn: &Connection, piece_id: i64) -> Result<Option<AssetMap>> {
    conn.query_row(
        &format!("SELECT {ASSET_COLUMNS} FROM asset_map WHERE piece_id = ?1"),
        [piece_id],
        asset_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query asset of piece {piece_id}"))
}

/// Write back every mutable column of an existing asset.
///
/// # Errors
///
/// Fails when no row has `asset.id`, e.g. because the asset was deleted as
/// stale after it was read.
pub fn save_asset(conn: &Connection, asset: &AssetMap) -> Result<()> {
    let updated = conn.execute(
        "UPDATE asset_map SET folder = ?1, name = ?2, has_lys = ?3, has_svg = ?4,
             piece_id = ?5, published = ?6
         WHERE id = ?7",
        params![
            asset.folder,
            asset.name,
            asset.layout.has_lys(),
            asset.has_svg,
            asset.piece_id,
            asset.published,
            asset.id
        ],
    )
    .with_context(|| format!("Failed to save asset {asset}"))?;
    if updated == 0 {
        anyhow::bail!("Asset {asset} (id {}) no longer exists", asset.id);
    }
    Ok(())
}

/// Delete assets other than `keep_id` that point at `piece_id`.
///
/// A piece whose folder was renamed keeps its old asset row until the new
/// folder is reconciled; this removes it.
pub fn delete_stale_assets(conn: &Connection, piece_id: i64, keep_id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM asset_map WHERE piece_id = ?1 AND id != ?2",
        params![piece_id, keep_id],
    )
    .with_context(|| format!("Failed to delete stale assets of piece {piece_id}"))
}

/// Outcome of [`mark_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    New,
    Refreshed,
}

/// Create an unpublished asset for `folder`, or flag an existing one for
/// re-reading.
///
/// Leading and trailing slashes are ignored and the asset name is the last
/// folder segment.
///
/// # Errors
///
/// Returns an error for an empty folder or if the write fails.
///
/// # Examples
///
/// ```
/// use mutopia::db::{self, PendingStatus};
/// use mutopia::models::AssetLayout;
///
/// let conn = db::open_in_memory()?;
/// let first = db::mark_pending(&conn, "BachJS/BWV846/wtk1/", AssetLayout::Single)?;
/// let again = db::mark_pending(&conn, "BachJS/BWV846/wtk1", AssetLayout::Single)?;
/// assert_eq!((first, again), (PendingStatus::New, PendingStatus::Refreshed));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn mark_pending(conn: &Connection, folder: &str, layout: AssetLayout) -> Result<PendingStatus> {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        anyhow::bail!("Asset folder must not be empty");
    }
    let name = AssetMap::name_for_folder(folder);

    match get_asset_by_folder(conn, folder)? {
        Some(asset) => {
            conn.execute(
                "UPDATE asset_map SET name = ?1, has_lys = ?2, published = 0 WHERE id = ?3",
                params![name, layout.has_lys(), asset.id],
            )
            .with_context(|| format!("Failed to refresh asset `{folder}`"))?;
            Ok(PendingStatus::Refreshed)
        }
        None => {
            conn.execute(
                "INSERT INTO asset_map (folder, name, has_lys, published) VALUES (?1, ?2, ?3, 0)",
                params![folder, name, layout.has_lys()],
            )
            .with_context(|| format!("Failed to create asset `{folder}`"))?;
            Ok(PendingStatus::New)
        }
    }
}

// ---------------------------------------------------------------------------
// Status and collections

/// Read-only summary for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteStatus {
    #[serde(rename = "LastID")]
    pub last_id: Option<i64>,
    pub pending: Vec<String>,
}

/// Highest piece id and the folders still waiting for reconciliation.
///
/// Serializes to `{"LastID": 33, "pending": ["BachJS/wtk1"]}`. `LastID` is
/// `null` on an empty catalog.
///
/// # Errors
///
/// Returns an error if either query fails.
pub fn site_status(conn: &Connection) -> Result<SiteStatus> {
    let last_id: Option<i64> = conn
        .query_row("SELECT MAX(piece_id) FROM piece", [], |row| row.get(0))
        .context("Failed to query the highest piece id")?;
    let pending = pending_assets(conn)?
        .into_iter()
        .map(|asset| asset.folder)
        .collect();
    Ok(SiteStatus { last_id, pending })
}

/// Create the collection if needed and add `piece_ids` to it.
pub fn add_to_collection(conn: &Connection, collection: &Collection, piece_ids: &[i64]) -> Result<()> {
    conn.execute(
        "INSERT INTO collection (tag, title) VALUES (?1, ?2)
         ON CONFLICT(tag) DO UPDATE SET title = excluded.title",
        params![collection.tag, collection.title],
    )
    .with_context(|| format!("Failed to save collection `{}`", collection.tag))?;

    for piece_id in piece_ids {
        conn.execute(
            "INSERT OR IGNORE INTO collection_piece (tag, piece_id) VALUES (?1, ?2)",
            params![collection.tag, piece_id],
        )
        .with_context(|| format!("Failed to add piece {piece_id} to `{}`", collection.tag))?;
    }
    Ok(())
}

/// Ids of the pieces in a collection, ascending.
pub fn collection_pieces(conn: &Connection, tag: &str) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT piece_id FROM collection_piece WHERE tag = ?1 ORDER BY piece_id")?;
    let ids = stmt
        .query_map([tag], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()
        .with_context(|| format!("Failed to read collection `{tag}`"))?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        save_composer(
            &conn,
            &Composer {
                composer: "BachJS".to_string(),
                description: "J. S. Bach (1685-1750)".to_string(),
            },
        )
        .unwrap();
        conn
    }

    fn piece(id: i64) -> Piece {
        let mut p = Piece::new(id, "BachJS", NaiveDate::from_ymd_opt(2016, 2, 12).unwrap());
        p.title = format!("Prelude {id}");
        p
    }

    #[test]
    fn test_contributor_find_or_create_returns_same_record() {
        let conn = seeded();
        let first = find_or_create_contributor(&conn, "Glen", "glen@example.org", "").unwrap();
        let second =
            find_or_create_contributor(&conn, "Glen", "other@example.org", "http://x").unwrap();
        assert_eq!(first, second);
        assert_eq!(second.email, "glen@example.org");
    }

    #[test]
    fn test_version_split() {
        let conn = seeded();
        let v = find_or_create_version(&conn, "2.18.2").unwrap();
        assert_eq!(v.major, Some(2));
        assert_eq!(v.minor, Some(18));
        assert_eq!(v.edit, "2");

        let again = find_or_create_version(&conn, "2.18.2").unwrap();
        assert_eq!(v.id, again.id);

        let short = find_or_create_version(&conn, "2.19").unwrap();
        assert_eq!(short.minor, Some(19));
        assert_eq!(short.edit, "");

        let long = find_or_create_version(&conn, "2.19.1.rc2").unwrap();
        assert_eq!(long.edit, "1.rc2");
    }

    #[test]
    fn test_find_or_create_style_slugs() {
        let conn = seeded();
        let style = find_or_create_style(&conn, "Popular / Dance", false).unwrap();
        assert_eq!(style.slug, "popular-dance");
        assert_eq!(get_style(&conn, "Popular / Dance").unwrap(), Some(style));
    }

    #[test]
    fn test_save_style_updates_flag() {
        let conn = seeded();
        let style = save_style(&conn, "Romantic", false).unwrap();
        assert!(!style.in_mutopia);

        save_style(&conn, "Romantic", true).unwrap();
        let stored = get_style(&conn, "Romantic").unwrap().unwrap();
        assert!(stored.in_mutopia);
        assert_eq!(stored.slug, "romantic");
    }

    #[test]
    fn test_save_asset_fails_for_deleted_asset() {
        let conn = seeded();
        mark_pending(&conn, "BachJS/gone", AssetLayout::Single).unwrap();
        let mut asset = get_asset_by_folder(&conn, "BachJS/gone").unwrap().unwrap();
        conn.execute("DELETE FROM asset_map WHERE id = ?1", [asset.id]).unwrap();

        asset.published = true;
        let err = save_asset(&conn, &asset).unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
    }

    #[test]
    fn test_save_piece_updates_in_place() {
        let conn = seeded();
        let mut p = piece(33);
        save_piece(&conn, &p).unwrap();
        p.title = "Renamed".to_string();
        save_piece(&conn, &p).unwrap();

        let stored = get_piece(&conn, 33).unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.date_published, p.date_published);
    }

    #[test]
    fn test_mark_pending_new_then_refresh() {
        let conn = seeded();
        let status = mark_pending(&conn, "BachJS/BWV846/wtk1/", AssetLayout::Single).unwrap();
        assert_eq!(status, PendingStatus::New);

        let mut asset = get_asset_by_folder(&conn, "BachJS/BWV846/wtk1").unwrap().unwrap();
        assert_eq!(asset.name, "wtk1");
        asset.published = true;
        save_asset(&conn, &asset).unwrap();
        assert!(pending_assets(&conn).unwrap().is_empty());

        let status = mark_pending(&conn, "BachJS/BWV846/wtk1", AssetLayout::Archive).unwrap();
        assert_eq!(status, PendingStatus::Refreshed);
        let pending = pending_assets(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].layout, AssetLayout::Archive);
    }

    #[test]
    fn test_mark_pending_rejects_empty_folder() {
        let conn = seeded();
        assert!(mark_pending(&conn, "/", AssetLayout::Single).is_err());
    }

    #[test]
    fn test_site_status() {
        let conn = seeded();
        assert_eq!(site_status(&conn).unwrap().last_id, None);

        save_piece(&conn, &piece(12)).unwrap();
        save_piece(&conn, &piece(40)).unwrap();
        mark_pending(&conn, "BachJS/a", AssetLayout::Single).unwrap();

        let status = site_status(&conn).unwrap();
        assert_eq!(status.last_id, Some(40));
        assert_eq!(status.pending, vec!["BachJS/a".to_string()]);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["LastID"], 40);
    }

    #[test]
    fn test_alias_requires_instrument() {
        let conn = seeded();
        assert!(save_instrument_alias(&conn, "Uke", "Ukulele").is_err());
        save_instrument(&conn, "Ukulele", true).unwrap();
        save_instrument_alias(&conn, "Uke", "Ukulele").unwrap();
        let target = get_instrument_alias(&conn, "Uke").unwrap().unwrap();
        assert_eq!(target.instrument, "Ukulele");
    }

    #[test]
    fn test_pieces_without_instruments() {
        let conn = seeded();
        save_instrument(&conn, "Piano", true).unwrap();
        save_piece(&conn, &piece(1)).unwrap();
        save_piece(&conn, &piece(2)).unwrap();
        add_piece_instrument(&conn, 1, "Piano").unwrap();

        let bare = pieces_without_instruments(&conn).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].0, 2);
    }

    #[test]
    fn test_collections() {
        let conn = seeded();
        save_piece(&conn, &piece(1)).unwrap();
        save_piece(&conn, &piece(2)).unwrap();
        let wtk = Collection { tag: "wtk1".to_string(), title: "WTK I".to_string() };
        add_to_collection(&conn, &wtk, &[2, 1]).unwrap();
        add_to_collection(&conn, &wtk, &[1]).unwrap();
        assert_eq!(collection_pieces(&conn, "wtk1").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_list_reference_keys() {
        let conn = seeded();
        save_instrument(&conn, "Violin", true).unwrap();
        save_instrument(&conn, "Cello", true).unwrap();
        assert_eq!(
            list_reference_keys(&conn, ReferenceTable::Instrument).unwrap(),
            vec!["Cello".to_string(), "Violin".to_string()]
        );
        assert_eq!(
            list_reference_keys(&conn, ReferenceTable::Composer).unwrap(),
            vec!["BachJS".to_string()]
        );
    }
}
