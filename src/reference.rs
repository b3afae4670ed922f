//! Reference data seeding and export.
//!
//! The reconciler never creates composers, styles, licenses or instruments.
//! They are loaded from a TOML file maintained next to the archive:
//!
//! ```toml
//! [[composer]]
//! composer = "BachJS"
//! description = "J. S. Bach (1685-1750)"
//!
//! [[style]]
//! style = "Baroque"
//! in_mutopia = true
//!
//! [[license]]
//! name = "Public Domain"
//! url = "http://creativecommons.org/licenses/publicdomain"
//! badge = "pd"
//! active = true
//!
//! [[instrument]]
//! instrument = "Ukulele"
//! in_mutopia = true
//!
//! [aliases]
//! Uke = "Ukulele"
//! ```

use crate::db::{self, ReferenceTable};
use crate::models::Composer;
use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposerSeed {
    pub composer: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleSeed {
    pub style: String,
    #[serde(default)]
    pub in_mutopia: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseSeed {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub badge: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstrumentSeed {
    pub instrument: String,
    #[serde(default)]
    pub in_mutopia: bool,
}

/// Contents of a reference data file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub composer: Vec<ComposerSeed>,
    pub style: Vec<StyleSeed>,
    pub license: Vec<LicenseSeed>,
    pub instrument: Vec<InstrumentSeed>,
    /// Alias -> canonical instrument name.
    pub aliases: BTreeMap<String, String>,
}

impl ReferenceData {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse reference data")
    }
}

/// Row counts written by [`load_reference`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub composers: usize,
    pub styles: usize,
    pub licenses: usize,
    pub instruments: usize,
    pub aliases: usize,
}

/// Insert or update every row of `data` in one transaction.
///
/// Instruments are written before aliases so aliases can point at them.
pub fn load_reference(conn: &mut Connection, data: &ReferenceData) -> Result<SeedCounts> {
    let tx = conn.transaction()?;

    for seed in &data.composer {
        db::save_composer(
            &tx,
            &Composer {
                composer: seed.composer.clone(),
                description: seed.description.clone(),
            },
        )?;
    }
    for seed in &data.style {
        db::save_style(&tx, &seed.style, seed.in_mutopia)?;
    }
    for seed in &data.license {
        db::save_license(&tx, &seed.name, &seed.url, &seed.badge, seed.active)?;
    }
    for seed in &data.instrument {
        db::save_instrument(&tx, &seed.instrument, seed.in_mutopia)?;
    }
    for (raw, instrument) in &data.aliases {
        db::save_instrument_alias(&tx, raw, instrument)?;
    }

    tx.commit().context("Commiting reference data failed")?;

    let counts = SeedCounts {
        composers: data.composer.len(),
        styles: data.style.len(),
        licenses: data.license.len(),
        instruments: data.instrument.len(),
        aliases: data.aliases.len(),
    };
    info!("Loaded reference data: {counts:?}");
    Ok(counts)
}

/// Minimal JSON description of the reference tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceListing {
    pub instruments: Vec<String>,
    pub composers: Vec<String>,
    pub styles: Vec<String>,
    pub licenses: Vec<String>,
}

pub fn list_reference(conn: &Connection) -> Result<ReferenceListing> {
    Ok(ReferenceListing {
        instruments: db::list_reference_keys(conn, ReferenceTable::Instrument)?,
        composers: db::list_reference_keys(conn, ReferenceTable::Composer)?,
        styles: db::list_reference_keys(conn, ReferenceTable::Style)?,
        licenses: db::list_reference_keys(conn, ReferenceTable::License)?,
    })
}
