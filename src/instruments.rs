//! Instrument name normalization.
//!
//! Contributors describe instrumentation as free text ("Guitar, Uke",
//! "Violine und Klavier"). The catalog searches on canonical [`Instrument`]
//! rows, so raw text is split into tokens and each token is resolved either
//! directly against the instrument table or through the `instrument_map` alias
//! table (nicknames, plurals, misspellings, foreign names).

use crate::db;
use crate::models::Instrument;
use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;

/// Tokens shorter than this are ignored ("&", "and", "op").
pub const MIN_TOKEN_LEN: usize = 3;

/// Separator between instrument tokens: runs of non-word characters.
pub const TOKEN_SEPARATOR: &str = r"\W+";

/// Splits raw instrument text into candidate tokens.
#[derive(Debug, Clone)]
pub struct InstrumentTokenizer {
    separator: Regex,
    min_len: usize,
}

impl Default for InstrumentTokenizer {
    fn default() -> Self {
        Self {
            separator: Regex::new(TOKEN_SEPARATOR).expect("default separator is valid"),
            min_len: MIN_TOKEN_LEN,
        }
    }
}

impl InstrumentTokenizer {
    /// Tokenizer with a custom separator pattern and minimum length.
    pub fn new(separator: &str, min_len: usize) -> Result<Self> {
        let separator = Regex::new(separator)
            .with_context(|| format!("Invalid instrument separator pattern `{separator}`"))?;
        Ok(Self { separator, min_len })
    }

    /// Candidate tokens in input order. Duplicates are kept.
    #[must_use]
    pub fn tokenize<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        self.separator
            .split(raw)
            .map(str::trim)
            .filter(|token| token.chars().count() >= self.min_len)
            .collect()
    }
}

/// First character uppercased, the rest lowercased.
#[must_use]
pub fn capitalize(candidate: &str) -> String {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Match a candidate name to a known instrument.
///
/// The capitalized candidate is tried against the instrument table first.
/// Otherwise the alias table is consulted with the candidate as given and
/// then lowercased. Returns `None` when neither matches.
pub fn normalize_instrument_name(conn: &Connection, candidate: &str) -> Result<Option<Instrument>> {
    if let Some(instrument) = db::get_instrument(conn, &capitalize(candidate))? {
        return Ok(Some(instrument));
    }

    if let Some(instrument) = db::get_instrument_alias(conn, candidate)? {
        return Ok(Some(instrument));
    }

    let lowered = candidate.to_lowercase();
    if lowered != candidate {
        return db::get_instrument_alias(conn, &lowered);
    }
    Ok(None)
}
