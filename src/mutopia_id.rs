//! Footer identifiers.
//!
//! Every published piece carries a footer identifier of the form
//! `Mutopia-YYYY/M/D-ID`: the publication date followed by the catalog id.
//! Neither part is stored as text; the database keeps the date and the integer
//! id and the string is rebuilt on demand.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix used when rebuilding identifiers.
pub const DEFAULT_PREFIX: &str = "Mutopia";

lazy_static::lazy_static! {
    static ref FOOTER_PATTERN: Regex =
        Regex::new(r"([A-Za-z]+)-([0-9]{4})/([0-9]{1,2})/([0-9]{1,2})-([0-9]+)$")
            .expect("footer pattern is valid");
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FooterError {
    #[error("empty footer identifier")]
    Empty,

    #[error("mal-formed footer identifier `{0}`")]
    Malformed(String),

    #[error("invalid publication date in footer identifier `{0}`")]
    InvalidDate(String),
}

/// A parsed footer identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutopiaId {
    pub prefix: String,
    pub date_published: NaiveDate,
    pub piece_id: i64,
}

impl MutopiaId {
    #[must_use]
    pub fn new(date_published: NaiveDate, piece_id: i64) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            date_published,
            piece_id,
        }
    }
}

impl FromStr for MutopiaId {
    type Err = FooterError;

    fn from_str(footer: &str) -> Result<Self, Self::Err> {
        let footer = footer.trim();
        if footer.is_empty() {
            return Err(FooterError::Empty);
        }

        let caps = FOOTER_PATTERN
            .captures(footer)
            .ok_or_else(|| FooterError::Malformed(footer.to_string()))?;

        // The pattern guarantees digits, so only range errors remain.
        let number = |i: usize| caps[i].parse::<u32>().ok();
        let date_published = match (number(2), number(3), number(4)) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d),
            _ => None,
        }
        .ok_or_else(|| FooterError::InvalidDate(footer.to_string()))?;

        let piece_id = caps[5]
            .parse::<i64>()
            .map_err(|_| FooterError::Malformed(footer.to_string()))?;

        Ok(Self {
            prefix: caps[1].to_string(),
            date_published,
            piece_id,
        })
    }
}

impl fmt::Display for MutopiaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}/{}/{}-{}",
            self.prefix,
            self.date_published.year(),
            self.date_published.month(),
            self.date_published.day(),
            self.piece_id
        )
    }
}

/// Parse a footer into its publication date and piece id.
pub fn parse_mutopia_id(footer: &str) -> Result<(NaiveDate, i64), FooterError> {
    footer
        .parse::<MutopiaId>()
        .map(|id| (id.date_published, id.piece_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_footer() {
        let (date, id) = parse_mutopia_id("Mutopia-2016/2/12-33").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2016, 2, 12).unwrap());
        assert_eq!(id, 33);
    }

    #[test]
    fn test_parse_rejects_non_numeric_id() {
        assert_eq!(
            parse_mutopia_id("Mutopia-2016/20/12-AB"),
            Err(FooterError::Malformed("Mutopia-2016/20/12-AB".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_invalid_date() {
        assert!(matches!(
            parse_mutopia_id("Mutopia-2016/20/12-33"),
            Err(FooterError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_mutopia_id("Mutopia-2015/2/30-7"),
            Err(FooterError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_parse_empty_footer() {
        assert_eq!(parse_mutopia_id(""), Err(FooterError::Empty));
        assert_eq!(parse_mutopia_id("   "), Err(FooterError::Empty));
    }

    #[test]
    fn test_parse_keeps_prefix() {
        let id: MutopiaId = "Mutopia-2003/11/3-392".parse().unwrap();
        assert_eq!(id.prefix, "Mutopia");
        assert_eq!(id.piece_id, 392);
        assert_eq!(id.to_string(), "Mutopia-2003/11/3-392");
    }

    #[test]
    fn test_parse_trailing_text_rejected() {
        assert!(parse_mutopia_id("Mutopia-2016/2/12-33 extra").is_err());
    }
}
