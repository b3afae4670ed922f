//! # Catalog Records
//!
//! Plain data types mirroring the rows of the catalog database. Database access
//! lives in [`crate::db`]; these types only carry values and the small amount of
//! formatting logic the rest of the crate needs (bylines, asset filenames).

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// An author of a piece of music.
///
/// The key is a compact unique name built from the surname and initials
/// (`BachJS`, `MozartWA`). The description is the human form, usually with a
/// parenthesized lifespan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Composer {
    pub composer: String,
    pub description: String,
}

impl Composer {
    /// Full name of the composer without the lifespan.
    #[must_use]
    pub fn raw_name(&self) -> &str {
        self.description
            .split_once('(')
            .map_or(self.description.as_str(), |(name, _)| name)
            .trim_end()
    }

    /// Citation line, e.g. `by Johann Sebastian Bach`.
    #[must_use]
    pub fn byline(&self) -> String {
        match self.composer.as_str() {
            "Traditional" | "Anonymous" => self.composer.clone(),
            _ => format!("by {}", self.raw_name()),
        }
    }
}

/// Someone who transcribed and maintains pieces in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub url: String,
}

impl Contributor {
    /// Lightly munged address for display.
    #[must_use]
    pub fn reformat_email(&self) -> String {
        self.email.replace('@', " (at) ")
    }
}

/// A musical genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Style {
    pub style: String,
    pub slug: String,
    pub in_mutopia: bool,
}

/// Lowercase, hyphen-separated form of `text` suitable for URLs.
#[must_use]
pub fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// A LilyPond version, kept whole and split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LpVersion {
    pub id: i64,
    pub version: String,
    pub major: Option<i64>,
    pub minor: Option<i64>,
    /// Free-form last part, may contain non-digits.
    pub edit: String,
}

/// A single canonical instrument name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Instrument {
    pub instrument: String,
    pub in_mutopia: bool,
}

/// Copyright terms a piece is published under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub badge: String,
    pub active: bool,
}

/// One catalogued piece of music.
///
/// Foreign keys are stored as the natural key of the referenced row so the
/// record can be filled from a descriptor without extra lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Piece {
    pub piece_id: i64,
    pub title: String,
    pub composer: String,
    pub style: Option<String>,
    /// Instrument text exactly as written by the contributor.
    pub raw_instrument: String,
    pub license_id: Option<i64>,
    pub maintainer_id: Option<i64>,
    pub version_id: Option<i64>,
    pub opus: String,
    pub lyricist: String,
    /// Sometimes approximate, not necessarily a date.
    pub date_composed: String,
    pub date_published: NaiveDate,
    pub source: String,
    pub moreinfo: String,
}

impl Piece {
    /// An empty piece with only the identifying fields set.
    #[must_use]
    pub fn new(piece_id: i64, composer: &str, date_published: NaiveDate) -> Self {
        Self {
            piece_id,
            title: String::new(),
            composer: composer.to_string(),
            style: None,
            raw_instrument: String::new(),
            license_id: None,
            maintainer_id: None,
            version_id: None,
            opus: String::new(),
            lyricist: String::new(),
            date_composed: String::new(),
            date_published,
            source: String::new(),
            moreinfo: String::new(),
        }
    }

    /// The footer identifier this piece was published under.
    #[must_use]
    pub fn mutopia_id(&self) -> String {
        crate::mutopia_id::MutopiaId::new(self.date_published, self.piece_id).to_string()
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.piece_id, self.title)
    }
}

/// Paper sizes the printable formats are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    fn tag(self) -> &'static str {
        match self {
            PaperSize::A4 => "a4",
            PaperSize::Letter => "let",
        }
    }
}

/// The downloadable files of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFile {
    Midi,
    Source,
    PostScript(PaperSize),
    Pdf(PaperSize),
}

impl AssetFile {
    /// Every file a published asset is expected to offer.
    pub const ALL: [AssetFile; 6] = [
        AssetFile::Midi,
        AssetFile::Source,
        AssetFile::PostScript(PaperSize::A4),
        AssetFile::PostScript(PaperSize::Letter),
        AssetFile::Pdf(PaperSize::A4),
        AssetFile::Pdf(PaperSize::Letter),
    ];
}

/// How the files of an asset are packaged.
///
/// A piece typeset from one LilyPond file publishes plain files. A piece built
/// from several LilyPond files publishes each format as a zip archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetLayout {
    #[default]
    Single,
    Archive,
}

impl AssetLayout {
    #[must_use]
    pub fn from_has_lys(has_lys: bool) -> Self {
        if has_lys {
            AssetLayout::Archive
        } else {
            AssetLayout::Single
        }
    }

    #[must_use]
    pub fn has_lys(self) -> bool {
        self == AssetLayout::Archive
    }

    /// Filename of `file` for an asset called `name`.
    #[must_use]
    pub fn file_name(self, name: &str, file: AssetFile) -> String {
        match (self, file) {
            (AssetLayout::Single, AssetFile::Midi) => format!("{name}.mid"),
            (AssetLayout::Single, AssetFile::Source) => format!("{name}.ly"),
            (AssetLayout::Single, AssetFile::PostScript(size)) => {
                format!("{name}-{}.ps.gz", size.tag())
            }
            (AssetLayout::Single, AssetFile::Pdf(size)) => format!("{name}-{}.pdf", size.tag()),
            (AssetLayout::Archive, AssetFile::Midi) => format!("{name}-mids.zip"),
            (AssetLayout::Archive, AssetFile::Source) => format!("{name}-lys.zip"),
            (AssetLayout::Archive, AssetFile::PostScript(size)) => {
                format!("{name}-{}-pss.zip", size.tag())
            }
            (AssetLayout::Archive, AssetFile::Pdf(size)) => {
                format!("{name}-{}-pdfs.zip", size.tag())
            }
        }
    }
}

/// Maps one piece to the folder holding its published files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMap {
    pub id: i64,
    /// Topmost location of the piece, relative to the archive root.
    pub folder: String,
    /// Common stem of the files in `folder`.
    pub name: String,
    pub layout: AssetLayout,
    pub has_svg: bool,
    pub piece_id: Option<i64>,
    pub published: bool,
}

impl AssetMap {
    /// Name derived from a folder: its last path segment.
    #[must_use]
    pub fn name_for_folder(folder: &str) -> &str {
        folder.rsplit('/').next().unwrap_or(folder)
    }

    /// Location of the RDF descriptor under `base_url`.
    #[must_use]
    pub fn rdf_url(&self, base_url: &str) -> String {
        format!("{}/{}/{}.rdf", base_url.trim_end_matches('/'), self.folder, self.name)
    }

    /// The subject URI the descriptor's properties are stated about.
    #[must_use]
    pub fn rdf_subject(&self, base_url: &str) -> String {
        format!("{}/{}/", base_url.trim_end_matches('/'), self.folder)
    }

    /// Full download URL of one of the asset's files.
    #[must_use]
    pub fn file_url(&self, base_url: &str, file: AssetFile) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.folder,
            self.layout.file_name(&self.name, file)
        )
    }

    /// The composer part of the folder.
    #[must_use]
    pub fn composer_part(&self) -> &str {
        self.folder.split('/').next().unwrap_or_default()
    }
}

impl fmt::Display for AssetMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.name)
    }
}

/// A named group of pieces, such as a complete opus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub tag: String,
    pub title: String,
}

impl Collection {
    /// Optional user-provided description file in the archive.
    #[must_use]
    pub fn user_infofile(&self) -> String {
        format!("collections/{}/collection-info.dat", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(layout: AssetLayout) -> AssetMap {
        AssetMap {
            id: 1,
            folder: "BachJS/BWV846/wtk1-prelude1".to_string(),
            name: "wtk1-prelude1".to_string(),
            layout,
            has_svg: false,
            piece_id: None,
            published: false,
        }
    }

    #[test]
    fn test_composer_byline() {
        let bach = Composer {
            composer: "BachJS".to_string(),
            description: "J. S. Bach (1685-1750)".to_string(),
        };
        assert_eq!(bach.byline(), "by J. S. Bach");

        let trad = Composer {
            composer: "Traditional".to_string(),
            description: "Traditional".to_string(),
        };
        assert_eq!(trad.byline(), "Traditional");
    }

    #[test]
    fn test_reformat_email() {
        let c = Contributor {
            id: 1,
            name: "Glen".to_string(),
            email: "glen@example.org".to_string(),
            url: String::new(),
        };
        assert_eq!(c.reformat_email(), "glen (at) example.org");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Romantic"), "romantic");
        assert_eq!(slugify("Popular / Dance"), "popular-dance");
    }

    #[test]
    fn test_single_layout_file_names() {
        let a = asset(AssetLayout::Single);
        assert_eq!(a.layout.file_name(&a.name, AssetFile::Midi), "wtk1-prelude1.mid");
        assert_eq!(a.layout.file_name(&a.name, AssetFile::Source), "wtk1-prelude1.ly");
        assert_eq!(
            a.layout.file_name(&a.name, AssetFile::PostScript(PaperSize::A4)),
            "wtk1-prelude1-a4.ps.gz"
        );
        assert_eq!(
            a.layout.file_name(&a.name, AssetFile::Pdf(PaperSize::Letter)),
            "wtk1-prelude1-let.pdf"
        );
    }

    #[test]
    fn test_archive_layout_file_names() {
        let a = asset(AssetLayout::Archive);
        assert_eq!(a.layout.file_name(&a.name, AssetFile::Midi), "wtk1-prelude1-mids.zip");
        assert_eq!(a.layout.file_name(&a.name, AssetFile::Source), "wtk1-prelude1-lys.zip");
        assert_eq!(
            a.layout.file_name(&a.name, AssetFile::PostScript(PaperSize::Letter)),
            "wtk1-prelude1-let-pss.zip"
        );
        assert_eq!(
            a.layout.file_name(&a.name, AssetFile::Pdf(PaperSize::A4)),
            "wtk1-prelude1-a4-pdfs.zip"
        );
    }

    #[test]
    fn test_asset_urls() {
        let a = asset(AssetLayout::Single);
        let base = "http://www.mutopiaproject.org/ftp/";
        assert_eq!(
            a.rdf_url(base),
            "http://www.mutopiaproject.org/ftp/BachJS/BWV846/wtk1-prelude1/wtk1-prelude1.rdf"
        );
        assert_eq!(
            a.rdf_subject(base),
            "http://www.mutopiaproject.org/ftp/BachJS/BWV846/wtk1-prelude1/"
        );
        assert_eq!(
            a.file_url(base, AssetFile::Midi),
            "http://www.mutopiaproject.org/ftp/BachJS/BWV846/wtk1-prelude1/wtk1-prelude1.mid"
        );
        assert_eq!(a.composer_part(), "BachJS");
        assert_eq!(a.to_string(), "BachJS/BWV846/wtk1-prelude1/wtk1-prelude1");
    }

    #[test]
    fn test_name_for_folder() {
        assert_eq!(AssetMap::name_for_folder("BachJS/BWV846/wtk1"), "wtk1");
        assert_eq!(AssetMap::name_for_folder("single"), "single");
    }

    #[test]
    fn test_piece_mutopia_id() {
        let date = NaiveDate::from_ymd_opt(2016, 2, 12).unwrap();
        let piece = Piece::new(33, "BachJS", date);
        assert_eq!(piece.mutopia_id(), "Mutopia-2016/2/12-33");
    }

    #[test]
    fn test_collection_infofile() {
        let c = Collection { tag: "wtk1".to_string(), title: "WTK I".to_string() };
        assert_eq!(c.user_infofile(), "collections/wtk1/collection-info.dat");
    }
}
