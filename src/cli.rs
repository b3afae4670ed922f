//! # Command-Line Interface Module
//!
//! This module defines the command-line interface using Clap derive macros.
//!
//! ## Commands
//!
//! - `init-db`: Create the catalog schema
//! - `load-reference`: Seed composers, styles, licenses, instruments and aliases
//! - `mark-pending`: Queue an asset folder for the next update
//! - `update`: Run the database update pass
//! - `status`: Print the highest piece id and the pending folders as JSON
//!
//! ## Examples
//!
//! ```bash
//! mutopia init-db
//! mutopia load-reference reference.toml
//! mutopia mark-pending BachJS/BWV846/wtk1-prelude1
//! mutopia update
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "mutopia")]
#[command(about = "Mutopia catalog: reconcile published sheet music into the catalog database")]
#[command(version)]
pub struct Args {
    /// TOML configuration file
    #[arg(long, global = true, env = "MUTOPIA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database, overrides the configured path
    #[arg(long, global = true, env = "MUTOPIA_DB")]
    pub db: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the catalog database
    ///
    /// Creates every missing table. Existing data is kept unless --force is
    /// given.
    InitDb {
        /// Delete and recreate the database file
        #[arg(long)]
        force: bool,
    },

    /// Load reference data from a TOML file
    ///
    /// Composers, styles, licenses, instruments and instrument aliases must
    /// exist before pieces referring to them can be reconciled.
    LoadReference {
        /// Reference data file
        file: PathBuf,
    },

    /// Print the reference tables as JSON
    Reference,

    /// Queue an asset folder for the next update
    ///
    /// Creates the asset if the folder is new, otherwise marks it unpublished
    /// so its descriptor is read again.
    MarkPending {
        /// Folder relative to the archive root, e.g. BachJS/BWV846/wtk1-prelude1
        folder: String,

        /// The piece is built from several LilyPond files (zipped formats)
        #[arg(long)]
        archive: bool,
    },

    /// Run the database update pass
    ///
    /// Reads the descriptor of every pending asset, creates or updates its
    /// piece and rebuilds missing instrument associations. The pass is atomic:
    /// a missing composer, style or license aborts it without changes.
    Update,

    /// Print the highest piece id and the pending folders as JSON
    Status,

    /// Map an instrument nickname or foreign name to a known instrument
    Alias {
        /// Name as written by contributors, e.g. Uke
        raw: String,
        /// Canonical instrument, e.g. Ukulele
        instrument: String,
    },

    /// Print the download URLs of an asset's files
    Assets {
        /// Folder relative to the archive root
        folder: String,
    },

    /// Create a collection or add pieces to one
    Collection {
        /// Unique collection tag
        tag: String,
        /// Collection title
        title: String,
        /// Piece ids to add
        #[arg(required = true)]
        pieces: Vec<i64>,
    },

    /// Generate shell completions
    ///
    /// Usage: mutopia completion bash > ~/.local/share/bash-completion/completions/mutopia
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
