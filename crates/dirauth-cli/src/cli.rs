//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dirauth_core::SearchScope;

use crate::config::OutputFormat;

/// dirauth - LDAP credential checks and directory browsing.
#[derive(Debug, Parser)]
#[command(name = "dirauth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (overrides the default location).
    #[arg(short, long, env = "DIRAUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Connection profile (overrides the configured default).
    #[arg(short, long, env = "DIRAUTH_PROFILE")]
    pub profile: Option<String>,

    /// Output format (overrides config).
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a principal's password.
    ///
    /// The password is read from `DIRAUTH_PASSWORD` or, when unset, from
    /// the first line of standard input.
    Verify {
        /// Username or DN.
        principal: String,

        /// Search base for search-then-bind (overrides the profile).
        #[arg(long)]
        base: Option<String>,
    },

    /// Search the directory.
    Search(SearchArgs),

    /// List the immediate children of an entry.
    Children {
        /// Parent DN.
        dn: String,
    },

    /// Show one entry.
    Entry {
        /// Entry DN.
        dn: String,
    },

    /// Probe every configured endpoint.
    Test,

    /// Add an entry (needs a writable profile).
    Add {
        /// New entry DN.
        dn: String,

        /// Attribute as `name=value`; repeat for more values.
        #[arg(short, long = "attr", required = true)]
        attr: Vec<String>,
    },

    /// Change attributes of an entry (needs a writable profile).
    Modify {
        /// Entry DN.
        dn: String,

        /// Replace an attribute with `name=value`; repeat a name for several values.
        #[arg(long)]
        set: Vec<String>,

        /// Remove an attribute entirely.
        #[arg(long)]
        clear: Vec<String>,
    },

    /// Delete a leaf entry (needs a writable profile).
    Delete {
        /// Entry DN.
        dn: String,

        /// Skip confirmation.
        #[arg(long)]
        force: bool,
    },

    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Search arguments.
#[derive(Debug, clap::Args)]
pub struct SearchArgs {
    /// LDAP filter, e.g. `(mail=*@example.com)`.
    pub filter: String,

    /// Search base (defaults to the profile's base DN).
    #[arg(short, long)]
    pub base: Option<String>,

    /// Search scope.
    #[arg(short, long, value_enum, default_value = "subtree")]
    pub scope: ScopeArg,

    /// Attributes to return (comma-separated); all user attributes when empty.
    #[arg(short, long, value_delimiter = ',')]
    pub attrs: Vec<String>,

    /// Entries per page (defaults to the profile's page size).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Maximum number of entries; 0 for no limit.
    #[arg(long, default_value = "0")]
    pub size_limit: u32,
}

/// Search scope argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// Only the base entry.
    Base,
    /// Direct children of the base.
    One,
    /// The base and everything below it.
    Subtree,
}

impl From<ScopeArg> for SearchScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Base => Self::Base,
            ScopeArg::One => Self::OneLevel,
            ScopeArg::Subtree => Self::Subtree,
        }
    }
}

/// Config commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration.
    Show,

    /// Print the configuration file path.
    Path,

    /// Write a starter configuration with one profile.
    Init {
        /// Profile name.
        #[arg(long, default_value = "default")]
        profile: String,

        /// Directory host.
        #[arg(long)]
        host: String,

        /// Bind DN template with a `{username}` placeholder.
        #[arg(long)]
        template: Option<String>,

        /// Default base DN.
        #[arg(long)]
        base_dn: Option<String>,

        /// Overwrite an existing profile.
        #[arg(long)]
        force: bool,
    },
}
