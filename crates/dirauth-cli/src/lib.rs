//! # dirauth-cli
//!
//! Command-line front-end for `dirauth-core`.
//!
//! This crate provides:
//! - Credential checks against a configured profile (`dirauth verify`)
//! - Directory search and browsing (`search`, `children`, `entry`)
//! - Endpoint connectivity probes (`test`)
//! - Entry editing on writable profiles (`add`, `modify`, `delete`)
//! - Profile file management (`config`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
