//! CLI configuration.
//!
//! The configuration file holds named connection profiles, each a complete
//! [`DirectoryConfig`]:
//!
//! ```toml
//! default_profile = "corp"
//! output_format = "table"
//!
//! [profiles.corp]
//! base_dn = "dc=corp,dc=example"
//!
//! [[profiles.corp.endpoints]]
//! name = "dc1"
//! host = "dc1.corp.example"
//! bind_dn_template = "uid={username},ou=people,dc=corp,dc=example"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dirauth_core::DirectoryConfig;
use serde::{Deserialize, Serialize};

use crate::{CliError, CliResult};

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Profile used when none is given on the command line.
    #[serde(default)]
    pub default_profile: Option<String>,

    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Connection profiles by name.
    #[serde(default)]
    pub profiles: BTreeMap<String, DirectoryConfig>,
}

impl CliConfig {
    /// Loads configuration from the default location.
    pub fn load() -> CliResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads configuration from a file; a missing file yields the default.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration text.
    pub fn parse(content: &str) -> CliResult<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(format!("failed to parse config: {e}")))
    }

    /// Saves configuration to a file.
    ///
    /// Service account passwords loaded from the file are written back
    /// alongside their profiles.
    pub fn save_to(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self.to_table()?)
            .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serializes to a TOML table, restoring service account passwords.
    fn to_table(&self) -> CliResult<toml::Table> {
        let toml::Value::Table(mut table) = toml::Value::try_from(self)
            .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))?
        else {
            return Err(CliError::Config("config did not serialize to a table".to_string()));
        };

        let Some(toml::Value::Table(profiles)) = table.get_mut("profiles") else {
            return Ok(table);
        };
        for (name, profile) in &self.profiles {
            let Some(account) = &profile.service_account else {
                continue;
            };
            if account.password.is_empty() {
                continue;
            }
            let Some(toml::Value::Table(saved)) = profiles
                .get_mut(name)
                .and_then(|p| p.get_mut("service_account"))
            else {
                continue;
            };
            saved.insert(
                "password".to_string(),
                toml::Value::String(account.password.expose().to_string()),
            );
        }
        Ok(table)
    }

    /// Gets the default configuration file path.
    pub fn config_path() -> CliResult<PathBuf> {
        let home = dirs_next::home_dir()
            .ok_or_else(|| CliError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".dirauth").join("dirauth.toml"))
    }

    /// Resolves the profile to use.
    ///
    /// An explicit name wins, then `default_profile`, then the only profile
    /// if exactly one is configured.
    pub fn profile(&self, name: Option<&str>) -> CliResult<(&str, &DirectoryConfig)> {
        let name = match name.or(self.default_profile.as_deref()) {
            Some(name) => name,
            None if self.profiles.len() == 1 => {
                let (name, profile) = self
                    .profiles
                    .iter()
                    .next()
                    .ok_or_else(|| CliError::Config("no profiles configured".to_string()))?;
                return Ok((name.as_str(), profile));
            }
            None if self.profiles.is_empty() => {
                return Err(CliError::Config(
                    "no profiles configured; run `dirauth config init`".to_string(),
                ));
            }
            None => {
                return Err(CliError::InvalidArgument(
                    "several profiles configured; pass --profile or set default_profile".to_string(),
                ));
            }
        };

        self.profiles
            .get_key_value(name)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| CliError::NotFound {
                resource_type: "profile".to_string(),
                id: name.to_string(),
            })
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}
