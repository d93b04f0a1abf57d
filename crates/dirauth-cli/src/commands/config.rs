//! Configuration management commands.

use std::path::Path;

use dirauth_core::{DirectoryConfig, ServerEndpoint};

use crate::cli::ConfigCommand;
use crate::output::{info, success};
use crate::{CliConfig, CliError};

/// Runs a config command.
pub fn run_config(cmd: ConfigCommand, config: &mut CliConfig, path: &Path) -> crate::CliResult<()> {
    match cmd {
        ConfigCommand::Show => show_config(config, path),
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Init {
            profile,
            host,
            template,
            base_dn,
            force,
        } => {
            let directory = starter_profile(&host, template, base_dn)?;
            add_profile(config, &profile, directory, force)?;
            config.save_to(path)?;
            success(&format!("Profile '{profile}' saved to: {}", path.display()));
            Ok(())
        }
    }
}

/// Shows the current configuration.
fn show_config(config: &CliConfig, path: &Path) -> crate::CliResult<()> {
    info(&format!("Configuration file: {}", path.display()));
    println!();
    println!("output_format: {:?}", config.output_format);
    if let Some(default) = &config.default_profile {
        println!("default_profile: {default}");
    }

    for (name, profile) in &config.profiles {
        println!();
        println!("[{name}]");
        for endpoint in &profile.endpoints {
            println!(
                "  endpoint: {} {} (priority {}, weight {})",
                endpoint.name,
                endpoint.url(),
                endpoint.priority,
                endpoint.weight
            );
        }
        if let Some(base_dn) = &profile.base_dn {
            println!("  base_dn: {base_dn}");
        }
        if let Some(account) = &profile.service_account {
            println!("  service_account: {} (password ****)", account.bind_dn);
        }
        println!("  edit_mode: {:?}", profile.edit_mode);
    }

    Ok(())
}

/// Builds a single-endpoint LDAPS profile.
fn starter_profile(
    host: &str,
    template: Option<String>,
    base_dn: Option<String>,
) -> crate::CliResult<DirectoryConfig> {
    let mut endpoint = ServerEndpoint::new("primary", host);
    if let Some(template) = template {
        endpoint = endpoint.with_bind_dn_template(template);
    }

    let mut builder = DirectoryConfig::builder().endpoint(endpoint);
    if let Some(base_dn) = base_dn {
        builder = builder.base_dn(base_dn);
    }
    Ok(builder.build()?)
}

/// Adds a profile, refusing to replace one unless forced.
///
/// The first profile becomes the default.
fn add_profile(
    config: &mut CliConfig,
    name: &str,
    profile: DirectoryConfig,
    force: bool,
) -> crate::CliResult<()> {
    if config.profiles.contains_key(name) && !force {
        return Err(CliError::InvalidArgument(format!(
            "profile '{name}' already exists; pass --force to replace it"
        )));
    }

    config.profiles.insert(name.to_string(), profile);
    if config.default_profile.is_none() {
        config.default_profile = Some(name.to_string());
    }
    Ok(())
}
