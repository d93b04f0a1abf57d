//! Output formatting utilities.

use colored::Colorize;
use dirauth_core::DirectoryEntry;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::config::OutputFormat;

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Outputs rows in the specified format.
pub fn output<T: Tabled + Serialize>(data: &[T], format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                info("No results found.");
            } else {
                let table = Table::new(data).with(Style::rounded()).to_string();
                println!("{table}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// One attribute value of an entry, as a table row.
#[derive(Debug, Tabled)]
struct AttributeRow<'a> {
    #[tabled(rename = "Attribute")]
    name: &'a str,
    #[tabled(rename = "Value")]
    value: &'a str,
}

fn attribute_rows(entry: &DirectoryEntry) -> Vec<AttributeRow<'_>> {
    entry
        .attributes
        .iter()
        .flat_map(|(name, values)| {
            values.iter().map(move |value| AttributeRow {
                name: name.as_str(),
                value: value.as_str(),
            })
        })
        .collect()
}

/// Outputs entries with all their attributes.
pub fn output_entries(entries: &[DirectoryEntry], format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                info("No entries found.");
            }
            for entry in entries {
                println!("{}", entry.dn.bold());
                let rows = attribute_rows(entry);
                if !rows.is_empty() {
                    println!("{}", Table::new(rows).with(Style::rounded()));
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(entries)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Prompts for confirmation.
pub fn confirm(message: &str) -> crate::CliResult<bool> {
    print!("{message} [y/N]: ");
    std::io::Write::flush(&mut std::io::stdout())?;
    read_confirmation(&mut std::io::stdin().lock())
}

fn read_confirmation(input: &mut impl std::io::BufRead) -> crate::CliResult<bool> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Reads a secret without taking it from the command line.
///
/// `DIRAUTH_PASSWORD` wins; otherwise the first line of `input` is used,
/// without its line terminator.
pub fn read_secret(
    env_value: Option<String>,
    input: &mut impl std::io::BufRead,
) -> crate::CliResult<String> {
    if let Some(value) = env_value {
        return Ok(value);
    }

    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']);
    Ok(trimmed.to_string())
}
