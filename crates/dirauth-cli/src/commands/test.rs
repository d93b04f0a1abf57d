//! Endpoint connectivity check.

use colored::Colorize;
use dirauth_core::{DirectoryConfig, EndpointReport};
use serde::Serialize;
use tabled::Tabled;

use crate::config::OutputFormat;
use crate::output::{info, output};
use crate::CliError;

/// Endpoint probe result for display.
#[derive(Debug, Serialize, Tabled)]
struct EndpointDisplay {
    #[tabled(rename = "Endpoint")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency (ms)")]
    latency_ms: u64,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<EndpointReport> for EndpointDisplay {
    fn from(report: EndpointReport) -> Self {
        Self {
            name: report.name,
            url: report.url,
            status: if report.reachable {
                "up".green().to_string()
            } else {
                "down".red().to_string()
            },
            latency_ms: report.latency_ms,
            error: report.error.unwrap_or_default(),
        }
    }
}

/// Probes every endpoint of the profile.
///
/// Fails when no endpoint is reachable.
pub async fn run_test(
    name: &str,
    profile: &DirectoryConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let service = super::connect(name, profile)?;
    if format == OutputFormat::Table {
        info(&format!(
            "Probing {} endpoint(s) of profile '{name}'...",
            profile.endpoints.len()
        ));
    }

    let reports = service.test_connection().await;
    service.shutdown().await;
    let any_up = reports.iter().any(|r| r.reachable);

    match format {
        OutputFormat::Table => {
            let rows: Vec<EndpointDisplay> = reports.into_iter().map(Into::into).collect();
            output(&rows, format)?;
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    if any_up {
        Ok(())
    } else {
        Err(CliError::Rejected("no endpoint is reachable"))
    }
}
