//! Credential verification command.

use dirauth_core::{CredentialRequest, DirectoryConfig, Secret, VerificationResult};
use serde::Serialize;
use tabled::Tabled;

use crate::config::OutputFormat;
use crate::output::{error, output, read_secret, success};
use crate::CliError;

/// Environment variable holding the secret to verify.
pub const PASSWORD_ENV: &str = "DIRAUTH_PASSWORD";

/// Verification outcome for display.
#[derive(Debug, Serialize, Tabled)]
struct VerifyDisplay {
    /// Principal as typed.
    #[tabled(rename = "Principal")]
    principal: String,
    /// Outcome.
    #[tabled(rename = "Result")]
    result: &'static str,
    /// Resolved DN on success.
    #[tabled(rename = "DN")]
    dn: String,
}

/// Runs the verify command.
///
/// Fails unless the directory accepted the credentials.
pub async fn run_verify(
    principal: String,
    base: Option<String>,
    name: &str,
    profile: &DirectoryConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let secret = read_secret(
        std::env::var(PASSWORD_ENV).ok(),
        &mut std::io::stdin().lock(),
    )?;

    let mut request = CredentialRequest::new(principal.clone(), Secret::new(secret));
    if let Some(base) = base {
        request = request.with_search_base(base);
    }

    let service = super::connect(name, profile)?;
    let result = service.verify(request).await;
    service.shutdown().await;
    let result = result?;

    match format {
        OutputFormat::Table => match &result {
            VerificationResult::Success { dn, attributes } => {
                success(&format!("{principal}: {}", result.public_message()));
                println!("dn: {dn}");
                for (attribute, values) in attributes {
                    for value in values {
                        println!("{attribute}: {value}");
                    }
                }
            }
            other => error(&format!("{principal}: {}", other.public_message())),
        },
        OutputFormat::Json => {
            let display = VerifyDisplay {
                principal,
                result: result.public_message(),
                dn: match &result {
                    VerificationResult::Success { dn, .. } => dn.clone(),
                    _ => String::new(),
                },
            };
            output(&[display], format)?;
        }
    }

    if result.is_success() {
        Ok(())
    } else {
        Err(CliError::Rejected(result.public_message()))
    }
}
