//! Search command.

use dirauth_core::{DirectoryConfig, SearchQuery};

use crate::cli::SearchArgs;
use crate::config::OutputFormat;
use crate::output::{output_entries, warning};
use crate::CliError;

/// Builds the query for the search arguments.
fn build_query(args: SearchArgs, profile: &DirectoryConfig) -> crate::CliResult<SearchQuery> {
    let base = args
        .base
        .or_else(|| profile.base_dn.clone())
        .ok_or_else(|| CliError::InvalidArgument("no --base given and profile has no base_dn".to_string()))?;

    Ok(SearchQuery::new(base, args.filter)
        .scope(args.scope.into())
        .attributes(args.attrs)
        .page_size(args.page_size.unwrap_or(profile.page_size))
        .size_limit(args.size_limit))
}

/// Runs the search command.
pub async fn run_search(
    args: SearchArgs,
    name: &str,
    profile: &DirectoryConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let query = build_query(args, profile)?;
    let service = super::connect(name, profile)?;

    let outcome = match service.search(query).await {
        Ok(results) => results.collect().await,
        Err(e) => Err(e),
    };
    service.shutdown().await;
    let outcome = outcome?;

    output_entries(&outcome.entries, format)?;
    if outcome.partial {
        warning(&format!(
            "Results are partial: the server stopped after {} entries",
            outcome.entries.len()
        ));
    }
    Ok(())
}
