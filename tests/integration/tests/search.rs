//! Paged search, partial results and browsing.

use dirauth_core::{DirectoryError, SearchQuery, SearchScope};
use dirauth_integration_tests::{add_people, config, seeded_directory, TestEnv, BASE, PEOPLE};
use futures::TryStreamExt;

fn env_with_people(count: usize) -> TestEnv {
    let directory = seeded_directory();
    add_people(&directory, count);
    TestEnv::with_directory(directory, config(&["primary"]))
}

fn bulk() -> SearchQuery {
    SearchQuery::new(PEOPLE, "(employeeType=bulk)")
}

/// Tests that a server size limit yields partial results, not an error.
#[tokio::test]
async fn test_server_size_limit_yields_partial_results() -> anyhow::Result<()> {
    let env = env_with_people(5);
    env.directory.set_server_size_limit(Some(3));

    let outcome = env.service.search_all(bulk()).await?;

    assert!(outcome.partial);
    assert_eq!(outcome.entries.len(), 3);
    assert!(matches!(
        outcome.into_complete(),
        Err(DirectoryError::PartialResult { received: 3 })
    ));
    Ok(())
}

/// Tests a client size limit across several pages.
#[tokio::test]
async fn test_client_size_limit_across_pages() -> anyhow::Result<()> {
    let env = env_with_people(10);

    let mut results = env.service.search(bulk().page_size(2).size_limit(4)).await?;
    let mut seen = 0;
    while results.next_entry().await?.is_some() {
        seen += 1;
    }

    assert_eq!(seen, 4);
    assert!(results.is_partial());
    assert_eq!(results.received(), 4);
    assert!(results.is_finished());
    Ok(())
}

/// Tests that pages are fetched only as entries are consumed.
#[tokio::test]
async fn test_pages_are_fetched_lazily() -> anyhow::Result<()> {
    let env = env_with_people(7);

    let mut results = env.service.search(bulk().page_size(3)).await?;
    assert_eq!(env.directory.searches(), 1);

    for _ in 0..3 {
        assert!(results.next_entry().await?.is_some());
    }
    assert_eq!(env.directory.searches(), 1);

    assert!(results.next_entry().await?.is_some());
    assert_eq!(env.directory.searches(), 2);

    let rest = results.collect().await?;
    assert_eq!(rest.entries.len(), 3);
    assert!(!rest.partial);
    assert_eq!(env.directory.searches(), 3);

    // A finished cursor hands its connection back.
    assert_eq!(env.service.pool().status("primary").map(|s| s.idle), Some(1));
    Ok(())
}

/// Tests consuming results as a stream.
#[tokio::test]
async fn test_results_as_stream() -> anyhow::Result<()> {
    let env = env_with_people(6);

    let results = env.service.search(bulk().page_size(4)).await?;
    let entries: Vec<_> = results.into_stream().try_collect().await?;

    assert_eq!(entries.len(), 6);
    assert!(entries.iter().all(|e| e.first("employeeType") == Some("bulk")));
    Ok(())
}

/// Tests attribute selection.
#[tokio::test]
async fn test_requested_attributes_only() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);

    let query = SearchQuery::new(PEOPLE, "(uid=jdoe)").attributes(["mail"]);
    let entries = env.service.search_all(query).await?.into_complete()?;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].first("mail"), Some("jdoe@example.com"));
    assert!(!entries[0].has_attribute("cn"));
    assert!(!entries[0].has_attribute("userPassword"));
    Ok(())
}

/// Tests search scopes.
#[tokio::test]
async fn test_scopes() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);
    let any = "(objectClass=*)";

    let base = env
        .service
        .search_all(SearchQuery::new(BASE, any).scope(SearchScope::Base))
        .await?;
    assert_eq!(base.entries.len(), 1);

    let one = env
        .service
        .search_all(SearchQuery::new(BASE, any).scope(SearchScope::OneLevel))
        .await?;
    assert_eq!(one.entries.len(), 3);

    let sub = env.service.search_all(SearchQuery::new(BASE, any)).await?;
    assert_eq!(sub.entries.len(), 7);
    Ok(())
}

/// Tests browsing helpers.
#[tokio::test]
async fn test_browse_entries() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);

    let children = env.service.children(PEOPLE).await?;
    let mut dns: Vec<_> = children.entries.iter().map(|e| e.dn.as_str()).collect();
    dns.sort_unstable();
    assert_eq!(
        dns,
        vec![
            "uid=jdoe,ou=people,dc=example,dc=com",
            "uid=jsmith,ou=people,dc=example,dc=com",
        ]
    );

    let attributes = env.service.attributes("uid=jdoe,ou=people,dc=example,dc=com").await?;
    assert_eq!(attributes["cn"], vec!["Jane Doe"]);

    let err = env
        .service
        .attributes("uid=ghost,ou=people,dc=example,dc=com")
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::NoSuchEntry(_)));
    Ok(())
}
