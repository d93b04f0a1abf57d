//! Connection pool behaviour under load, staleness and cancellation.

use std::sync::Arc;
use std::time::Duration;

use dirauth_core::testing::EndpointState;
use dirauth_core::{DirectoryError, RetryPolicy, SearchQuery};
use dirauth_integration_tests::{add_people, config, seeded_directory, TestEnv, PEOPLE};

fn people() -> SearchQuery {
    SearchQuery::new(PEOPLE, "(objectClass=inetOrgPerson)")
}

/// Tests that concurrent callers beyond the pool size wait instead of
/// opening extra connections.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bound_holds_under_concurrent_load() -> anyhow::Result<()> {
    let env = TestEnv::new(
        config(&["primary"])
            .max_connections_per_endpoint(3)
            .acquire_timeout(Duration::from_secs(30)),
    );
    env.directory.set_state("primary", EndpointState::Slow(Duration::from_millis(5)));
    let directory = env.directory;
    let service = Arc::new(env.service);

    let tasks: Vec<_> = (0..24)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.search_all(people()).await })
        })
        .collect();

    for task in tasks {
        let outcome = task.await??;
        assert_eq!(outcome.entries.len(), 2);
        assert!(!outcome.partial);
    }

    assert!(directory.peak_open_sessions("primary") <= 3);
    assert!(directory.connects("primary") <= 3);
    let status = service.pool().status("primary").expect("endpoint is pooled");
    assert_eq!(status.in_use, 0);
    assert_eq!(status.max, 3);
    Ok(())
}

/// Tests the explicit acquire timeout and that an abandoned cursor gives
/// its slot back without returning the connection.
#[tokio::test]
async fn test_acquire_timeout_and_abandoned_cursor() -> anyhow::Result<()> {
    let directory = seeded_directory();
    add_people(&directory, 5);
    let env = TestEnv::with_directory(
        directory,
        config(&["primary"])
            .max_connections_per_endpoint(1)
            .acquire_timeout(Duration::from_millis(50)),
    );

    let mut cursor = env.service.search(people().page_size(2)).await?;
    assert!(cursor.next_entry().await?.is_some());

    let err = env.service.search_all(people()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::PoolExhausted { .. }));

    drop(cursor);
    let status = env.service.pool().status("primary").expect("endpoint is pooled");
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 0);

    let outcome = env.service.search_all(people()).await?;
    assert_eq!(outcome.entries.len(), 7);
    assert_eq!(env.directory.connects("primary"), 2);
    Ok(())
}

/// Tests that idle connections past their lifetime are validated and
/// replaced when validation fails.
#[tokio::test]
async fn test_stale_idle_connection_is_replaced() -> anyhow::Result<()> {
    let env = TestEnv::new(config(&["primary"]).idle_lifetime(Duration::from_millis(20)));

    env.service.search_all(people()).await?;
    assert_eq!(env.service.pool().status("primary").map(|s| s.idle), Some(1));

    env.directory.drop_sessions("primary");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = env.service.search_all(people()).await?;
    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(env.directory.pings("primary"), 1);
    assert_eq!(env.directory.connects("primary"), 2);
    Ok(())
}

/// Tests that fresh idle connections are reused without a liveness check.
#[tokio::test]
async fn test_fresh_idle_connection_is_reused() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);

    for _ in 0..3 {
        env.service.search_all(people()).await?;
    }

    assert_eq!(env.directory.connects("primary"), 1);
    assert_eq!(env.directory.pings("primary"), 0);
    Ok(())
}

/// Tests that an attempt cut off by its timeout never returns its
/// connection to the pool.
#[tokio::test(start_paused = true)]
async fn test_timed_out_attempt_discards_connection() -> anyhow::Result<()> {
    let env = TestEnv::new(config(&["primary"]).retry(RetryPolicy {
        attempt_timeout_ms: 100,
        backoff_ms: 0,
        ..RetryPolicy::default()
    }));

    env.service.search_all(people()).await?;
    assert_eq!(env.service.pool().status("primary").map(|s| s.idle), Some(1));

    env.directory.set_state("primary", EndpointState::Slow(Duration::from_secs(1)));
    let err = env.service.search_all(people()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Timeout(_)));

    let status = env.service.pool().status("primary").expect("endpoint is pooled");
    assert_eq!(status.idle, 0);
    assert_eq!(status.in_use, 0);

    env.directory.set_state("primary", EndpointState::Up);
    env.service.search_all(people()).await?;
    assert_eq!(env.directory.connects("primary"), 2);
    Ok(())
}

/// Tests that shutdown closes idle connections and refuses new work.
#[tokio::test]
async fn test_shutdown_closes_idle_connections() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);
    env.service.search_all(people()).await?;

    env.service.shutdown().await;
    assert!(env.service.pool().is_closed());
    assert_eq!(env.service.pool().status("primary").map(|s| s.idle), Some(0));

    let err = env.service.search_all(people()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::PoolClosed));
    Ok(())
}
