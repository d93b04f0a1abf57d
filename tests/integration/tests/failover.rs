//! Retry, failover and timeouts.

use std::sync::Arc;
use std::time::Duration;

use dirauth_core::testing::EndpointState;
use dirauth_core::{
    DirectoryError, FailoverMode, RetryCoordinator, RetryPolicy, SearchQuery, SelectionMode,
    ServerSelector, VerificationResult,
};
use dirauth_integration_tests::{config, endpoint, TestEnv, BASE};

fn coordinator(names: &[&str]) -> RetryCoordinator {
    let endpoints = (0u32..).zip(names).map(|(p, n)| Arc::new(endpoint(n, p)));
    let selector = ServerSelector::new(endpoints, SelectionMode::Priority, Duration::from_secs(30));
    RetryCoordinator::new(Arc::new(selector), RetryPolicy::default())
}

/// Tests that the third endpoint answers after the first two are unavailable.
#[tokio::test]
async fn test_third_endpoint_succeeds_after_two_unavailable() -> anyhow::Result<()> {
    let coordinator = coordinator(&["a", "b", "c"]);
    let mut attempts = Vec::new();

    let result = coordinator
        .execute("verify", |endpoint| {
            attempts.push(endpoint.name.clone());
            async move {
                if endpoint.name == "c" {
                    Ok(VerificationResult::Success {
                        dn: "uid=jdoe,ou=people,dc=example,dc=com".into(),
                        attributes: Default::default(),
                    })
                } else {
                    Err(DirectoryError::unavailable("connection refused"))
                }
            }
        })
        .await?;

    assert!(result.is_success());
    assert_eq!(attempts, vec!["a", "b", "c"]);
    assert!(coordinator.selector().is_cooling_down("a"));
    assert!(coordinator.selector().is_cooling_down("b"));
    assert!(!coordinator.selector().is_cooling_down("c"));
    Ok(())
}

/// Tests that rejected credentials are never retried.
#[tokio::test]
async fn test_invalid_credentials_get_one_attempt() -> anyhow::Result<()> {
    let coordinator = coordinator(&["a", "b", "c"]);
    let mut attempts = 0;

    let result: Result<(), _> = coordinator
        .execute("verify", |_| {
            attempts += 1;
            async { Err(DirectoryError::InvalidCredentials) }
        })
        .await;

    assert!(matches!(result, Err(DirectoryError::InvalidCredentials)));
    assert_eq!(attempts, 1);
    Ok(())
}

/// Tests the same properties end to end.
#[tokio::test]
async fn test_service_fails_over_to_third_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["a", "b", "c"]);
    env.directory.set_state("a", EndpointState::Down);
    env.directory.set_state("b", EndpointState::Down);

    let result = env.service.verify_credentials("jdoe", "s3cret").await?;

    assert!(result.is_success());
    assert_eq!(env.directory.connects("c"), 1);
    assert!(env.service.selector().is_cooling_down("a"));

    // The next request starts on the healthy endpoint.
    let result = env.service.verify_credentials("jdoe", "s3cret").await?;
    assert!(result.is_success());
    assert_eq!(env.directory.connects("c"), 2);
    Ok(())
}

/// Tests that a wrong password stops at the first endpoint.
#[tokio::test]
async fn test_service_does_not_retry_wrong_password() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["a", "b", "c"]);

    let result = env.service.verify_credentials("jdoe", "wrong").await?;

    assert_eq!(result, VerificationResult::InvalidCredentials);
    assert_eq!(env.directory.binds(), 1);
    assert_eq!(env.directory.connects("b"), 0);
    assert_eq!(env.directory.connects("c"), 0);
    Ok(())
}

/// Tests that a filter the server rejects is not retried elsewhere.
#[tokio::test]
async fn test_malformed_filter_is_not_retried() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["a", "b"]);

    // Unbalanced: rejected before any connection is used.
    let err = env.service.search_all(SearchQuery::new(BASE, "(uid=jdoe")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::MalformedFilter(_)));
    assert_eq!(env.directory.searches(), 0);

    // Balanced but unparseable: one server round trip.
    let err = env.service.search_all(SearchQuery::new(BASE, "(uid)")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::MalformedFilter(_)));
    assert_eq!(env.directory.searches(), 1);
    assert_eq!(env.directory.connects("b"), 0);
    Ok(())
}

/// Tests that an unresponsive endpoint times out and the next one answers.
#[tokio::test(start_paused = true)]
async fn test_unresponsive_endpoint_times_out_then_fails_over() -> anyhow::Result<()> {
    let env = TestEnv::new(config(&["a", "b"]).retry(RetryPolicy {
        attempt_timeout_ms: 2_000,
        backoff_ms: 0,
        ..RetryPolicy::default()
    }));
    env.directory.set_state("a", EndpointState::Unresponsive);

    let started = tokio::time::Instant::now();
    let result = env.service.verify_credentials("jdoe", "s3cret").await?;

    assert!(result.is_success());
    assert_eq!(env.directory.connects("b"), 1);
    assert!(started.elapsed() >= Duration::from_secs(2));
    Ok(())
}

/// Tests that a request exceeding its overall deadline reports a timeout.
#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_request() -> anyhow::Result<()> {
    let env = TestEnv::new(config(&["a", "b", "c"]).retry(RetryPolicy {
        attempt_timeout_ms: 2_000,
        deadline_ms: 3_000,
        backoff_ms: 0,
        ..RetryPolicy::default()
    }));
    for name in ["a", "b", "c"] {
        env.directory.set_state(name, EndpointState::Unresponsive);
    }

    let started = tokio::time::Instant::now();
    let result = env.service.verify_credentials("jdoe", "s3cret").await?;

    assert_eq!(result, VerificationResult::Timeout);
    assert!(started.elapsed() <= Duration::from_millis(3_100));
    Ok(())
}

/// Tests next-request failover: the failing request reports the outage and
/// the following one goes to the next endpoint.
#[tokio::test]
async fn test_next_request_failover() -> anyhow::Result<()> {
    let env = TestEnv::new(config(&["a", "b"]).retry(RetryPolicy {
        failover: FailoverMode::NextRequest,
        backoff_ms: 0,
        ..RetryPolicy::default()
    }));
    env.directory.set_state("a", EndpointState::Down);

    let first = env.service.verify_credentials("jdoe", "s3cret").await?;
    assert_eq!(first, VerificationResult::ServerUnavailable);
    assert_eq!(env.directory.connects("b"), 0);

    let second = env.service.verify_credentials("jdoe", "s3cret").await?;
    assert!(second.is_success());
    assert_eq!(env.directory.connects("b"), 1);
    Ok(())
}
