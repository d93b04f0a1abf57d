//! Credential verification.

use dirauth_core::{CredentialRequest, VerificationResult};
use dirauth_integration_tests::{search_then_bind, TestEnv, PEOPLE};

/// Tests that an empty secret is rejected before any connection is opened.
#[tokio::test]
async fn test_empty_secret_makes_no_network_call() -> anyhow::Result<()> {
    for env in [
        TestEnv::direct(&["primary", "secondary"]),
        TestEnv::new(search_then_bind(&["primary", "secondary"], "(uid={username})")),
    ] {
        let result = env.service.verify_credentials("jdoe", "").await?;

        assert_eq!(result, VerificationResult::InvalidCredentials);
        assert_eq!(env.directory.connects("primary"), 0);
        assert_eq!(env.directory.connects("secondary"), 0);
        assert_eq!(env.directory.binds(), 0);
        assert_eq!(env.directory.searches(), 0);
        assert_eq!(env.service.pool().status("primary").map(|s| s.in_use), Some(0));
    }
    Ok(())
}

/// Tests direct bind with the endpoint's DN template.
#[tokio::test]
async fn test_direct_bind_success_returns_attributes() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);

    let result = env.service.verify_credentials("jdoe", "s3cret").await?;

    match result {
        VerificationResult::Success { dn, attributes } => {
            assert_eq!(dn, format!("uid=jdoe,{PEOPLE}"));
            assert_eq!(attributes["mail"], vec!["jdoe@example.com"]);
            assert!(!attributes.contains_key("userPassword"));
        }
        other => panic!("expected success, got {other:?}"),
    }
    Ok(())
}

/// Tests that a principal given as a DN is bound as-is.
#[tokio::test]
async fn test_direct_bind_accepts_dn_principal() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);

    let dn = format!("uid=jsmith,{PEOPLE}");
    let result = env.service.verify_credentials(dn.as_str(), "smith-pw").await?;

    assert!(matches!(result, VerificationResult::Success { dn: ref bound, .. } if *bound == dn));
    Ok(())
}

/// Tests that unknown users and wrong passwords look the same to callers.
#[tokio::test]
async fn test_failures_are_indistinguishable() -> anyhow::Result<()> {
    let env = TestEnv::new(search_then_bind(&["primary"], "(uid={username})"));

    let wrong_password = env.service.verify_credentials("jdoe", "nope").await?;
    let unknown_user = env.service.verify_credentials("ghost", "nope").await?;

    assert_eq!(wrong_password, VerificationResult::InvalidCredentials);
    assert_eq!(unknown_user, VerificationResult::PrincipalNotFound);
    assert_eq!(wrong_password.public_message(), unknown_user.public_message());
    Ok(())
}

/// Tests search-then-bind resolving a unique entry.
#[tokio::test]
async fn test_search_then_bind_resolves_unique_entry() -> anyhow::Result<()> {
    let env = TestEnv::new(search_then_bind(&["primary"], "(mail={username})"));

    let result = env
        .service
        .verify_credentials("jsmith@example.com", "smith-pw")
        .await?;

    match result {
        VerificationResult::Success { dn, attributes } => {
            assert_eq!(dn, format!("uid=jsmith,{PEOPLE}"));
            assert_eq!(attributes["cn"], vec!["John Smith"]);
        }
        other => panic!("expected success, got {other:?}"),
    }
    Ok(())
}

/// Tests that two matching entries never lead to a bind as either of them.
#[tokio::test]
async fn test_ambiguous_principal_is_not_found() -> anyhow::Result<()> {
    let env = TestEnv::new(search_then_bind(&["primary"], "(cn={username})"));

    let result = env.service.verify_credentials("John Smith", "smith-pw").await?;

    assert_eq!(result, VerificationResult::PrincipalNotFound);
    // Only the service account bound.
    assert_eq!(env.directory.binds(), env.directory.connects("primary"));
    Ok(())
}

/// Tests that filter metacharacters in the principal match literally.
#[tokio::test]
async fn test_principal_wildcards_are_escaped() -> anyhow::Result<()> {
    let env = TestEnv::new(search_then_bind(&["primary"], "(uid={username})"));

    let result = env.service.verify_credentials("*", "s3cret").await?;
    assert_eq!(result, VerificationResult::PrincipalNotFound);

    let result = env.service.verify_credentials("jdoe)(uid=*", "s3cret").await?;
    assert_eq!(result, VerificationResult::PrincipalNotFound);
    Ok(())
}

/// Tests a per-request search base override.
#[tokio::test]
async fn test_request_search_base_narrows_lookup() -> anyhow::Result<()> {
    let env = TestEnv::new(search_then_bind(&["primary"], "(cn={username})"));

    let request = CredentialRequest::new("John Smith", "smith-pw").with_search_base(PEOPLE);
    let result = env.service.verify(request).await?;

    assert!(result.is_success());
    Ok(())
}
