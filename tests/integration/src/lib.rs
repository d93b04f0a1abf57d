//! Shared fixtures for the end-to-end tests.
//!
//! Every test gets its own [`InMemoryDirectory`] seeded with a small
//! organisation and a [`DirectoryService`] built over it.

use std::time::Duration;

use dirauth_core::testing::InMemoryDirectory;
use dirauth_core::{
    DirectoryConfig, DirectoryConfigBuilder, DirectoryEntry, DirectoryService, EditMode,
    RetryPolicy, SearchScope, ServerEndpoint, VerificationStrategy,
};

/// Directory suffix.
pub const BASE: &str = "dc=example,dc=com";
/// Container of person entries.
pub const PEOPLE: &str = "ou=people,dc=example,dc=com";
/// Container of contractor entries.
pub const CONTRACTORS: &str = "ou=contractors,dc=example,dc=com";
/// Service account DN.
pub const SERVICE_DN: &str = "cn=svc-auth,dc=example,dc=com";
/// Service account password.
pub const SERVICE_PASSWORD: &str = "svc-pass";

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dirauth_core=debug")
        .with_test_writer()
        .try_init();
}

/// Builds a directory with two containers, a service account and a few people.
///
/// `jdoe` exists once; the common name "John Smith" exists in both
/// containers.
#[must_use]
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.insert(DirectoryEntry::new(BASE).with_attr("objectClass", "domain"));
    for ou in [PEOPLE, CONTRACTORS] {
        directory.insert(DirectoryEntry::new(ou).with_attr("objectClass", "organizationalUnit"));
    }
    directory.add_user(SERVICE_DN, SERVICE_PASSWORD, &[]);

    directory.add_user(
        &format!("uid=jdoe,{PEOPLE}"),
        "s3cret",
        &[("cn", "Jane Doe"), ("mail", "jdoe@example.com")],
    );
    directory.add_user(
        &format!("uid=jsmith,{PEOPLE}"),
        "smith-pw",
        &[("cn", "John Smith"), ("mail", "jsmith@example.com")],
    );
    directory.add_user(
        &format!("uid=jsmith2,{CONTRACTORS}"),
        "other-pw",
        &[("cn", "John Smith"), ("mail", "john.smith@contractor.example")],
    );
    directory
}

/// Adds `count` numbered people under [`PEOPLE`].
pub fn add_people(directory: &InMemoryDirectory, count: usize) {
    for i in 0..count {
        directory.add_user(
            &format!("uid=user{i:03},{PEOPLE}"),
            "pw",
            &[("cn", "Bulk User"), ("employeeType", "bulk")],
        );
    }
}

/// An endpoint that binds people under [`PEOPLE`] directly.
#[must_use]
pub fn endpoint(name: &str, priority: u32) -> ServerEndpoint {
    ServerEndpoint::new(name, format!("{name}.example.com"))
        .with_priority(priority)
        .with_bind_dn_template(format!("uid={{username}},{PEOPLE}"))
}

/// Configuration over the named endpoints, in priority order, without
/// failure padding.
#[must_use]
pub fn config(names: &[&str]) -> DirectoryConfigBuilder {
    let mut builder = DirectoryConfig::builder()
        .base_dn(BASE)
        .user_attributes(["cn", "mail"])
        .failure_delay_floor(Duration::ZERO)
        .retry(RetryPolicy {
            backoff_ms: 0,
            ..RetryPolicy::default()
        });
    for (priority, name) in (0u32..).zip(names) {
        builder = builder.endpoint(endpoint(name, priority));
    }
    builder
}

/// Configuration that resolves principals by `filter` under the whole tree.
#[must_use]
pub fn search_then_bind(names: &[&str], filter: &str) -> DirectoryConfigBuilder {
    config(names)
        .service_account(SERVICE_DN, SERVICE_PASSWORD)
        .strategy(VerificationStrategy::SearchThenBind {
            base_dn: None,
            user_filter: filter.to_string(),
            scope: SearchScope::Subtree,
        })
}

/// A directory plus a service over it.
pub struct TestEnv {
    /// Backing directory.
    pub directory: InMemoryDirectory,
    /// Service under test.
    pub service: DirectoryService,
}

impl TestEnv {
    /// Builds a service over a seeded directory.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn new(builder: DirectoryConfigBuilder) -> Self {
        Self::with_directory(seeded_directory(), builder)
    }

    /// Builds a service over the given directory.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn with_directory(directory: InMemoryDirectory, builder: DirectoryConfigBuilder) -> Self {
        init_tracing();
        let config = builder.build().expect("test configuration must be valid");
        let service =
            DirectoryService::new(config, directory.connector()).expect("service must build");
        Self { directory, service }
    }

    /// Direct-bind service over `names`.
    #[must_use]
    pub fn direct(names: &[&str]) -> Self {
        Self::new(config(names))
    }

    /// Writable direct-bind service over `names`.
    #[must_use]
    pub fn writable(names: &[&str]) -> Self {
        Self::new(config(names).edit_mode(EditMode::Writable))
    }
}
