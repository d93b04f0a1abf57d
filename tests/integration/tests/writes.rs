//! Writes: edit mode, update diffs and unknown outcomes.

use dirauth_core::{DirectoryEntry, DirectoryError, SearchQuery};
use dirauth_integration_tests::{TestEnv, PEOPLE};

const JDOE: &str = "uid=jdoe,ou=people,dc=example,dc=com";

/// Tests that a read-only service refuses every write locally.
#[tokio::test]
async fn test_read_only_refuses_writes() -> anyhow::Result<()> {
    let env = TestEnv::direct(&["primary"]);
    let entry = DirectoryEntry::new(format!("uid=new,{PEOPLE}")).with_attr("uid", "new");

    let results = [
        env.service.add_entry(&entry).await,
        env.service.modify_attribute(JDOE, "mail", "x@example.com").await,
        env.service.delete_entry(JDOE).await,
        env.service.update_entry(&entry, &entry).await.map(|_| ()),
    ];

    for result in results {
        assert!(matches!(result, Err(DirectoryError::ReadOnly(_))));
    }
    assert_eq!(env.directory.writes(), 0);
    assert_eq!(env.directory.connects("primary"), 0);
    Ok(())
}

/// Tests that an edited entry is written as add, replace and delete.
#[tokio::test]
async fn test_update_entry_writes_the_difference() -> anyhow::Result<()> {
    let env = TestEnv::writable(&["primary"]);

    let original = env.service.entry(JDOE).await?.expect("jdoe exists");
    let mut modified = original.clone();
    modified
        .attributes
        .insert("telephoneNumber".into(), vec!["555-0100".into()]);
    modified
        .attributes
        .insert("mail".into(), vec!["jane.doe@example.com".into()]);
    modified.attributes.remove("cn");

    let changes = env.service.update_entry(&original, &modified).await?;
    assert_eq!(changes, 3);
    assert_eq!(env.directory.writes(), 1);

    let stored = env.directory.get(JDOE).expect("jdoe still exists");
    assert_eq!(stored.first("telephoneNumber"), Some("555-0100"));
    assert_eq!(stored.values("mail"), Some(&vec!["jane.doe@example.com".to_string()]));
    assert!(!stored.has_attribute("cn"));
    // Attributes the read never returned are left alone.
    assert!(stored.has_attribute("userPassword"));
    Ok(())
}

/// Tests that a write whose connection dies is reported as indeterminate
/// and never replayed on another server.
#[tokio::test]
async fn test_interrupted_write_is_indeterminate() -> anyhow::Result<()> {
    let env = TestEnv::writable(&["primary", "secondary"]);

    // Leave a connection idle in the pool, then cut it.
    env.service
        .search_all(SearchQuery::new(PEOPLE, "(uid=jdoe)"))
        .await?;
    env.directory.drop_sessions("primary");

    let err = env.service.delete_entry(JDOE).await.unwrap_err();

    assert!(matches!(err, DirectoryError::Indeterminate { ref operation, .. } if operation == "delete"));
    assert!(!err.is_transient());
    assert_eq!(env.directory.writes(), 1);
    assert_eq!(env.directory.connects("secondary"), 0);
    Ok(())
}

/// Tests server-side write refusals.
#[tokio::test]
async fn test_server_refusals_are_returned() -> anyhow::Result<()> {
    let env = TestEnv::writable(&["primary", "secondary"]);

    let existing = DirectoryEntry::new(JDOE).with_attr("uid", "jdoe");
    let err = env.service.add_entry(&existing).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Protocol { code: 68, .. }));

    let err = env.service.delete_entry(PEOPLE).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Protocol { code: 66, .. }));

    let err = env
        .service
        .modify_attribute("uid=ghost,ou=people,dc=example,dc=com", "cn", "Ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::NoSuchEntry(_)));

    assert_eq!(env.directory.writes(), 3);
    assert_eq!(env.directory.connects("secondary"), 0);
    Ok(())
}
