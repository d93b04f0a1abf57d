//! End-to-end tests
//!
//! These tests drive `DirectoryService` against the in-memory directory
//! and assert on the network activity it records.

mod failover;
mod pool;
mod search;
mod verification;
mod writes;
