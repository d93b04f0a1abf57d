//! # dirauth-ldap
//!
//! LDAP backend for `dirauth-core`.
//!
//! This crate implements the core's connector and session traits using
//! `ldap3`: LDAPS or StartTLS transport, simple bind, paged search, and
//! add/modify/delete.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connector;
pub mod entry;
pub mod error;

pub use connector::{Ldap3Connector, Ldap3Session};
