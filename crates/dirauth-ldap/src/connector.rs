//! `ldap3` implementation of the directory session traits.
//!
//! ## Security Requirements
//!
//! - `Tls` endpoints use LDAPS (TLS from connection start)
//! - `StartTls` endpoints upgrade before any other operation
//! - Certificate validation is only skipped when an endpoint opts out
//! - Passwords are never logged

use std::collections::HashSet;

use async_trait::async_trait;
use dirauth_core::{
    Attributes, BindOutcome, DirectoryConnector, DirectoryError, DirectoryResult, DirectorySession,
    Modification, SearchPage, SearchQuery, SearchScope, ServerEndpoint, TransportSecurity,
};
use ldap3::controls::{ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchOptions, SearchResult};
use tracing::{debug, warn};

use crate::entry::from_search_entry;
use crate::error::{classify, classify_connect, from_result_code, is_truncation, rc};

/// Opens `ldap3` sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn settings(endpoint: &ServerEndpoint) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(endpoint.connect_timeout())
            .set_starttls(endpoint.security == TransportSecurity::StartTls);
        if !endpoint.verify_certificates {
            warn!(endpoint = %endpoint.name, "Certificate validation disabled");
            settings = settings.set_no_tls_verify(true);
        }
        settings
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, endpoint: &ServerEndpoint) -> DirectoryResult<Box<dyn DirectorySession>> {
        let url = endpoint.url();
        debug!(endpoint = %endpoint.name, url = %url, "Connecting to LDAP server");

        let (conn, ldap) = LdapConnAsync::with_settings(Self::settings(endpoint), &url)
            .await
            .map_err(|e| classify_connect(e, &url))?;

        // Spawn connection driver
        let name = endpoint.name.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(endpoint = %name, error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(Ldap3Session { ldap }))
    }
}

/// One `ldap3` connection.
pub struct Ldap3Session {
    ldap: Ldap,
}

impl std::fmt::Debug for Ldap3Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldap3Session").finish_non_exhaustive()
    }
}

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn value_set(values: &[String]) -> HashSet<String> {
    values.iter().cloned().collect()
}

/// Converts modifications into `ldap3` form.
fn to_ldap_mods(modifications: &[Modification]) -> Vec<Mod<String>> {
    modifications
        .iter()
        .map(|m| match m {
            Modification::Add { attribute, values } => Mod::Add(attribute.clone(), value_set(values)),
            Modification::Replace { attribute, values } => {
                Mod::Replace(attribute.clone(), value_set(values))
            }
            Modification::Delete { attribute, values } => {
                Mod::Delete(attribute.clone(), value_set(values))
            }
        })
        .collect()
}

/// Returns the cookie of a paged-results response control, if more pages remain.
fn next_cookie(result: &ldap3::LdapResult) -> Option<Vec<u8>> {
    result
        .ctrls
        .iter()
        .find(|ctrl| matches!(ctrl.0, Some(ControlType::PagedResults)))
        .map(|ctrl| ctrl.1.parse::<PagedResults>().cookie)
        .filter(|cookie| !cookie.is_empty())
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> DirectoryResult<BindOutcome> {
        let result = self
            .ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| classify(e, "bind"))?;

        match result.rc {
            rc::SUCCESS => Ok(BindOutcome::Accepted),
            rc::INVALID_CREDENTIALS => Ok(BindOutcome::Rejected),
            code => Err(from_result_code(code, &result.text, "bind")),
        }
    }

    async fn search_page(
        &mut self,
        query: &SearchQuery,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage> {
        let attrs: Vec<&str> = query.attributes.iter().map(String::as_str).collect();

        if query.size_limit > 0 {
            self.ldap
                .with_search_options(SearchOptions::new().sizelimit(to_i32(query.size_limit)));
        }
        if query.page_size > 0 {
            let control: RawControl = PagedResults {
                size: to_i32(query.page_size),
                cookie: cookie.map(<[u8]>::to_vec).unwrap_or_default(),
            }
            .into();
            self.ldap.with_controls(control);
        }

        let SearchResult(entries, result) = self
            .ldap
            .search(&query.base_dn, scope(query.scope), &query.filter, attrs)
            .await
            .map_err(|e| classify(e, "search"))?;

        let truncated = is_truncation(result.rc);
        if result.rc != rc::SUCCESS && !truncated {
            return Err(from_result_code(result.rc, &result.text, &query.base_dn));
        }

        let cookie = if truncated { None } else { next_cookie(&result) };
        Ok(SearchPage {
            entries: entries
                .into_iter()
                .map(SearchEntry::construct)
                .map(from_search_entry)
                .collect(),
            cookie,
            truncated,
        })
    }

    async fn add(&mut self, dn: &str, attributes: &Attributes) -> DirectoryResult<()> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .iter()
            .map(|(name, values)| (name.clone(), value_set(values)))
            .collect();

        let result = self.ldap.add(dn, attrs).await.map_err(|e| classify(e, "add"))?;
        match result.rc {
            rc::SUCCESS => Ok(()),
            code => Err(from_result_code(code, &result.text, dn)),
        }
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let result = self
            .ldap
            .modify(dn, to_ldap_mods(modifications))
            .await
            .map_err(|e| classify(e, "modify"))?;
        match result.rc {
            rc::SUCCESS => Ok(()),
            code => Err(from_result_code(code, &result.text, dn)),
        }
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let result = self.ldap.delete(dn).await.map_err(|e| classify(e, "delete"))?;
        match result.rc {
            rc::SUCCESS => Ok(()),
            code => Err(from_result_code(code, &result.text, dn)),
        }
    }

    async fn ping(&mut self) -> DirectoryResult<()> {
        // Root DSE read
        let SearchResult(_, result) = self
            .ldap
            .search("", Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await
            .map_err(|e| classify(e, "ping"))?;
        match result.rc {
            rc::SUCCESS => Ok(()),
            code => Err(DirectoryError::protocol(code, result.text)),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!(error = %e, "Unbind failed");
        }
    }
}
