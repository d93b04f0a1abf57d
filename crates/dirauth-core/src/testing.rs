//! In-memory directory for tests.
//!
//! [`InMemoryDirectory`] implements [`DirectoryConnector`] over a shared
//! entry map. Each endpoint name can be taken down, made unresponsive or
//! slowed, and the directory counts connects, binds, searches, pings and
//! closes so tests can assert on network activity.
//!
//! Like many real servers, an empty-password bind succeeds as an
//! anonymous bind.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ServerEndpoint;
use crate::error::{DirectoryError, DirectoryResult};
use crate::model::{Attributes, DirectoryEntry, Modification, SearchQuery, SearchScope};
use crate::session::{BindOutcome, DirectoryConnector, DirectorySession, SearchPage};

const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// Behaviour of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Answers normally.
    #[default]
    Up,
    /// Refuses connections; existing sessions fail with a reset.
    Down,
    /// Accepts nothing and never answers.
    Unresponsive,
    /// Answers every operation after the given delay.
    Slow(Duration),
}

#[derive(Debug, Default)]
struct EndpointStats {
    state: EndpointState,
    generation: u64,
    connects: usize,
    open: usize,
    peak_open: usize,
    pings: usize,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, DirectoryEntry>,
    endpoints: HashMap<String, EndpointStats>,
    server_size_limit: Option<usize>,
    binds: usize,
    searches: usize,
    closes: usize,
    writes: usize,
}

impl State {
    fn endpoint(&mut self, name: &str) -> &mut EndpointStats {
        self.endpoints.entry(name.to_string()).or_default()
    }
}

/// Shared in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a connector serving this directory.
    #[must_use]
    pub fn connector(&self) -> Arc<dyn DirectoryConnector> {
        Arc::new(self.clone())
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, entry: DirectoryEntry) {
        self.state.lock().entries.insert(normalize_dn(&entry.dn), entry);
    }

    /// Inserts a person entry with a password and extra attributes.
    pub fn add_user(&self, dn: &str, password: &str, attributes: &[(&str, &str)]) {
        let mut entry = DirectoryEntry::new(dn)
            .with_attr("objectClass", "inetOrgPerson")
            .with_attr(PASSWORD_ATTRIBUTE, password);
        if let Some((attr, value)) = dn.split(',').next().and_then(|rdn| rdn.split_once('=')) {
            entry = entry.with_attr(attr.trim(), value.trim());
        }
        for (name, value) in attributes {
            entry = entry.with_attr(*name, *value);
        }
        self.insert(entry);
    }

    /// Returns an entry by DN.
    #[must_use]
    pub fn get(&self, dn: &str) -> Option<DirectoryEntry> {
        self.state.lock().entries.get(&normalize_dn(dn)).cloned()
    }

    /// Sets the behaviour of an endpoint.
    pub fn set_state(&self, endpoint: &str, state: EndpointState) {
        self.state.lock().endpoint(endpoint).state = state;
    }

    /// Makes every existing session to `endpoint` fail on its next operation.
    pub fn drop_sessions(&self, endpoint: &str) {
        self.state.lock().endpoint(endpoint).generation += 1;
    }

    /// Limits the number of entries any search returns.
    pub fn set_server_size_limit(&self, limit: Option<usize>) {
        self.state.lock().server_size_limit = limit;
    }

    /// Connections opened to `endpoint`.
    #[must_use]
    pub fn connects(&self, endpoint: &str) -> usize {
        self.state.lock().endpoint(endpoint).connects
    }

    /// Sessions to `endpoint` currently alive.
    #[must_use]
    pub fn open_sessions(&self, endpoint: &str) -> usize {
        self.state.lock().endpoint(endpoint).open
    }

    /// Highest number of simultaneously open sessions to `endpoint`.
    #[must_use]
    pub fn peak_open_sessions(&self, endpoint: &str) -> usize {
        self.state.lock().endpoint(endpoint).peak_open
    }

    /// Liveness checks received by `endpoint`.
    #[must_use]
    pub fn pings(&self, endpoint: &str) -> usize {
        self.state.lock().endpoint(endpoint).pings
    }

    /// Total bind requests.
    #[must_use]
    pub fn binds(&self) -> usize {
        self.state.lock().binds
    }

    /// Total search requests.
    #[must_use]
    pub fn searches(&self) -> usize {
        self.state.lock().searches
    }

    /// Total graceful closes.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    /// Total write requests (add, modify, delete).
    #[must_use]
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    async fn connect(&self, endpoint: &ServerEndpoint) -> DirectoryResult<Box<dyn DirectorySession>> {
        let (state, generation) = {
            let mut guard = self.state.lock();
            let stats = guard.endpoint(&endpoint.name);
            (stats.state, stats.generation)
        };

        match state {
            EndpointState::Down => {
                return Err(DirectoryError::unavailable(format!(
                    "connection refused by {}",
                    endpoint.url()
                )))
            }
            EndpointState::Unresponsive => std::future::pending::<()>().await,
            EndpointState::Slow(delay) => tokio::time::sleep(delay).await,
            EndpointState::Up => {}
        }

        {
            let mut guard = self.state.lock();
            let stats = guard.endpoint(&endpoint.name);
            stats.connects += 1;
            stats.open += 1;
            stats.peak_open = stats.peak_open.max(stats.open);
        }

        Ok(Box::new(InMemorySession {
            directory: self.clone(),
            endpoint: endpoint.name.clone(),
            generation,
            closed: false,
        }))
    }
}

struct InMemorySession {
    directory: InMemoryDirectory,
    endpoint: String,
    generation: u64,
    closed: bool,
}

impl InMemorySession {
    /// Applies the endpoint's current behaviour to an operation.
    async fn gate(&self) -> DirectoryResult<()> {
        if self.closed {
            return Err(DirectoryError::ConnectionReset("session closed".to_string()));
        }
        let (state, generation) = {
            let mut guard = self.directory.state.lock();
            let stats = guard.endpoint(&self.endpoint);
            (stats.state, stats.generation)
        };
        if generation != self.generation {
            return Err(DirectoryError::ConnectionReset(format!(
                "{} closed the connection",
                self.endpoint
            )));
        }
        match state {
            EndpointState::Up => Ok(()),
            EndpointState::Down => Err(DirectoryError::ConnectionReset(format!(
                "{} reset the connection",
                self.endpoint
            ))),
            EndpointState::Unresponsive => std::future::pending().await,
            EndpointState::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        let mut guard = self.directory.state.lock();
        let stats = guard.endpoint(&self.endpoint);
        stats.open = stats.open.saturating_sub(1);
    }
}

#[async_trait]
impl DirectorySession for InMemorySession {
    async fn bind(&mut self, dn: &str, password: &str) -> DirectoryResult<BindOutcome> {
        self.directory.state.lock().binds += 1;
        self.gate().await?;

        if password.is_empty() {
            return Ok(BindOutcome::Accepted);
        }

        let guard = self.directory.state.lock();
        let accepted = guard
            .entries
            .get(&normalize_dn(dn))
            .and_then(|entry| entry.first(PASSWORD_ATTRIBUTE))
            .is_some_and(|stored| stored == password);
        Ok(if accepted {
            BindOutcome::Accepted
        } else {
            BindOutcome::Rejected
        })
    }

    async fn search_page(
        &mut self,
        query: &SearchQuery,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage> {
        self.directory.state.lock().searches += 1;
        self.gate().await?;

        let filter = Filter::parse(&query.filter)?;
        let base = normalize_dn(&query.base_dn);

        let guard = self.directory.state.lock();
        let mut matches: Vec<DirectoryEntry> = guard
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, query.scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| entry.clone())
            .collect();

        let client_limit = (query.size_limit > 0).then_some(query.size_limit as usize);
        let limit = match (client_limit, guard.server_size_limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        drop(guard);

        let limited = limit.is_some_and(|limit| matches.len() > limit);
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        let offset = cookie
            .and_then(|c| std::str::from_utf8(c).ok())
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let page_size = if query.page_size == 0 {
            matches.len().max(1)
        } else {
            query.page_size as usize
        };
        let end = (offset + page_size).min(matches.len());
        let more = end < matches.len();

        let entries = matches
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(|entry| strip_password(entry, &query.attributes).project(&query.attributes))
            .collect();

        Ok(SearchPage {
            entries,
            cookie: more.then(|| end.to_string().into_bytes()),
            truncated: limited && !more,
        })
    }

    async fn add(&mut self, dn: &str, attributes: &Attributes) -> DirectoryResult<()> {
        self.directory.state.lock().writes += 1;
        self.gate().await?;

        let mut guard = self.directory.state.lock();
        let key = normalize_dn(dn);
        if guard.entries.contains_key(&key) {
            return Err(DirectoryError::protocol(68, "entry already exists"));
        }
        guard.entries.insert(
            key,
            DirectoryEntry {
                dn: dn.to_string(),
                attributes: attributes.clone(),
                binary_attributes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        self.directory.state.lock().writes += 1;
        self.gate().await?;

        let mut guard = self.directory.state.lock();
        let entry = guard
            .entries
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| DirectoryError::NoSuchEntry(dn.to_string()))?;

        for modification in modifications {
            match modification {
                Modification::Add { attribute, values } => {
                    entry
                        .attributes
                        .entry(attribute.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                Modification::Replace { attribute, values } => {
                    if values.is_empty() {
                        entry.attributes.remove(attribute);
                    } else {
                        entry.attributes.insert(attribute.clone(), values.clone());
                    }
                }
                Modification::Delete { attribute, values } => {
                    if values.is_empty() {
                        entry.attributes.remove(attribute);
                    } else if let Some(existing) = entry.attributes.get_mut(attribute) {
                        existing.retain(|v| !values.contains(v));
                        if existing.is_empty() {
                            entry.attributes.remove(attribute);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        self.directory.state.lock().writes += 1;
        self.gate().await?;

        let mut guard = self.directory.state.lock();
        let key = normalize_dn(dn);
        if guard.entries.keys().any(|k| k != &key && k.ends_with(&format!(",{key}"))) {
            return Err(DirectoryError::protocol(66, "not allowed on non-leaf"));
        }
        guard
            .entries
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::NoSuchEntry(dn.to_string()))
    }

    async fn ping(&mut self) -> DirectoryResult<()> {
        self.directory.state.lock().endpoint(&self.endpoint).pings += 1;
        self.gate().await
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.directory.state.lock().closes += 1;
        }
    }
}

fn strip_password(mut entry: DirectoryEntry, requested: &[String]) -> DirectoryEntry {
    if !requested
        .iter()
        .any(|a| a.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE))
    {
        entry
            .attributes
            .retain(|k, _| !k.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE));
    }
    entry
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| rdn.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let parent = dn.split_once(',').map_or("", |(_, rest)| rest);
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => parent == base,
        SearchScope::Subtree => base.is_empty() || dn == base || dn.ends_with(&format!(",{base}")),
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

#[derive(Debug)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
    Substring(String, Vec<String>),
}

impl Filter {
    fn parse(input: &str) -> DirectoryResult<Self> {
        let chars: Vec<char> = input.trim().chars().collect();
        let mut pos = 0;
        let filter = Self::parse_at(&chars, &mut pos)
            .ok_or_else(|| DirectoryError::MalformedFilter(input.to_string()))?;
        if pos == chars.len() {
            Ok(filter)
        } else {
            Err(DirectoryError::MalformedFilter(input.to_string()))
        }
    }

    fn parse_at(chars: &[char], pos: &mut usize) -> Option<Self> {
        if chars.get(*pos) != Some(&'(') {
            return None;
        }
        *pos += 1;
        let filter = match chars.get(*pos)? {
            '&' | '|' => {
                let op = chars[*pos];
                *pos += 1;
                let mut children = Vec::new();
                while chars.get(*pos) == Some(&'(') {
                    children.push(Self::parse_at(chars, pos)?);
                }
                if children.is_empty() {
                    return None;
                }
                if op == '&' {
                    Self::And(children)
                } else {
                    Self::Or(children)
                }
            }
            '!' => {
                *pos += 1;
                Self::Not(Box::new(Self::parse_at(chars, pos)?))
            }
            _ => {
                let start = *pos;
                while chars.get(*pos).is_some_and(|c| *c != ')') {
                    if chars[*pos] == '(' {
                        return None;
                    }
                    *pos += 1;
                }
                let item: String = chars.get(start..*pos)?.iter().collect();
                let (attr, value) = item.split_once('=')?;
                if attr.is_empty() || !attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';' || c == '.') {
                    return None;
                }
                if value == "*" {
                    Self::Present(attr.to_string())
                } else if value.contains('*') {
                    Self::Substring(
                        attr.to_string(),
                        value.split('*').map(unescape).collect::<Option<Vec<_>>>()?,
                    )
                } else {
                    Self::Equal(attr.to_string(), unescape(value)?)
                }
            }
        };
        if chars.get(*pos) != Some(&')') {
            return None;
        }
        *pos += 1;
        Some(filter)
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Self::And(children) => children.iter().all(|f| f.matches(entry)),
            Self::Or(children) => children.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Present(attr) => entry.has_attribute(attr),
            Self::Equal(attr, value) => entry
                .values(attr)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
            Self::Substring(attr, parts) => entry.values(attr).is_some_and(|values| {
                values
                    .iter()
                    .any(|v| substring_match(&v.to_ascii_lowercase(), parts))
            }),
        }
    }
}

fn substring_match(value: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let first = first.to_ascii_lowercase();
    if !value.starts_with(&first) {
        return false;
    }
    let mut remaining = &value[first.len()..];
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        let part = part.to_ascii_lowercase();
        match remaining.find(&part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(&last.to_ascii_lowercase())
}

fn unescape(value: &str) -> Option<String> {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
