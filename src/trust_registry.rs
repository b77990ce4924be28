//! Trusted-accounts registry
//!
//! The registry holds an immutable [`TrustedSet`] behind an `Arc`. Readers
//! clone the `Arc` and keep using their copy for the whole analysis; refreshes
//! and admin edits build a new set and swap the pointer. Writers are
//! serialized by an async gate so at most one reload is in flight.

use crate::account::normalize_handle;
use crate::config::RegistryConfig;
use crate::errors::{GuardError, GuardResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One immutable version of the trusted-accounts list
#[derive(Debug, Clone)]
pub struct TrustedSet {
    version: u64,
    members: Vec<String>,
    index: HashSet<String>,
    edges: HashMap<String, HashSet<String>>,
    loaded_at: DateTime<Utc>,
    source: String,
}

impl TrustedSet {
    pub fn empty() -> Self {
        Self {
            version: 0,
            members: Vec::new(),
            index: HashSet::new(),
            edges: HashMap::new(),
            loaded_at: Utc::now(),
            source: "none".to_string(),
        }
    }

    /// Build a set from raw handles, keeping first-seen order.
    pub fn from_handles<I, S>(handles: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::empty();
        for raw in handles {
            let handle = normalize_handle(raw.as_ref())?;
            if set.index.insert(handle.clone()) {
                set.members.push(handle);
            }
        }
        Ok(set)
    }

    /// Attach known trust edges: accounts each member is known to follow.
    pub fn with_edges<I, S>(mut self, member: &str, follows: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let member = normalize_handle(member)?;
        if !self.index.contains(&member) {
            return Err(GuardError::validation(
                "edges",
                format!("@{member} is not a trusted member"),
            ));
        }
        let entry = self.edges.entry(member).or_default();
        for raw in follows {
            entry.insert(normalize_handle(raw.as_ref())?);
        }
        Ok(self)
    }

    fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self.loaded_at = Utc::now();
        self
    }

    fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Members in list order
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, handle: &str) -> bool {
        normalize_handle(handle)
            .map(|h| self.index.contains(&h))
            .unwrap_or(false)
    }

    /// Answer from preloaded edges; `None` when the member has no edge data.
    pub fn known_edge(&self, member: &str, target: &str) -> Option<bool> {
        self.edges.get(member).map(|follows| follows.contains(target))
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn summary(&self) -> TrustedSetSummary {
        TrustedSetSummary {
            version: self.version,
            members: self.members.len(),
            members_with_edges: self.edges.len(),
            loaded_at: self.loaded_at,
            source: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedSetSummary {
    pub version: u64,
    pub members: usize,
    pub members_with_edges: usize,
    pub loaded_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Deserialize)]
struct TrustListDocument {
    accounts: Vec<String>,
    #[serde(default)]
    edges: HashMap<String, Vec<String>>,
}

/// Parse a trusted-accounts document.
///
/// Plain text holds one handle per line; blank lines and `#` comments are
/// skipped and a leading `@` is optional. A document starting with `{` is read
/// as JSON with `accounts` and optional `edges`. Any invalid entry or an empty
/// list fails the whole document.
pub fn parse_trusted_list(body: &str) -> GuardResult<TrustedSet> {
    let trimmed = body.trim_start();
    let set = if trimmed.starts_with('{') {
        let doc: TrustListDocument = serde_json::from_str(trimmed)
            .map_err(|e| GuardError::trust_list(format!("invalid JSON list: {e}")))?;
        let mut set = TrustedSet::from_handles(&doc.accounts)
            .map_err(|e| GuardError::trust_list(e.to_string()))?;
        for (member, follows) in &doc.edges {
            set = set
                .with_edges(member, follows)
                .map_err(|e| GuardError::trust_list(e.to_string()))?;
        }
        set
    } else {
        let mut handles = Vec::new();
        for (idx, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let handle = normalize_handle(line)
                .map_err(|e| GuardError::trust_list(format!("line {}: {e}", idx + 1)))?;
            handles.push(handle);
        }
        TrustedSet::from_handles(handles)?
    };

    if set.is_empty() {
        return Err(GuardError::trust_list("list contains no accounts"));
    }
    Ok(set)
}

/// Where the trusted-accounts document comes from
#[async_trait]
pub trait TrustListSource: Send + Sync {
    fn describe(&self) -> String;
    async fn fetch(&self) -> GuardResult<String>;
}

pub struct HttpTrustListSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTrustListSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::network("build_http_client", e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TrustListSource for HttpTrustListSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> GuardResult<String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GuardError::network("fetch_trusted_list", e))?;
        resp.text()
            .await
            .map_err(|e| GuardError::network("read_trusted_list", e))
    }
}

pub struct FileTrustListSource {
    path: PathBuf,
}

impl FileTrustListSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrustListSource for FileTrustListSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> GuardResult<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GuardError::trust_list(format!("cannot read {}: {e}", self.path.display()))
        })
    }
}

/// Pick an HTTP or file source from the configured location.
pub fn source_from_config(config: &RegistryConfig) -> GuardResult<Arc<dyn TrustListSource>> {
    let location = config.source.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        let timeout = Duration::from_secs(config.fetch_timeout_secs);
        Ok(Arc::new(HttpTrustListSource::new(location, timeout)?))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(Arc::new(FileTrustListSource::new(path)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A new set was swapped in
    Replaced { version: u64, members: usize },
    /// The reload failed; the previous set stays current
    Retained { version: u64, reason: String },
    /// Another refresh was in flight; its result is current
    Coalesced { version: u64 },
}

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub struct TrustRegistry {
    source: Arc<dyn TrustListSource>,
    current: RwLock<Arc<TrustedSet>>,
    write_gate: tokio::sync::Mutex<()>,
    last_error: RwLock<Option<String>>,
}

impl TrustRegistry {
    /// A registry holding the empty set; nothing is fetched yet.
    pub fn new(source: Arc<dyn TrustListSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(TrustedSet::empty())),
            write_gate: tokio::sync::Mutex::new(()),
            last_error: RwLock::new(None),
        }
    }

    /// Create the registry and perform the first load.
    ///
    /// A failed first load leaves the empty set in place, so analyses still
    /// run with vouching impossible.
    pub async fn init(source: Arc<dyn TrustListSource>) -> Self {
        let registry = Self::new(source);
        match registry.refresh().await {
            RefreshOutcome::Replaced { version, members } => {
                info!(version, members, "trusted registry initialised");
            }
            RefreshOutcome::Retained { reason, .. } => {
                warn!(
                    %reason,
                    "trusted registry unavailable at startup, vouching disabled until next refresh"
                );
            }
            RefreshOutcome::Coalesced { .. } => {}
        }
        registry
    }

    /// Fetch and parse the remote list without touching the held set.
    pub async fn load(&self) -> GuardResult<TrustedSet> {
        let body = self.source.fetch().await.map_err(|e| match e {
            GuardError::TrustListUnavailable { .. } => e,
            other => GuardError::trust_list(other.to_string()),
        })?;
        Ok(parse_trusted_list(&body)?.with_source(self.source.describe()))
    }

    /// The last successfully loaded set.
    pub fn get(&self) -> Arc<TrustedSet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload the list, swapping only on full success.
    pub async fn refresh(&self) -> RefreshOutcome {
        let _gate = match self.write_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                debug!("trusted list refresh already in flight, waiting for it");
                let _wait = self.write_gate.lock().await;
                return RefreshOutcome::Coalesced {
                    version: self.get().version(),
                };
            }
        };

        match self.load().await {
            Ok(set) => {
                let members = set.len();
                let installed = self.install(set);
                self.set_last_error(None);
                info!(version = installed.version(), members, "trusted set replaced");
                RefreshOutcome::Replaced {
                    version: installed.version(),
                    members,
                }
            }
            Err(e) => {
                let version = self.get().version();
                warn!(error = %e, version, "trusted list refresh failed, keeping previous set");
                self.set_last_error(Some(e.to_string()));
                RefreshOutcome::Retained {
                    version,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Add a member by copy-on-write. Returns the installed set.
    pub async fn add_member(&self, handle: &str) -> GuardResult<Arc<TrustedSet>> {
        let handle = normalize_handle(handle)?;
        let _gate = self.write_gate.lock().await;
        let current = self.get();
        if current.index.contains(&handle) {
            return Ok(current);
        }
        let mut next = (*current).clone();
        next.index.insert(handle.clone());
        next.members.push(handle.clone());
        let installed = self.install(next);
        info!(version = installed.version(), member = %handle, "trusted member added");
        Ok(installed)
    }

    /// Remove a member by copy-on-write. Returns whether it was present.
    pub async fn remove_member(&self, handle: &str) -> GuardResult<bool> {
        let handle = normalize_handle(handle)?;
        let _gate = self.write_gate.lock().await;
        let current = self.get();
        if !current.index.contains(&handle) {
            return Ok(false);
        }
        let mut next = (*current).clone();
        next.index.remove(&handle);
        next.members.retain(|m| m != &handle);
        next.edges.remove(&handle);
        let installed = self.install(next);
        info!(version = installed.version(), member = %handle, "trusted member removed");
        Ok(true)
    }

    // Callers hold the write gate.
    fn install(&self, set: TrustedSet) -> Arc<TrustedSet> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(set.with_version(guard.version() + 1));
        *guard = Arc::clone(&next);
        next
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

/// Refresh the registry on a fixed interval until the task is aborted.
///
/// Intervals shorter than one second are raised to one second.
pub fn spawn_refresh_task(registry: Arc<TrustRegistry>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_REFRESH_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick fires immediately; init already loaded
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = registry.refresh().await;
            debug!(?outcome, "scheduled trusted list refresh");
        }
    })
}
