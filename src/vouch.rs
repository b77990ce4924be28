//! Vouch resolution against the trusted set
//!
//! Every trusted member is asked independently whether it follows the target.
//! Lookups run as separate tasks under a concurrency limit and a per-lookup
//! timeout; a failed or timed-out lookup counts as "not following". The
//! resolver returns only once every lookup has resolved or timed out, so
//! pending lookups are never counted either way.

use crate::account::normalize_handle;
use crate::config::VouchConfig;
use crate::errors::GuardResult;
use crate::trust_registry::TrustedSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Does `follower` follow `target`?
///
/// Implementations may hit the network. Each call must be idempotent.
#[async_trait]
pub trait FollowerEdgeLookup: Send + Sync {
    async fn follows(&self, follower: &str, target: &str) -> GuardResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VouchResult {
    pub target: String,
    pub is_vouched: bool,
    /// Trusted members found to follow the target
    pub count: usize,
    /// Corroborating members, in trusted-set order
    pub vouched_by: Vec<String>,
    /// Minimum corroboration this result was judged against
    pub required: usize,
    /// The target is itself a trusted member
    pub on_trusted_list: bool,
    /// Members consulted, the target excluded
    pub checked: usize,
    pub failed_lookups: usize,
}

impl VouchResult {
    pub fn not_vouched(target: impl Into<String>, required: usize) -> Self {
        Self {
            target: target.into(),
            is_vouched: false,
            count: 0,
            vouched_by: Vec::new(),
            required,
            on_trusted_list: false,
            checked: 0,
            failed_lookups: 0,
        }
    }

    /// Corroborators shared with another result, in this result's order.
    pub fn mutual_with(&self, other: &VouchResult) -> Vec<String> {
        self.vouched_by
            .iter()
            .filter(|m| other.vouched_by.contains(m))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeOutcome {
    Follows,
    NotFollowing,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct VouchResolver {
    min_corroboration: usize,
    lookup_timeout: Duration,
    max_concurrent: usize,
}

impl VouchResolver {
    pub fn new(config: &VouchConfig) -> Self {
        Self {
            min_corroboration: config.min_corroboration.max(1),
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            max_concurrent: config.max_concurrent_lookups.max(1),
        }
    }

    pub fn min_corroboration(&self) -> usize {
        self.min_corroboration
    }

    pub async fn resolve(
        &self,
        target: &str,
        trusted: &TrustedSet,
        lookup: Arc<dyn FollowerEdgeLookup>,
    ) -> VouchResult {
        let target = match normalize_handle(target) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "cannot resolve vouching for malformed handle");
                return VouchResult::not_vouched(target, self.min_corroboration);
            }
        };

        let members = trusted.members();
        let mut outcomes: Vec<Option<EdgeOutcome>> = vec![None; members.len()];
        let mut self_index = None;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (idx, member) in members.iter().enumerate() {
            if *member == target {
                self_index = Some(idx);
                continue;
            }
            if let Some(known) = trusted.known_edge(member, &target) {
                outcomes[idx] = Some(if known {
                    EdgeOutcome::Follows
                } else {
                    EdgeOutcome::NotFollowing
                });
                continue;
            }

            let lookup = Arc::clone(&lookup);
            let semaphore = Arc::clone(&semaphore);
            let member = member.clone();
            let target = target.clone();
            let timeout = self.lookup_timeout;
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, EdgeOutcome::Failed);
                };
                let lookup = tokio::time::timeout(timeout, lookup.follows(&member, &target));
                let outcome = match lookup.await {
                    Ok(Ok(true)) => EdgeOutcome::Follows,
                    Ok(Ok(false)) => EdgeOutcome::NotFollowing,
                    Ok(Err(e)) => {
                        warn!(
                            %member,
                            %target,
                            error = %e,
                            "edge lookup failed, counting as not following"
                        );
                        EdgeOutcome::Failed
                    }
                    Err(_) => {
                        warn!(
                            %member,
                            %target,
                            timeout_ms = timeout.as_millis() as u64,
                            "edge lookup timed out"
                        );
                        EdgeOutcome::TimedOut
                    }
                };
                (idx, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "edge lookup task aborted"),
            }
        }

        let mut vouched_by = Vec::new();
        let mut failed_lookups = 0;
        for (idx, (member, outcome)) in members.iter().zip(&outcomes).enumerate() {
            if Some(idx) == self_index {
                continue;
            }
            match outcome {
                Some(EdgeOutcome::Follows) => vouched_by.push(member.clone()),
                Some(EdgeOutcome::NotFollowing) => {}
                Some(EdgeOutcome::Failed) | Some(EdgeOutcome::TimedOut) | None => {
                    failed_lookups += 1
                }
            }
        }

        let count = vouched_by.len();
        let result = VouchResult {
            is_vouched: count >= self.min_corroboration,
            count,
            vouched_by,
            required: self.min_corroboration,
            on_trusted_list: self_index.is_some(),
            checked: members.len() - usize::from(self_index.is_some()),
            failed_lookups,
            target,
        };

        info!(
            target = %result.target,
            trusted_version = trusted.version(),
            count = result.count,
            required = result.required,
            vouched = result.is_vouched,
            failed = result.failed_lookups,
            "vouch resolution complete"
        );
        result
    }
}
