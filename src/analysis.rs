//! End-to-end analysis of one account
//!
//! Fetch snapshot → extract signals → resolve vouching against the current
//! trusted set → score → render. Only rate limiting and an exhausted API
//! budget escape as errors; every other failure becomes an
//! [`AnalysisOutcome::Unavailable`] with a ready-to-post report.

use crate::account::{normalize_handle, AccountSnapshot};
use crate::config::GuardConfig;
use crate::errors::{GuardError, GuardResult};
use crate::report::{AnalysisFailure, ReportFormatter};
use crate::scoring::{RiskAssessment, RiskScorer};
use crate::signals::SignalExtractor;
use crate::trust_registry::TrustRegistry;
use crate::vouch::{FollowerEdgeLookup, VouchResolver, VouchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where account snapshots come from.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// `DataUnavailable` for missing, private or suspended accounts.
    async fn fetch_snapshot(&self, handle: &str) -> GuardResult<AccountSnapshot>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Assessed {
        id: Uuid,
        target: String,
        assessment: RiskAssessment,
        report: String,
    },
    Unavailable {
        id: Uuid,
        target: String,
        reason: AnalysisFailure,
        report: String,
    },
}

impl AnalysisOutcome {
    pub fn report(&self) -> &str {
        match self {
            AnalysisOutcome::Assessed { report, .. }
            | AnalysisOutcome::Unavailable { report, .. } => report,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            AnalysisOutcome::Assessed { target, .. }
            | AnalysisOutcome::Unavailable { target, .. } => target,
        }
    }

    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            AnalysisOutcome::Assessed { assessment, .. } => Some(assessment),
            AnalysisOutcome::Unavailable { .. } => None,
        }
    }
}

/// Trusted members following both accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutualConnections {
    pub first: String,
    pub second: String,
    /// In trusted-set order
    pub connections: Vec<String>,
    pub trusted_version: u64,
}

/// Shared, cheaply cloneable analysis pipeline.
#[derive(Clone)]
pub struct Analyzer {
    registry: Arc<TrustRegistry>,
    accounts: Arc<dyn AccountSource>,
    edges: Arc<dyn FollowerEdgeLookup>,
    extractor: Arc<SignalExtractor>,
    resolver: VouchResolver,
    scorer: RiskScorer,
    formatter: ReportFormatter,
}

impl Analyzer {
    pub fn new(
        config: &GuardConfig,
        registry: Arc<TrustRegistry>,
        accounts: Arc<dyn AccountSource>,
        edges: Arc<dyn FollowerEdgeLookup>,
    ) -> GuardResult<Self> {
        Ok(Self {
            registry,
            accounts,
            edges,
            extractor: Arc::new(SignalExtractor::new(&config.signals)?),
            resolver: VouchResolver::new(&config.vouch),
            scorer: RiskScorer::new(&config.scoring),
            formatter: ReportFormatter::new(&config.report),
        })
    }

    pub fn registry(&self) -> &Arc<TrustRegistry> {
        &self.registry
    }

    pub fn formatter(&self) -> &ReportFormatter {
        &self.formatter
    }

    pub async fn analyze(&self, handle: &str) -> GuardResult<AnalysisOutcome> {
        self.analyze_at(handle, Utc::now()).await
    }

    pub async fn analyze_at(
        &self,
        handle: &str,
        now: DateTime<Utc>,
    ) -> GuardResult<AnalysisOutcome> {
        let target = normalize_handle(handle)?;
        let id = Uuid::new_v4();
        let span = info_span!("analysis", %id, target = %target);
        self.run(id, target, now).instrument(span).await
    }

    /// Trusted members who follow both accounts. Both lookups use the same
    /// trusted set.
    pub async fn mutual_connections(
        &self,
        first: &str,
        second: &str,
    ) -> GuardResult<MutualConnections> {
        let first = normalize_handle(first)?;
        let second = normalize_handle(second)?;
        let trusted = self.registry.get();
        let (a, b) = tokio::join!(
            self.resolver.resolve(&first, &trusted, Arc::clone(&self.edges)),
            self.resolver.resolve(&second, &trusted, Arc::clone(&self.edges)),
        );
        let connections = a.mutual_with(&b);
        info!(
            first = %first,
            second = %second,
            mutual = connections.len(),
            "mutual trusted connections resolved"
        );
        Ok(MutualConnections {
            first,
            second,
            connections,
            trusted_version: trusted.version(),
        })
    }

    /// Score an already fetched snapshot. Pure apart from logging.
    pub fn assess(
        &self,
        snapshot: &AccountSnapshot,
        vouch: &VouchResult,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let signals = self.extractor.extract_at(snapshot, now);
        self.scorer.score(&signals, vouch)
    }

    async fn run(
        &self,
        id: Uuid,
        target: String,
        now: DateTime<Utc>,
    ) -> GuardResult<AnalysisOutcome> {
        let snapshot = match self.accounts.fetch_snapshot(&target).await {
            Ok(snapshot) if snapshot.protected => {
                return Ok(self.unavailable(id, target, AnalysisFailure::Private));
            }
            Ok(snapshot) => snapshot,
            Err(GuardError::DataUnavailable { reason, .. }) => {
                info!(%reason, "account data unavailable");
                return Ok(self.unavailable(id, target, reason.into()));
            }
            Err(e) if e.is_retryable() || e.needs_operator() => return Err(e),
            Err(e) => {
                error!(error = %e, "snapshot fetch failed");
                return Ok(self.unavailable(id, target, AnalysisFailure::Internal));
            }
        };

        // pin one trusted set for the whole analysis
        let trusted = self.registry.get();
        if trusted.is_empty() {
            warn!(version = trusted.version(), "trusted set is empty, vouching impossible");
        }
        let vouch = self
            .resolver
            .resolve(&target, &trusted, Arc::clone(&self.edges))
            .await;

        let assessment = self.assess(&snapshot, &vouch, now);
        let report = self.formatter.format_account(&assessment, &snapshot);
        info!(
            score = assessment.score,
            level = %assessment.level,
            vouched = assessment.vouch.is_vouched,
            trusted_version = trusted.version(),
            "analysis complete"
        );
        Ok(AnalysisOutcome::Assessed {
            id,
            target,
            assessment,
            report,
        })
    }

    fn unavailable(&self, id: Uuid, target: String, reason: AnalysisFailure) -> AnalysisOutcome {
        let report = self.formatter.format_error(Some(&target), reason);
        AnalysisOutcome::Unavailable {
            id,
            target,
            reason,
            report,
        }
    }
}
