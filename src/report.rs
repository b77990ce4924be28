//! Bounded-length text reports
//!
//! Reports are posted as platform replies, so every rendering is fitted to
//! `max_length` characters. Sections are shed in a fixed order until the
//! text fits; the level line and the vouch line are always kept.

use crate::account::AccountSnapshot;
use crate::config::ReportConfig;
use crate::errors::Unavailability;
use crate::scoring::{ReasonSource, RiskAssessment};
use crate::signals::{Polarity, SignalKind};
use crate::vouch::VouchResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why an analysis produced no assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFailure {
    NotFound,
    Private,
    Suspended,
    RateLimited,
    ThreadUnavailable,
    Internal,
}

impl AnalysisFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AnalysisFailure::NotFound => "❌ Account not found",
            AnalysisFailure::Private => "🔒 Account is private - cannot analyze",
            AnalysisFailure::Suspended => "🚫 Account suspended",
            AnalysisFailure::RateLimited => "⏰ Rate limited - please wait before next request",
            AnalysisFailure::ThreadUnavailable => {
                "⚠️ Could not access the post thread. This might be due to rate limits, \
                 thread length, or post age. Please try again in a few minutes."
            }
            AnalysisFailure::Internal => "❌ Analysis failed - please try again later",
        }
    }
}

impl From<Unavailability> for AnalysisFailure {
    fn from(reason: Unavailability) -> Self {
        match reason {
            Unavailability::NotFound => AnalysisFailure::NotFound,
            Unavailability::Private => AnalysisFailure::Private,
            Unavailability::Suspended => AnalysisFailure::Suspended,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportFormatter {
    max_length: usize,
    max_vouchers_shown: usize,
    brand: String,
    footer: String,
}

impl ReportFormatter {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            max_length: config.max_length,
            max_vouchers_shown: config.max_vouchers_shown,
            brand: config.brand.clone(),
            footer: config.footer.clone(),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn format(&self, assessment: &RiskAssessment, target: &str) -> String {
        self.render(assessment, target, None)
    }

    /// Like [`format`](Self::format), with the follower count in the metrics line.
    pub fn format_account(&self, assessment: &RiskAssessment, account: &AccountSnapshot) -> String {
        self.render(assessment, &account.handle, Some(account.followers_count))
    }

    pub fn format_error(&self, target: Option<&str>, failure: AnalysisFailure) -> String {
        let header = match target {
            Some(t) => format!("🔍 {}: @{}", self.brand, t.trim_start_matches('@')),
            None => format!("🔍 {}", self.brand),
        };
        let message = failure.message();
        let candidates = [
            format!("{header}\n{message}\n\n{}", self.footer),
            format!("{header}\n{message}"),
            message.to_string(),
        ];
        self.first_fit(&candidates)
            .unwrap_or_else(|| truncate_chars(message, self.max_length))
    }

    fn render(&self, assessment: &RiskAssessment, target: &str, followers: Option<u64>) -> String {
        let target = target.trim_start_matches('@');
        let header = format!("🔍 {} ANALYSIS: @{}", self.brand, target);
        let level = format!("{} ({:.0}/100)", assessment.level.indicator(), assessment.score);
        let vouch = self.vouch_line(&assessment.vouch);
        let metrics = metrics_line(assessment, followers);
        let reasons: Vec<String> = assessment
            .reasons
            .iter()
            .filter(|r| r.source != ReasonSource::Vouching)
            .map(|r| match r.polarity {
                Polarity::Negative => format!("⚠️ {}", r.text),
                Polarity::Positive => format!("✅ {}", r.text),
            })
            .collect();

        let compose = |metrics: Option<&str>, shown: usize, marker: bool, footer: bool| {
            let hidden = reasons.len() - shown;
            let more = format!("(+{hidden} more)");
            let mut lines = vec![header.as_str(), level.as_str(), vouch.as_str()];
            if let Some(m) = metrics {
                lines.push(m);
            }
            lines.extend(reasons[..shown].iter().map(String::as_str));
            if marker && hidden > 0 {
                lines.push(&more);
            }
            let mut text = lines.join("\n");
            if footer {
                text.push_str("\n\n");
                text.push_str(&self.footer);
            }
            text
        };

        let mut candidates = Vec::new();
        candidates.push(compose(metrics.as_deref(), reasons.len(), false, true));
        candidates.push(compose(metrics.as_deref(), reasons.len(), false, false));
        for shown in (0..=reasons.len()).rev() {
            candidates.push(compose(None, shown, true, false));
            candidates.push(compose(None, shown, false, false));
        }
        candidates.push(format!("{level}\n{vouch}"));

        match self.first_fit(&candidates) {
            Some(text) => text,
            None => {
                let vouched = if assessment.vouch.is_vouched {
                    "VOUCHED"
                } else {
                    "NOT VOUCHED"
                };
                let compact = format!(
                    "{} {:.0}/100 | {} | @{}",
                    assessment.level.label(),
                    assessment.score,
                    vouched,
                    target
                );
                debug!(target = %target, max = self.max_length, "report fell back to compact form");
                truncate_chars(&compact, self.max_length)
            }
        }
    }

    fn vouch_line(&self, vouch: &VouchResult) -> String {
        let mut line = if vouch.is_vouched {
            let shown: Vec<String> = vouch
                .vouched_by
                .iter()
                .take(self.max_vouchers_shown)
                .map(|m| format!("@{m}"))
                .collect();
            let mut line = format!("✅ Vouched by {}", shown.join(", "));
            if vouch.vouched_by.len() > shown.len() {
                line.push_str(&format!(" +{} more", vouch.vouched_by.len() - shown.len()));
            }
            line
        } else if vouch.count > 0 {
            format!(
                "🤝 {}/{} trusted follows, not vouched",
                vouch.count, vouch.required
            )
        } else {
            "❌ Not vouched by trusted network".to_string()
        };
        if vouch.on_trusted_list {
            line.push_str(" | ⭐ on trusted list");
        }
        line
    }

    fn first_fit(&self, candidates: &[String]) -> Option<String> {
        candidates
            .iter()
            .find(|c| c.chars().count() <= self.max_length)
            .cloned()
    }
}

fn metrics_line(assessment: &RiskAssessment, followers: Option<u64>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(days) = assessment.signal(SignalKind::Age).and_then(|s| s.raw) {
        let days = days as i64;
        parts.push(match days {
            d if d < 30 => format!("📅 {d}d old (NEW)"),
            d if d < 365 => format!("📅 {d}d old"),
            d => format!("📅 {}y old", d / 365),
        });
    }
    if let Some(count) = followers {
        parts.push(format!("👥 {} followers", compact_count(count)));
    }
    if let Some(ratio) = assessment.signal(SignalKind::Ratio).and_then(|s| s.raw) {
        parts.push(if ratio >= 10.0 {
            "📊 Great ratio".to_string()
        } else if ratio >= 1.0 {
            format!("📊 {ratio:.1}:1 ratio")
        } else {
            format!("📊 {ratio:.2}:1 ratio")
        });
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

fn compact_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
