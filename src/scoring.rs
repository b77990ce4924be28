//! Risk scoring
//!
//! Combines the extracted signals and the vouch result into a single
//! 0-100 trust score, a level and a list of reasons ordered by impact.
//! The linear model is a weighted mean of the signal values, lifted by
//! trusted connections.

use crate::config::ScoringConfig;
use crate::errors::{GuardError, GuardResult};
use crate::signals::{Polarity, Signal, SignalKind};
use crate::vouch::VouchResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level, ordered from most to least risky
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Critical,
    Low,
    Medium,
    High,
}

impl TrustLevel {
    pub fn label(&self) -> &'static str {
        match self {
            TrustLevel::Critical => "CRITICAL",
            TrustLevel::Low => "LOW",
            TrustLevel::Medium => "MEDIUM",
            TrustLevel::High => "HIGH",
        }
    }

    /// Short display form used in reports
    pub fn indicator(&self) -> &'static str {
        match self {
            TrustLevel::Critical => "🔴 HIGH RISK",
            TrustLevel::Low => "🟠 LOW TRUST",
            TrustLevel::Medium => "🟡 MEDIUM TRUST",
            TrustLevel::High => "🟢 HIGH TRUST",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower score boundaries of the LOW, MEDIUM and HIGH levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            low: 30.0,
            medium: 60.0,
            high: 80.0,
        }
    }
}

impl LevelThresholds {
    pub fn validate(&self) -> GuardResult<()> {
        let ordered = [0.0, self.low, self.medium, self.high, 100.0];
        if ordered.iter().any(|b| !b.is_finite()) || ordered.windows(2).any(|w| w[0] > w[1]) {
            return Err(GuardError::config(format!(
                "scoring.thresholds must satisfy 0 <= low <= medium <= high <= 100, got {}/{}/{}",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }

    pub fn level_for(&self, score: f64) -> TrustLevel {
        if score >= self.high {
            TrustLevel::High
        } else if score >= self.medium {
            TrustLevel::Medium
        } else if score >= self.low {
            TrustLevel::Low
        } else {
            TrustLevel::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub age: f64,
    pub ratio: f64,
    pub bio: f64,
    pub content: f64,
    pub engagement: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            age: 0.25,
            ratio: 0.20,
            bio: 0.20,
            content: 0.15,
            engagement: 0.20,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Age => self.age,
            SignalKind::Ratio => self.ratio,
            SignalKind::Bio => self.bio,
            SignalKind::Content => self.content,
            SignalKind::Engagement => self.engagement,
        }
    }

    pub fn validate(&self) -> GuardResult<()> {
        let weights = SignalKind::ALL.map(|k| self.weight(k));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GuardError::config("scoring.weights must be finite and non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(GuardError::config("scoring.weights must not all be zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonSource {
    Signal(SignalKind),
    Vouching,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReason {
    pub source: ReasonSource,
    pub polarity: Polarity,
    pub text: String,
    /// Share of the final verdict this reason accounts for, in [0, 1]
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    /// Weighted signal mean before connection bonus and vouch floor
    pub base_score: f64,
    pub level: TrustLevel,
    pub signals: Vec<Signal>,
    pub vouch: VouchResult,
    /// Highest impact first
    pub reasons: Vec<ScoredReason>,
}

impl RiskAssessment {
    pub fn signal(&self, kind: SignalKind) -> Option<&Signal> {
        self.signals.iter().find(|s| s.kind == kind)
    }
}

#[derive(Debug, Clone)]
pub struct RiskScorer {
    weights: SignalWeights,
    thresholds: LevelThresholds,
    vouch_floor: f64,
    per_connection_bonus: f64,
    max_connection_bonus: f64,
}

impl RiskScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.weights,
            thresholds: config.thresholds,
            vouch_floor: config.vouch_floor,
            per_connection_bonus: config.per_connection_bonus,
            max_connection_bonus: config.max_connection_bonus,
        }
    }

    pub fn thresholds(&self) -> &LevelThresholds {
        &self.thresholds
    }

    pub fn level_for(&self, score: f64) -> TrustLevel {
        self.thresholds.level_for(score)
    }

    /// Level every vouched account reaches at minimum.
    pub fn floor_level(&self) -> TrustLevel {
        self.level_for(self.vouch_floor)
    }

    pub fn score(&self, signals: &[Signal], vouch: &VouchResult) -> RiskAssessment {
        let total_weight: f64 = signals.iter().map(|s| self.weights.weight(s.kind)).sum();
        let base = if total_weight > 0.0 {
            100.0
                * signals
                    .iter()
                    .map(|s| self.weights.weight(s.kind) * s.value)
                    .sum::<f64>()
                / total_weight
        } else {
            50.0
        };

        let bonus = (vouch.count as f64 * self.per_connection_bonus).min(self.max_connection_bonus);
        let mut score = round1((base + bonus).clamp(0.0, 100.0));
        if vouch.is_vouched {
            score = score.max(self.vouch_floor);
        }

        let mut reasons: Vec<ScoredReason> = signals
            .iter()
            .filter_map(|s| {
                let reason = s.reason.as_ref()?;
                let share = if total_weight > 0.0 {
                    self.weights.weight(s.kind) / total_weight
                } else {
                    0.0
                };
                Some(ScoredReason {
                    source: ReasonSource::Signal(s.kind),
                    polarity: reason.polarity,
                    text: reason.text.clone(),
                    impact: share * (s.value - 0.5).abs() * 2.0,
                })
            })
            .collect();
        reasons.extend(vouch_reasons(vouch));
        reasons.sort_by(|a, b| {
            b.impact
                .total_cmp(&a.impact)
                .then_with(|| a.source.cmp(&b.source))
        });

        RiskAssessment {
            score,
            base_score: round1(base),
            level: self.level_for(score),
            signals: signals.to_vec(),
            vouch: vouch.clone(),
            reasons,
        }
    }
}

fn vouch_reasons(vouch: &VouchResult) -> Vec<ScoredReason> {
    let reason = |polarity, text: String, impact| ScoredReason {
        source: ReasonSource::Vouching,
        polarity,
        text,
        impact,
    };

    let mut reasons = Vec::new();
    if vouch.on_trusted_list {
        reasons.push(reason(
            Polarity::Positive,
            "Listed in the trusted registry".to_string(),
            1.0,
        ));
    }
    if vouch.is_vouched {
        reasons.push(reason(
            Polarity::Positive,
            format!("Vouched by {} trusted accounts", vouch.count),
            1.0,
        ));
    } else if vouch.count > 0 {
        let plural = if vouch.count == 1 { "" } else { "s" };
        reasons.push(reason(
            Polarity::Positive,
            format!(
                "{} trusted connection{plural}, {} needed to vouch",
                vouch.count, vouch.required
            ),
            0.5,
        ));
    } else if vouch.checked > 0 {
        reasons.push(reason(
            Polarity::Negative,
            "No trusted connections".to_string(),
            0.25,
        ));
    }
    reasons
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Reason;

    fn signal(kind: SignalKind, value: f64, reason: Option<Reason>) -> Signal {
        Signal {
            kind,
            value,
            raw: None,
            reason,
        }
    }

    fn flat(value: f64) -> Vec<Signal> {
        SignalKind::ALL.iter().map(|k| signal(*k, value, None)).collect()
    }

    fn vouched(count: usize) -> VouchResult {
        let mut v = VouchResult::not_vouched("t", 2);
        v.count = count;
        v.is_vouched = count >= 2;
        v.checked = 10;
        v.vouched_by = (0..count).map(|i| format!("m{i}")).collect();
        v
    }

    fn scorer() -> RiskScorer {
        RiskScorer::new(&ScoringConfig::default())
    }

    #[test]
    fn levels_are_monotonic() {
        let t = LevelThresholds::default();
        let mut previous = TrustLevel::Critical;
        for score in 0..=100 {
            let level = t.level_for(score as f64);
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(t.level_for(29.9), TrustLevel::Critical);
        assert_eq!(t.level_for(30.0), TrustLevel::Low);
        assert_eq!(t.level_for(80.0), TrustLevel::High);
    }

    #[test]
    fn threshold_validation() {
        assert!(LevelThresholds::default().validate().is_ok());
        let bad = LevelThresholds {
            low: 50.0,
            medium: 40.0,
            high: 80.0,
        };
        assert!(bad.validate().is_err());
        let nan = LevelThresholds {
            high: f64::NAN,
            ..LevelThresholds::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn weight_validation() {
        assert!(SignalWeights::default().validate().is_ok());
        let zero = SignalWeights {
            age: 0.0,
            ratio: 0.0,
            bio: 0.0,
            content: 0.0,
            engagement: 0.0,
        };
        assert!(zero.validate().is_err());
        let negative = SignalWeights {
            bio: -1.0,
            ..SignalWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn score_is_a_weighted_mean() {
        let s = scorer();
        assert_eq!(s.score(&flat(0.0), &vouched(0)).score, 0.0);
        assert_eq!(s.score(&flat(1.0), &vouched(0)).score, 100.0);
        assert_eq!(s.score(&flat(0.5), &vouched(0)).score, 50.0);
        assert_eq!(s.score(&[], &vouched(0)).score, 50.0);
    }

    #[test]
    fn connections_add_a_capped_bonus() {
        let s = scorer();
        assert_eq!(s.score(&flat(0.5), &vouched(1)).score, 55.0);
        let mut partial = vouched(9);
        partial.required = 10;
        partial.is_vouched = false;
        let capped = s.score(&flat(0.2), &partial);
        assert_eq!(capped.base_score, 20.0);
        assert_eq!(capped.score, 35.0);
        assert_eq!(capped.level, TrustLevel::Low);
    }

    #[test]
    fn vouching_lifts_to_the_floor() {
        let s = scorer();
        let assessment = s.score(&flat(0.0), &vouched(2));
        assert_eq!(assessment.score, 80.0);
        assert_eq!(assessment.level, TrustLevel::High);
        assert_eq!(s.floor_level(), TrustLevel::High);
        assert!(assessment.reasons[0].text.contains("Vouched by 2"));
    }

    #[test]
    fn reasons_are_ordered_by_impact() {
        let signals = vec![
            signal(SignalKind::Age, 0.05, Some(Reason::negative("Very new account (2d old)"))),
            signal(SignalKind::Ratio, 0.4, Some(Reason::negative("Suspicious follow pattern"))),
            signal(SignalKind::Bio, 0.9, Some(Reason::positive("Professional bio"))),
            signal(SignalKind::Content, 0.5, None),
            signal(SignalKind::Engagement, 0.5, None),
        ];
        let assessment = scorer().score(&signals, &vouched(0));
        let impacts: Vec<f64> = assessment.reasons.iter().map(|r| r.impact).collect();
        assert!(impacts.windows(2).all(|w| w[0] >= w[1]));
        let rank = |kind| {
            assessment
                .reasons
                .iter()
                .position(|r| r.source == ReasonSource::Signal(kind))
        };
        assert!(rank(SignalKind::Age) < rank(SignalKind::Bio));
        assert!(rank(SignalKind::Bio) < rank(SignalKind::Ratio));
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.source == ReasonSource::Vouching && r.polarity == Polarity::Negative));
    }

    #[test]
    fn scoring_is_deterministic() {
        let signals = flat(0.37);
        let v = vouched(1);
        assert_eq!(scorer().score(&signals, &v), scorer().score(&signals, &v));
    }
}
