//! Layered runtime configuration
//!
//! Defaults are serialized into a figment, then `rugguard.toml` (or an
//! explicit path) and `RUGGUARD_*` environment variables are merged on top.
//! Nested keys use a double underscore: `RUGGUARD_VOUCH__MIN_CORROBORATION=3`.

use crate::errors::{GuardError, GuardResult};
use crate::scoring::{LevelThresholds, SignalWeights};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "rugguard.toml";
pub const ENV_PREFIX: &str = "RUGGUARD_";

/// Shortest report limit that still fits the compact level/vouch line.
pub const MIN_REPORT_LENGTH: usize = 40;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub registry: RegistryConfig,
    pub vouch: VouchConfig,
    pub signals: SignalConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub platform: PlatformConfig,
    pub watcher: WatcherConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// HTTP(S) URL or local path of the trusted-accounts list
    pub source: String,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            source: "https://raw.githubusercontent.com/devsyrem/turst-list/main/list".to_string(),
            refresh_interval_secs: 3600,
            fetch_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VouchConfig {
    /// Trusted followers needed before an account counts as vouched
    pub min_corroboration: usize,
    pub lookup_timeout_ms: u64,
    pub max_concurrent_lookups: usize,
}

impl Default for VouchConfig {
    fn default() -> Self {
        Self {
            min_corroboration: 2,
            lookup_timeout_ms: 5_000,
            max_concurrent_lookups: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    // age
    pub new_account_days: i64,
    pub young_account_days: i64,
    pub mature_account_days: i64,

    // follower / following ratio
    pub suspicious_ratio: f64,
    pub healthy_ratio: f64,

    // bio
    pub suspicious_keywords: Vec<String>,
    pub professional_keywords: Vec<String>,
    pub professional_bio_score: f64,
    pub max_emoji_share: f64,

    // content
    pub max_hashtags: usize,
    pub max_links: usize,
    pub min_lexical_diversity: f64,
    pub substantial_post_chars: usize,
    pub content_low_score: f64,
    pub content_high_score: f64,

    // cadence
    pub excessive_posts_per_day: f64,
    pub high_posts_per_day: f64,
    pub organic_posts_per_day_min: f64,
    pub organic_posts_per_day_max: f64,
    pub burst_min_posts: usize,
    pub burst_window_minutes: i64,
    pub engagement_low_score: f64,
    pub engagement_high_score: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect();
        Self {
            new_account_days: 30,
            young_account_days: 90,
            mature_account_days: 365,
            suspicious_ratio: 0.1,
            healthy_ratio: 10.0,
            suspicious_keywords: words(&[
                "guaranteed",
                "risk-free",
                "get rich",
                "easy money",
                "moonshot",
                "to the moon",
                "100x",
                "guaranteed returns",
                "no risk",
                "quick profit",
                "instant wealth",
                "diamond hands",
                "hodl",
                "financial advice",
                "not financial advice",
                "dyor",
            ]),
            professional_keywords: words(&[
                "developer",
                "engineer",
                "founder",
                "ceo",
                "cto",
                "researcher",
                "university",
                "phd",
                "professor",
                "verified",
                "official",
            ]),
            professional_bio_score: 7.0,
            max_emoji_share: 0.2,
            max_hashtags: 5,
            max_links: 2,
            min_lexical_diversity: 0.7,
            substantial_post_chars: 100,
            content_low_score: 3.0,
            content_high_score: 7.0,
            excessive_posts_per_day: 50.0,
            high_posts_per_day: 20.0,
            organic_posts_per_day_min: 1.0,
            organic_posts_per_day_max: 10.0,
            burst_min_posts: 5,
            burst_window_minutes: 60,
            engagement_low_score: 3.0,
            engagement_high_score: 7.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SignalWeights,
    pub thresholds: LevelThresholds,
    /// Minimum score of a vouched account
    pub vouch_floor: f64,
    pub per_connection_bonus: f64,
    pub max_connection_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let thresholds = LevelThresholds::default();
        Self {
            weights: SignalWeights::default(),
            vouch_floor: thresholds.high,
            thresholds,
            per_connection_bonus: 5.0,
            max_connection_bonus: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Platform message limit, counted in characters
    pub max_length: usize,
    pub max_vouchers_shown: usize,
    pub brand: String,
    pub footer: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_length: 280,
            max_vouchers_shown: 3,
            brand: "RUGGUARD".to_string(),
            footer: "#RUGGUARD #DeFiSafety #DYOR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_base: String,
    /// App-only token used for reads
    pub bearer_token: Option<String>,
    /// User-context token used to post replies
    pub user_access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub recent_posts: u32,
    pub following_pages: u32,
    pub following_cache_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.com".to_string(),
            bearer_token: None,
            user_access_token: None,
            request_timeout_secs: 15,
            recent_posts: 20,
            following_pages: 1,
            following_cache_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub bot_username: String,
    pub trigger_phrase: String,
    pub poll_interval_secs: u64,
    pub max_backoff_secs: u64,
    pub max_results: u32,
    /// Answer mentions already present when the watcher starts
    pub answer_backlog: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            bot_username: "projectrugguard".to_string(),
            trigger_phrase: "riddle me this".to_string(),
            poll_interval_secs: 60,
            max_backoff_secs: 300,
            max_results: 10,
            answer_backlog: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration from defaults, a TOML file and the environment.
///
/// A missing file is not an error; figment simply skips it.
pub fn load_config(path: Option<&Path>) -> GuardResult<GuardConfig> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let figment = Figment::from(Serialized::defaults(GuardConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: GuardConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

impl GuardConfig {
    pub fn validate(&self) -> GuardResult<()> {
        if self.registry.source.trim().is_empty() {
            return Err(GuardError::config("registry.source must be set"));
        }
        if self.registry.refresh_interval_secs == 0 {
            return Err(GuardError::config("registry.refresh_interval_secs must be at least 1"));
        }
        if self.registry.fetch_timeout_secs == 0 {
            return Err(GuardError::config("registry.fetch_timeout_secs must be at least 1"));
        }
        if self.vouch.min_corroboration == 0 {
            return Err(GuardError::config("vouch.min_corroboration must be at least 1"));
        }
        if self.vouch.max_concurrent_lookups == 0 {
            return Err(GuardError::config("vouch.max_concurrent_lookups must be at least 1"));
        }
        if self.vouch.lookup_timeout_ms == 0 {
            return Err(GuardError::config("vouch.lookup_timeout_ms must be positive"));
        }

        let s = &self.signals;
        if !(0 < s.new_account_days
            && s.new_account_days <= s.young_account_days
            && s.young_account_days <= s.mature_account_days)
        {
            return Err(GuardError::config(
                "signals: expected 0 < new_account_days <= young_account_days \
                 <= mature_account_days",
            ));
        }
        if !(s.suspicious_ratio > 0.0 && s.suspicious_ratio < s.healthy_ratio) {
            return Err(GuardError::config(
                "signals: expected 0 < suspicious_ratio < healthy_ratio",
            ));
        }
        if s.burst_min_posts < 2 || s.burst_window_minutes <= 0 {
            return Err(GuardError::config(
                "signals: burst detection needs at least 2 posts and a positive window",
            ));
        }

        self.scoring.thresholds.validate()?;
        self.scoring.weights.validate()?;
        if !(0.0..=100.0).contains(&self.scoring.vouch_floor) {
            return Err(GuardError::config("scoring.vouch_floor must be within 0..=100"));
        }
        if self.scoring.per_connection_bonus < 0.0 || self.scoring.max_connection_bonus < 0.0 {
            return Err(GuardError::config("scoring: connection bonuses cannot be negative"));
        }

        if self.report.max_length < MIN_REPORT_LENGTH {
            return Err(GuardError::config(format!(
                "report.max_length must be at least {MIN_REPORT_LENGTH}"
            )));
        }
        if self.platform.recent_posts < 5 || self.platform.recent_posts > 100 {
            return Err(GuardError::config("platform.recent_posts must be within 5..=100"));
        }
        if self.watcher.trigger_phrase.trim().is_empty() {
            return Err(GuardError::config("watcher.trigger_phrase must be set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = GuardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vouch.min_corroboration, 2);
        assert_eq!(config.report.max_length, 280);
        assert_eq!(config.scoring.vouch_floor, config.scoring.thresholds.high);
    }

    #[test]
    fn zero_corroboration_is_rejected() {
        let mut config = GuardConfig::default();
        config.vouch.min_corroboration = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_corroboration"));
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let mut config = GuardConfig::default();
        config.scoring.thresholds.medium = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_report_limit_is_rejected() {
        let mut config = GuardConfig::default();
        config.report.max_length = 10;
        assert!(config.validate().is_err());
    }
}
