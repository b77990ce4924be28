//! Heuristic signals derived from an account snapshot
//!
//! Each signal is computed on its own from the snapshot and never looks at
//! another signal. Values are normalized trust values: 0.0 is the strongest
//! risk indicator, 1.0 the strongest trust indicator, 0.5 is neutral.

use crate::account::{AccountSnapshot, Post};
use crate::config::SignalConfig;
use crate::errors::{GuardError, GuardResult};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Age,
    Ratio,
    Bio,
    Content,
    Engagement,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Age,
        SignalKind::Ratio,
        SignalKind::Bio,
        SignalKind::Content,
        SignalKind::Engagement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::Age => "account age",
            SignalKind::Ratio => "follower ratio",
            SignalKind::Bio => "bio",
            SignalKind::Content => "content",
            SignalKind::Engagement => "posting cadence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub polarity: Polarity,
    pub text: String,
}

impl Reason {
    pub fn positive(text: impl Into<String>) -> Self {
        Self {
            polarity: Polarity::Positive,
            text: text.into(),
        }
    }

    pub fn negative(text: impl Into<String>) -> Self {
        Self {
            polarity: Polarity::Negative,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    /// Normalized trust value in [0, 1]
    pub value: f64,
    /// Measurement behind the value: days, ratio, 0-10 score or posts/day
    pub raw: Option<f64>,
    /// Set only when a configured threshold was crossed
    pub reason: Option<Reason>,
}

impl Signal {
    fn new(kind: SignalKind, value: f64, raw: Option<f64>, reason: Option<Reason>) -> Self {
        Self {
            kind,
            value: value.clamp(0.0, 1.0),
            raw,
            reason,
        }
    }
}

struct Keyword {
    word: String,
    pattern: Regex,
}

fn compile_keywords(words: &[String]) -> GuardResult<Vec<Keyword>> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let pattern = Regex::new(&format!(r"(?i)(?:^|\W){}(?:\W|$)", regex::escape(&word)))
                .map_err(|e| GuardError::config(format!("bad keyword '{word}': {e}")))?;
            Ok(Keyword { word, pattern })
        })
        .collect()
}

fn matching<'a>(keywords: &'a [Keyword], text: &str) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|k| k.pattern.is_match(text))
        .map(|k| k.word.as_str())
        .collect()
}

pub struct SignalExtractor {
    config: SignalConfig,
    suspicious: Vec<Keyword>,
    professional: Vec<Keyword>,
    url: Regex,
    hashtag: Regex,
    emoji: Regex,
}

impl SignalExtractor {
    pub fn new(config: &SignalConfig) -> GuardResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| GuardError::internal(format!("pattern {pattern}: {e}")))
        };
        Ok(Self {
            suspicious: compile_keywords(&config.suspicious_keywords)?,
            professional: compile_keywords(&config.professional_keywords)?,
            url: compile(r"https?://\S+")?,
            hashtag: compile(r"#\w+")?,
            emoji: compile(r"[\x{1F300}-\x{1FAFF}\x{2600}-\x{27BF}]")?,
            config: config.clone(),
        })
    }

    /// All signals, evaluated against the current time.
    pub fn extract(&self, snapshot: &AccountSnapshot) -> Vec<Signal> {
        self.extract_at(snapshot, Utc::now())
    }

    /// All signals in [`SignalKind::ALL`] order, evaluated at `now`.
    pub fn extract_at(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Vec<Signal> {
        vec![
            self.age_signal(snapshot, now),
            self.ratio_signal(snapshot),
            self.bio_signal(&snapshot.bio),
            self.content_signal(&snapshot.recent_posts),
            self.engagement_signal(snapshot, now),
        ]
    }

    pub fn age_signal(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Signal {
        let c = &self.config;
        let days = snapshot.age_days(now);
        let value = days as f64 / c.mature_account_days as f64;
        let reason = if days < c.new_account_days {
            Some(Reason::negative(format!("Very new account ({days}d old)")))
        } else if days < c.young_account_days {
            Some(Reason::negative(format!("New account ({days}d old)")))
        } else if days >= c.mature_account_days {
            Some(Reason::positive(format!("Established account ({}y old)", days / 365)))
        } else {
            None
        };
        Signal::new(SignalKind::Age, value, Some(days as f64), reason)
    }

    pub fn ratio_signal(&self, snapshot: &AccountSnapshot) -> Signal {
        let c = &self.config;
        let Some(ratio) = snapshot.follower_ratio() else {
            return Signal::new(SignalKind::Ratio, 0.5, None, None);
        };

        // log scale: suspicious_ratio maps to 0, healthy_ratio to 1
        let low = c.suspicious_ratio.ln();
        let high = c.healthy_ratio.ln();
        let value = if ratio <= 0.0 {
            0.0
        } else {
            (ratio.ln() - low) / (high - low)
        };

        let reason = if ratio <= c.suspicious_ratio {
            Some(Reason::negative(format!("Suspicious follow pattern ({ratio:.2}:1)")))
        } else if ratio >= c.healthy_ratio {
            Some(Reason::positive(format!("Strong follower ratio ({ratio:.0}:1)")))
        } else {
            None
        };
        Signal::new(SignalKind::Ratio, value, Some(ratio), reason)
    }

    pub fn bio_signal(&self, bio: &str) -> Signal {
        let c = &self.config;
        let text = bio.trim();
        if text.is_empty() {
            return Signal::new(SignalKind::Bio, 0.3, Some(3.0), None);
        }

        let suspicious = matching(&self.suspicious, text);
        let professional = matching(&self.professional, text);
        let mut score = 5.0 - 2.0 * suspicious.len() as f64 + professional.len() as f64;

        let chars = text.chars().count() as f64;
        let emoji = self.emoji.find_iter(text).count() as f64;
        if emoji > chars * c.max_emoji_share {
            score -= 1.0;
        }

        match self.url.find_iter(text).count() {
            0 => {}
            1 => score += 0.5,
            2 => {}
            _ => score -= 1.0,
        }

        let score = score.clamp(0.0, 10.0);
        let reason = if !suspicious.is_empty() {
            let shown: Vec<&str> = suspicious.iter().take(3).copied().collect();
            Some(Reason::negative(format!("Suspicious bio ({})", shown.join(", "))))
        } else if score >= c.professional_bio_score {
            Some(Reason::positive("Professional bio"))
        } else {
            None
        };
        Signal::new(SignalKind::Bio, score / 10.0, Some(score), reason)
    }

    pub fn content_signal(&self, posts: &[Post]) -> Signal {
        let c = &self.config;
        if posts.is_empty() {
            return Signal::new(SignalKind::Content, 0.3, Some(3.0), None);
        }

        let mut seen = HashSet::new();
        let mut spam_indicators = 0usize;
        let mut spam_posts = 0usize;
        let mut quality_indicators = 0usize;

        for post in posts {
            let text = post.text.trim();
            let mut indicators = 0;

            if !matching(&self.suspicious, text).is_empty() {
                indicators += 1;
            }
            if self.hashtag.find_iter(text).count() > c.max_hashtags {
                indicators += 1;
            }
            if self.url.find_iter(text).count() > c.max_links {
                indicators += 1;
            }
            let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
            if words.len() >= 5 {
                let unique: HashSet<&String> = words.iter().collect();
                if (unique.len() as f64) < words.len() as f64 * c.min_lexical_diversity {
                    indicators += 1;
                }
            }
            if !text.is_empty() && !seen.insert(words.join(" ")) {
                indicators += 1;
            }

            if indicators > 0 {
                spam_posts += 1;
            }
            spam_indicators += indicators;

            if text.chars().count() > c.substantial_post_chars {
                quality_indicators += 1;
            }
            if post.engagement.total() > 0 {
                quality_indicators += 1;
            }
        }

        let n = posts.len() as f64;
        let score = (5.0 + 3.0 * quality_indicators as f64 / n - 4.0 * spam_indicators as f64 / n)
            .clamp(0.0, 10.0);
        let reason = if score < c.content_low_score {
            Some(Reason::negative(format!(
                "Spam-like posts ({spam_posts} of {} recent)",
                posts.len()
            )))
        } else if score > c.content_high_score {
            Some(Reason::positive("Genuine engagement on recent posts"))
        } else {
            None
        };
        Signal::new(SignalKind::Content, score / 10.0, Some(score), reason)
    }

    pub fn engagement_signal(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Signal {
        let c = &self.config;
        let posts = snapshot.post_count.max(snapshot.recent_posts.len() as u64);
        if posts == 0 {
            return Signal::new(
                SignalKind::Engagement,
                0.2,
                Some(0.0),
                Some(Reason::negative("No posting history")),
            );
        }

        let days = snapshot.age_days(now).max(1) as f64;
        let per_day = posts as f64 / days;
        let mut score: f64 = 5.0;

        if per_day > c.excessive_posts_per_day {
            score -= 2.0;
        } else if per_day > c.high_posts_per_day {
            score -= 1.0;
        } else if (c.organic_posts_per_day_min..=c.organic_posts_per_day_max).contains(&per_day) {
            score += 1.0;
        }

        let followers = snapshot.followers_count;
        if followers > 1000 && posts > 100 {
            score += 2.0;
        } else if followers > 100 && posts > 50 {
            score += 1.0;
        }

        let bursty = self.is_bursty(&snapshot.recent_posts);
        if bursty {
            score -= 2.0;
        }

        let score = score.clamp(0.0, 10.0);
        let reason = if bursty {
            Some(Reason::negative(format!(
                "Bursty posting ({}+ posts within {} min)",
                c.burst_min_posts, c.burst_window_minutes
            )))
        } else if score < c.engagement_low_score {
            Some(Reason::negative(format!("Abnormal posting cadence ({per_day:.1}/day)")))
        } else if score > c.engagement_high_score {
            Some(Reason::positive("Healthy posting cadence"))
        } else {
            None
        };
        Signal::new(SignalKind::Engagement, score / 10.0, Some(per_day), reason)
    }

    /// Any `burst_min_posts` consecutive posts inside `burst_window_minutes`.
    fn is_bursty(&self, posts: &[Post]) -> bool {
        let n = self.config.burst_min_posts;
        if posts.len() < n {
            return false;
        }
        let mut stamps: Vec<DateTime<Utc>> = posts.iter().map(|p| p.created_at).collect();
        stamps.sort();
        let window = Duration::minutes(self.config.burst_window_minutes);
        stamps.windows(n).any(|w| w[n - 1] - w[0] <= window)
    }
}
