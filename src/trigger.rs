//! Mention watcher
//!
//! Polls for replies that mention the bot with the trigger phrase, analyzes
//! the author of the post being replied to and answers with the report.

use crate::analysis::Analyzer;
use crate::config::WatcherConfig;
use crate::errors::{GuardError, GuardResult};
use crate::report::AnalysisFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    /// Post this mention replies to or quotes
    pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: String,
    pub author_handle: String,
}

/// Read mentions and write replies on the platform.
#[async_trait]
pub trait MentionChannel: Send + Sync {
    async fn search_mentions(
        &self,
        query: &str,
        since_id: Option<&str>,
        max_results: u32,
    ) -> GuardResult<Vec<Mention>>;

    async fn get_post(&self, id: &str) -> GuardResult<PostRef>;

    /// Returns the id of the posted reply.
    async fn post_reply(&self, in_reply_to: &str, text: &str) -> GuardResult<String>;
}

/// Case-insensitive check for the bot mention and trigger phrase.
pub fn is_trigger(text: &str, bot_username: &str, phrase: &str) -> bool {
    let text = text.to_lowercase();
    let mention = format!("@{}", bot_username.trim_start_matches('@').to_lowercase());
    let mentioned = text.match_indices(&mention).any(|(at, m)| {
        text[at + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    });
    mentioned && text.contains(&phrase.trim().to_lowercase())
}

// Post ids are decimal snowflakes; longer means newer.
fn compare_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub seen: usize,
    pub answered: usize,
    pub skipped: usize,
}

pub struct Watcher {
    analyzer: Analyzer,
    channel: Arc<dyn MentionChannel>,
    config: WatcherConfig,
    last_seen: Option<String>,
}

impl Watcher {
    pub fn new(
        analyzer: Analyzer,
        channel: Arc<dyn MentionChannel>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            analyzer,
            channel,
            config,
            last_seen: None,
        }
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn search_query(&self) -> String {
        format!(
            "@{} \"{}\" (is:reply OR is:quote) -is:retweet",
            self.config.bot_username.trim_start_matches('@'),
            self.config.trigger_phrase.trim()
        )
    }

    /// Resume after a mention id answered by an earlier run.
    pub fn resume_after(mut self, id: impl Into<String>) -> Self {
        self.last_seen = Some(id.into());
        self
    }

    /// Mark every mention currently visible as seen without answering it.
    ///
    /// Returns the newest id found, if any.
    pub async fn skip_backlog(&mut self) -> GuardResult<Option<&str>> {
        let mentions = self
            .channel
            .search_mentions(
                &self.search_query(),
                self.last_seen.as_deref(),
                self.config.max_results,
            )
            .await?;
        let newest = mentions
            .into_iter()
            .map(|m| m.id)
            .max_by(|a, b| compare_ids(a, b));
        if let Some(newest) = newest {
            let advance = self
                .last_seen
                .as_deref()
                .map_or(true, |last| compare_ids(&newest, last) == Ordering::Greater);
            if advance {
                self.last_seen = Some(newest);
            }
        }
        Ok(self.last_seen.as_deref())
    }

    /// One polling round. Mentions are handled oldest first. Rate limits and
    /// an exhausted budget stop the round without advancing past the failed
    /// mention; any other failure skips that mention.
    pub async fn poll_once(&mut self) -> GuardResult<PollSummary> {
        let mut mentions = self
            .channel
            .search_mentions(
                &self.search_query(),
                self.last_seen.as_deref(),
                self.config.max_results,
            )
            .await?;
        mentions.sort_by(|a, b| compare_ids(&a.id, &b.id));

        let mut summary = PollSummary::default();
        for mention in mentions {
            if let Some(last) = &self.last_seen {
                if compare_ids(&mention.id, last) != Ordering::Greater {
                    continue;
                }
            }
            summary.seen += 1;

            if self.handle(&mention).await? {
                summary.answered += 1;
            } else {
                summary.skipped += 1;
            }
            self.last_seen = Some(mention.id);
        }
        Ok(summary)
    }

    async fn handle(&self, mention: &Mention) -> GuardResult<bool> {
        if !is_trigger(&mention.text, &self.config.bot_username, &self.config.trigger_phrase) {
            debug!(mention = %mention.id, "mention without trigger phrase");
            return Ok(false);
        }
        let Some(parent) = &mention.in_reply_to else {
            debug!(mention = %mention.id, "trigger outside a reply");
            return Ok(false);
        };

        let report = match self.channel.get_post(parent).await {
            Ok(post) => match self.analyzer.analyze(&post.author_handle).await {
                Ok(outcome) => outcome.report().to_string(),
                Err(e) if e.is_retryable() || e.needs_operator() => return Err(e),
                Err(e) => {
                    warn!(mention = %mention.id, error = %e, "analysis failed");
                    self.analyzer
                        .formatter()
                        .format_error(Some(&post.author_handle), AnalysisFailure::Internal)
                }
            },
            Err(e) if e.is_retryable() || e.needs_operator() => return Err(e),
            Err(e) => {
                warn!(
                    mention = %mention.id,
                    parent = %parent,
                    error = %e,
                    "could not load replied-to post"
                );
                self.analyzer
                    .formatter()
                    .format_error(None, AnalysisFailure::ThreadUnavailable)
            }
        };

        match self.channel.post_reply(&mention.id, &report).await {
            Ok(reply_id) => {
                info!(mention = %mention.id, reply = %reply_id, "report posted");
                Ok(true)
            }
            Err(e) if e.is_retryable() || e.needs_operator() => Err(e),
            Err(e) => {
                warn!(mention = %mention.id, error = %e, "reply rejected, skipping mention");
                Ok(false)
            }
        }
    }

    /// Poll forever, doubling the delay after failures up to `max_backoff_secs`.
    pub async fn run(mut self) {
        let base = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let max = Duration::from_secs(self.config.max_backoff_secs).max(base);
        let mut delay = base;
        info!(query = %self.search_query(), "mention watcher started");
        if !self.config.answer_backlog && self.last_seen.is_none() {
            match self.skip_backlog().await {
                Ok(last) => info!(last_seen = ?last, "existing mentions marked as seen"),
                Err(e) => warn!(error = %e, "could not skip mention backlog, answering it"),
            }
        }
        loop {
            match self.poll_once().await {
                Ok(summary) => {
                    if summary.seen > 0 {
                        info!(seen = summary.seen, answered = summary.answered, "poll complete");
                    }
                    delay = base;
                }
                Err(GuardError::RateLimited { retry_after_secs }) => {
                    delay = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(delay * 2)
                        .clamp(base, max);
                    warn!(wait_secs = delay.as_secs(), "rate limited, backing off");
                }
                Err(e) => {
                    delay = (delay * 2).min(max);
                    error!(error = %e, wait_secs = delay.as_secs(), "poll failed");
                }
            }
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_detection() {
        let phrase = "riddle me this";
        assert!(is_trigger("@ProjectRugGuard riddle me this", "projectrugguard", phrase));
        assert!(is_trigger("hey @projectrugguard, RIDDLE ME THIS!", "@projectrugguard", phrase));
        assert!(!is_trigger("@projectrugguard what is this", "projectrugguard", phrase));
        assert!(!is_trigger("riddle me this", "projectrugguard", phrase));
        assert!(!is_trigger("@projectrugguard_fan riddle me this", "projectrugguard", phrase));
    }

    #[test]
    fn ids_compare_numerically() {
        assert_eq!(compare_ids("99", "100"), Ordering::Less);
        assert_eq!(compare_ids("1800", "1799"), Ordering::Greater);
        assert_eq!(compare_ids("42", "42"), Ordering::Equal);
    }
}
