//! X API v2 adapter
//!
//! Implements [`AccountSource`], [`FollowerEdgeLookup`] and
//! [`MentionChannel`] over HTTPS with an app-only bearer token for reads and
//! an optional user-context token for posting replies.

use crate::account::{normalize_handle, AccountSnapshot, Engagement, Post};
use crate::analysis::AccountSource;
use crate::config::PlatformConfig;
use crate::errors::{GuardError, GuardResult, Unavailability};
use crate::trigger::{Mention, MentionChannel, PostRef};
use crate::vouch::FollowerEdgeLookup;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const USER_FIELDS: &str = "created_at,description,public_metrics,protected,verified";
const FOLLOWING_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<UserRef>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    tweet_count: u64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
    #[serde(default)]
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    protected: bool,
    #[serde(default)]
    public_metrics: UserMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    quote_count: u64,
}

#[derive(Debug, Deserialize)]
struct Reference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<DateTime<Utc>>,
    author_id: Option<String>,
    #[serde(default)]
    public_metrics: TweetMetrics,
    #[serde(default)]
    referenced_tweets: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

struct CachedFollowing {
    fetched: Instant,
    handles: Arc<HashSet<String>>,
}

pub struct XApiClient {
    http: Client,
    base: String,
    bearer: String,
    user_token: Option<String>,
    recent_posts: u32,
    following_pages: u32,
    following_ttl: Duration,
    following: RwLock<HashMap<String, CachedFollowing>>,
    user_ids: RwLock<HashMap<String, String>>,
}

impl XApiClient {
    pub fn new(config: &PlatformConfig) -> GuardResult<Self> {
        let bearer = config
            .bearer_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GuardError::config("platform.bearer_token is required for the X API"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("rugguard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            bearer,
            user_token: config.user_access_token.clone(),
            recent_posts: config.recent_posts.clamp(5, 100),
            following_pages: config.following_pages.max(1),
            following_ttl: Duration::from_secs(config.following_cache_secs),
            following: RwLock::new(HashMap::new()),
            user_ids: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> GuardResult<Envelope<T>> {
        let request = self.http.get(self.url(path)).bearer_auth(&self.bearer).query(query);
        self.send(operation, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> GuardResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| GuardError::network(operation, e))?;
        let response = check_status(operation, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GuardError::network(operation, e))
    }

    async fn lookup_user(&self, handle: &str) -> GuardResult<User> {
        let envelope: Envelope<User> = self
            .get(
                "user_lookup",
                &format!("/2/users/by/username/{handle}"),
                &[("user.fields", USER_FIELDS.to_string())],
            )
            .await?;
        match envelope.data {
            Some(user) => {
                self.user_ids
                    .write()
                    .await
                    .insert(handle.to_string(), user.id.clone());
                Ok(user)
            }
            None => Err(GuardError::data_unavailable(handle, classify(&envelope.errors))),
        }
    }

    async fn user_id(&self, handle: &str) -> GuardResult<String> {
        if let Some(id) = self.user_ids.read().await.get(handle) {
            return Ok(id.clone());
        }
        Ok(self.lookup_user(handle).await?.id)
    }

    async fn recent_posts(&self, user_id: &str) -> GuardResult<Vec<Post>> {
        let envelope: Envelope<Vec<Tweet>> = self
            .get(
                "user_timeline",
                &format!("/2/users/{user_id}/tweets"),
                &[
                    ("max_results", self.recent_posts.to_string()),
                    ("tweet.fields", "created_at,public_metrics".to_string()),
                    ("exclude", "retweets".to_string()),
                ],
            )
            .await?;
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| {
                Some(Post {
                    created_at: t.created_at?,
                    engagement: Engagement {
                        likes: t.public_metrics.like_count,
                        reposts: t.public_metrics.retweet_count,
                        replies: t.public_metrics.reply_count,
                        quotes: t.public_metrics.quote_count,
                    },
                    id: t.id,
                    text: t.text,
                })
            })
            .collect())
    }

    /// Handles followed by `member`, cached for `following_cache_secs`.
    async fn following(&self, member: &str) -> GuardResult<Arc<HashSet<String>>> {
        if let Some(cached) = self.following.read().await.get(member) {
            if cached.fetched.elapsed() < self.following_ttl {
                return Ok(Arc::clone(&cached.handles));
            }
        }

        let id = self.user_id(member).await?;
        let mut handles = HashSet::new();
        let mut token: Option<String> = None;
        for page in 0..self.following_pages {
            let mut query = vec![("max_results", FOLLOWING_PAGE_SIZE.to_string())];
            if let Some(t) = &token {
                query.push(("pagination_token", t.clone()));
            }
            let envelope: Envelope<Vec<UserRef>> = self
                .get("following", &format!("/2/users/{id}/following"), &query)
                .await?;
            handles.extend(
                envelope
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|u| u.username.to_ascii_lowercase()),
            );
            debug!(%member, page, total = handles.len(), "following page fetched");
            token = envelope.meta.next_token;
            if token.is_none() {
                break;
            }
        }

        let handles = Arc::new(handles);
        self.following.write().await.insert(
            member.to_string(),
            CachedFollowing {
                fetched: Instant::now(),
                handles: Arc::clone(&handles),
            },
        );
        Ok(handles)
    }
}

async fn check_status(operation: &str, response: Response) -> GuardResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_secs(&response, Utc::now().timestamp());
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::TOO_MANY_REQUESTS if body.contains("UsageCapExceeded") => {
            Err(GuardError::budget_exhausted(format!("{operation}: monthly usage cap reached")))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(GuardError::rate_limited(retry_after)),
        StatusCode::UNAUTHORIZED => Err(GuardError::config(format!(
            "{operation}: credentials rejected"
        ))),
        _ => Err(GuardError::internal(format!(
            "{operation}: HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        ))),
    }
}

fn retry_after_secs(response: &Response, now: i64) -> Option<u64> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };
    reset_delay(header("x-rate-limit-reset"), header("retry-after"), now)
}

fn reset_delay(reset_epoch: Option<i64>, retry_after: Option<i64>, now: i64) -> Option<u64> {
    reset_epoch
        .map(|reset| (reset - now).max(0) as u64)
        .or_else(|| retry_after.map(|secs| secs.max(0) as u64))
}

fn classify(errors: &[Problem]) -> Unavailability {
    for problem in errors {
        let detail = problem.detail.as_deref().unwrap_or_default().to_lowercase();
        let title = problem.title.as_deref().unwrap_or_default().to_lowercase();
        if detail.contains("suspended") {
            return Unavailability::Suspended;
        }
        if detail.contains("not authorized") || title.contains("authorization") {
            return Unavailability::Private;
        }
        if let Some(kind) = &problem.kind {
            debug!(%kind, "unavailable resource");
        }
    }
    Unavailability::NotFound
}

fn reply_target(tweet: &Tweet) -> Option<String> {
    tweet
        .referenced_tweets
        .iter()
        .find(|r| r.kind == "replied_to")
        .or_else(|| tweet.referenced_tweets.iter().find(|r| r.kind == "quoted"))
        .map(|r| r.id.clone())
}

#[async_trait]
impl AccountSource for XApiClient {
    async fn fetch_snapshot(&self, handle: &str) -> GuardResult<AccountSnapshot> {
        let handle = normalize_handle(handle)?;
        let user = self.lookup_user(&handle).await?;

        let recent_posts = if user.protected {
            Vec::new()
        } else {
            match self.recent_posts(&user.id).await {
                Ok(posts) => posts,
                Err(e) if e.is_retryable() || e.needs_operator() => return Err(e),
                Err(e) => {
                    warn!(%handle, error = %e, "timeline unavailable, scoring without posts");
                    Vec::new()
                }
            }
        };

        Ok(AccountSnapshot {
            handle: user.username.to_ascii_lowercase(),
            platform_id: Some(user.id),
            display_name: user.name,
            created_at: user.created_at,
            followers_count: user.public_metrics.followers_count,
            following_count: user.public_metrics.following_count,
            post_count: user.public_metrics.tweet_count,
            bio: user.description,
            protected: user.protected,
            recent_posts,
        })
    }
}

#[async_trait]
impl FollowerEdgeLookup for XApiClient {
    async fn follows(&self, follower: &str, target: &str) -> GuardResult<bool> {
        match self.following(follower).await {
            Ok(handles) => Ok(handles.contains(&target.to_ascii_lowercase())),
            Err(e) if e.is_retryable() || e.needs_operator() => Err(e),
            Err(e) => Err(GuardError::edge_lookup(follower, target, e.to_string())),
        }
    }
}

#[async_trait]
impl MentionChannel for XApiClient {
    async fn search_mentions(
        &self,
        query: &str,
        since_id: Option<&str>,
        max_results: u32,
    ) -> GuardResult<Vec<Mention>> {
        let mut params = vec![
            ("query", query.to_string()),
            ("max_results", max_results.clamp(10, 100).to_string()),
            ("tweet.fields", "author_id,created_at,referenced_tweets".to_string()),
        ];
        if let Some(id) = since_id {
            params.push(("since_id", id.to_string()));
        }
        let envelope: Envelope<Vec<Tweet>> = self
            .get("search_mentions", "/2/tweets/search/recent", &params)
            .await?;
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|t| Mention {
                in_reply_to: reply_target(&t),
                id: t.id,
                text: t.text,
                author_id: t.author_id,
            })
            .collect())
    }

    async fn get_post(&self, id: &str) -> GuardResult<PostRef> {
        let envelope: Envelope<Tweet> = self
            .get(
                "get_post",
                &format!("/2/tweets/{id}"),
                &[
                    ("expansions", "author_id".to_string()),
                    ("tweet.fields", "author_id,referenced_tweets".to_string()),
                    ("user.fields", "username".to_string()),
                ],
            )
            .await?;
        let Some(tweet) = envelope.data else {
            return Err(GuardError::data_unavailable(id, classify(&envelope.errors)));
        };
        let author = tweet
            .author_id
            .as_deref()
            .and_then(|author| envelope.includes.users.iter().find(|u| u.id == author))
            .ok_or_else(|| GuardError::internal(format!("post {id} has no author expansion")))?;
        Ok(PostRef {
            id: tweet.id,
            author_handle: author.username.to_ascii_lowercase(),
        })
    }

    async fn post_reply(&self, in_reply_to: &str, text: &str) -> GuardResult<String> {
        let token = self.user_token.as_deref().ok_or_else(|| {
            GuardError::config("platform.user_access_token is required to post replies")
        })?;
        let body = serde_json::json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": in_reply_to },
        });
        let request = self.http.post(self.url("/2/tweets")).bearer_auth(token).json(&body);
        let envelope: Envelope<Created> = self.send("post_reply", request).await?;
        envelope
            .data
            .map(|c| c.id)
            .ok_or_else(|| GuardError::internal("reply created without an id"))
    }
}
