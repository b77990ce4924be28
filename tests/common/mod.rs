//! In-memory fakes of the platform, the trusted list and the edge lookups.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rugguard::account::{AccountSnapshot, Engagement, Post};
use rugguard::analysis::{AccountSource, Analyzer};
use rugguard::config::GuardConfig;
use rugguard::errors::{GuardError, GuardResult, Unavailability};
use rugguard::trigger::{Mention, MentionChannel, PostRef};
use rugguard::trust_registry::{TrustListSource, TrustRegistry};
use rugguard::vouch::FollowerEdgeLookup;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub enum Account {
    Present(AccountSnapshot),
    Missing(Unavailability),
    RateLimited,
}

#[derive(Default)]
pub struct FakeAccounts {
    accounts: HashMap<String, Account>,
}

impl FakeAccounts {
    pub fn with(mut self, snapshot: AccountSnapshot) -> Self {
        self.accounts
            .insert(snapshot.handle.clone(), Account::Present(snapshot));
        self
    }

    pub fn missing(mut self, handle: &str, reason: Unavailability) -> Self {
        self.accounts.insert(handle.to_string(), Account::Missing(reason));
        self
    }

    pub fn rate_limited(mut self, handle: &str) -> Self {
        self.accounts.insert(handle.to_string(), Account::RateLimited);
        self
    }
}

#[async_trait]
impl AccountSource for FakeAccounts {
    async fn fetch_snapshot(&self, handle: &str) -> GuardResult<AccountSnapshot> {
        match self.accounts.get(handle) {
            Some(Account::Present(snapshot)) => Ok(snapshot.clone()),
            Some(Account::Missing(reason)) => Err(GuardError::data_unavailable(handle, *reason)),
            Some(Account::RateLimited) => Err(GuardError::rate_limited(Some(60))),
            None => Err(GuardError::data_unavailable(handle, Unavailability::NotFound)),
        }
    }
}

#[derive(Default)]
pub struct FakeEdges {
    edges: HashSet<(String, String)>,
}

impl FakeEdges {
    pub fn followed_by(mut self, target: &str, followers: &[&str]) -> Self {
        for f in followers {
            self.edges.insert((f.to_string(), target.to_string()));
        }
        self
    }
}

#[async_trait]
impl FollowerEdgeLookup for FakeEdges {
    async fn follows(&self, follower: &str, target: &str) -> GuardResult<bool> {
        Ok(self.edges.contains(&(follower.to_string(), target.to_string())))
    }
}

/// Serves a fixed body, or fails every fetch when `None`.
pub struct StaticList(pub Option<String>);

#[async_trait]
impl TrustListSource for StaticList {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn fetch(&self) -> GuardResult<String> {
        self.0
            .clone()
            .ok_or_else(|| GuardError::trust_list("connection refused"))
    }
}

#[derive(Default)]
pub struct FakeChannel {
    pub mentions: Vec<Mention>,
    pub posts: HashMap<String, PostRef>,
    pub replies: Mutex<Vec<(String, String)>>,
    /// Mentions whose reply the platform refuses
    pub rejected: HashSet<String>,
}

impl FakeChannel {
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl MentionChannel for FakeChannel {
    async fn search_mentions(
        &self,
        _query: &str,
        _since_id: Option<&str>,
        _max_results: u32,
    ) -> GuardResult<Vec<Mention>> {
        Ok(self.mentions.clone())
    }

    async fn get_post(&self, id: &str) -> GuardResult<PostRef> {
        self.posts
            .get(id)
            .cloned()
            .ok_or_else(|| GuardError::internal(format!("post {id} is gone")))
    }

    async fn post_reply(&self, in_reply_to: &str, text: &str) -> GuardResult<String> {
        if self.rejected.contains(in_reply_to) {
            return Err(GuardError::internal("post_reply: HTTP 403 Forbidden"));
        }
        let mut replies = self.replies.lock().unwrap();
        replies.push((in_reply_to.to_string(), text.to_string()));
        Ok(format!("reply-{}", replies.len()))
    }
}

pub fn snapshot(
    handle: &str,
    now: DateTime<Utc>,
    age_days: i64,
    followers: u64,
    following: u64,
    bio: &str,
) -> AccountSnapshot {
    AccountSnapshot {
        handle: handle.to_string(),
        platform_id: Some(format!("id-{handle}")),
        display_name: handle.to_string(),
        created_at: now - Duration::days(age_days),
        followers_count: followers,
        following_count: following,
        post_count: 0,
        bio: bio.to_string(),
        protected: false,
        recent_posts: vec![],
    }
}

pub fn posts(
    now: DateTime<Utc>,
    count: usize,
    hours_apart: i64,
    text: &str,
    likes: u64,
) -> Vec<Post> {
    (0..count)
        .map(|i| Post {
            id: format!("p{i}"),
            created_at: now - Duration::hours(hours_apart * i as i64),
            text: format!("{text} ({i})"),
            engagement: Engagement {
                likes,
                ..Engagement::default()
            },
        })
        .collect()
}

pub async fn analyzer(
    config: &GuardConfig,
    list: Option<&str>,
    accounts: FakeAccounts,
    edges: FakeEdges,
) -> Analyzer {
    let source = Arc::new(StaticList(list.map(str::to_string)));
    let registry = Arc::new(TrustRegistry::init(source).await);
    Analyzer::new(config, registry, Arc::new(accounts), Arc::new(edges)).unwrap()
}
