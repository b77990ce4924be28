mod common;

use chrono::Utc;
use common::{analyzer, posts, snapshot, FakeAccounts, FakeChannel, FakeEdges};
use rugguard::analysis::AnalysisOutcome;
use rugguard::config::GuardConfig;
use rugguard::errors::{GuardError, Unavailability};
use rugguard::report::AnalysisFailure;
use rugguard::scoring::{ReasonSource, TrustLevel};
use rugguard::trigger::{Mention, PostRef, Watcher};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const TRUSTED: &str = "alice\nbob\ncarol\ndave\nerin\nfrank\n";

fn reason_texts(outcome: &AnalysisOutcome) -> Vec<String> {
    outcome
        .assessment()
        .unwrap()
        .reasons
        .iter()
        .map(|r| r.text.to_lowercase())
        .collect()
}

#[tokio::test]
async fn new_account_with_scam_bio_is_high_risk() {
    let now = Utc::now();
    let accounts = FakeAccounts::default().with(snapshot(
        "moonboy",
        now,
        10,
        10,
        100,
        "guaranteed 100x returns",
    ));
    let config = GuardConfig::default();
    let analyzer = analyzer(&config, Some(TRUSTED), accounts, FakeEdges::default()).await;

    let outcome = analyzer.analyze_at("@MoonBoy", now).await.unwrap();
    let assessment = outcome.assessment().unwrap();
    assert!(matches!(assessment.level, TrustLevel::Critical | TrustLevel::Low));
    assert!(!assessment.vouch.is_vouched);

    let reasons = reason_texts(&outcome);
    assert!(reasons.iter().any(|r| r.contains("new account")));
    assert!(reasons.iter().any(|r| r.contains("suspicious bio")));

    let report = outcome.report();
    assert!(report.chars().count() <= 280);
    assert!(report.contains("@moonboy"));
    assert!(report.contains("Not vouched"));
}

#[tokio::test]
async fn established_vouched_account_is_high_trust() {
    let now = Utc::now();
    let mut account = snapshot(
        "builder",
        now,
        730,
        1_200,
        100,
        "Software engineer and founder. PhD researcher.",
    );
    account.post_count = 2_000;
    account.recent_posts = posts(
        now,
        6,
        30,
        "Wrote up how we cut incremental build times in half \
         by splitting the type checker into smaller crates",
        12,
    );
    let accounts = FakeAccounts::default().with(account);
    let edges =
        FakeEdges::default().followed_by("builder", &["alice", "bob", "carol", "dave", "erin"]);
    let analyzer = analyzer(&GuardConfig::default(), Some(TRUSTED), accounts, edges).await;

    let outcome = analyzer.analyze_at("builder", now).await.unwrap();
    let assessment = outcome.assessment().unwrap();
    assert_eq!(assessment.level, TrustLevel::High);
    assert!(assessment.vouch.is_vouched);
    assert_eq!(assessment.vouch.count, 5);
    assert_eq!(assessment.vouch.vouched_by, vec!["alice", "bob", "carol", "dave", "erin"]);
    assert!(assessment
        .reasons
        .iter()
        .any(|r| r.source == ReasonSource::Vouching && r.text.contains("Vouched by 5")));
    assert!(outcome.report().contains("✅ Vouched by @alice, @bob, @carol +2 more"));
}

#[tokio::test]
async fn unreachable_trust_list_still_completes() {
    let now = Utc::now();
    let accounts =
        FakeAccounts::default().with(snapshot("someone", now, 400, 300, 250, "just vibes"));
    let edges = FakeEdges::default().followed_by("someone", &["alice", "bob"]);
    let analyzer = analyzer(&GuardConfig::default(), None, accounts, edges).await;

    assert!(analyzer.registry().get().is_empty());
    assert!(analyzer.registry().last_error().is_some());

    let outcome = analyzer.analyze_at("someone", now).await.unwrap();
    let assessment = outcome.assessment().unwrap();
    assert!(!assessment.vouch.is_vouched);
    assert_eq!(assessment.vouch.count, 0);
    assert!(outcome.report().contains("❌ Not vouched by trusted network"));
}

#[tokio::test]
async fn corroboration_threshold_comes_from_config() {
    let now = Utc::now();
    let accounts = FakeAccounts::default().with(snapshot("midway", now, 200, 150, 150, ""));
    let edges = FakeEdges::default().followed_by("midway", &["alice", "bob"]);

    let mut config = GuardConfig::default();
    config.vouch.min_corroboration = 3;
    let strict = analyzer(&config, Some(TRUSTED), accounts, edges).await;
    let outcome = strict.analyze_at("midway", now).await.unwrap();
    let vouch = &outcome.assessment().unwrap().vouch;
    assert!(!vouch.is_vouched);
    assert_eq!(vouch.required, 3);
    assert!(outcome.report().contains("🤝 2/3 trusted follows"));
}

#[tokio::test]
async fn unavailable_accounts_yield_error_reports() {
    let accounts = FakeAccounts::default()
        .missing("hidden", Unavailability::Private)
        .missing("banned", Unavailability::Suspended);
    let config = GuardConfig::default();
    let analyzer = analyzer(&config, Some(TRUSTED), accounts, FakeEdges::default()).await;

    match analyzer.analyze("ghost").await.unwrap() {
        AnalysisOutcome::Unavailable { reason, report, .. } => {
            assert_eq!(reason, AnalysisFailure::NotFound);
            assert!(report.contains("Account not found"));
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
    match analyzer.analyze("hidden").await.unwrap() {
        AnalysisOutcome::Unavailable { reason, .. } => assert_eq!(reason, AnalysisFailure::Private),
        other => panic!("expected unavailable, got {other:?}"),
    }
    match analyzer.analyze("banned").await.unwrap() {
        AnalysisOutcome::Unavailable { reason, .. } => {
            assert_eq!(reason, AnalysisFailure::Suspended)
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn protected_snapshot_is_not_scored() {
    let now = Utc::now();
    let mut account = snapshot("locked", now, 900, 50, 50, "");
    account.protected = true;
    let analyzer = analyzer(
        &GuardConfig::default(),
        Some(TRUSTED),
        FakeAccounts::default().with(account),
        FakeEdges::default(),
    )
    .await;
    let outcome = analyzer.analyze("locked").await.unwrap();
    assert!(outcome.assessment().is_none());
    assert!(matches!(
        outcome,
        AnalysisOutcome::Unavailable {
            reason: AnalysisFailure::Private,
            ..
        }
    ));
}

#[tokio::test]
async fn rate_limits_and_bad_handles_surface_as_errors() {
    let accounts = FakeAccounts::default().rate_limited("busy");
    let config = GuardConfig::default();
    let analyzer = analyzer(&config, Some(TRUSTED), accounts, FakeEdges::default()).await;

    let err = analyzer.analyze("busy").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, GuardError::RateLimited { retry_after_secs: Some(60) }));

    let err = analyzer.analyze("not a handle").await.unwrap_err();
    assert!(matches!(err, GuardError::Validation { .. }));
}

#[tokio::test]
async fn admin_edits_apply_to_later_analyses() {
    let now = Utc::now();
    let accounts = FakeAccounts::default().with(snapshot("steady", now, 500, 400, 200, ""));
    let edges = FakeEdges::default().followed_by("steady", &["alice", "bob"]);
    let analyzer = analyzer(&GuardConfig::default(), Some(TRUSTED), accounts, edges).await;

    let before = analyzer.registry().get();
    let removed = analyzer.registry().remove_member("bob").await.unwrap();
    assert!(removed);
    assert_eq!(before.len(), 6);
    assert_eq!(analyzer.registry().get().len(), 5);

    let outcome = analyzer.analyze_at("steady", now).await.unwrap();
    let vouch = &outcome.assessment().unwrap().vouch;
    assert_eq!(vouch.vouched_by, vec!["alice"]);
    assert!(!vouch.is_vouched);
}

#[tokio::test]
async fn mutual_connections_follow_trusted_order() {
    let edges = FakeEdges::default()
        .followed_by("left", &["erin", "alice", "carol"])
        .followed_by("right", &["carol", "bob", "erin"]);
    let analyzer = analyzer(
        &GuardConfig::default(),
        Some(TRUSTED),
        FakeAccounts::default(),
        edges,
    )
    .await;

    let mutual = analyzer.mutual_connections("@Left", "right").await.unwrap();
    assert_eq!(mutual.first, "left");
    assert_eq!(mutual.connections, vec!["carol", "erin"]);
    assert_eq!(mutual.trusted_version, 1);

    let none = analyzer.mutual_connections("left", "nobody").await.unwrap();
    assert!(none.connections.is_empty());

    let err = analyzer.mutual_connections("left", "not a handle").await.unwrap_err();
    assert!(matches!(err, GuardError::Validation { .. }));
}

#[tokio::test]
async fn watcher_answers_trigger_replies_once() {
    let now = Utc::now();
    let accounts =
        FakeAccounts::default().with(snapshot("scammer", now, 5, 3, 400, "easy money, dyor"));
    let config = GuardConfig::default();
    let analyzer = analyzer(&config, Some(TRUSTED), accounts, FakeEdges::default()).await;

    let mention = |id: &str, text: &str, parent: Option<&str>| Mention {
        id: id.to_string(),
        text: text.to_string(),
        author_id: Some("42".to_string()),
        in_reply_to: parent.map(str::to_string),
    };
    let channel = Arc::new(FakeChannel {
        mentions: vec![
            mention("1003", "@projectrugguard thoughts?", Some("500")),
            mention("1001", "@projectrugguard riddle me this", Some("500")),
            mention("1002", "@ProjectRugGuard Riddle me this", None),
        ],
        posts: HashMap::from([(
            "500".to_string(),
            PostRef {
                id: "500".to_string(),
                author_handle: "scammer".to_string(),
            },
        )]),
        ..FakeChannel::default()
    });

    let mut watcher = Watcher::new(analyzer, channel.clone(), GuardConfig::default().watcher);
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 3);
    assert_eq!(summary.answered, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(watcher.last_seen(), Some("1003"));

    let replies = channel.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "1001");
    assert!(replies[0].1.starts_with("🔍 RUGGUARD ANALYSIS: @scammer"));

    // the same mentions again are ignored
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 0);
    assert_eq!(channel.replies().len(), 1);
}

#[tokio::test]
async fn watcher_reports_missing_threads() {
    let analyzer = analyzer(
        &GuardConfig::default(),
        Some(TRUSTED),
        FakeAccounts::default(),
        FakeEdges::default(),
    )
    .await;
    let channel = Arc::new(FakeChannel {
        mentions: vec![Mention {
            id: "77".to_string(),
            text: "@projectrugguard riddle me this".to_string(),
            author_id: None,
            in_reply_to: Some("deleted".to_string()),
        }],
        ..FakeChannel::default()
    });

    let mut watcher = Watcher::new(analyzer, channel.clone(), GuardConfig::default().watcher);
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.answered, 1);
    assert!(channel.replies()[0].1.contains("Could not access the post thread"));
}

fn trigger(id: &str, parent: &str) -> Mention {
    Mention {
        id: id.to_string(),
        text: "@projectrugguard riddle me this".to_string(),
        author_id: None,
        in_reply_to: Some(parent.to_string()),
    }
}

fn scammer_post() -> HashMap<String, PostRef> {
    HashMap::from([(
        "500".to_string(),
        PostRef {
            id: "500".to_string(),
            author_handle: "scammer".to_string(),
        },
    )])
}

#[tokio::test]
async fn rejected_reply_does_not_block_newer_mentions() {
    let now = Utc::now();
    let accounts = FakeAccounts::default().with(snapshot("scammer", now, 5, 3, 400, "dyor"));
    let analyzer = analyzer(
        &GuardConfig::default(),
        Some(TRUSTED),
        accounts,
        FakeEdges::default(),
    )
    .await;
    let channel = Arc::new(FakeChannel {
        mentions: vec![trigger("100", "500"), trigger("101", "500")],
        posts: scammer_post(),
        rejected: HashSet::from(["100".to_string()]),
        ..FakeChannel::default()
    });

    let mut watcher = Watcher::new(analyzer, channel.clone(), GuardConfig::default().watcher);
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 2);
    assert_eq!(summary.answered, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(watcher.last_seen(), Some("101"));

    let replies = channel.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "101");

    // the rejected mention is not retried
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 0);
}

#[tokio::test]
async fn restart_skips_already_visible_mentions() {
    let analyzer = analyzer(
        &GuardConfig::default(),
        Some(TRUSTED),
        FakeAccounts::default(),
        FakeEdges::default(),
    )
    .await;
    let channel = Arc::new(FakeChannel {
        mentions: vec![trigger("99", "500"), trigger("1000", "500"), trigger("998", "500")],
        posts: scammer_post(),
        ..FakeChannel::default()
    });

    let config = GuardConfig::default().watcher;
    let mut watcher = Watcher::new(analyzer.clone(), channel.clone(), config);
    assert_eq!(watcher.skip_backlog().await.unwrap(), Some("1000"));
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 0);
    assert!(channel.replies().is_empty());

    // an explicit resume point only skips what came before it
    let mut watcher = Watcher::new(analyzer, channel.clone(), GuardConfig::default().watcher)
        .resume_after("998");
    let summary = watcher.poll_once().await.unwrap();
    assert_eq!(summary.seen, 1);
    assert_eq!(channel.replies()[0].0, "1000");
}
