//! Core Flow Integration Tests
//!
//! Purpose: Verify the complete recap flow from raw playback history to
//! a served recap payload, entirely in process.
//!
//! Test Coverage:
//! 1. Analyzer turns raw history records into a user profile
//! 2. Cross-user comparison ranks users and attaches anonymized blocks
//! 3. Card generation survives real-world model output
//! 4. Storage round-trips recaps and share tokens
//!
//! Run: cargo test --test core_flow_test

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use recap_service::clients::llm::{extract_cards, CardGenerator, LlmProvider};
use recap_service::error::Result;
use recap_service::models::{MediaKind, MediaUser, RecapData};
use recap_service::services::analyzer::EventNormalizer;
use recap_service::services::{compare_users, AnalyzerOptions, HistoryAnalyzer, HistorySource};
use recap_service::storage::RecapStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

// 2025-06-01 12:00:00 UTC
const BASE_TS: i64 = 1_748_779_200;
const DAY: i64 = 86_400;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

/// One raw history record in source shape. The `date` string pins the
/// calendar day regardless of the machine's timezone; the epoch fields
/// drive session stitching.
fn movie(
    title: &str,
    day: &str,
    started: i64,
    play_seconds: i64,
    duration: i64,
    genres: &[&str],
    player: &str,
) -> Value {
    json!({
        "media_type": "movie",
        "title": title,
        "watched_status": 1,
        "duration": duration,
        "play_duration": play_seconds,
        "started": started,
        "stopped": started + play_seconds,
        "date": day,
        "player": player,
        "genres": genres,
    })
}

fn episode(
    show: &str,
    title: &str,
    day: &str,
    started: i64,
    play_seconds: i64,
    genres: &[&str],
    player: &str,
) -> Value {
    json!({
        "media_type": "episode",
        "title": title,
        "grandparent_title": show,
        "watched_status": 1,
        "duration": 3600,
        "play_duration": play_seconds,
        "started": started,
        "stopped": started + play_seconds,
        "date": day,
        "player": player,
        "genres": genres,
    })
}

fn media_user(id: &str, username: &str) -> MediaUser {
    MediaUser {
        id: id.to_string(),
        username: username.to_string(),
        friendly_name: None,
        thumb: None,
    }
}

struct StaticHistory {
    users: Vec<MediaUser>,
    history: HashMap<String, Vec<Value>>,
}

#[async_trait]
impl HistorySource for StaticHistory {
    async fn fetch_users(&self) -> Result<Vec<MediaUser>> {
        Ok(self.users.clone())
    }

    async fn fetch_history(
        &self,
        user_id: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Value>> {
        Ok(self.history.get(user_id).cloned().unwrap_or_default())
    }
}

/// Two users with distinct viewing shapes. Alice mixes movie nights, a
/// rewatch and one three-episode binge evening; Bob watches lightly.
fn deployment() -> StaticHistory {
    let wire_night = BASE_TS + 2 * DAY + 28_800;
    let alice = vec![
        movie(
            "Heat",
            "2025-06-01 20:00:00",
            BASE_TS + 28_800,
            7_200,
            10_200,
            &["Crime", "Thriller"],
            "Living Room TV",
        ),
        episode(
            "The Wire",
            "The Target",
            "2025-06-03 20:00:00",
            wire_night,
            3_300,
            &["Crime", "Drama"],
            "Living Room TV",
        ),
        episode(
            "The Wire",
            "The Detail",
            "2025-06-03 21:00:00",
            wire_night + 3_600,
            3_300,
            &["Crime", "Drama"],
            "Living Room TV",
        ),
        episode(
            "The Wire",
            "The Buys",
            "2025-06-03 22:00:00",
            wire_night + 7_200,
            3_300,
            &["Crime", "Drama"],
            "Living Room TV",
        ),
        movie(
            "Ronin",
            "2025-06-07 21:00:00",
            BASE_TS + 6 * DAY + 32_400,
            5_400,
            7_200,
            &["Action", "Thriller"],
            "Tablet",
        ),
        movie(
            "Ronin",
            "2025-10-29 21:00:00",
            BASE_TS + 150 * DAY + 32_400,
            5_400,
            7_200,
            &["Action", "Thriller"],
            "Tablet",
        ),
    ];

    let severance_night = BASE_TS - 77 * DAY;
    let bob = vec![
        movie(
            "Alien",
            "2025-03-15 22:00:00",
            BASE_TS - 78 * DAY,
            3_600,
            7_000,
            &["Horror", "Sci-Fi"],
            "TV",
        ),
        episode(
            "Severance",
            "Good News About Hell",
            "2025-03-16 19:00:00",
            severance_night,
            2_700,
            &["Drama"],
            "TV",
        ),
        episode(
            "Severance",
            "Half Loop",
            "2025-03-16 20:00:00",
            severance_night + 3_000,
            2_700,
            &["Drama"],
            "TV",
        ),
    ];

    StaticHistory {
        users: vec![media_user("1", "alice"), media_user("2", "bob")],
        history: HashMap::from([("1".to_string(), alice), ("2".to_string(), bob)]),
    }
}

fn analyzer(source: StaticHistory) -> HistoryAnalyzer<StaticHistory> {
    HistoryAnalyzer::new(
        Arc::new(source),
        EventNormalizer::new(None),
        AnalyzerOptions::default(),
    )
}

struct CannedProvider {
    reply: String,
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "canned"
    }
}

fn canned_deck() -> String {
    // The chatty framing and fence mirror what chat models actually return.
    r#"Here is the recap you asked for!

```json
{
  "cards": [
    {
      "id": "welcome",
      "kind": "summary",
      "content": {"title": "Your Year in Review", "text": {"headline": "What a year, alice!"}}
    },
    {
      "id": "watch-time",
      "kind": "stat",
      "content": {"title": "465 minutes watched", "metrics": {"total_minutes": 465}}
    }
  ]
}
```

Enjoy!"#
        .to_string()
}

// ============================================
// 1. Raw history -> profile
// ============================================

#[tokio::test]
async fn test_analyzer_builds_profile_from_raw_history() {
    let analyzer = analyzer(deployment());

    let profile = analyzer
        .analyze_known_user(&media_user("1", "alice"), date(1, 1), date(12, 31))
        .await
        .expect("analysis should succeed");

    assert_eq!(profile.username, "alice");
    assert_eq!(profile.user_id, "1");
    assert_eq!(profile.period_start, date(1, 1));
    assert_eq!(profile.period_end, date(12, 31));

    let stats = &profile.stats;
    assert_eq!(stats.total_watch_time, 465, "120 + 3x55 + 2x90 minutes");
    assert_eq!(stats.total_movies_watched, 3, "movie plays, not titles");
    assert_eq!(stats.total_episodes_watched, 3);
    assert_eq!(stats.total_items_watched, 3, "Heat, The Wire, Ronin");

    // Genres weigh by watched minutes: Thriller 300, Crime 285.
    assert_eq!(stats.genres[0].genre, "Thriller");
    assert_eq!(stats.genres[0].watch_time, 300);
    assert_eq!(stats.genres[1].genre, "Crime");
    assert_eq!(stats.genres.len(), 4);

    // Per-title totals group episodes under the show.
    assert_eq!(stats.top_content[0].title, "Ronin");
    assert_eq!(stats.top_content[0].watch_time, 180);
    assert_eq!(stats.top_content[0].media_kind, MediaKind::Movie);
    assert_eq!(stats.top_content[1].title, "The Wire");
    assert_eq!(stats.top_content[1].watch_time, 165);

    // Only the Wire evening crosses the 120 minute binge threshold;
    // Heat lands exactly on it and a threshold hit is not a binge.
    assert_eq!(stats.binge_sessions.len(), 1);
    let binge = stats.longest_binge.as_ref().expect("one binge day");
    assert_eq!(binge.date, date(6, 3));
    assert_eq!(binge.duration_minutes, 165);
    assert_eq!(binge.content, vec!["The Wire".to_string()]);
    assert_eq!(binge.episode_count, 3);

    // Three back-to-back episodes merge into the longest stretch.
    let session = stats.longest_session.as_ref().expect("longest stretch");
    assert_eq!(session.duration_minutes, 165);
    assert_eq!(session.item_count, 3);

    let day = stats.day_with_most.as_ref().expect("busiest day");
    assert_eq!(day.date, date(6, 3));
    assert_eq!(day.duration_minutes, 165);

    assert_eq!(stats.repeat_watches.len(), 1);
    assert_eq!(stats.repeat_watches[0].title, "Ronin");
    assert_eq!(stats.repeat_watches[0].count, 2);
}

// ============================================
// 2. Cross-user rankings
// ============================================

#[tokio::test]
async fn test_cross_user_comparison_ranks_and_anonymizes() {
    let analyzer = analyzer(deployment());
    let mut profiles = Vec::new();
    for user in analyzer.list_users().await.unwrap() {
        profiles.push(
            analyzer
                .analyze_known_user(&user, date(1, 1), date(12, 31))
                .await
                .unwrap(),
        );
    }

    let insights = compare_users(&mut profiles).expect("two users rank");

    assert_eq!(insights.total_users, 2);
    assert_eq!(insights.most_watched_user.as_deref(), Some("alice"));
    assert_eq!(insights.least_watched_user.as_deref(), Some("bob"));
    assert_eq!(insights.max_watch_time, 465);
    assert_eq!(insights.min_watch_time, 150);
    assert!((insights.avg_watch_time - 307.5).abs() < f64::EPSILON);
    assert_eq!(insights.most_episodes_user.as_deref(), Some("alice"));
    assert_eq!(insights.most_movies_user.as_deref(), Some("alice"));
    assert_eq!(insights.most_binge_sessions_user.as_deref(), Some("alice"));
    assert_eq!(insights.longest_binge_user.as_deref(), Some("alice"));

    // Bob has no binge day, so the longest-binge ranking holds one user.
    assert_eq!(insights.longest_binge_rankings.len(), 1);
    assert_eq!(insights.watch_time_rankings[0].username, "alice");
    assert_eq!(insights.watch_time_rankings[0].value, 465);
    assert_eq!(insights.watch_time_rankings[1].value, 150);

    let alice = &profiles[0];
    let comparison = alice.comparative_stats.as_ref().expect("attached block");
    let watch_time = comparison.watch_time.as_ref().expect("ranked metric");
    assert_eq!(watch_time.rank, 1);
    assert_eq!(watch_time.total_users, 2);
    assert!(watch_time.is_top);
    assert!(watch_time.above_average);
    assert_eq!(watch_time.percentile, 100.0);
    assert_eq!(watch_time.max, 465);
    assert_eq!(watch_time.min, Some(150), "min reported for watch time");
    assert_eq!(comparison.episodes.as_ref().unwrap().rank, 1);

    let bob = &profiles[1];
    let comparison = bob.comparative_stats.as_ref().expect("attached block");
    let watch_time = comparison.watch_time.as_ref().expect("ranked metric");
    assert_eq!(watch_time.rank, 2);
    assert!(watch_time.is_bottom);
    assert!(!watch_time.above_average);
    assert_eq!(watch_time.percentile, 50.0);
    // Sat-out metrics carry no comparison at all.
    assert!(comparison.binge_sessions.is_none());
    assert!(comparison.longest_binge.is_none());
}

// ============================================
// 3. Card generation
// ============================================

#[tokio::test]
async fn test_card_generation_survives_model_output() {
    let analyzer = analyzer(deployment());
    let user = media_user("1", "alice");
    let profile = analyzer
        .analyze_known_user(&user, date(1, 1), date(12, 31))
        .await
        .unwrap();

    let generator = CardGenerator::with_provider(
        Arc::new(CannedProvider {
            reply: canned_deck(),
        }),
        None,
    );
    let cards = generator.generate_cards(&user, &profile).await;

    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].id, "welcome");
    assert_eq!(cards[0].kind, "summary");
    assert_eq!(cards[0].content.title, "Your Year in Review");
    assert_eq!(cards[1].id, "watch-time");
    assert_eq!(
        cards[1].content.metrics.as_ref().unwrap()["total_minutes"],
        465
    );

    // Unusable output degrades to an empty deck, never an error.
    assert!(extract_cards("the model rambled and returned no JSON").is_empty());
}

// ============================================
// 4. Golden path: history -> stored, shareable recap
// ============================================

#[tokio::test]
async fn test_complete_history_to_served_recap_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecapStore::new(dir.path()).unwrap();
    let analyzer = analyzer(deployment());

    // Step 1: analyze every user on the server
    let users = analyzer.list_users().await.unwrap();
    let mut profiles = Vec::new();
    for user in &users {
        profiles.push(
            analyzer
                .analyze_known_user(user, date(1, 1), date(12, 31))
                .await
                .unwrap(),
        );
    }

    // Step 2: rank the deployment
    let insights = compare_users(&mut profiles).expect("insights built");
    store.save_insights(&insights).unwrap();

    // Step 3: narrate and persist each recap
    let generator = CardGenerator::with_provider(
        Arc::new(CannedProvider {
            reply: canned_deck(),
        }),
        None,
    );
    for (user, profile) in users.iter().zip(&profiles) {
        let cards = generator.generate_cards(user, profile).await;
        let recap = RecapData {
            user: user.clone(),
            period_start: date(1, 1),
            period_end: date(12, 31),
            generated_at: Utc::now(),
            analysis: profile.clone(),
            cards,
        };
        store.save(&user.username, &recap).unwrap();
    }

    // Step 4: the read surface sees both recaps
    assert_eq!(store.list().unwrap(), vec!["alice", "bob"]);
    let served = store
        .load("alice")
        .unwrap()
        .expect("alice recap should be stored");
    assert_eq!(served.user.username, "alice");
    assert_eq!(served.cards.len(), 2);
    assert!(
        served.analysis.comparative_stats.is_some(),
        "stored recap carries the comparison block"
    );

    // Step 5: the share token resolves to the same payload
    let token = store.token_for("alice").unwrap();
    assert_eq!(store.token_for("alice").unwrap(), token, "tokens are stable");
    let shared = store
        .load_by_token(&token)
        .unwrap()
        .expect("token should resolve");
    assert_eq!(shared, served);

    // Step 6: deployment insights stay server-side but reload intact
    let reloaded = store.load_insights().unwrap().expect("insights stored");
    assert_eq!(reloaded.total_users, 2);
    assert_eq!(reloaded.most_watched_user.as_deref(), Some("alice"));
}
