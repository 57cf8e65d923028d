// ============================================
// Watch History Analyzer
// ============================================
//
// Turns raw playback history into a per-user statistical profile:
// event normalization (normalize), minutes-weighted rankings
// (aggregate), temporal patterns (temporal), binge and continuous
// session detection (sessions), consistency scoring (consistency) and
// movie re-watch detection (rewatch).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{RecapError, Result};
use crate::models::{MediaUser, UserAnalysisResult, UserStats, WatchEvent};

pub mod aggregate;
pub mod consistency;
pub mod normalize;
pub mod rewatch;
pub mod sessions;
pub mod temporal;

pub use aggregate::WatchAggregator;
pub use normalize::EventNormalizer;
pub use temporal::TemporalCollector;

/// Rounds to two decimal places, the precision every emitted minute
/// total and percentage uses.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Where user lists and raw playback history come from.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<MediaUser>>;

    async fn fetch_history(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Value>>;
}

/// No-op source for wiring and tests.
pub struct StubHistorySource;

#[async_trait]
impl HistorySource for StubHistorySource {
    async fn fetch_users(&self) -> Result<Vec<MediaUser>> {
        Ok(Vec::new())
    }

    async fn fetch_history(
        &self,
        _user_id: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Thresholds and limits for profile analysis.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub binge_threshold_minutes: f64,
    pub session_gap_seconds: i64,
    pub top_items: usize,
    pub southern_hemisphere: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            binge_threshold_minutes: 120.0,
            session_gap_seconds: 1800,
            top_items: 10,
            southern_hemisphere: false,
        }
    }
}

/// Orchestrates one user's profile: fetch, normalize, analyze.
pub struct HistoryAnalyzer<S> {
    source: Arc<S>,
    normalizer: EventNormalizer,
    options: AnalyzerOptions,
}

impl<S: HistorySource> HistoryAnalyzer<S> {
    pub fn new(source: Arc<S>, normalizer: EventNormalizer, options: AnalyzerOptions) -> Self {
        Self {
            source,
            normalizer,
            options,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<MediaUser>> {
        self.source.fetch_users().await
    }

    /// Resolves `name` against usernames and friendly names
    /// (case-insensitive), then analyzes that user's period history.
    pub async fn analyze_user(
        &self,
        name: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<UserAnalysisResult> {
        let users = self.source.fetch_users().await?;
        let user = find_user(&users, name)
            .ok_or_else(|| RecapError::NotFound(format!("user {name} not found")))?
            .clone();
        self.analyze_known_user(&user, period_start, period_end).await
    }

    pub async fn analyze_known_user(
        &self,
        user: &MediaUser,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<UserAnalysisResult> {
        let raw = self
            .source
            .fetch_history(&user.id, period_start, period_end)
            .await?;
        debug!(
            username = %user.username,
            raw_items = raw.len(),
            "fetched watch history"
        );

        let events = self.normalizer.normalize_batch(&raw).await;
        let stats = self.build_stats(&events, period_start, period_end);
        info!(
            username = %user.username,
            events = events.len(),
            excluded = raw.len().saturating_sub(events.len()),
            watch_minutes = stats.total_watch_time,
            "analyzed watch history"
        );

        Ok(UserAnalysisResult {
            username: user.username.clone(),
            user_id: user.id.clone(),
            friendly_name: user.friendly_name.clone(),
            thumb: user.thumb.clone(),
            period_start,
            period_end,
            stats,
            request_stats: None,
            comparative_stats: None,
        })
    }

    /// Assembles the full statistical profile from normalized events.
    pub fn build_stats(
        &self,
        events: &[WatchEvent],
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> UserStats {
        let mut aggregator = WatchAggregator::new();
        let mut temporal = TemporalCollector::new();
        for event in events {
            aggregator.observe(event);
            temporal.observe(event);
        }

        let binge_sessions =
            sessions::detect_binge_sessions(events, self.options.binge_threshold_minutes);
        let longest_binge = binge_sessions.first().cloned();
        let longest_session =
            sessions::longest_continuous_session(events, self.options.session_gap_seconds);
        let repeat_watches = rewatch::detect_repeat_watches(events);
        let consistency =
            consistency::analyze_consistency(temporal.daily_totals(), period_start, period_end);

        let top = self.options.top_items;
        UserStats {
            total_watch_time: aggregator.total_watch_time.round() as u64,
            total_items_watched: aggregator.unique_title_count(),
            total_episodes_watched: aggregator.episodes_watched,
            total_movies_watched: aggregator.movies_watched,
            genres: aggregator.genre_stats(top),
            actors: aggregator.actor_stats(top),
            directors: aggregator.director_stats(top),
            devices: aggregator.device_stats(top),
            platforms: aggregator.platform_stats(top),
            top_content: aggregator.top_content(top),
            longest_binge,
            binge_sessions,
            longest_session,
            day_with_most: temporal.day_with_most(),
            repeat_watches,
            seasonal_patterns: temporal.seasonal_patterns(self.options.southern_hemisphere),
            time_of_day: temporal.time_of_day(),
            day_of_week: temporal.day_of_week(),
            consistency,
        }
    }
}

fn find_user<'a>(users: &'a [MediaUser], name: &str) -> Option<&'a MediaUser> {
    let needle = name.to_lowercase();
    users.iter().find(|user| {
        user.username.to_lowercase() == needle
            || user
                .friendly_name
                .as_ref()
                .map_or(false, |friendly| friendly.to_lowercase() == needle)
    })
}
