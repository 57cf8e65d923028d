// ============================================
// Recap Models
// ============================================
//
// Shared data types for the analytics engine, the pregenerate pipeline
// and the HTTP read surface:
// 1. WatchEvent - one normalized playback event (derived, never persisted)
// 2. Per-user report types (stats, sessions, temporal patterns, consistency)
// 3. Cross-user rankings and anonymized comparative stats
// 4. Stored recap envelope (profile + narrative cards)
//
// Report types avoid map containers on purpose: every collection is a
// vector with a defined order, so the same history always serializes
// to byte-identical JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Media Classification
// ============================================

/// Kind of media a playback event refers to. Audio tracks are dropped
/// during normalization and never reach this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
        }
    }
}

/// Time-of-day bucket. Night wraps midnight: hour >= 22 or hour < 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl DayPeriod {
    pub const ALL: [DayPeriod; 4] = [
        DayPeriod::Morning,
        DayPeriod::Afternoon,
        DayPeriod::Evening,
        DayPeriod::Night,
    ];

    /// Classify an hour of day (0-23) into its period.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            18..=21 => DayPeriod::Evening,
            _ => DayPeriod::Night,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DayPeriod::Morning => "morning",
            DayPeriod::Afternoon => "afternoon",
            DayPeriod::Evening => "evening",
            DayPeriod::Night => "night",
        }
    }
}

/// Meteorological season. Month mapping is northern-hemisphere unless
/// the deployment flips it via config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub const ALL: [Season; 4] = [
        Season::Winter,
        Season::Spring,
        Season::Summer,
        Season::Fall,
    ];

    /// Classify a calendar month (1-12) into its season.
    pub fn from_month(month: u32, southern_hemisphere: bool) -> Self {
        let northern = match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        };
        if southern_hemisphere {
            northern.opposite()
        } else {
            northern
        }
    }

    fn opposite(self) -> Self {
        match self {
            Season::Winter => Season::Summer,
            Season::Spring => Season::Fall,
            Season::Summer => Season::Winter,
            Season::Fall => Season::Spring,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

// ============================================
// Normalized Event
// ============================================

/// One playback event after alias resolution and classification.
///
/// Invariants the normalizer guarantees:
/// - `watched_minutes > 0` (zero-minute events never leave the normalizer)
/// - `actors` holds at most 5 entries
/// - temporal fields are all `Some` or all `None` except `hour`/`month_key`,
///   which additionally require a start timestamp / parseable date
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub title: String,
    /// Show title for episodes, otherwise the title itself.
    pub show_title: String,
    pub media_kind: MediaKind,
    pub watched_minutes: f64,
    /// Nominal runtime in minutes, 0 when the source did not report one.
    pub duration_minutes: f64,
    pub genres: Vec<String>,
    pub actors: Vec<String>,
    pub directors: Vec<String>,
    pub device: Option<String>,
    pub platform: Option<String>,
    pub year: Option<i64>,
    pub thumb: Option<String>,
    /// Playback start / stop as Unix seconds, when the source reported them.
    pub start_ts: Option<i64>,
    pub stop_ts: Option<i64>,
    /// Best-effort event timestamp: history date field, else start.
    pub event_ts: Option<i64>,
    /// Local calendar date derived from `event_ts`.
    pub date: Option<NaiveDate>,
    /// `YYYY-MM` derived from `date`.
    pub month_key: Option<String>,
    /// Local hour of day derived from `start_ts` only.
    pub hour: Option<u32>,
    /// 0 = Monday .. 6 = Sunday, derived from `date`.
    pub weekday: Option<u32>,
}

// ============================================
// Per-User Report Types
// ============================================

/// Watch time share for a genre, weighted by watched minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreStat {
    pub genre: String,
    /// Minutes, rounded to the nearest integer for display.
    pub watch_time: u64,
    /// Number of included events carrying this genre.
    pub count: u64,
    pub percentage: f64,
}

/// Watch time attributed to an actor or director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonStat {
    pub name: String,
    pub watch_time: u64,
    pub count: u64,
}

/// Watch time share for a playback device or platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStat {
    pub device: String,
    pub watch_time: u64,
    pub percentage: f64,
}

/// One of the user's most-watched titles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopContent {
    pub title: String,
    pub watch_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    pub media_kind: MediaKind,
}

/// A calendar day whose accumulated watched minutes exceeded the binge
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BingeSession {
    pub date: NaiveDate,
    pub duration_minutes: u64,
    /// Distinct show/movie titles watched that day, first-seen order.
    pub content: Vec<String>,
    pub episode_count: u64,
}

/// A run of events merged across gaps of at most the session gap,
/// regardless of calendar-day boundaries. Duration is the sum of
/// constituent watched minutes, not the wall-clock span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousSession {
    pub start_ts: i64,
    pub end_ts: i64,
    pub duration_minutes: u64,
    pub item_count: u64,
}

/// The single day with the most watched minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub duration_minutes: u64,
    pub item_count: u64,
}

/// A movie watched more than once inside the period. Episodes never
/// appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatWatch {
    pub title: String,
    pub count: u64,
    /// Event timestamps (Unix seconds) of each watch, input order.
    pub timestamps: Vec<i64>,
}

/// Accumulated minutes for one label inside a seasonal genre breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMinutes {
    pub name: String,
    pub minutes: f64,
}

/// Viewing totals for one season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonBucket {
    pub season: Season,
    pub total_minutes: f64,
    pub item_count: u64,
    /// Genre minutes within the season, descending.
    pub genres: Vec<LabelMinutes>,
}

/// Seasonal viewing patterns. Only seasons with data appear, in
/// Winter/Spring/Summer/Fall order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPatterns {
    pub by_season: Vec<SeasonBucket>,
    pub most_active: Option<Season>,
    pub most_active_minutes: u64,
}

/// Totals for one time-of-day period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub total_minutes: f64,
    pub item_count: u64,
    pub percentage: f64,
}

/// Totals for one hour of day. Only hours with data are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u32,
    pub total_minutes: f64,
    pub item_count: u64,
}

/// Time-of-day viewing breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayStats {
    pub morning: PeriodStats,
    pub afternoon: PeriodStats,
    pub evening: PeriodStats,
    pub night: PeriodStats,
    pub most_active_period: Option<DayPeriod>,
    pub most_active_period_minutes: u64,
    pub peak_hour: Option<u32>,
    pub peak_hour_minutes: u64,
    /// Ascending by hour.
    pub by_hour: Vec<HourBucket>,
}

/// Totals for one weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayStats {
    /// Weekday name, "Monday" through "Sunday".
    pub weekday: String,
    pub total_minutes: f64,
    pub item_count: u64,
    pub percentage: f64,
}

/// Day-of-week viewing breakdown, Monday first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayOfWeekStats {
    pub by_weekday: Vec<WeekdayStats>,
    pub most_active_day: Option<String>,
    pub most_active_day_minutes: u64,
}

/// Label for the blended consistency score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularityLabel {
    VeryConsistent,
    Consistent,
    Moderate,
    Sporadic,
    Irregular,
    #[default]
    NoData,
}

impl RegularityLabel {
    /// Classify a consistency score (0-100) into its label. Callers are
    /// expected to use `NoData` directly for empty histories.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RegularityLabel::VeryConsistent
        } else if score >= 60.0 {
            RegularityLabel::Consistent
        } else if score >= 40.0 {
            RegularityLabel::Moderate
        } else if score >= 20.0 {
            RegularityLabel::Sporadic
        } else {
            RegularityLabel::Irregular
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RegularityLabel::VeryConsistent => "very_consistent",
            RegularityLabel::Consistent => "consistent",
            RegularityLabel::Moderate => "moderate",
            RegularityLabel::Sporadic => "sporadic",
            RegularityLabel::Irregular => "irregular",
            RegularityLabel::NoData => "no_data",
        }
    }
}

/// Viewing-consistency report: how often and how evenly the user watched
/// across the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyProfile {
    /// 0-100 blend: 60% watch frequency, 40% regularity.
    pub score: f64,
    pub regularity_label: RegularityLabel,
    pub avg_daily_minutes: f64,
    /// Share of period days with at least one watch, 0-100.
    pub watch_frequency: f64,
    pub days_with_watching: u32,
    pub days_without_watching: u32,
    pub longest_streak_days: u32,
    pub longest_gap_days: u32,
    /// Sample standard deviation of daily minutes, 0 below 2 data points.
    pub stdev: f64,
}

/// Complete per-user statistics over the analysis period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Total watched minutes, rounded for display.
    pub total_watch_time: u64,
    /// Distinct shows + movies watched.
    pub total_items_watched: u64,
    pub total_episodes_watched: u64,
    pub total_movies_watched: u64,
    pub genres: Vec<GenreStat>,
    pub actors: Vec<PersonStat>,
    pub directors: Vec<PersonStat>,
    pub devices: Vec<DeviceStat>,
    pub platforms: Vec<DeviceStat>,
    pub top_content: Vec<TopContent>,
    pub longest_binge: Option<BingeSession>,
    /// Descending by duration.
    pub binge_sessions: Vec<BingeSession>,
    pub longest_session: Option<ContinuousSession>,
    pub day_with_most: Option<DayRecord>,
    /// Descending by count.
    pub repeat_watches: Vec<RepeatWatch>,
    pub seasonal_patterns: Option<SeasonalPatterns>,
    pub time_of_day: TimeOfDayStats,
    pub day_of_week: DayOfWeekStats,
    pub consistency: ConsistencyProfile,
}

/// Media request counts pulled from the optional request-tracker source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub approved_requests: u64,
    pub pending_requests: u64,
    pub available_requests: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_requested_genre: Option<String>,
}

/// The full analysis artifact for one user. Immutable once produced;
/// regenerated on every pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalysisResult {
    pub username: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stats: UserStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_stats: Option<RequestStats>,
    /// Filled in by the pipeline after cross-user ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparative_stats: Option<ComparativeStats>,
}

// ============================================
// Cross-User Types
// ============================================

/// One entry in a metric ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedUser {
    pub username: String,
    pub value: u64,
}

/// Deployment-wide rankings and leaders. Usernames appear here; this
/// object stays server-side and is never merged into user recaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossUserInsights {
    pub total_users: u32,
    pub watch_time_rankings: Vec<RankedUser>,
    pub episode_rankings: Vec<RankedUser>,
    pub movie_rankings: Vec<RankedUser>,
    pub binge_rankings: Vec<RankedUser>,
    /// Only users that have a binge at all are ranked here.
    pub longest_binge_rankings: Vec<RankedUser>,
    pub genre_diversity_rankings: Vec<RankedUser>,
    pub device_diversity_rankings: Vec<RankedUser>,
    pub most_watched_user: Option<String>,
    pub least_watched_user: Option<String>,
    pub avg_watch_time: f64,
    pub max_watch_time: u64,
    pub min_watch_time: u64,
    pub most_episodes_user: Option<String>,
    pub most_movies_user: Option<String>,
    /// None when the top binge count is 0.
    pub most_binge_sessions_user: Option<String>,
    pub longest_binge_user: Option<String>,
    pub most_diverse_genres_user: Option<String>,
}

/// A user's anonymized position for one metric. Carries no other
/// usernames or raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub rank: u32,
    pub total_users: u32,
    pub percentile: f64,
    pub is_top: bool,
    pub is_bottom: bool,
    pub above_average: bool,
    pub average: u64,
    pub max: u64,
    /// Reported for the watch-time metric only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
}

/// Per-metric comparisons for one user. A metric is absent when the
/// user's own value for it is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparativeStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_time: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movies: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binge_sessions: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_binge: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_diversity: Option<MetricComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_diversity: Option<MetricComparison>,
}

// ============================================
// Users, Cards and Stored Recaps
// ============================================

/// A user account on the media server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaUser {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

impl MediaUser {
    /// Name shown on the recap: friendly name when set, else username.
    pub fn display_name(&self) -> &str {
        self.friendly_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Icon / color hint the card generator attaches for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardVisualHint {
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Narrative text body of a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardText {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aside: Option<String>,
}

/// Card payload. `metrics` stays free-form JSON; the generator decides
/// which numbers each card surfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<CardText>,
}

/// One generated recap card. Parsed leniently: the generator is an LLM
/// and unknown or missing fields must not sink the whole deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecapCard {
    #[serde(default)]
    pub id: String,
    /// summary | stat | record | pattern | comparison | fun
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub visual_hint: Option<CardVisualHint>,
    #[serde(default)]
    pub content: CardContent,
}

/// The stored, servable recap for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecapData {
    pub user: MediaUser,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub analysis: UserAnalysisResult,
    pub cards: Vec<RecapCard>,
}
