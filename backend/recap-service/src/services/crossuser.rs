// ============================================
// Cross-User Comparison
// ============================================
//
// Deployment-wide rankings over finished per-user profiles, plus the
// anonymized per-user comparison blocks. Rankings include zero-valued
// users so ranks stay honest; the longest-binge ranking only covers
// users who actually had a binge day. A user's own comparison block
// never names anyone else.

use tracing::info;

use crate::models::{
    ComparativeStats, CrossUserInsights, MetricComparison, RankedUser, UserAnalysisResult,
};

/// Comparisons need at least two users to mean anything.
const MIN_USERS: usize = 2;

struct MetricSnapshot {
    username: String,
    watch_time: u64,
    episodes: u64,
    movies: u64,
    binge_count: u64,
    longest_binge: Option<u64>,
    genre_diversity: u64,
    device_diversity: u64,
}

/// Builds deployment-wide insights and attaches a comparison block to
/// every profile. Returns `None` and leaves profiles untouched when
/// fewer than two users are present.
pub fn compare_users(results: &mut [UserAnalysisResult]) -> Option<CrossUserInsights> {
    if results.len() < MIN_USERS {
        return None;
    }

    let snapshots: Vec<MetricSnapshot> = results
        .iter()
        .map(|result| MetricSnapshot {
            username: result.username.clone(),
            watch_time: result.stats.total_watch_time,
            episodes: result.stats.total_episodes_watched,
            movies: result.stats.total_movies_watched,
            binge_count: result.stats.binge_sessions.len() as u64,
            longest_binge: result
                .stats
                .longest_binge
                .as_ref()
                .map(|binge| binge.duration_minutes),
            genre_diversity: result.stats.genres.len() as u64,
            device_diversity: result.stats.devices.len() as u64,
        })
        .collect();

    let watch_time_rankings = ranked(&snapshots, |s| s.watch_time);
    let episode_rankings = ranked(&snapshots, |s| s.episodes);
    let movie_rankings = ranked(&snapshots, |s| s.movies);
    let binge_rankings = ranked(&snapshots, |s| s.binge_count);
    let longest_binge_rankings = sort_desc(
        snapshots
            .iter()
            .filter_map(|s| {
                s.longest_binge.map(|value| RankedUser {
                    username: s.username.clone(),
                    value,
                })
            })
            .collect(),
    );
    let genre_diversity_rankings = ranked(&snapshots, |s| s.genre_diversity);
    let device_diversity_rankings = ranked(&snapshots, |s| s.device_diversity);

    let avg_watch_time = watch_time_rankings
        .iter()
        .map(|entry| entry.value as f64)
        .sum::<f64>()
        / watch_time_rankings.len() as f64;

    let most_watched_user = watch_time_rankings.first().map(|r| r.username.clone());
    let least_watched_user = watch_time_rankings.last().map(|r| r.username.clone());
    let max_watch_time = watch_time_rankings.first().map(|r| r.value).unwrap_or(0);
    let min_watch_time = watch_time_rankings.last().map(|r| r.value).unwrap_or(0);
    let most_episodes_user = episode_rankings.first().map(|r| r.username.clone());
    let most_movies_user = movie_rankings.first().map(|r| r.username.clone());
    let most_binge_sessions_user = binge_rankings
        .first()
        .filter(|r| r.value > 0)
        .map(|r| r.username.clone());
    let longest_binge_user = longest_binge_rankings.first().map(|r| r.username.clone());
    let most_diverse_genres_user = genre_diversity_rankings.first().map(|r| r.username.clone());

    let insights = CrossUserInsights {
        total_users: results.len() as u32,
        watch_time_rankings,
        episode_rankings,
        movie_rankings,
        binge_rankings,
        longest_binge_rankings,
        genre_diversity_rankings,
        device_diversity_rankings,
        most_watched_user,
        least_watched_user,
        avg_watch_time,
        max_watch_time,
        min_watch_time,
        most_episodes_user,
        most_movies_user,
        most_binge_sessions_user,
        longest_binge_user,
        most_diverse_genres_user,
    };

    for result in results.iter_mut() {
        result.comparative_stats = Some(ComparativeStats {
            watch_time: comparison(&insights.watch_time_rankings, &result.username, true),
            episodes: comparison(&insights.episode_rankings, &result.username, false),
            movies: comparison(&insights.movie_rankings, &result.username, false),
            binge_sessions: comparison(&insights.binge_rankings, &result.username, false),
            longest_binge: comparison(&insights.longest_binge_rankings, &result.username, false),
            genre_diversity: comparison(&insights.genre_diversity_rankings, &result.username, false),
            device_diversity: comparison(
                &insights.device_diversity_rankings,
                &result.username,
                false,
            ),
        });
    }

    info!(users = insights.total_users, "built cross-user insights");
    Some(insights)
}

fn ranked<F>(snapshots: &[MetricSnapshot], value: F) -> Vec<RankedUser>
where
    F: Fn(&MetricSnapshot) -> u64,
{
    sort_desc(
        snapshots
            .iter()
            .map(|s| RankedUser {
                username: s.username.clone(),
                value: value(s),
            })
            .collect(),
    )
}

/// Stable sort, so tied users keep their input order.
fn sort_desc(mut entries: Vec<RankedUser>) -> Vec<RankedUser> {
    entries.sort_by(|a, b| b.value.cmp(&a.value));
    entries
}

/// One anonymized comparison against a ranking. `None` when the user is
/// not in the ranking's population or sat the metric out entirely.
fn comparison(ranking: &[RankedUser], username: &str, include_min: bool) -> Option<MetricComparison> {
    let position = ranking.iter().position(|entry| entry.username == username)?;
    let own = ranking[position].value;
    if own == 0 {
        return None;
    }

    let total = ranking.len();
    let rank = position + 1;
    let average = ranking.iter().map(|entry| entry.value as f64).sum::<f64>() / total as f64;
    let max = ranking.iter().map(|entry| entry.value).max().unwrap_or(0);
    let min = ranking.iter().map(|entry| entry.value).min().unwrap_or(0);
    let percentile = (total - rank + 1) as f64 / total as f64 * 100.0;

    Some(MetricComparison {
        rank: rank as u32,
        total_users: total as u32,
        percentile: round1(percentile),
        is_top: rank == 1,
        is_bottom: rank == total,
        above_average: (own as f64) > average,
        average: average.round() as u64,
        max,
        min: include_min.then_some(min),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
