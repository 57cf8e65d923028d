// ============================================
// Consistency Scoring
// ============================================
//
// Scores how evenly a user watched across the period: 60% watch
// frequency (share of period days with any watching) and 40% regularity
// (inverse coefficient of variation of the daily minutes). Streaks and
// gaps come from the calendar dates that actually saw watching, so
// silence before the first or after the last watch date never counts as
// a gap.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{ConsistencyProfile, RegularityLabel};

use super::round2;
use super::temporal::BucketTotal;

pub fn analyze_consistency(
    daily: &BTreeMap<NaiveDate, BucketTotal>,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> ConsistencyProfile {
    let total_days = ((period_end - period_start).num_days().max(0) + 1) as u32;
    if daily.is_empty() {
        return ConsistencyProfile {
            days_without_watching: total_days,
            ..ConsistencyProfile::default()
        };
    }

    let totals: Vec<f64> = daily.values().map(|total| total.minutes).collect();
    let days_with_watching = totals.len() as u32;
    let days_without_watching = total_days.saturating_sub(days_with_watching);

    let avg_daily = totals.iter().sum::<f64>() / totals.len() as f64;
    let watch_frequency = days_with_watching as f64 / total_days as f64 * 100.0;

    let std_dev = sample_stdev(&totals);
    let regularity_score = if totals.len() > 1 {
        if avg_daily > 0.0 {
            let coefficient_of_variation = std_dev / avg_daily;
            (100.0 - coefficient_of_variation * 50.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    } else {
        // Neutral with a single data point.
        50.0
    };

    let score = watch_frequency * 0.6 + regularity_score * 0.4;
    let (longest_streak_days, longest_gap_days) = streaks_and_gaps(daily);

    ConsistencyProfile {
        score: round2(score),
        regularity_label: RegularityLabel::from_score(score),
        avg_daily_minutes: round2(avg_daily),
        watch_frequency: round2(watch_frequency),
        days_with_watching,
        days_without_watching,
        longest_streak_days,
        longest_gap_days,
        stdev: round2(std_dev),
    }
}

/// Sample standard deviation (n - 1 divisor), 0 for fewer than 2 points.
fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Longest run of consecutive watch dates, and the widest gap of silent
/// days strictly between two watch dates.
fn streaks_and_gaps(daily: &BTreeMap<NaiveDate, BucketTotal>) -> (u32, u32) {
    let mut longest_streak = 0_u32;
    let mut current_streak = 0_u32;
    let mut longest_gap = 0_u32;
    let mut previous: Option<NaiveDate> = None;

    for &date in daily.keys() {
        match previous {
            Some(prev) => {
                let between = (date - prev).num_days();
                if between == 1 {
                    current_streak += 1;
                } else {
                    current_streak = 1;
                    longest_gap = longest_gap.max((between - 1).max(0) as u32);
                }
            }
            None => current_streak = 1,
        }
        longest_streak = longest_streak.max(current_streak);
        previous = Some(date);
    }

    (longest_streak, longest_gap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn daily(entries: &[(NaiveDate, f64)]) -> BTreeMap<NaiveDate, BucketTotal> {
        entries
            .iter()
            .map(|&(day, minutes)| (day, BucketTotal { minutes, items: 1 }))
            .collect()
    }

    #[test]
    fn test_empty_period_is_no_data() {
        let profile = analyze_consistency(&BTreeMap::new(), date(2025, 1, 1), date(2025, 1, 10));
        assert_eq!(profile.regularity_label, RegularityLabel::NoData);
        assert_eq!(profile.score, 0.0);
        assert_eq!(profile.days_with_watching, 0);
        assert_eq!(profile.days_without_watching, 10);
        assert_eq!(profile.longest_streak_days, 0);
    }

    #[test]
    fn test_single_day_gets_neutral_regularity() {
        let days = daily(&[(date(2025, 1, 5), 60.0)]);
        let profile = analyze_consistency(&days, date(2025, 1, 1), date(2025, 1, 10));
        // Frequency 10% * 0.6 + neutral 50 * 0.4 = 26.
        assert_eq!(profile.score, 26.0);
        assert_eq!(profile.regularity_label, RegularityLabel::Sporadic);
        assert_eq!(profile.stdev, 0.0);
        assert_eq!(profile.longest_streak_days, 1);
        assert_eq!(profile.longest_gap_days, 0);
    }

    #[test]
    fn test_daily_uniform_watching_scores_perfect() {
        let days: Vec<(NaiveDate, f64)> = (1..=10).map(|d| (date(2025, 1, d), 45.0)).collect();
        let profile = analyze_consistency(&daily(&days), date(2025, 1, 1), date(2025, 1, 10));
        assert_eq!(profile.score, 100.0);
        assert_eq!(profile.regularity_label, RegularityLabel::VeryConsistent);
        assert_eq!(profile.watch_frequency, 100.0);
        assert_eq!(profile.avg_daily_minutes, 45.0);
        assert_eq!(profile.longest_streak_days, 10);
        assert_eq!(profile.days_without_watching, 0);
    }

    #[test]
    fn test_sample_stdev_uses_n_minus_one() {
        let days = daily(&[(date(2025, 1, 1), 30.0), (date(2025, 1, 2), 60.0)]);
        let profile = analyze_consistency(&days, date(2025, 1, 1), date(2025, 1, 2));
        // stdev = sqrt(((15)^2 + (15)^2) / 1) = 21.21
        assert_eq!(profile.stdev, 21.21);
        assert_eq!(profile.score, 90.57);
        assert_eq!(profile.regularity_label, RegularityLabel::VeryConsistent);
    }

    #[test]
    fn test_high_variance_clamps_regularity_to_zero() {
        // One heavy day among trickles pushes CV well past 2.
        let days = daily(&[
            (date(2025, 1, 1), 1.0),
            (date(2025, 1, 3), 1.0),
            (date(2025, 1, 5), 1.0),
            (date(2025, 1, 7), 1.0),
            (date(2025, 1, 9), 600.0),
        ]);
        let profile = analyze_consistency(&days, date(2025, 1, 1), date(2025, 1, 10));
        // Frequency 50% * 0.6 + clamped 0 * 0.4 = 30.
        assert_eq!(profile.score, 30.0);
        assert_eq!(profile.regularity_label, RegularityLabel::Sporadic);
    }

    #[test]
    fn test_streaks_and_gaps_follow_calendar_dates() {
        let days = daily(&[
            (date(2025, 2, 1), 30.0),
            (date(2025, 2, 2), 30.0),
            (date(2025, 2, 3), 30.0),
            (date(2025, 2, 10), 30.0),
            (date(2025, 2, 11), 30.0),
        ]);
        let profile = analyze_consistency(&days, date(2025, 1, 1), date(2025, 12, 31));
        assert_eq!(profile.longest_streak_days, 3);
        // Feb 4 through Feb 9 are six silent days.
        assert_eq!(profile.longest_gap_days, 6);
    }
}
