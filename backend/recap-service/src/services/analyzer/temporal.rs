// ============================================
// Temporal Pattern Analysis
// ============================================
//
// Buckets watched minutes by calendar date, month, hour of day and
// weekday, then derives seasonal, time-of-day and day-of-week patterns.
// All bucket maps are ordered so every emitted ranking is deterministic;
// "most active" picks use strict greater-than, so ties resolve to the
// earliest bucket in calendar order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    DayOfWeekStats, DayPeriod, DayRecord, HourBucket, LabelMinutes, PeriodStats, Season,
    SeasonBucket, SeasonalPatterns, TimeOfDayStats, WatchEvent, WeekdayStats,
};

use super::round2;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Minutes and event count for one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketTotal {
    pub minutes: f64,
    pub items: u64,
}

#[derive(Debug, Default)]
struct MonthTotal {
    minutes: f64,
    items: u64,
    // Genre label -> minutes, in first-encounter order.
    genres: Vec<(String, f64)>,
}

#[derive(Debug, Default)]
struct SeasonTotal {
    minutes: f64,
    items: u64,
    genres: Vec<(String, f64)>,
}

/// Collects per-date, per-month, per-hour and per-weekday totals from
/// included events.
#[derive(Debug, Default)]
pub struct TemporalCollector {
    by_date: BTreeMap<NaiveDate, BucketTotal>,
    by_month: BTreeMap<String, MonthTotal>,
    by_hour: BTreeMap<u32, BucketTotal>,
    by_weekday: BTreeMap<u32, BucketTotal>,
}

impl TemporalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &WatchEvent) {
        let minutes = event.watched_minutes;

        if let Some(date) = event.date {
            let entry = self.by_date.entry(date).or_default();
            entry.minutes += minutes;
            entry.items += 1;
        }

        if let Some(month) = &event.month_key {
            let entry = self.by_month.entry(month.clone()).or_default();
            entry.minutes += minutes;
            entry.items += 1;
            for genre in &event.genres {
                if !genre.is_empty() {
                    add_minutes(&mut entry.genres, genre, minutes);
                }
            }
        }

        if let Some(hour) = event.hour {
            let entry = self.by_hour.entry(hour).or_default();
            entry.minutes += minutes;
            entry.items += 1;
        }

        if let Some(weekday) = event.weekday {
            let entry = self.by_weekday.entry(weekday).or_default();
            entry.minutes += minutes;
            entry.items += 1;
        }
    }

    /// Per-date totals in ascending date order, for consistency analysis.
    pub fn daily_totals(&self) -> &BTreeMap<NaiveDate, BucketTotal> {
        &self.by_date
    }

    /// The single date with the most watched minutes; ties keep the
    /// earliest date.
    pub fn day_with_most(&self) -> Option<DayRecord> {
        let mut best: Option<(NaiveDate, &BucketTotal)> = None;
        for (&date, total) in &self.by_date {
            if best.as_ref().map_or(true, |(_, t)| total.minutes > t.minutes) {
                best = Some((date, total));
            }
        }
        best.map(|(date, total)| DayRecord {
            date,
            duration_minutes: total.minutes.round() as u64,
            item_count: total.items,
        })
    }

    /// Seasonal rollup of the monthly buckets. `None` when no event
    /// carried a month, so serialized output omits the section entirely.
    pub fn seasonal_patterns(&self, southern_hemisphere: bool) -> Option<SeasonalPatterns> {
        if self.by_month.is_empty() {
            return None;
        }

        let mut totals: [SeasonTotal; 4] = Default::default();
        for (month_key, data) in &self.by_month {
            let Some(month) = month_number(month_key) else {
                continue;
            };
            let slot = &mut totals[season_index(Season::from_month(month, southern_hemisphere))];
            slot.minutes += data.minutes;
            slot.items += data.items;
            for (genre, minutes) in &data.genres {
                add_minutes(&mut slot.genres, genre, *minutes);
            }
        }

        let mut by_season = Vec::new();
        let mut best: Option<(Season, f64)> = None;
        for (index, slot) in totals.iter().enumerate() {
            if slot.items == 0 {
                continue;
            }
            let season = Season::ALL[index];
            let mut genres = slot.genres.clone();
            // Stable sort keeps the first-encountered genre ahead on ties.
            genres.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            by_season.push(SeasonBucket {
                season,
                total_minutes: round2(slot.minutes),
                item_count: slot.items,
                genres: genres
                    .into_iter()
                    .map(|(name, minutes)| LabelMinutes {
                        name,
                        minutes: round2(minutes),
                    })
                    .collect(),
            });
            if best.as_ref().map_or(true, |(_, m)| slot.minutes > *m) {
                best = Some((season, slot.minutes));
            }
        }

        Some(SeasonalPatterns {
            by_season,
            most_active: best.map(|(season, _)| season),
            most_active_minutes: best.map(|(_, minutes)| minutes.round() as u64).unwrap_or(0),
        })
    }

    /// Time-of-day rollup. All four periods are always present; hours
    /// only appear in `by_hour` when they saw at least one event.
    pub fn time_of_day(&self) -> TimeOfDayStats {
        if self.by_hour.is_empty() {
            return TimeOfDayStats::default();
        }

        let mut period_minutes = [0.0_f64; 4];
        let mut period_items = [0_u64; 4];
        for (&hour, data) in &self.by_hour {
            let index = period_index(DayPeriod::from_hour(hour));
            period_minutes[index] += data.minutes;
            period_items[index] += data.items;
        }
        let total: f64 = period_minutes.iter().sum();

        let mut best_index = 0;
        for index in 1..period_minutes.len() {
            if period_minutes[index] > period_minutes[best_index] {
                best_index = index;
            }
        }

        let mut peak: Option<(u32, f64)> = None;
        for (&hour, data) in &self.by_hour {
            if peak.as_ref().map_or(true, |(_, m)| data.minutes > *m) {
                peak = Some((hour, data.minutes));
            }
        }

        TimeOfDayStats {
            morning: period_stats(period_minutes[0], period_items[0], total),
            afternoon: period_stats(period_minutes[1], period_items[1], total),
            evening: period_stats(period_minutes[2], period_items[2], total),
            night: period_stats(period_minutes[3], period_items[3], total),
            most_active_period: Some(DayPeriod::ALL[best_index]),
            most_active_period_minutes: period_minutes[best_index].round() as u64,
            peak_hour: peak.map(|(hour, _)| hour),
            peak_hour_minutes: peak.map(|(_, minutes)| minutes.round() as u64).unwrap_or(0),
            by_hour: self
                .by_hour
                .iter()
                .map(|(&hour, data)| HourBucket {
                    hour,
                    total_minutes: round2(data.minutes),
                    item_count: data.items,
                })
                .collect(),
        }
    }

    /// Day-of-week rollup, Monday first. Percentages follow the rounded
    /// per-day minutes.
    pub fn day_of_week(&self) -> DayOfWeekStats {
        if self.by_weekday.is_empty() {
            return DayOfWeekStats::default();
        }

        let rounded: Vec<(u32, f64, u64)> = self
            .by_weekday
            .iter()
            .map(|(&day, data)| (day, round2(data.minutes), data.items))
            .collect();
        let total: f64 = rounded.iter().map(|(_, minutes, _)| minutes).sum();

        let by_weekday = rounded
            .iter()
            .map(|&(day, minutes, items)| WeekdayStats {
                weekday: weekday_name(day).to_string(),
                total_minutes: minutes,
                item_count: items,
                percentage: if total > 0.0 {
                    round2(minutes / total * 100.0)
                } else {
                    0.0
                },
            })
            .collect();

        let mut best: Option<(u32, f64)> = None;
        for (&day, data) in &self.by_weekday {
            if best.as_ref().map_or(true, |(_, m)| data.minutes > *m) {
                best = Some((day, data.minutes));
            }
        }

        DayOfWeekStats {
            by_weekday,
            most_active_day: best.map(|(day, _)| weekday_name(day).to_string()),
            most_active_day_minutes: best.map(|(_, minutes)| minutes.round() as u64).unwrap_or(0),
        }
    }
}

fn add_minutes(buckets: &mut Vec<(String, f64)>, label: &str, minutes: f64) {
    if let Some(entry) = buckets.iter_mut().find(|(name, _)| name == label) {
        entry.1 += minutes;
    } else {
        buckets.push((label.to_string(), minutes));
    }
}

fn month_number(month_key: &str) -> Option<u32> {
    month_key
        .split('-')
        .nth(1)?
        .parse::<u32>()
        .ok()
        .filter(|month| (1..=12).contains(month))
}

fn season_index(season: Season) -> usize {
    match season {
        Season::Winter => 0,
        Season::Spring => 1,
        Season::Summer => 2,
        Season::Fall => 3,
    }
}

fn period_index(period: DayPeriod) -> usize {
    match period {
        DayPeriod::Morning => 0,
        DayPeriod::Afternoon => 1,
        DayPeriod::Evening => 2,
        DayPeriod::Night => 3,
    }
}

fn weekday_name(day: u32) -> &'static str {
    WEEKDAY_NAMES.get(day as usize).copied().unwrap_or("Unknown")
}

fn period_stats(minutes: f64, items: u64, total: f64) -> PeriodStats {
    PeriodStats {
        total_minutes: round2(minutes),
        item_count: items,
        percentage: if total > 0.0 {
            round2(minutes / total * 100.0)
        } else {
            0.0
        },
    }
}
