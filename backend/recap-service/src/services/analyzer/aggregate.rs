// ============================================
// Weighted Aggregator
// ============================================
//
// Accumulates watched minutes into labeled buckets: genres, actors,
// directors, devices, platforms and per-title content totals. Buckets
// weigh by watched minutes, not event count. Totals are commutative,
// so event supply order never changes a ranking; ties rank by first
// encounter.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{DeviceStat, GenreStat, MediaKind, PersonStat, TopContent, WatchEvent};

use super::round2;

/// Running totals for one label.
#[derive(Debug, Clone)]
struct LabelTotal {
    minutes: f64,
    count: u64,
    first_seen: usize,
}

/// One ranked label with its accumulated minutes and event count.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedLabel {
    pub label: String,
    pub minutes: f64,
    pub count: u64,
}

/// Label -> minutes accumulator. The backing map's iteration order never
/// leaks: ranked output sorts by minutes descending, ties by first
/// encounter.
#[derive(Debug, Default)]
pub struct CategoryAccumulator {
    totals: HashMap<String, LabelTotal>,
    next_index: usize,
}

impl CategoryAccumulator {
    pub fn add(&mut self, label: &str, minutes: f64) {
        if let Some(entry) = self.totals.get_mut(label) {
            entry.minutes += minutes;
            entry.count += 1;
        } else {
            self.totals.insert(
                label.to_string(),
                LabelTotal {
                    minutes,
                    count: 1,
                    first_seen: self.next_index,
                },
            );
            self.next_index += 1;
        }
    }

    /// Sum over every bucket, not just the ranked top.
    pub fn total_minutes(&self) -> f64 {
        self.totals.values().map(|t| t.minutes).sum()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn ranked(&self, limit: usize) -> Vec<RankedLabel> {
        let mut entries: Vec<(&String, &LabelTotal)> = self.totals.iter().collect();
        entries.sort_by(|a, b| {
            b.1.minutes
                .partial_cmp(&a.1.minutes)
                .unwrap_or(Ordering::Equal)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        entries.truncate(limit);
        entries
            .into_iter()
            .map(|(label, total)| RankedLabel {
                label: label.clone(),
                minutes: total.minutes,
                count: total.count,
            })
            .collect()
    }
}

/// Per-title running totals, keyed by show title for episodes and the
/// movie title otherwise.
#[derive(Debug, Clone)]
struct ContentTotal {
    minutes: f64,
    first_seen: usize,
    thumb: Option<String>,
    year: Option<i64>,
    media_kind: MediaKind,
}

/// Accumulates one user's included events into every bucketed dimension.
#[derive(Debug, Default)]
pub struct WatchAggregator {
    pub total_watch_time: f64,
    pub episodes_watched: u64,
    pub movies_watched: u64,
    unique_titles: HashSet<String>,
    pub genres: CategoryAccumulator,
    pub actors: CategoryAccumulator,
    pub directors: CategoryAccumulator,
    pub devices: CategoryAccumulator,
    pub platforms: CategoryAccumulator,
    content: HashMap<String, ContentTotal>,
    content_next_index: usize,
}

impl WatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &WatchEvent) {
        let minutes = event.watched_minutes;
        self.total_watch_time += minutes;

        match event.media_kind {
            MediaKind::Episode => self.episodes_watched += 1,
            MediaKind::Movie => self.movies_watched += 1,
        }
        if !event.show_title.is_empty() {
            self.unique_titles.insert(event.show_title.clone());
        }

        for genre in &event.genres {
            self.genres.add(genre, minutes);
        }
        for actor in &event.actors {
            self.actors.add(actor, minutes);
        }
        for director in &event.directors {
            self.directors.add(director, minutes);
        }

        if let Some(device) = &event.device {
            self.devices.add(device, minutes);
        }
        // The platform bucket only counts platforms that are not already
        // the device label for the same event.
        if let Some(platform) = &event.platform {
            if event.device.as_ref() != Some(platform) {
                self.platforms.add(platform, minutes);
            }
        }

        if !event.show_title.is_empty() {
            if let Some(entry) = self.content.get_mut(&event.show_title) {
                entry.minutes += minutes;
            } else {
                self.content.insert(
                    event.show_title.clone(),
                    ContentTotal {
                        minutes,
                        first_seen: self.content_next_index,
                        thumb: event.thumb.clone(),
                        year: event.year,
                        media_kind: event.media_kind,
                    },
                );
                self.content_next_index += 1;
            }
        }
    }

    /// Distinct shows + movies watched.
    pub fn unique_title_count(&self) -> u64 {
        self.unique_titles.len() as u64
    }

    pub fn genre_stats(&self, limit: usize) -> Vec<GenreStat> {
        let total = self.genres.total_minutes();
        self.genres
            .ranked(limit)
            .into_iter()
            .map(|entry| GenreStat {
                genre: entry.label,
                watch_time: entry.minutes.round() as u64,
                count: entry.count,
                percentage: share(entry.minutes, total),
            })
            .collect()
    }

    pub fn actor_stats(&self, limit: usize) -> Vec<PersonStat> {
        person_stats(&self.actors, limit)
    }

    pub fn director_stats(&self, limit: usize) -> Vec<PersonStat> {
        person_stats(&self.directors, limit)
    }

    pub fn device_stats(&self, limit: usize) -> Vec<DeviceStat> {
        device_stats(&self.devices, limit)
    }

    pub fn platform_stats(&self, limit: usize) -> Vec<DeviceStat> {
        device_stats(&self.platforms, limit)
    }

    pub fn top_content(&self, limit: usize) -> Vec<TopContent> {
        let mut entries: Vec<(&String, &ContentTotal)> = self.content.iter().collect();
        entries.sort_by(|a, b| {
            b.1.minutes
                .partial_cmp(&a.1.minutes)
                .unwrap_or(Ordering::Equal)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        entries.truncate(limit);
        entries
            .into_iter()
            .map(|(title, total)| TopContent {
                title: title.clone(),
                watch_time: total.minutes.round() as u64,
                thumb: total.thumb.clone(),
                year: total.year,
                media_kind: total.media_kind,
            })
            .collect()
    }
}

fn person_stats(accumulator: &CategoryAccumulator, limit: usize) -> Vec<PersonStat> {
    accumulator
        .ranked(limit)
        .into_iter()
        .map(|entry| PersonStat {
            name: entry.label,
            watch_time: entry.minutes.round() as u64,
            count: entry.count,
        })
        .collect()
}

fn device_stats(accumulator: &CategoryAccumulator, limit: usize) -> Vec<DeviceStat> {
    let total = accumulator.total_minutes();
    accumulator
        .ranked(limit)
        .into_iter()
        .map(|entry| DeviceStat {
            device: entry.label,
            watch_time: entry.minutes.round() as u64,
            percentage: share(entry.minutes, total),
        })
        .collect()
}

fn share(minutes: f64, total: f64) -> f64 {
    if total > 0.0 {
        round2(minutes / total * 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str, kind: MediaKind, minutes: f64) -> WatchEvent {
        WatchEvent {
            title: title.to_string(),
            show_title: title.to_string(),
            media_kind: kind,
            watched_minutes: minutes,
            duration_minutes: minutes,
            genres: Vec::new(),
            actors: Vec::new(),
            directors: Vec::new(),
            device: None,
            platform: None,
            year: None,
            thumb: None,
            start_ts: None,
            stop_ts: None,
            event_ts: None,
            date: None,
            month_key: None,
            hour: None,
            weekday: None,
        }
    }

    fn episode(show: &str, minutes: f64) -> WatchEvent {
        let mut ev = event(show, MediaKind::Episode, minutes);
        ev.title = format!("{} episode", show);
        ev
    }

    #[test]
    fn test_totals_invariant_to_event_order() {
        let mut a = event("One", MediaKind::Movie, 50.0);
        a.genres = vec!["Drama".to_string(), "Crime".to_string()];
        let mut b = episode("Two", 30.0);
        b.genres = vec!["Drama".to_string()];
        let c = event("Three", MediaKind::Movie, 20.0);

        let mut forward = WatchAggregator::new();
        for ev in [&a, &b, &c] {
            forward.observe(ev);
        }
        let mut reverse = WatchAggregator::new();
        for ev in [&c, &b, &a] {
            reverse.observe(ev);
        }

        assert_eq!(forward.total_watch_time, reverse.total_watch_time);
        assert_eq!(forward.genre_stats(10), reverse.genre_stats(10));
        assert_eq!(forward.unique_title_count(), reverse.unique_title_count());
    }

    #[test]
    fn test_ranking_weighs_minutes_not_counts() {
        let mut agg = WatchAggregator::new();
        // Three short comedies vs one long drama.
        for _ in 0..3 {
            let mut ev = event("Short", MediaKind::Movie, 10.0);
            ev.genres = vec!["Comedy".to_string()];
            agg.observe(&ev);
        }
        let mut long = event("Long", MediaKind::Movie, 120.0);
        long.genres = vec!["Drama".to_string()];
        agg.observe(&long);

        let stats = agg.genre_stats(10);
        assert_eq!(stats[0].genre, "Drama");
        assert_eq!(stats[0].watch_time, 120);
        assert_eq!(stats[1].genre, "Comedy");
        assert_eq!(stats[1].count, 3);
    }

    #[test]
    fn test_tied_labels_keep_encounter_order() {
        let mut agg = WatchAggregator::new();
        let mut ev = event("A", MediaKind::Movie, 30.0);
        ev.genres = vec!["Zebra".to_string(), "Alpha".to_string()];
        agg.observe(&ev);

        let stats = agg.genre_stats(10);
        assert_eq!(stats[0].genre, "Zebra");
        assert_eq!(stats[1].genre, "Alpha");
    }

    #[test]
    fn test_percentages_sum_to_one_hundred() {
        let mut agg = WatchAggregator::new();
        for (genre, minutes) in [("Drama", 90.0), ("Comedy", 45.0), ("Horror", 15.0)] {
            let mut ev = event(genre, MediaKind::Movie, minutes);
            ev.genres = vec![genre.to_string()];
            agg.observe(&ev);
        }
        let total: f64 = agg.genre_stats(10).iter().map(|g| g.percentage).sum();
        assert!((total - 100.0).abs() < 0.05);
    }

    #[test]
    fn test_platform_matching_device_not_double_counted() {
        let mut agg = WatchAggregator::new();
        let mut ev = event("One", MediaKind::Movie, 60.0);
        ev.device = Some("Roku".to_string());
        ev.platform = Some("Roku".to_string());
        agg.observe(&ev);

        assert_eq!(agg.device_stats(10).len(), 1);
        assert!(agg.platform_stats(10).is_empty());

        let mut ev = event("Two", MediaKind::Movie, 30.0);
        ev.device = Some("Living Room TV".to_string());
        ev.platform = Some("Roku".to_string());
        agg.observe(&ev);

        let platforms = agg.platform_stats(10);
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].watch_time, 30);
    }

    #[test]
    fn test_unique_titles_span_shows_and_movies() {
        let mut agg = WatchAggregator::new();
        agg.observe(&episode("Severance", 45.0));
        agg.observe(&episode("Severance", 50.0));
        agg.observe(&event("Arrival", MediaKind::Movie, 110.0));

        assert_eq!(agg.episodes_watched, 2);
        assert_eq!(agg.movies_watched, 1);
        assert_eq!(agg.unique_title_count(), 2);
    }

    #[test]
    fn test_top_content_keeps_first_seen_details() {
        let mut agg = WatchAggregator::new();
        let mut first = episode("Severance", 45.0);
        first.thumb = Some("/thumb/1".to_string());
        first.year = Some(2022);
        agg.observe(&first);

        let mut second = episode("Severance", 55.0);
        second.thumb = Some("/thumb/other".to_string());
        agg.observe(&second);

        let top = agg.top_content(10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].title, "Severance");
        assert_eq!(top[0].watch_time, 100);
        assert_eq!(top[0].thumb.as_deref(), Some("/thumb/1"));
        assert_eq!(top[0].year, Some(2022));
    }

    #[test]
    fn test_top_content_limit() {
        let mut agg = WatchAggregator::new();
        for i in 0..15 {
            agg.observe(&event(&format!("Movie {i}"), MediaKind::Movie, 10.0 + i as f64));
        }
        let top = agg.top_content(10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].title, "Movie 14");
    }
}
