// ============================================
// Session Detection
// ============================================
//
// Binge days and continuous watch stretches. A binge day is any calendar
// date whose watched minutes exceed the threshold (strictly). A
// continuous stretch merges timestamped spans whose gap to the previous
// span's end is at most the configured allowance; its duration is the
// sum of watched minutes, not the wall-clock span.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{BingeSession, ContinuousSession, MediaKind, WatchEvent};

#[derive(Debug, Clone, Copy)]
struct Span {
    start: i64,
    end: i64,
    minutes: f64,
}

/// All binge days, most minutes first. Ties keep ascending date order.
pub fn detect_binge_sessions(events: &[WatchEvent], threshold_minutes: f64) -> Vec<BingeSession> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&WatchEvent>> = BTreeMap::new();
    for event in events {
        if let Some(date) = event.date {
            by_date.entry(date).or_default().push(event);
        }
    }

    let mut sessions = Vec::new();
    for (date, items) in &by_date {
        let total: f64 = items.iter().map(|event| event.watched_minutes).sum();
        if total <= threshold_minutes {
            continue;
        }

        let mut content: Vec<String> = Vec::new();
        for event in items {
            if event.show_title.is_empty() {
                continue;
            }
            if !content.iter().any(|title| title == &event.show_title) {
                content.push(event.show_title.clone());
            }
        }
        let episode_count = items
            .iter()
            .filter(|event| event.media_kind == MediaKind::Episode)
            .count() as u64;

        sessions.push(BingeSession {
            date: *date,
            duration_minutes: total.round() as u64,
            content,
            episode_count,
        });
    }

    // Stable sort, so equal durations stay in ascending date order.
    sessions.sort_by(|a, b| b.duration_minutes.cmp(&a.duration_minutes));
    sessions
}

/// The single heaviest continuous stretch, if any event carried both a
/// start and a stop timestamp. Ties keep the earliest stretch.
pub fn longest_continuous_session(
    events: &[WatchEvent],
    max_gap_seconds: i64,
) -> Option<ContinuousSession> {
    let mut spans: Vec<Span> = events
        .iter()
        .filter_map(|event| match (event.start_ts, event.stop_ts) {
            (Some(start), Some(end)) => Some(Span {
                start,
                end,
                minutes: event.watched_minutes,
            }),
            _ => None,
        })
        .collect();
    if spans.is_empty() {
        return None;
    }
    spans.sort_by_key(|span| span.start);

    let mut longest: Option<ContinuousSession> = None;
    let mut max_minutes = 0.0_f64;
    let mut group: Vec<Span> = Vec::new();
    for span in spans {
        let continues = group
            .last()
            .map_or(false, |last| span.start - last.end <= max_gap_seconds);
        if !continues && !group.is_empty() {
            close_group(&group, &mut longest, &mut max_minutes);
            group.clear();
        }
        group.push(span);
    }
    close_group(&group, &mut longest, &mut max_minutes);
    longest
}

fn close_group(group: &[Span], longest: &mut Option<ContinuousSession>, max_minutes: &mut f64) {
    let total: f64 = group.iter().map(|span| span.minutes).sum();
    if total > *max_minutes {
        if let (Some(first), Some(last)) = (group.first(), group.last()) {
            *max_minutes = total;
            *longest = Some(ContinuousSession {
                start_ts: first.start,
                end_ts: last.end,
                duration_minutes: total.round() as u64,
                item_count: group.len() as u64,
            });
        }
    }
}
