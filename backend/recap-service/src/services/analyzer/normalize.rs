// ============================================
// Event Normalizer
// ============================================
//
// Turns one raw history record (arbitrary JSON) into a canonical
// WatchEvent:
// 1. Resolve runtime and played time from ordered alias fields
// 2. Decide whether the record counts as watched at all
// 3. Classify the media kind; audio tracks are dropped here
// 4. Normalize category fields, enriching from the metadata source
//    when the record itself carries none
// 5. Derive local calendar fields from the best-effort timestamp
//
// A record that fails the watched predicate, or ends up with zero
// watched minutes, never leaves this module.

use std::sync::Arc;

use chrono::{Local, NaiveDate, TimeZone, Timelike};
use serde_json::Value;
use tracing::debug;

use crate::clients::metadata::MetadataLookup;
use crate::models::{MediaKind, WatchEvent};

/// Ordered alias fields for the nominal runtime, in seconds.
const DURATION_FIELDS: &[&str] = &["duration", "media_duration"];
/// Ordered alias fields for the event timestamp.
const DATE_FIELDS: &[&str] = &["date", "started"];
/// Ordered alias fields for the playback device label.
const DEVICE_FIELDS: &[&str] = &["player", "platform"];
/// Ordered alias fields for the platform label.
const PLATFORM_FIELDS: &[&str] = &["platform", "platform_name"];
/// Fields whose presence marks a record as an episode.
const SHOW_TITLE_FIELDS: &[&str] = &["grandparent_title", "parent_title"];
const EPISODE_INDEX_FIELDS: &[&str] = &["season_number", "parent_index", "episode_number", "index"];

/// Minimum watched share of the runtime for an event to count.
const WATCHED_RATIO_THRESHOLD: f64 = 0.5;
/// Events with at least this many watched minutes count regardless of ratio.
const WATCHED_MINUTES_FLOOR: f64 = 5.0;
/// Actors weighed per event.
const MAX_ACTORS: usize = 5;

/// Normalizes raw history records. Metadata enrichment is optional and
/// best-effort; a missing or failing lookup never drops an event.
pub struct EventNormalizer {
    metadata: Option<Arc<dyn MetadataLookup>>,
}

impl EventNormalizer {
    pub fn new(metadata: Option<Arc<dyn MetadataLookup>>) -> Self {
        Self { metadata }
    }

    /// Normalize one raw record. Returns None when the record is not a
    /// countable watch (audio track, unwatched, zero minutes).
    pub async fn normalize(&self, raw: &Value) -> Option<WatchEvent> {
        if !raw.is_object() {
            return None;
        }

        let media_kind = classify_media(raw)?;

        let duration_minutes = first_field_f64(raw, DURATION_FIELDS).unwrap_or(0.0) / 60.0;
        let watched_minutes = resolve_watched_seconds(raw) / 60.0;

        if watched_minutes <= 0.0 || !is_watched(raw, watched_minutes, duration_minutes) {
            return None;
        }

        let title = field_str(raw, "title").unwrap_or_default();
        let show_title = field_str(raw, "grandparent_title").unwrap_or_else(|| title.clone());

        let mut genres = extract_category(raw, "genres");
        let mut actors = extract_category(raw, "actors");
        let mut directors = extract_category(raw, "directors");

        if genres.is_empty() || actors.is_empty() || directors.is_empty() {
            if let (Some(lookup), Some(content_id)) =
                (self.metadata.as_ref(), field_str(raw, "rating_key"))
            {
                match lookup.lookup(&content_id).await {
                    Ok(Some(meta)) => {
                        if genres.is_empty() {
                            genres = normalize_name_list(&meta.genres);
                        }
                        if actors.is_empty() {
                            actors = normalize_name_list(&meta.actors);
                        }
                        if directors.is_empty() {
                            directors = normalize_name_list(&meta.directors);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(content_id = %content_id, error = %e, "Metadata lookup failed");
                    }
                }
            }
        }
        actors.truncate(MAX_ACTORS);

        let start_ts = field_f64(raw, "started")
            .filter(|v| *v > 0.0)
            .map(|v| v as i64);
        let stop_ts = field_f64(raw, "stopped")
            .filter(|v| *v > 0.0)
            .map(|v| v as i64);

        let (event_ts, date) = resolve_event_date(raw);
        let month_key = date.map(|d| d.format("%Y-%m").to_string());
        let weekday = date.map(|d| d.weekday().num_days_from_monday());
        let hour = start_ts.and_then(local_hour_from_ts);

        Some(WatchEvent {
            title,
            show_title,
            media_kind,
            watched_minutes,
            duration_minutes,
            genres,
            actors,
            directors,
            device: first_field_str(raw, DEVICE_FIELDS),
            platform: first_field_str(raw, PLATFORM_FIELDS),
            year: field_f64(raw, "year").map(|v| v as i64).filter(|v| *v > 0),
            thumb: field_str(raw, "thumb"),
            start_ts,
            stop_ts,
            event_ts,
            date,
            month_key,
            hour,
            weekday,
        })
    }

    /// Normalize a whole history page, dropping non-countable records.
    pub async fn normalize_batch(&self, raws: &[Value]) -> Vec<WatchEvent> {
        let mut events = Vec::with_capacity(raws.len());
        for raw in raws {
            if let Some(event) = self.normalize(raw).await {
                events.push(event);
            }
        }
        events
    }
}

/// Normalize a category field into a flat list of non-empty names.
/// Handles the three shapes history sources emit: a list of strings,
/// a list of tagged objects (`{"tag": ...}`), and a comma-joined string.
pub fn normalize_name_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(tag_or_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn tag_or_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Object(obj) => obj
            .get("tag")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from),
        _ => None,
    }
}

fn classify_media(raw: &Value) -> Option<MediaKind> {
    let media_type = field_str(raw, "media_type")
        .unwrap_or_default()
        .to_lowercase();
    if media_type == "track" {
        return None;
    }
    if media_type.contains("episode") {
        return Some(MediaKind::Episode);
    }
    if media_type.contains("movie") {
        return Some(MediaKind::Movie);
    }

    // Untyped records: show fields or index numbers mean episode.
    let has_show_title = first_field_str(raw, SHOW_TITLE_FIELDS).is_some();
    let has_index = EPISODE_INDEX_FIELDS
        .iter()
        .any(|field| raw.get(*field).map_or(false, |v| !v.is_null()));
    if has_show_title || has_index {
        Some(MediaKind::Episode)
    } else {
        Some(MediaKind::Movie)
    }
}

/// Played seconds: first positive of play_duration, the started/stopped
/// span, then watched_duration.
fn resolve_watched_seconds(raw: &Value) -> f64 {
    if let Some(v) = field_f64(raw, "play_duration").filter(|v| *v > 0.0) {
        return v;
    }
    let started = field_f64(raw, "started").unwrap_or(0.0);
    let stopped = field_f64(raw, "stopped").unwrap_or(0.0);
    if started > 0.0 && stopped > started {
        return stopped - started;
    }
    field_f64(raw, "watched_duration")
        .filter(|v| *v > 0.0)
        .unwrap_or(0.0)
}

fn is_watched(raw: &Value, watched_minutes: f64, duration_minutes: f64) -> bool {
    if field_f64(raw, "watched_status").map_or(false, |v| v == 1.0) {
        return true;
    }
    if field_f64(raw, "stopped").map_or(false, |v| v > 0.0) {
        return true;
    }
    if duration_minutes > 0.0 && watched_minutes / duration_minutes >= WATCHED_RATIO_THRESHOLD {
        return true;
    }
    watched_minutes >= WATCHED_MINUTES_FLOOR
}

/// Direct field first, then the nested media_info copy.
fn extract_category(raw: &Value, key: &str) -> Vec<String> {
    let direct = raw.get(key).map(normalize_name_list).unwrap_or_default();
    if !direct.is_empty() {
        return direct;
    }
    raw.get("media_info")
        .filter(|mi| mi.is_object())
        .and_then(|mi| mi.get(key))
        .map(normalize_name_list)
        .unwrap_or_default()
}

/// Resolve the event timestamp and its local calendar date. Alias order
/// decides: a date-shaped string on an earlier field beats an epoch on a
/// later one.
fn resolve_event_date(raw: &Value) -> (Option<i64>, Option<NaiveDate>) {
    for key in DATE_FIELDS {
        let Some(value) = raw.get(*key) else { continue };
        if let Some(ts) = value_f64(value).filter(|v| *v > 0.0) {
            let ts = ts as i64;
            return (Some(ts), local_date_from_ts(ts));
        }
        if let Some(date) = value_date(value) {
            return (None, Some(date));
        }
    }
    (None, None)
}

fn local_date_from_ts(ts: i64) -> Option<NaiveDate> {
    Local.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive())
}

fn local_hour_from_ts(ts: i64) -> Option<u32> {
    Local.timestamp_opt(ts, 0).single().map(|dt| dt.hour())
}

fn value_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    let head = s.split_whitespace().next()?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_f64(raw: &Value, key: &str) -> Option<f64> {
    raw.get(key).and_then(value_f64)
}

fn field_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(value_str)
}

fn first_field_f64(raw: &Value, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|key| field_f64(raw, key))
        .find(|v| *v > 0.0)
}

fn first_field_str(raw: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().filter_map(|key| field_str(raw, key)).next()
}
