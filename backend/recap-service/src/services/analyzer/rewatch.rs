// ============================================
// Repeat Watch Detection
// ============================================
//
// Movies watched more than once in the period. Episodes never count:
// working through a show is normal viewing, not re-watching.

use std::collections::HashMap;

use crate::models::{MediaKind, RepeatWatch, WatchEvent};

struct RepeatTotal {
    count: u64,
    timestamps: Vec<i64>,
    first_seen: usize,
}

/// Titles watched at least twice, most-watched first. Ties keep the
/// first-encountered title ahead.
pub fn detect_repeat_watches(events: &[WatchEvent]) -> Vec<RepeatWatch> {
    let mut totals: HashMap<String, RepeatTotal> = HashMap::new();
    let mut next_index = 0;

    for event in events {
        if event.media_kind != MediaKind::Movie || event.title.is_empty() {
            continue;
        }
        if let Some(entry) = totals.get_mut(&event.title) {
            entry.count += 1;
            if let Some(ts) = event.event_ts {
                entry.timestamps.push(ts);
            }
        } else {
            let mut timestamps = Vec::new();
            if let Some(ts) = event.event_ts {
                timestamps.push(ts);
            }
            totals.insert(
                event.title.clone(),
                RepeatTotal {
                    count: 1,
                    timestamps,
                    first_seen: next_index,
                },
            );
            next_index += 1;
        }
    }

    let mut repeats: Vec<(String, RepeatTotal)> = totals
        .into_iter()
        .filter(|(_, total)| total.count > 1)
        .collect();
    repeats.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });
    repeats
        .into_iter()
        .map(|(title, total)| RepeatWatch {
            title,
            count: total.count,
            timestamps: total.timestamps,
        })
        .collect()
}
