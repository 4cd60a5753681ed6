use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Drops repeated ids, keeping the first occurrence of each.
pub fn dedupe_preserving_order<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// `spotify:track:{id}`; ids that are already URIs pass through.
pub fn track_uri(track_id: &str) -> String {
    if track_id.starts_with("spotify:") {
        track_id.to_string()
    } else {
        format!("spotify:track:{}", track_id)
    }
}

/// Cutoff `days` before now, if a refresh age is configured.
pub fn days_ago(days: Option<u32>) -> Option<DateTime<Utc>> {
    days.map(|d| Utc::now() - Duration::days(i64::from(d)))
}
