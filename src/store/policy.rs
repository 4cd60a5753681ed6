//! Watermark selection policies.
//!
//! Artist and album eligibility are kept as separate, explicitly named
//! policies instead of one shared predicate so each caller states which
//! staleness rule it wants.

use super::Filter;
use chrono::{DateTime, Utc};

/// Which artists are due for album discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtistAlbumPolicy {
    /// Only artists whose `last_album_update` was never set.
    #[default]
    NeverChecked,
    /// Artists checked at or before `cutoff`, plus never-checked ones.
    StaleOrNeverChecked { cutoff: DateTime<Utc> },
}

impl ArtistAlbumPolicy {
    pub fn from_cutoff(cutoff: Option<DateTime<Utc>>) -> Self {
        match cutoff {
            Some(cutoff) => Self::StaleOrNeverChecked { cutoff },
            None => Self::NeverChecked,
        }
    }

    pub fn filter(&self) -> Filter {
        let never = Filter::absent("last_album_update");
        match self {
            Self::NeverChecked => never,
            Self::StaleOrNeverChecked { cutoff } => {
                Filter::lte("last_album_update", cutoff.timestamp_millis()).or(never)
            }
        }
    }
}

/// Which albums are due for track collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlbumTrackPolicy {
    /// Only albums whose tracks were never collected.
    #[default]
    NeverCollected,
    /// Albums collected at or before `cutoff`, plus never-collected ones.
    StaleOrNeverCollected { cutoff: DateTime<Utc> },
}

impl AlbumTrackPolicy {
    pub fn from_cutoff(cutoff: Option<DateTime<Utc>>) -> Self {
        match cutoff {
            Some(cutoff) => Self::StaleOrNeverCollected { cutoff },
            None => Self::NeverCollected,
        }
    }

    /// `fail_cap` drops albums that already failed collection that many times.
    pub fn filter(&self, fail_cap: Option<u32>) -> Filter {
        let never = Filter::absent("tracks_collected_date");
        let due = match self {
            Self::NeverCollected => never,
            Self::StaleOrNeverCollected { cutoff } => {
                Filter::lte("tracks_collected_date", cutoff.timestamp_millis()).or(never)
            }
        };
        match fail_cap {
            Some(cap) => due.and(Filter::lt("track_collection_fail_count", cap)),
            None => due,
        }
    }
}
