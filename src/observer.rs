//! Observer passed to operations through their context.
//!
//! Operations report what happened as [`SyncEvent`]s instead of logging
//! directly. [`TracingObserver`] is the default sink; tests use
//! [`RecordingObserver`] to assert on the emitted events.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    OperationStarted {
        operation: String,
    },
    OperationFinished {
        operation: String,
        processed: usize,
        failed: usize,
        elapsed_ms: u64,
    },
    /// The operation aborted as a whole; the job moves on to the next one.
    OperationFailed {
        operation: String,
        error: String,
    },
    /// One resource failed; the operation carried on with the next one.
    ResourceFailed {
        operation: String,
        resource_id: String,
        error: String,
    },
    /// A payload failed validation and was skipped.
    ItemRejected {
        resource_id: String,
        reason: String,
    },
    PlaylistSynced {
        playlist_id: String,
        upserted: usize,
        rejected: usize,
        soft_deleted: usize,
    },
    ArtistDiscovered {
        artist_id: String,
        name: String,
    },
    AlbumDiscovered {
        album_id: String,
        artist_id: String,
    },
    ArtistAlbumsChecked {
        artist_id: String,
        seen: usize,
        discovered: usize,
    },
    AlbumTracksCollected {
        album_id: String,
        tracks: usize,
    },
    /// The album yielded no tracks. `fail_count` is `None` for an unknown album.
    AlbumCollectionFailed {
        album_id: String,
        fail_count: Option<u32>,
        reason: Option<String>,
    },
    ArtistsBlacklisted {
        storm_name: String,
        playlist_id: String,
        added: usize,
    },
    TracksWritten {
        playlist_id: String,
        tracks: usize,
        calls: usize,
    },
}

pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::OperationStarted { operation } => info!(operation = %operation, "operation started"),
            SyncEvent::OperationFinished {
                operation,
                processed,
                failed,
                elapsed_ms,
            } => info!(
                operation = %operation,
                processed = *processed,
                failed = *failed,
                elapsed_ms = *elapsed_ms,
                "operation finished"
            ),
            SyncEvent::OperationFailed { operation, error } => {
                warn!(operation = %operation, error = %error, "operation failed")
            }
            SyncEvent::ResourceFailed {
                operation,
                resource_id,
                error,
            } => warn!(operation = %operation, resource_id = %resource_id, error = %error, "resource failed"),
            SyncEvent::ItemRejected { resource_id, reason } => {
                warn!(resource_id = %resource_id, reason = %reason, "item rejected")
            }
            SyncEvent::PlaylistSynced {
                playlist_id,
                upserted,
                rejected,
                soft_deleted,
            } => info!(
                playlist_id = %playlist_id,
                upserted = *upserted,
                rejected = *rejected,
                soft_deleted = *soft_deleted,
                "playlist synced"
            ),
            SyncEvent::ArtistDiscovered { artist_id, name } => {
                info!(artist_id = %artist_id, name = %name, "artist discovered")
            }
            SyncEvent::AlbumDiscovered { album_id, artist_id } => {
                debug!(album_id = %album_id, artist_id = %artist_id, "album discovered")
            }
            SyncEvent::ArtistAlbumsChecked {
                artist_id,
                seen,
                discovered,
            } => debug!(artist_id = %artist_id, seen = *seen, discovered = *discovered, "artist albums checked"),
            SyncEvent::AlbumTracksCollected { album_id, tracks } => {
                debug!(album_id = %album_id, tracks = *tracks, "album tracks collected")
            }
            SyncEvent::AlbumCollectionFailed {
                album_id,
                fail_count,
                reason,
            } => warn!(
                album_id = %album_id,
                fail_count = ?fail_count,
                reason = reason.as_deref().unwrap_or("no tracks returned"),
                "album track collection failed"
            ),
            SyncEvent::ArtistsBlacklisted {
                storm_name,
                playlist_id,
                added,
            } => info!(storm = %storm_name, playlist_id = %playlist_id, added = *added, "artists blacklisted"),
            SyncEvent::TracksWritten {
                playlist_id,
                tracks,
                calls,
            } => info!(playlist_id = %playlist_id, tracks = *tracks, calls = *calls, "tracks written"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sends each event to several observers in order.
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn SyncObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.push(observer);
    }
}

impl SyncObserver for FanoutObserver {
    fn on_event(&self, event: &SyncEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_reaches_every_observer() {
        let a = Arc::new(RecordingObserver::new());
        let b = Arc::new(RecordingObserver::new());
        let observers: Vec<Arc<dyn SyncObserver>> = vec![a.clone(), b.clone(), Arc::new(TracingObserver)];
        let fanout = FanoutObserver::new(observers);
        fanout.on_event(&SyncEvent::OperationStarted {
            operation: "playlist_sync".into(),
        });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.count(|e| matches!(e, SyncEvent::OperationStarted { .. })), 1);
    }
}
