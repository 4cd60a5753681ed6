//! Read-only track selection over the store. Nothing here calls the remote
//! source or writes.

use crate::models::{DateWindow, StormConfig, Track};
use crate::store::CatalogStore;
use crate::util::dedupe_preserving_order;
use anyhow::Result;
use std::collections::HashSet;

/// Tracks by a set of artists on albums released inside a date window.
pub struct ArtistTrackBuilder<'a> {
    store: &'a CatalogStore,
}

impl<'a> ArtistTrackBuilder<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    /// De-duplicated by track id, in artist order.
    pub fn tracks(&self, artist_ids: &[String], window: &DateWindow) -> Result<Vec<Track>> {
        let mut seen = HashSet::new();
        let mut tracks = Vec::new();
        for artist_id in artist_ids {
            for track in self.store.artist_tracks_by_date(artist_id, window)? {
                if seen.insert(track.id.clone()) {
                    tracks.push(track);
                }
            }
        }
        Ok(tracks)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Artists of the source playlists that survived the blacklist.
    pub artist_ids: Vec<String>,
    /// Artists dropped because the storm blacklists them.
    pub blacklisted: Vec<String>,
    pub tracks: Vec<Track>,
}

impl Selection {
    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Resolves the artists of one or more source playlists, removes the storm's
/// blacklisted artists, and collects their tracks for a release window.
pub struct TrackSelectionBuilder<'a> {
    store: &'a CatalogStore,
    storm_name: String,
    playlists: Vec<String>,
    window: DateWindow,
}

impl<'a> TrackSelectionBuilder<'a> {
    pub fn new(store: &'a CatalogStore, storm_name: impl Into<String>) -> Self {
        Self {
            store,
            storm_name: storm_name.into(),
            playlists: Vec::new(),
            window: DateWindow::unbounded(),
        }
    }

    /// Builder preloaded with the config's input playlists.
    pub fn for_config(store: &'a CatalogStore, config: &StormConfig) -> Self {
        Self::new(store, config.storm_name.clone()).playlists(config.input_playlists.iter().cloned())
    }

    pub fn playlists(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.playlists.extend(ids);
        self
    }

    pub fn window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn build(&self) -> Result<Selection> {
        let mut referenced = Vec::new();
        for playlist_id in &self.playlists {
            referenced.extend(self.store.artist_ids_for_playlist(playlist_id)?);
        }
        let referenced = dedupe_preserving_order(referenced);

        let banned = self.store.blacklisted_artist_ids(&self.storm_name)?;
        let (blacklisted, artist_ids): (Vec<String>, Vec<String>) =
            referenced.into_iter().partition(|id| banned.contains(id));

        let tracks = ArtistTrackBuilder::new(self.store).tracks(&artist_ids, &self.window)?;
        tracing::debug!(
            storm = %self.storm_name,
            artists = artist_ids.len(),
            blacklisted = blacklisted.len(),
            tracks = tracks.len(),
            "selection built"
        );
        Ok(Selection {
            artist_ids,
            blacklisted,
            tracks,
        })
    }
}
