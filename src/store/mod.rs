//! The catalog store: keyed document collections plus the typed upsert,
//! reconciliation, discovery and watermark operations built on top of them.

pub mod filter;
pub mod memory;
pub mod policy;

pub use filter::Filter;
pub use memory::MemoryStore;
pub use policy::{AlbumTrackPolicy, ArtistAlbumPolicy};

use crate::models::{
    with_album_id, Album, AlbumRef, Artist, ArtistBlacklist, DateWindow, Playlist, PlaylistTrack,
    StormConfig, Track, ValidationError,
};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The named collections persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Config,
    Playlist,
    PlaylistTrack,
    Track,
    Artist,
    Album,
    ArtistBlacklist,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Config,
        Collection::Playlist,
        Collection::PlaylistTrack,
        Collection::Track,
        Collection::Artist,
        Collection::Album,
        Collection::ArtistBlacklist,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Config => "config",
            Collection::Playlist => "playlist",
            Collection::PlaylistTrack => "playlist_track",
            Collection::Track => "track",
            Collection::Artist => "artist",
            Collection::Album => "album",
            Collection::ArtistBlacklist => "artist_blacklist",
        }
    }
}

/// Keyed JSON document persistence with predicate queries.
///
/// Writes are synchronous and visible to every later read.
pub trait DocumentStore: Send + Sync {
    /// Replaces the document stored under `id`, creating it if absent.
    fn put(&self, collection: Collection, id: &str, doc: &Value) -> Result<()>;

    /// Stores the document only if `id` is unused. Returns true if it was written.
    fn insert_new(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    /// Documents matching `filter`, ordered by id.
    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>>;

    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        Ok(self.find(collection, filter)?.len())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} document `{id}` already exists")]
    AlreadyExists { collection: &'static str, id: String },
    #[error("corrupt {collection} document: {reason}")]
    CorruptDocument {
        collection: &'static str,
        reason: String,
    },
}

/// An entity persisted in one collection under a stable key.
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    fn key(&self) -> String;
}

impl Document for StormConfig {
    const COLLECTION: Collection = Collection::Config;
    fn key(&self) -> String {
        self.storm_name.clone()
    }
}

impl Document for Playlist {
    const COLLECTION: Collection = Collection::Playlist;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Document for PlaylistTrack {
    const COLLECTION: Collection = Collection::PlaylistTrack;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Document for Track {
    const COLLECTION: Collection = Collection::Track;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Document for Artist {
    const COLLECTION: Collection = Collection::Artist;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Document for Album {
    const COLLECTION: Collection = Collection::Album;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Document for ArtistBlacklist {
    const COLLECTION: Collection = Collection::ArtistBlacklist;
    fn key(&self) -> String {
        ArtistBlacklist::key(&self.storm_name, &self.artist_id)
    }
}

/// A payload that was rejected during a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub resource_id: String,
    pub error: ValidationError,
}

impl Rejection {
    fn new(payload: &Value, pointer: &str, fallback: String, error: ValidationError) -> Self {
        let resource_id = payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback);
        Self { resource_id, error }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub rejected: Vec<Rejection>,
    /// Composite ids of the rows soft-deleted by this pass.
    pub soft_deleted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumDiscovery {
    pub seen: usize,
    pub discovered: Vec<Album>,
    pub rejected: Vec<Rejection>,
    /// False when the artist is unknown, so no watermark was written.
    pub artist_checked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub stored: usize,
    pub rejected: Vec<Rejection>,
    /// False when the album is unknown, so no watermark was written.
    pub album_marked: bool,
}

/// Typed catalog operations over any [`DocumentStore`] backend.
#[derive(Clone)]
pub struct CatalogStore {
    docs: Arc<dyn DocumentStore>,
}

impl CatalogStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn encode<T: Document>(entity: &T) -> Result<Value> {
        serde_json::to_value(entity)
            .with_context(|| format!("encoding {} document", T::COLLECTION.name()))
    }

    fn decode<T: Document>(doc: Value) -> Result<T> {
        serde_json::from_value(doc).map_err(|e| {
            StoreError::CorruptDocument {
                collection: T::COLLECTION.name(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn put<T: Document>(&self, entity: &T) -> Result<()> {
        self.docs.put(T::COLLECTION, &entity.key(), &Self::encode(entity)?)
    }

    fn insert_new<T: Document>(&self, entity: &T) -> Result<bool> {
        self.docs
            .insert_new(T::COLLECTION, &entity.key(), &Self::encode(entity)?)
    }

    fn get<T: Document>(&self, id: &str) -> Result<Option<T>> {
        self.docs
            .get(T::COLLECTION, id)?
            .map(Self::decode::<T>)
            .transpose()
    }

    fn find<T: Document>(&self, filter: &Filter) -> Result<Vec<T>> {
        self.docs
            .find(T::COLLECTION, filter)?
            .into_iter()
            .map(Self::decode::<T>)
            .collect()
    }

    pub fn count(&self, collection: Collection) -> Result<usize> {
        self.docs.count(collection, &Filter::All)
    }

    // ---------------------------------------------------------------------
    // Storm configs
    // ---------------------------------------------------------------------

    /// Creates a config; a second config with the same name is refused.
    pub fn create_config(&self, config: &StormConfig) -> Result<()> {
        if !self.insert_new(config)? {
            return Err(StoreError::AlreadyExists {
                collection: Collection::Config.name(),
                id: config.storm_name.clone(),
            }
            .into());
        }
        info!("Created storm config {}", config.storm_name);
        Ok(())
    }

    pub fn get_config(&self, storm_name: &str) -> Result<Option<StormConfig>> {
        self.get(storm_name)
    }

    pub fn list_configs(&self) -> Result<Vec<StormConfig>> {
        self.find(&Filter::All)
    }

    // ---------------------------------------------------------------------
    // Playlists
    // ---------------------------------------------------------------------

    /// Replaces the playlist record from a metadata payload.
    pub fn upsert_playlist(&self, wire: &Value) -> Result<Playlist> {
        let mut playlist = Playlist::from_wire(wire)?;
        playlist.sys_last_updated = Some(Utc::now());
        self.put(&playlist)?;
        Ok(playlist)
    }

    pub fn get_playlist(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        self.get(playlist_id)
    }

    /// Upserts one playlist entry and re-saves its embedded track.
    pub fn upsert_playlist_track(&self, playlist_id: &str, item: &Value) -> Result<PlaylistTrack> {
        let (entry, track) = PlaylistTrack::from_wire(playlist_id, item)?;
        self.store_playlist_track(entry, track)
    }

    fn store_playlist_track(&self, mut entry: PlaylistTrack, mut track: Track) -> Result<PlaylistTrack> {
        let now = Utc::now();
        entry.sys_last_updated = Some(now);
        self.put(&entry)?;
        track.last_updated = Some(now);
        self.put(&track)?;
        Ok(entry)
    }

    /// Upserts every incoming entry, then (with `flag_deleted`) soft-deletes
    /// stored active entries of the playlist that the batch did not contain.
    pub fn reconcile_playlist_tracks(
        &self,
        playlist_id: &str,
        items: &[Value],
        flag_deleted: bool,
    ) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let mut present: HashSet<String> = HashSet::new();

        for (index, item) in items.iter().enumerate() {
            match PlaylistTrack::from_wire(playlist_id, item) {
                Ok((entry, track)) => {
                    let entry = self.store_playlist_track(entry, track)?;
                    present.insert(entry.id);
                    summary.upserted += 1;
                }
                Err(error) => {
                    warn!("Skipping item {} of playlist {}: {}", index, playlist_id, error);
                    summary.rejected.push(Rejection::new(
                        item,
                        "/track/id",
                        format!("{}[{}]", playlist_id, index),
                        error,
                    ));
                }
            }
        }

        if flag_deleted {
            let now = Utc::now();
            for mut row in self.playlist_tracks(playlist_id, false)? {
                if present.contains(&row.id) {
                    continue;
                }
                row.soft_delete(now);
                self.put(&row)?;
                debug!("Soft-deleted {} from playlist {}", row.track_id, playlist_id);
                summary.soft_deleted.push(row.id);
            }
        }

        Ok(summary)
    }

    pub fn playlist_tracks(&self, playlist_id: &str, include_deleted: bool) -> Result<Vec<PlaylistTrack>> {
        let mut filter = Filter::eq("playlist_id", playlist_id);
        if !include_deleted {
            filter = filter.and(Filter::eq("sys_is_deleted", false));
        }
        self.find(&filter)
    }

    /// Tracks of a playlist's active entries, falling back to the embedded
    /// snapshot when the track record is missing.
    pub fn tracks_for_playlist(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        for entry in self.playlist_tracks(playlist_id, false)? {
            match self.get_track(&entry.track_id)? {
                Some(track) => tracks.push(track),
                None => match Track::from_wire(&entry.track) {
                    Ok(track) => tracks.push(track),
                    Err(e) => warn!("Unreadable snapshot for {}: {}", entry.id, e),
                },
            }
        }
        Ok(tracks)
    }

    /// Distinct artist ids referenced by a playlist's active entries.
    pub fn artist_ids_for_playlist(&self, playlist_id: &str) -> Result<Vec<String>> {
        let ids = self
            .tracks_for_playlist(playlist_id)?
            .into_iter()
            .flat_map(|t| t.artists.into_iter().map(|a| a.id));
        Ok(crate::util::dedupe_preserving_order(ids))
    }

    // ---------------------------------------------------------------------
    // Tracks
    // ---------------------------------------------------------------------

    pub fn get_track(&self, track_id: &str) -> Result<Option<Track>> {
        self.get(track_id)
    }

    pub fn tracks_for_album(&self, album_id: &str) -> Result<Vec<Track>> {
        self.find(&Filter::eq("album.id", album_id))
    }

    pub fn tracks_for_artist(&self, artist_id: &str) -> Result<Vec<Track>> {
        self.find(&Filter::any_eq("artists", "id", artist_id))
    }

    /// Tracks by `artist_id` on albums of that artist released inside `window`.
    pub fn artist_tracks_by_date(&self, artist_id: &str, window: &DateWindow) -> Result<Vec<Track>> {
        let album_ids: Vec<String> = self
            .albums_for_artist_by_date(artist_id, window)?
            .into_iter()
            .map(|a| a.id)
            .collect();
        if album_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find(
            &Filter::is_in("album.id", album_ids).and(Filter::any_eq("artists", "id", artist_id)),
        )
    }

    // ---------------------------------------------------------------------
    // Artists
    // ---------------------------------------------------------------------

    pub fn get_artist(&self, artist_id: &str) -> Result<Option<Artist>> {
        self.get(artist_id)
    }

    /// Targeted artist update; replaces the stored record.
    pub fn save_artist(&self, artist: &Artist) -> Result<()> {
        self.put(artist)
    }

    /// Creates artist records for every artist the tracks reference that is
    /// not stored yet. Known artists are left untouched. Returns the newly
    /// created records.
    pub fn discover_artists(&self, tracks: &[Track]) -> Result<Vec<Artist>> {
        let mut discovered = Vec::new();
        for artist_ref in tracks.iter().flat_map(|t| t.artists.iter()) {
            let mut artist = match Artist::from_ref(artist_ref) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Cannot create artist {}: {}", artist_ref.id, e);
                    continue;
                }
            };
            artist.last_updated = Some(Utc::now());
            if self.insert_new(&artist)? {
                debug!("Discovered new artist {} ({})", artist.name, artist.id);
                discovered.push(artist);
            }
        }
        Ok(discovered)
    }

    pub fn discover_artists_from_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Artist>> {
        let tracks = self.tracks_for_playlist(playlist_id)?;
        self.discover_artists(&tracks)
    }

    /// Advances the artist's `last_album_update` watermark to now.
    pub fn mark_artist_albums_checked(&self, artist_id: &str) -> Result<bool> {
        match self.get_artist(artist_id)? {
            Some(mut artist) => {
                artist.last_album_update = Some(Utc::now());
                self.put(&artist)?;
                Ok(true)
            }
            None => {
                warn!("Cannot advance album watermark of unknown artist {}", artist_id);
                Ok(false)
            }
        }
    }

    pub fn artists_for_album_collection(&self, policy: &ArtistAlbumPolicy) -> Result<Vec<Artist>> {
        self.find(&policy.filter())
    }

    // ---------------------------------------------------------------------
    // Albums
    // ---------------------------------------------------------------------

    pub fn get_album(&self, album_id: &str) -> Result<Option<Album>> {
        self.get(album_id)
    }

    /// Targeted album update; replaces the stored record.
    pub fn save_album(&self, album: &Album) -> Result<()> {
        self.put(album)
    }

    /// Creates the albums of `artist_id` that are not stored yet, then marks
    /// the artist as checked whether or not anything new turned up.
    pub fn discover_albums(&self, artist_id: &str, albums: &[Value]) -> Result<AlbumDiscovery> {
        let mut outcome = AlbumDiscovery {
            seen: albums.len(),
            ..Default::default()
        };
        for (index, wire) in albums.iter().enumerate() {
            let mut album = match Album::from_wire(wire) {
                Ok(a) => a,
                Err(error) => {
                    warn!("Skipping album {} of artist {}: {}", index, artist_id, error);
                    outcome.rejected.push(Rejection::new(
                        wire,
                        "/id",
                        format!("{}[{}]", artist_id, index),
                        error,
                    ));
                    continue;
                }
            };
            album.last_updated = Some(Utc::now());
            if self.insert_new(&album)? {
                debug!("Discovered new album {} ({}) for artist {}", album.name, album.id, artist_id);
                outcome.discovered.push(album);
            }
        }
        outcome.artist_checked = self.mark_artist_albums_checked(artist_id)?;
        Ok(outcome)
    }

    pub fn albums_for_artist(&self, artist_id: &str) -> Result<Vec<Album>> {
        self.find(&Filter::any_eq("artists", "id", artist_id))
    }

    pub fn albums_for_artist_by_date(&self, artist_id: &str, window: &DateWindow) -> Result<Vec<Album>> {
        Ok(self
            .albums_for_artist(artist_id)?
            .into_iter()
            .filter(|a| window.admits(a))
            .collect())
    }

    /// Stores the album's tracks with their album reference forced to
    /// `album_id`, then advances the album's `tracks_collected_date`. The
    /// watermark stays put when no track survived validation.
    pub fn ingest_album_tracks(&self, album_id: &str, tracks: &[Value]) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let album = self.get_album(album_id)?;
        let now = Utc::now();

        for (index, wire) in tracks.iter().enumerate() {
            let fallback = format!("{}[{}]", album_id, index);
            let parsed = with_album_id(wire, album_id)
                .ok_or_else(|| ValidationError::new("Track", "id"))
                .and_then(|forced| Track::from_wire(&forced));
            let mut track = match parsed {
                Ok(t) => t,
                Err(error) => {
                    warn!("Skipping track {} of album {}: {}", index, album_id, error);
                    summary.rejected.push(Rejection::new(wire, "/id", fallback, error));
                    continue;
                }
            };
            if let Some(album) = &album {
                fill_album_ref(&mut track.album, album);
            }
            track.last_updated = Some(now);
            self.put(&track)?;
            summary.stored += 1;
        }

        match album {
            Some(_) if summary.stored == 0 => {
                warn!("No valid tracks for album {}; watermark left as is", album_id)
            }
            Some(mut album) => {
                album.tracks_collected_date = Some(now);
                self.put(&album)?;
                summary.album_marked = true;
            }
            None => warn!("Cannot advance track watermark of unknown album {}", album_id),
        }
        Ok(summary)
    }

    /// Bumps the album's fail counter; `tracks_collected_date` is left as is.
    /// Returns the new count, or `None` for an unknown album.
    pub fn record_album_collection_failure(&self, album_id: &str) -> Result<Option<u32>> {
        let Some(mut album) = self.get_album(album_id)? else {
            warn!("Cannot record collection failure of unknown album {}", album_id);
            return Ok(None);
        };
        album.track_collection_fail_count = album.track_collection_fail_count.saturating_add(1);
        self.put(&album)?;
        Ok(Some(album.track_collection_fail_count))
    }

    pub fn albums_for_track_collection(
        &self,
        policy: &AlbumTrackPolicy,
        fail_cap: Option<u32>,
    ) -> Result<Vec<Album>> {
        self.find(&policy.filter(fail_cap))
    }

    // ---------------------------------------------------------------------
    // Blacklist
    // ---------------------------------------------------------------------

    /// Returns true when the artist was not blacklisted for the storm before.
    pub fn blacklist_artist(&self, artist_id: &str, storm_name: &str, blacklist_type: Option<&str>) -> Result<bool> {
        let row = ArtistBlacklist {
            artist_id: artist_id.to_string(),
            storm_name: storm_name.to_string(),
            blacklist_type: blacklist_type.map(str::to_string),
        };
        self.insert_new(&row)
    }

    /// Blacklists every artist reachable from the playlist's active entries.
    /// Returns the artist ids that were newly added.
    pub fn blacklist_artists_of_playlist(&self, playlist_id: &str, storm_name: &str) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for artist_id in self.artist_ids_for_playlist(playlist_id)? {
            if self.blacklist_artist(&artist_id, storm_name, Some("playlist"))? {
                added.push(artist_id);
            }
        }
        if !added.is_empty() {
            info!("Blacklisted {} artists for storm {} from playlist {}", added.len(), storm_name, playlist_id);
        }
        Ok(added)
    }

    pub fn list_blacklisted(&self, storm_name: &str) -> Result<Vec<ArtistBlacklist>> {
        self.find(&Filter::eq("storm_name", storm_name))
    }

    pub fn blacklisted_artist_ids(&self, storm_name: &str) -> Result<HashSet<String>> {
        Ok(self
            .list_blacklisted(storm_name)?
            .into_iter()
            .map(|b| b.artist_id)
            .collect())
    }
}

fn fill_album_ref(reference: &mut AlbumRef, album: &Album) {
    if reference.name.is_none() {
        reference.name = Some(album.name.clone());
    }
    if reference.release_date.is_none() {
        reference.release_date = album.release_date.clone();
    }
}
