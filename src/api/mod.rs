pub mod mock;
pub mod spotify;
pub mod spotify_auth;

use crate::pagination::{collect_all, Page};
use crate::util::track_uri;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

/// Most track ids a single playlist write may carry.
pub const MAX_WRITE_BATCH: usize = 100;

/// The remote catalog the sync operations pull from and write back to.
/// Implementations: spotify::SpotifyCatalog, mock::MockCatalog.
///
/// Page methods take the continuation token of the previous page (`None` for
/// the first one) and return raw wire payloads; mapping them into entities is
/// the store's job.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Return the source's name (for logging)
    fn name(&self) -> &str;

    async fn fetch_playlist_metadata(&self, playlist_id: &str) -> Result<Value>;

    /// Items are playlist entries: `{added_at, added_by, is_local, track}`.
    async fn fetch_playlist_tracks_page(&self, playlist_id: &str, cursor: Option<String>) -> Result<Page<Value>>;

    async fn fetch_artist_albums_page(&self, artist_id: &str, cursor: Option<String>) -> Result<Page<Value>>;

    async fn fetch_album_tracks_page(&self, album_id: &str, cursor: Option<String>) -> Result<Page<Value>>;

    /// Replace the playlist contents with `uris` (at most [`MAX_WRITE_BATCH`]).
    async fn replace_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Append `uris` (at most [`MAX_WRITE_BATCH`]) to the playlist.
    async fn append_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;
}

pub async fn fetch_playlist_tracks(source: &dyn CatalogSource, playlist_id: &str) -> Result<Vec<Value>> {
    collect_all(|cursor| source.fetch_playlist_tracks_page(playlist_id, cursor))
        .await
        .with_context(|| format!("listing tracks of playlist {}", playlist_id))
}

pub async fn fetch_artist_albums(source: &dyn CatalogSource, artist_id: &str) -> Result<Vec<Value>> {
    collect_all(|cursor| source.fetch_artist_albums_page(artist_id, cursor))
        .await
        .with_context(|| format!("listing albums of artist {}", artist_id))
}

pub async fn fetch_album_tracks(source: &dyn CatalogSource, album_id: &str) -> Result<Vec<Value>> {
    collect_all(|cursor| source.fetch_album_tracks_page(album_id, cursor))
        .await
        .with_context(|| format!("listing tracks of album {}", album_id))
}

/// Writes `track_ids` to the playlist in batches of at most `batch_size`
/// (clamped to `1..=MAX_WRITE_BATCH`). With `overwrite_first_batch` the first
/// batch replaces the existing contents, so an empty id list clears the
/// playlist; every later batch appends. Returns the number of calls made.
pub async fn write_tracks_to_playlist(
    source: &dyn CatalogSource,
    playlist_id: &str,
    track_ids: &[String],
    overwrite_first_batch: bool,
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.clamp(1, MAX_WRITE_BATCH);
    let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();

    if uris.is_empty() {
        if overwrite_first_batch {
            source.replace_playlist_tracks(playlist_id, &[]).await?;
            return Ok(1);
        }
        return Ok(0);
    }

    let mut calls = 0;
    for (index, batch) in uris.chunks(batch_size).enumerate() {
        if index == 0 && overwrite_first_batch {
            source
                .replace_playlist_tracks(playlist_id, batch)
                .await
                .with_context(|| format!("replacing tracks of playlist {}", playlist_id))?;
        } else {
            source
                .append_playlist_tracks(playlist_id, batch)
                .await
                .with_context(|| format!("appending batch {} to playlist {}", index, playlist_id))?;
        }
        calls += 1;
    }
    debug!("Wrote {} tracks to {} in {} calls", uris.len(), playlist_id, calls);
    Ok(calls)
}
