use super::CatalogSource;
use crate::pagination::Page;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// A playlist write observed by [`MockCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Replace { playlist_id: String, uris: Vec<String> },
    Append { playlist_id: String, uris: Vec<String> },
}

#[derive(Default)]
struct Recorded {
    calls: Vec<String>,
    writes: Vec<WriteCall>,
    contents: HashMap<String, Vec<String>>,
}

/// In-memory catalog source used by tests and `--mock` runs.
///
/// Collections are served in pages of `page_size` items with numeric offset
/// tokens. Unknown playlists are an error; unknown artists and albums have
/// empty listings.
pub struct MockCatalog {
    playlists: HashMap<String, (Value, Vec<Value>)>,
    artist_albums: HashMap<String, Vec<Value>>,
    album_tracks: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    page_size: usize,
    recorded: Mutex<Recorded>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            playlists: HashMap::new(),
            artist_albums: HashMap::new(),
            album_tracks: HashMap::new(),
            failing: HashSet::new(),
            page_size: 2,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_playlist(mut self, playlist_id: &str, name: &str, items: Vec<Value>) -> Self {
        self.playlists
            .insert(playlist_id.to_string(), (playlist_json(playlist_id, name), items));
        self
    }

    pub fn with_artist_albums(mut self, artist_id: &str, albums: Vec<Value>) -> Self {
        self.artist_albums.insert(artist_id.to_string(), albums);
        self
    }

    pub fn with_album_tracks(mut self, album_id: &str, tracks: Vec<Value>) -> Self {
        self.album_tracks.insert(album_id.to_string(), tracks);
        self
    }

    /// Makes every fetch for `id` fail, whatever its kind.
    pub fn fail_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Builds a catalog from a JSON fixture:
    ///
    /// ```json
    /// {"playlists": {"P1": {"name": "..", "items": [..]}},
    ///  "artist_albums": {"A1": [..]},
    ///  "album_tracks": {"AL1": [..]}}
    /// ```
    pub fn from_fixture(fixture: &Value) -> Result<Self> {
        let mut catalog = Self::new();
        if let Some(playlists) = fixture.get("playlists").and_then(Value::as_object) {
            for (id, body) in playlists {
                let name = body.get("name").and_then(Value::as_str).unwrap_or(id.as_str());
                let items = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
                catalog = catalog.with_playlist(id, name, items);
            }
        }
        for (key, target) in [("artist_albums", &mut catalog.artist_albums), ("album_tracks", &mut catalog.album_tracks)] {
            if let Some(map) = fixture.get(key).and_then(Value::as_object) {
                for (id, list) in map {
                    let list = list
                        .as_array()
                        .cloned()
                        .with_context(|| format!("fixture {}.{} is not a list", key, id))?;
                    target.insert(id.clone(), list);
                }
            }
        }
        if let Some(size) = fixture.get("page_size").and_then(Value::as_u64) {
            catalog.page_size = (size as usize).max(1);
        }
        Ok(catalog)
    }

    pub fn from_fixture_path(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Value = serde_json::from_str(&raw)?;
        Self::from_fixture(&fixture)
    }

    fn recorded(&self) -> Result<MutexGuard<'_, Recorded>> {
        self.recorded.lock().map_err(|_| anyhow!("mock catalog lock poisoned"))
    }

    fn record(&self, call: String) -> Result<()> {
        self.recorded()?.calls.push(call);
        Ok(())
    }

    /// Every source call made so far, e.g. `album_tracks:AL1@0`.
    pub fn calls(&self) -> Vec<String> {
        self.recorded().map(|r| r.calls.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.recorded().map(|r| r.writes.clone()).unwrap_or_default()
    }

    /// Playlist contents as left by the writes so far.
    pub fn playlist_contents(&self, playlist_id: &str) -> Vec<String> {
        self.recorded()
            .ok()
            .and_then(|r| r.contents.get(playlist_id).cloned())
            .unwrap_or_default()
    }

    fn check(&self, kind: &str, id: &str) -> Result<()> {
        if self.failing.contains(id) {
            return Err(anyhow!("mock {} fetch failed for {}", kind, id));
        }
        Ok(())
    }

    fn page(&self, kind: &str, id: &str, items: &[Value], cursor: Option<String>) -> Result<Page<Value>> {
        let offset: usize = match cursor {
            Some(token) => token
                .parse()
                .map_err(|_| anyhow!("bad mock cursor `{}`", token))?,
            None => 0,
        };
        self.record(format!("{}:{}@{}", kind, id, offset))?;
        self.check(kind, id)?;
        let end = (offset + self.page_size).min(items.len());
        let slice = items.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next = (end < items.len()).then(|| end.to_string());
        Ok(Page::new(slice, next))
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_playlist_metadata(&self, playlist_id: &str) -> Result<Value> {
        self.record(format!("playlist:{}", playlist_id))?;
        self.check("playlist", playlist_id)?;
        self.playlists
            .get(playlist_id)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| anyhow!("playlist {} not found", playlist_id))
    }

    async fn fetch_playlist_tracks_page(&self, playlist_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let (_, items) = self
            .playlists
            .get(playlist_id)
            .ok_or_else(|| anyhow!("playlist {} not found", playlist_id))?;
        self.page("playlist_tracks", playlist_id, items, cursor)
    }

    async fn fetch_artist_albums_page(&self, artist_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let items = self.artist_albums.get(artist_id).map(Vec::as_slice).unwrap_or_default();
        self.page("artist_albums", artist_id, items, cursor)
    }

    async fn fetch_album_tracks_page(&self, album_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let items = self.album_tracks.get(album_id).map(Vec::as_slice).unwrap_or_default();
        self.page("album_tracks", album_id, items, cursor)
    }

    async fn replace_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        info!("MockCatalog: replace {} -> {} tracks", playlist_id, uris.len());
        let mut recorded = self.recorded()?;
        recorded.writes.push(WriteCall::Replace {
            playlist_id: playlist_id.to_string(),
            uris: uris.to_vec(),
        });
        recorded.contents.insert(playlist_id.to_string(), uris.to_vec());
        Ok(())
    }

    async fn append_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        info!("MockCatalog: append {} -> {} tracks", playlist_id, uris.len());
        let mut recorded = self.recorded()?;
        recorded.writes.push(WriteCall::Append {
            playlist_id: playlist_id.to_string(),
            uris: uris.to_vec(),
        });
        recorded
            .contents
            .entry(playlist_id.to_string())
            .or_default()
            .extend_from_slice(uris);
        Ok(())
    }
}

pub fn playlist_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "owner": {"id": "owner"},
        "public": false,
        "collaborative": false,
        "snapshot_id": format!("snap-{}", id),
        "type": "playlist"
    })
}

/// A track payload; `artists` are `(id, name)` pairs.
pub fn track_json(id: &str, name: &str, artists: &[(&str, &str)], album_id: &str) -> Value {
    let artists: Vec<Value> = artists
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name}))
        .collect();
    json!({
        "id": id,
        "name": name,
        "artists": artists,
        "album": {"id": album_id},
        "duration_ms": 180000,
        "explicit": false,
        "uri": format!("spotify:track:{}", id)
    })
}

/// Wraps a track payload as a playlist listing entry.
pub fn playlist_item(track: Value) -> Value {
    json!({
        "added_at": "2024-01-01T00:00:00Z",
        "added_by": {"id": "owner"},
        "is_local": false,
        "track": track
    })
}

pub fn album_json(id: &str, name: &str, artist_id: &str, release_date: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "artists": [{"id": artist_id}],
        "album_type": "album",
        "album_group": "album",
        "release_date": release_date,
        "release_date_precision": "day",
        "total_tracks": 1
    })
}
