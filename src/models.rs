//! Catalog entities and their mapping from loosely-structured wire payloads.
//!
//! Every `from_wire` constructor is pure: it never reads the clock or the
//! store. Optional wire fields fall back to explicit defaults; only the
//! required field set of each entity can make a mapping fail.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A payload could not be turned into an entity because a required field was
/// missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} is missing required field `{field}`")]
pub struct ValidationError {
    pub entity: &'static str,
    pub field: &'static str,
}

impl ValidationError {
    pub fn new(entity: &'static str, field: &'static str) -> Self {
        Self { entity, field }
    }
}

fn opt_str(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(Value::as_str).map(str::to_string)
}

fn req_str(json: &Value, entity: &'static str, key: &'static str) -> Result<String, ValidationError> {
    match json.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ValidationError::new(entity, key)),
    }
}

fn opt_bool(json: &Value, key: &str) -> Option<bool> {
    json.get(key).and_then(Value::as_bool)
}

fn opt_u32(json: &Value, key: &str) -> Option<u32> {
    json.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn opt_u64(json: &Value, key: &str) -> Option<u64> {
    json.get(key).and_then(Value::as_u64)
}

fn str_list(json: &Value, key: &str) -> Vec<String> {
    json.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn value_list(json: &Value, key: &str) -> Vec<Value> {
    json.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `followers` arrives either as `{"total": n}` or as a bare number.
fn followers_total(json: &Value) -> Option<u64> {
    match json.get("followers") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(obj @ Value::Object(_)) => opt_u64(obj, "total"),
        _ => None,
    }
}

/// Operator-created configuration for one storm run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StormConfig {
    pub storm_name: String,
    #[serde(default)]
    pub input_playlists: Vec<String>,
    #[serde(default)]
    pub artist_blacklist_playlist: Option<String>,
    #[serde(default)]
    pub target_playlist: Option<String>,
}

impl StormConfig {
    pub fn new(storm_name: impl Into<String>, input_playlists: Vec<String>) -> Self {
        Self {
            storm_name: storm_name.into(),
            input_playlists,
            artist_blacklist_playlist: None,
            target_playlist: None,
        }
    }
}

/// Minimal artist reference embedded in tracks and albums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ArtistRef {
    fn from_wire(json: &Value) -> Option<Self> {
        let id = json.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;
        Some(Self {
            id: id.to_string(),
            name: opt_str(json, "name"),
        })
    }
}

/// Minimal album reference embedded in tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<Value>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub sys_last_updated: Option<DateTime<Utc>>,
}

impl Playlist {
    pub fn from_wire(json: &Value) -> Result<Self, ValidationError> {
        Ok(Self {
            id: req_str(json, "Playlist", "id")?,
            name: req_str(json, "Playlist", "name")?,
            owner: json.get("owner").filter(|v| !v.is_null()).cloned(),
            public: opt_bool(json, "public"),
            collaborative: opt_bool(json, "collaborative"),
            description: opt_str(json, "description"),
            followers: followers_total(json),
            snapshot_id: opt_str(json, "snapshot_id"),
            kind: opt_str(json, "type"),
            sys_last_updated: None,
        })
    }
}

/// One entry of a playlist. Identity is the `(track_id, playlist_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistTrack {
    #[serde(rename = "_id")]
    pub id: String,
    pub playlist_id: String,
    pub track_id: String,
    /// Track payload exactly as it was observed in the playlist listing.
    pub track: Value,
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub added_by: Option<Value>,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub sys_last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sys_is_deleted: bool,
}

impl PlaylistTrack {
    pub fn composite_id(track_id: &str, playlist_id: &str) -> String {
        format!("{}{}", track_id, playlist_id)
    }

    /// Maps a playlist listing item. The embedded track must itself be a
    /// valid [`Track`], which is returned alongside so callers can persist it.
    pub fn from_wire(playlist_id: &str, item: &Value) -> Result<(Self, Track), ValidationError> {
        if playlist_id.is_empty() {
            return Err(ValidationError::new("PlaylistTrack", "playlist_id"));
        }
        let snapshot = match item.get("track") {
            Some(t @ Value::Object(_)) => t,
            _ => return Err(ValidationError::new("PlaylistTrack", "track")),
        };
        let track = Track::from_wire(snapshot)?;
        let entry = Self {
            id: Self::composite_id(&track.id, playlist_id),
            playlist_id: playlist_id.to_string(),
            track_id: track.id.clone(),
            track: snapshot.clone(),
            added_at: opt_str(item, "added_at"),
            added_by: item.get("added_by").filter(|v| !v.is_null()).cloned(),
            is_local: opt_bool(item, "is_local").unwrap_or(false),
            sys_last_updated: None,
            sys_is_deleted: false,
        };
        Ok((entry, track))
    }

    pub fn artist_ids(&self) -> Vec<String> {
        self.track
            .get("artists")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(ArtistRef::from_wire).map(|r| r.id).collect())
            .unwrap_or_default()
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.sys_last_updated = Some(at);
        self.sys_is_deleted = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub disc_number: Option<u32>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub available_markets: Vec<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Track {
    /// Checks `id`, `name`, `artists` and `album` in that order; the error
    /// names the first one that is missing. Every artist needs an id and a name.
    pub fn from_wire(json: &Value) -> Result<Self, ValidationError> {
        let id = req_str(json, "Track", "id")?;
        let name = req_str(json, "Track", "name")?;

        let raw_artists = json
            .get("artists")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ValidationError::new("Track", "artists"))?;
        let artists = raw_artists
            .iter()
            .map(|a| ArtistRef::from_wire(a).filter(|r| r.name.as_deref().is_some_and(|n| !n.is_empty())))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ValidationError::new("Track", "artists"))?;

        let album = json
            .get("album")
            .and_then(|a| {
                let id = a.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;
                Some(AlbumRef {
                    id: id.to_string(),
                    name: opt_str(a, "name"),
                    release_date: opt_str(a, "release_date"),
                })
            })
            .ok_or_else(|| ValidationError::new("Track", "album"))?;

        Ok(Self {
            id,
            name,
            artists,
            album,
            duration_ms: opt_u64(json, "duration_ms"),
            explicit: opt_bool(json, "explicit"),
            popularity: opt_u32(json, "popularity"),
            track_number: opt_u32(json, "track_number"),
            disc_number: opt_u32(json, "disc_number"),
            uri: opt_str(json, "uri"),
            href: opt_str(json, "href"),
            preview_url: opt_str(json, "preview_url"),
            available_markets: str_list(json, "available_markets"),
            last_updated: None,
        })
    }

    pub fn has_artist(&self, artist_id: &str) -> bool {
        self.artists.iter().any(|a| a.id == artist_id)
    }
}

/// Forces the `album` reference of a track payload to point at `album_id`,
/// keeping any other album fields the payload carried. Returns `None` when
/// the payload is not a JSON object.
pub fn with_album_id(track: &Value, album_id: &str) -> Option<Value> {
    let mut track = track.clone();
    let map = track.as_object_mut()?;
    match map.get_mut("album") {
        Some(Value::Object(album)) => {
            album.insert("id".into(), Value::String(album_id.to_string()));
        }
        _ => {
            let mut album = Map::new();
            album.insert("id".into(), Value::String(album_id.to_string()));
            map.insert("album".into(), Value::Object(album));
        }
    }
    Some(track)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// `None` means albums were never collected for this artist.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_album_update: Option<DateTime<Utc>>,
}

impl Artist {
    pub fn from_wire(json: &Value) -> Result<Self, ValidationError> {
        Ok(Self {
            id: req_str(json, "Artist", "id")?,
            name: req_str(json, "Artist", "name")?,
            genres: str_list(json, "genres"),
            popularity: opt_u32(json, "popularity"),
            followers: followers_total(json),
            uri: opt_str(json, "uri"),
            href: opt_str(json, "href"),
            images: value_list(json, "images"),
            last_updated: None,
            last_album_update: None,
        })
    }

    pub fn from_ref(artist: &ArtistRef) -> Result<Self, ValidationError> {
        let name = artist
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ValidationError::new("Artist", "name"))?;
        Ok(Self {
            id: artist.id.clone(),
            name,
            genres: Vec::new(),
            popularity: None,
            followers: None,
            uri: None,
            href: None,
            images: Vec::new(),
            last_updated: None,
            last_album_update: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub album_group: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub release_date_precision: Option<String>,
    #[serde(default)]
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// `None` means tracks were never successfully collected.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub tracks_collected_date: Option<DateTime<Utc>>,
    /// Only ever incremented.
    #[serde(default)]
    pub track_collection_fail_count: u32,
}

impl Album {
    pub fn from_wire(json: &Value) -> Result<Self, ValidationError> {
        let artists = json
            .get("artists")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(ArtistRef::from_wire).collect())
            .unwrap_or_default();
        Ok(Self {
            id: req_str(json, "Album", "id")?,
            name: req_str(json, "Album", "name")?,
            artists,
            album_type: opt_str(json, "album_type"),
            album_group: opt_str(json, "album_group"),
            release_date: opt_str(json, "release_date"),
            release_date_precision: opt_str(json, "release_date_precision"),
            total_tracks: opt_u32(json, "total_tracks"),
            uri: opt_str(json, "uri"),
            images: value_list(json, "images"),
            last_updated: None,
            tracks_collected_date: None,
            track_collection_fail_count: 0,
        })
    }

    /// Release date as a calendar day. Year and month precision dates resolve
    /// to the first day of the period.
    pub fn release_day(&self) -> Option<NaiveDate> {
        let raw = self.release_date.as_deref()?.trim();
        match raw.len() {
            4 => NaiveDate::parse_from_str(&format!("{}-01-01", raw), "%Y-%m-%d").ok(),
            7 => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
            _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        }
    }
}

/// An artist excluded from one storm configuration's selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistBlacklist {
    pub artist_id: String,
    pub storm_name: String,
    #[serde(default)]
    pub blacklist_type: Option<String>,
}

impl ArtistBlacklist {
    pub fn key(storm_name: &str, artist_id: &str) -> String {
        format!("{}:{}", storm_name, artist_id)
    }
}

/// Inclusive release-date window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }

    /// Undated albums only pass an unbounded window.
    pub fn admits(&self, album: &Album) -> bool {
        match album.release_day() {
            Some(day) => self.contains(day),
            None => self.is_unbounded(),
        }
    }
}
