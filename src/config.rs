use crate::store::{AlbumTrackPolicy, ArtistAlbumPolicy};
use crate::util::days_ago;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub spotify: SpotifySettings,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifySettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Enables the refresh-token grant, which playlist write-back needs.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default = "default_album_groups")]
    pub album_groups: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Albums that failed track collection this many times are skipped.
    #[serde(default = "default_album_fail_cap")]
    pub album_fail_cap: u32,
    #[serde(default)]
    pub album_refresh_days: Option<u32>,
    #[serde(default)]
    pub artist_refresh_days: Option<u32>,
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("storm-sync").join("storm.db"))
        .unwrap_or_else(|| "storm.db".into())
}
fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("storm-sync").join("logs"))
        .unwrap_or_else(|| "logs".into())
}
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_market() -> String { "US".into() }
fn default_album_groups() -> String { "album,single".into() }
fn default_http_timeout() -> u64 { 30 }
fn default_max_rate_limit_retries() -> u32 { 3 }
fn default_album_fail_cap() -> u32 { 3 }
fn default_write_batch_size() -> usize { 100 }

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: None,
            api_base: default_api_base(),
            auth_base: default_auth_base(),
            market: default_market(),
            album_groups: default_album_groups(),
            http_timeout_secs: default_http_timeout(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

impl SpotifySettings {
    /// Fills empty credentials from `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`
    /// and `SPOTIFY_REFRESH_TOKEN`.
    pub fn apply_env(&mut self) {
        if self.client_id.is_empty() {
            if let Ok(v) = std::env::var("SPOTIFY_CLIENT_ID") {
                self.client_id = v;
            }
        }
        if self.client_secret.is_empty() {
            if let Ok(v) = std::env::var("SPOTIFY_CLIENT_SECRET") {
                self.client_secret = v;
            }
        }
        if self.refresh_token.as_deref().map_or(true, str::is_empty) {
            self.refresh_token = std::env::var("SPOTIFY_REFRESH_TOKEN").ok().filter(|t| !t.is_empty());
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            album_fail_cap: default_album_fail_cap(),
            album_refresh_days: None,
            artist_refresh_days: None,
            write_batch_size: default_write_batch_size(),
        }
    }
}

impl SyncConfig {
    pub fn artist_policy(&self) -> ArtistAlbumPolicy {
        ArtistAlbumPolicy::from_cutoff(days_ago(self.artist_refresh_days))
    }

    pub fn album_policy(&self) -> AlbumTrackPolicy {
        AlbumTrackPolicy::from_cutoff(days_ago(self.album_refresh_days))
    }

    /// `write_batch_size` clamped to what one playlist write accepts.
    pub fn batch_size(&self) -> usize {
        self.write_batch_size.clamp(1, crate::api::MAX_WRITE_BATCH)
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&s)?;
        cfg.spotify.apply_env();
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            spotify: SpotifySettings::default(),
            sync: SyncConfig::default(),
        }
    }
}
