use super::CatalogSource;
use crate::config::SpotifySettings;
use crate::pagination::Page;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const PLAYLIST_FIELDS: &str = "id,name,owner,public,collaborative,description,followers,snapshot_id,type";
const PLAYLIST_PAGE_LIMIT: &str = "100";
const CATALOG_PAGE_LIMIT: &str = "50";

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64, // epoch seconds
}

/// Catalog source backed by the Spotify Web API.
///
/// Reads use a client-credentials token unless a refresh token is configured,
/// in which case the refresh-token grant is used so playlist writes work too.
/// Continuation tokens are the `next` URLs Spotify returns.
pub struct SpotifyCatalog {
    client: Client,
    settings: SpotifySettings,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl SpotifyCatalog {
    pub fn new(settings: SpotifySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings,
            token: tokio::sync::Mutex::new(None),
        })
    }

    fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&format!("{}/{}", self.settings.api_base.trim_end_matches('/'), path))
            .with_context(|| format!("bad api url for {}", path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let params: Vec<(&str, &str)> = match self.settings.refresh_token.as_deref() {
            Some(token) => vec![("grant_type", "refresh_token"), ("refresh_token", token)],
            None => vec![("grant_type", "client_credentials")],
        };
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.settings.client_id, self.settings.client_secret
            ))
        );
        let url = format!("{}/api/token", self.settings.auth_base.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, auth_header)
            .form(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to obtain token: {} - {}", status, body));
        }
        let j: Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("no access_token"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(3600);
        Ok(CachedToken {
            access_token,
            expires_at: Utc::now().timestamp() + expires_in,
        })
    }

    async fn get_bearer(&self) -> Result<String> {
        let mut lock = self.token.lock().await;
        let fresh = lock
            .as_ref()
            .map_or(false, |t| Utc::now().timestamp() + 30 < t.expires_at);
        if !fresh {
            debug!("Spotify token missing or near expiry, requesting a new one");
            *lock = Some(self.request_token().await?);
        }
        let token = lock.as_ref().ok_or_else(|| anyhow!("no token loaded"))?;
        Ok(format!("Bearer {}", token.access_token))
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Sends one API call. A 401 drops the cached token and retries once; a
    /// 429 waits for `Retry-After` up to `max_rate_limit_retries` times.
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Option<Value>> {
        let mut refreshed = false;
        let mut rate_limited: u32 = 0;
        loop {
            let bearer = self.get_bearer().await?;
            let mut req = self
                .client
                .request(method.clone(), url)
                .header(AUTHORIZATION, &bearer)
                .header(ACCEPT, "application/json");
            if let Some(b) = body {
                req = req.header(CONTENT_TYPE, "application/json").json(b);
            }
            let resp = req.send().await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("Got 401 from {}; refreshing token", url);
                self.invalidate_token().await;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(1);
                if rate_limited < self.settings.max_rate_limit_retries {
                    rate_limited += 1;
                    warn!("Rate limited on {}; retrying in {}s", url, retry_after);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                return Err(anyhow!("rate_limited: retry_after={} url={}", retry_after, url));
            }

            if !status.is_success() {
                let txt = resp.text().await.unwrap_or_default();
                return Err(anyhow!("{} {} failed: {} => {}", method, url, status, txt));
            }

            let txt = resp.text().await?;
            if txt.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&txt).context("decoding spotify response")?));
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        self.send(Method::GET, url, None)
            .await?
            .ok_or_else(|| anyhow!("empty response from {}", url))
    }

    async fn get_page(&self, url: &str) -> Result<Page<Value>> {
        let j = self.get_json(url).await?;
        let items = j["items"]
            .as_array()
            .map(|items| items.iter().filter(|v| !v.is_null()).cloned().collect())
            .unwrap_or_default();
        let next = j["next"].as_str().map(|s| s.to_string());
        Ok(Page::new(items, next))
    }

    fn first_or_next(&self, cursor: Option<String>, first: impl FnOnce() -> Result<String>) -> Result<String> {
        match cursor {
            Some(next) => Ok(next),
            None => first(),
        }
    }
}

#[async_trait]
impl CatalogSource for SpotifyCatalog {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn fetch_playlist_metadata(&self, playlist_id: &str) -> Result<Value> {
        let url = self.api_url(
            &format!("playlists/{}", urlencoding::encode(playlist_id)),
            &[("fields", PLAYLIST_FIELDS), ("market", self.settings.market.as_str())],
        )?;
        self.get_json(&url).await
    }

    async fn fetch_playlist_tracks_page(&self, playlist_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let url = self.first_or_next(cursor, || {
            self.api_url(
                &format!("playlists/{}/tracks", urlencoding::encode(playlist_id)),
                &[("limit", PLAYLIST_PAGE_LIMIT), ("market", self.settings.market.as_str())],
            )
        })?;
        self.get_page(&url).await
    }

    async fn fetch_artist_albums_page(&self, artist_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let url = self.first_or_next(cursor, || {
            self.api_url(
                &format!("artists/{}/albums", urlencoding::encode(artist_id)),
                &[
                    ("include_groups", self.settings.album_groups.as_str()),
                    ("limit", CATALOG_PAGE_LIMIT),
                    ("market", self.settings.market.as_str()),
                ],
            )
        })?;
        self.get_page(&url).await
    }

    async fn fetch_album_tracks_page(&self, album_id: &str, cursor: Option<String>) -> Result<Page<Value>> {
        let url = self.first_or_next(cursor, || {
            self.api_url(
                &format!("albums/{}/tracks", urlencoding::encode(album_id)),
                &[("limit", CATALOG_PAGE_LIMIT), ("market", self.settings.market.as_str())],
            )
        })?;
        self.get_page(&url).await
    }

    async fn replace_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let url = self.api_url(&format!("playlists/{}/tracks", urlencoding::encode(playlist_id)), &[])?;
        self.send(Method::PUT, &url, Some(&json!({ "uris": uris }))).await?;
        Ok(())
    }

    async fn append_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let url = self.api_url(&format!("playlists/{}/tracks", urlencoding::encode(playlist_id)), &[])?;
        self.send(Method::POST, &url, Some(&json!({ "uris": uris }))).await?;
        Ok(())
    }
}
