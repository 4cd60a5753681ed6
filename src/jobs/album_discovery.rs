use super::{Operation, OperationReport, SyncContext};
use crate::api::fetch_artist_albums;
use crate::observer::SyncEvent;
use crate::store::{AlbumDiscovery, ArtistAlbumPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Fetches the album list of every artist due under the policy and creates
/// the albums not stored yet. The artist's `last_album_update` watermark
/// advances after each successful listing, even an empty one.
#[derive(Default)]
pub struct ArtistAlbumDiscovery {
    policy: Option<ArtistAlbumPolicy>,
}

impl ArtistAlbumDiscovery {
    /// Uses the policy derived from the context's sync settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ArtistAlbumPolicy) -> Self {
        Self {
            policy: Some(policy),
        }
    }

    async fn discover_for(&self, ctx: &SyncContext, artist_id: &str) -> Result<AlbumDiscovery> {
        let albums = fetch_artist_albums(ctx.source.as_ref(), artist_id).await?;
        ctx.store
            .discover_albums(artist_id, &albums)
            .with_context(|| format!("storing albums of artist {}", artist_id))
    }
}

#[async_trait]
impl Operation for ArtistAlbumDiscovery {
    fn name(&self) -> &str {
        "artist_album_discovery"
    }

    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport> {
        let policy = self.policy.unwrap_or_else(|| ctx.settings.artist_policy());
        let artists = ctx
            .store
            .artists_for_album_collection(&policy)
            .context("selecting artists for album discovery")?;

        let mut report = OperationReport::new(self.name());
        for artist in artists {
            report.processed += 1;
            match self.discover_for(ctx, &artist.id).await {
                Ok(outcome) => {
                    report.reject_all(ctx, &outcome.rejected);
                    for album in &outcome.discovered {
                        ctx.emit(SyncEvent::AlbumDiscovered {
                            album_id: album.id.clone(),
                            artist_id: artist.id.clone(),
                        });
                    }
                    ctx.emit(SyncEvent::ArtistAlbumsChecked {
                        artist_id: artist.id.clone(),
                        seen: outcome.seen,
                        discovered: outcome.discovered.len(),
                    });
                }
                Err(e) => report.fail(ctx, &artist.id, &e),
            }
        }
        Ok(report)
    }
}
