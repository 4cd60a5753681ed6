use super::{Operation, OperationReport, SyncContext};
use crate::api::fetch_playlist_tracks;
use crate::observer::SyncEvent;
use crate::store::ReconcileSummary;
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Pulls metadata and the full track listing of each playlist and reconciles
/// them into the store, soft-deleting entries that disappeared remotely.
/// A failing playlist does not stop the remaining ones.
pub struct PlaylistSync {
    playlist_ids: Vec<String>,
}

impl PlaylistSync {
    pub fn new(playlist_ids: Vec<String>) -> Self {
        Self { playlist_ids }
    }

    async fn sync_one(&self, ctx: &SyncContext, playlist_id: &str) -> Result<ReconcileSummary> {
        let metadata = ctx
            .source
            .fetch_playlist_metadata(playlist_id)
            .await
            .with_context(|| format!("fetching playlist {}", playlist_id))?;
        ctx.store
            .upsert_playlist(&metadata)
            .with_context(|| format!("storing playlist {}", playlist_id))?;
        let items = fetch_playlist_tracks(ctx.source.as_ref(), playlist_id).await?;
        ctx.store.reconcile_playlist_tracks(playlist_id, &items, true)
    }
}

#[async_trait]
impl Operation for PlaylistSync {
    fn name(&self) -> &str {
        "playlist_sync"
    }

    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport> {
        let mut report = OperationReport::new(self.name());
        for playlist_id in &self.playlist_ids {
            report.processed += 1;
            match self.sync_one(ctx, playlist_id).await {
                Ok(summary) => {
                    report.reject_all(ctx, &summary.rejected);
                    ctx.emit(SyncEvent::PlaylistSynced {
                        playlist_id: playlist_id.clone(),
                        upserted: summary.upserted,
                        rejected: summary.rejected.len(),
                        soft_deleted: summary.soft_deleted.len(),
                    });
                }
                Err(e) => report.fail(ctx, playlist_id, &e),
            }
        }
        Ok(report)
    }
}

/// Creates artist records for every artist referenced by the active entries
/// of the given playlists. Known artists are never touched.
pub struct ArtistDiscovery {
    playlist_ids: Vec<String>,
}

impl ArtistDiscovery {
    pub fn new(playlist_ids: Vec<String>) -> Self {
        Self { playlist_ids }
    }
}

#[async_trait]
impl Operation for ArtistDiscovery {
    fn name(&self) -> &str {
        "artist_discovery"
    }

    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport> {
        let mut report = OperationReport::new(self.name());
        for playlist_id in &self.playlist_ids {
            report.processed += 1;
            match ctx.store.discover_artists_from_playlist_tracks(playlist_id) {
                Ok(artists) => {
                    for artist in artists {
                        ctx.emit(SyncEvent::ArtistDiscovered {
                            artist_id: artist.id,
                            name: artist.name,
                        });
                    }
                }
                Err(e) => report.fail(ctx, playlist_id, &e),
            }
        }
        Ok(report)
    }
}
