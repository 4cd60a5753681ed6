use super::{Operation, OperationReport, SyncContext};
use crate::api::fetch_album_tracks;
use crate::observer::SyncEvent;
use crate::store::{AlbumTrackPolicy, Rejection};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Collects the tracks of every album due under the policy.
///
/// A non-empty listing is ingested and advances `tracks_collected_date`. An
/// empty listing, or a fetch error, bumps `track_collection_fail_count`
/// instead; albums at the configured fail cap are no longer selected.
#[derive(Default)]
pub struct AlbumTrackCollection {
    policy: Option<AlbumTrackPolicy>,
}

impl AlbumTrackCollection {
    /// Uses the policy derived from the context's sync settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: AlbumTrackPolicy) -> Self {
        Self {
            policy: Some(policy),
        }
    }

    fn record_failure(&self, ctx: &SyncContext, album_id: &str, reason: Option<String>) -> Result<()> {
        let fail_count = ctx
            .store
            .record_album_collection_failure(album_id)
            .with_context(|| format!("recording collection failure of album {}", album_id))?;
        ctx.emit(SyncEvent::AlbumCollectionFailed {
            album_id: album_id.to_string(),
            fail_count,
            reason,
        });
        Ok(())
    }

    /// Returns the track payloads that failed validation.
    async fn collect_one(&self, ctx: &SyncContext, album_id: &str) -> Result<Vec<Rejection>> {
        let (tracks, reason) = match fetch_album_tracks(ctx.source.as_ref(), album_id).await {
            Ok(tracks) => (tracks, None),
            Err(e) => (Vec::new(), Some(format!("{:#}", e))),
        };

        if tracks.is_empty() {
            self.record_failure(ctx, album_id, reason)?;
            return Ok(Vec::new());
        }

        let summary = ctx
            .store
            .ingest_album_tracks(album_id, &tracks)
            .with_context(|| format!("storing tracks of album {}", album_id))?;
        if summary.stored == 0 {
            let reason = format!("all {} tracks rejected", tracks.len());
            self.record_failure(ctx, album_id, Some(reason))?;
            return Ok(summary.rejected);
        }
        ctx.emit(SyncEvent::AlbumTracksCollected {
            album_id: album_id.to_string(),
            tracks: summary.stored,
        });
        Ok(summary.rejected)
    }
}

#[async_trait]
impl Operation for AlbumTrackCollection {
    fn name(&self) -> &str {
        "album_track_collection"
    }

    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport> {
        let policy = self.policy.unwrap_or_else(|| ctx.settings.album_policy());
        let albums = ctx
            .store
            .albums_for_track_collection(&policy, Some(ctx.settings.album_fail_cap))
            .context("selecting albums for track collection")?;

        let mut report = OperationReport::new(self.name());
        for album in albums {
            report.processed += 1;
            match self.collect_one(ctx, &album.id).await {
                Ok(rejected) => report.reject_all(ctx, &rejected),
                Err(e) => report.fail(ctx, &album.id, &e),
            }
        }
        Ok(report)
    }
}
