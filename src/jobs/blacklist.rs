use super::{Operation, OperationReport, SyncContext};
use crate::observer::SyncEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Blacklists, for one storm, every artist referenced by a playlist's active
/// entries. Rows are append-only; already blacklisted artists are skipped.
pub struct BlacklistSync {
    storm_name: String,
    playlist_id: String,
}

impl BlacklistSync {
    pub fn new(storm_name: impl Into<String>, playlist_id: impl Into<String>) -> Self {
        Self {
            storm_name: storm_name.into(),
            playlist_id: playlist_id.into(),
        }
    }
}

#[async_trait]
impl Operation for BlacklistSync {
    fn name(&self) -> &str {
        "blacklist_sync"
    }

    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport> {
        let mut report = OperationReport::new(self.name());
        report.processed = 1;
        match ctx
            .store
            .blacklist_artists_of_playlist(&self.playlist_id, &self.storm_name)
        {
            Ok(added) => ctx.emit(SyncEvent::ArtistsBlacklisted {
                storm_name: self.storm_name.clone(),
                playlist_id: self.playlist_id.clone(),
                added: added.len(),
            }),
            Err(e) => report.fail(ctx, &self.playlist_id, &e),
        }
        Ok(report)
    }
}
