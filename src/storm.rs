//! A full storm run: harvest the catalog around one storm config, select
//! tracks, and write them back to the config's target playlist.

use crate::api::write_tracks_to_playlist;
use crate::jobs::{
    AlbumTrackCollection, ArtistAlbumDiscovery, ArtistDiscovery, BlacklistSync, Job, JobReport,
    PlaylistSync, SyncContext,
};
use crate::models::{DateWindow, StormConfig};
use crate::observer::SyncEvent;
use crate::selection::{Selection, TrackSelectionBuilder};
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, Default)]
pub struct StormRunOptions {
    pub window: DateWindow,
    /// Select but do not write back.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct StormRunReport {
    pub storm_name: String,
    pub harvest: JobReport,
    pub selection: Selection,
    /// Playlist the selection went to, if it was written.
    pub written_to: Option<String>,
    pub write_calls: usize,
}

/// Harvest operations for one config, in run order: playlist sync of the
/// input and blacklist playlists, artist discovery over the inputs, blacklist
/// ingestion, album discovery, then track collection.
pub fn harvest_job(config: &StormConfig) -> Job {
    let mut synced = config.input_playlists.clone();
    if let Some(blacklist) = &config.artist_blacklist_playlist {
        if !synced.contains(blacklist) {
            synced.push(blacklist.clone());
        }
    }

    let mut job = Job::new(format!("storm:{}", config.storm_name))
        .then(PlaylistSync::new(synced))
        .then(ArtistDiscovery::new(config.input_playlists.clone()));
    if let Some(blacklist) = &config.artist_blacklist_playlist {
        job = job.then(BlacklistSync::new(config.storm_name.clone(), blacklist.clone()));
    }
    job.then(ArtistAlbumDiscovery::new())
        .then(AlbumTrackCollection::new())
}

pub async fn run_storm(ctx: &SyncContext, storm_name: &str, options: &StormRunOptions) -> Result<StormRunReport> {
    let config = ctx
        .store
        .get_config(storm_name)?
        .ok_or_else(|| anyhow!("no storm config named {}", storm_name))?;

    let harvest = harvest_job(&config).run(ctx).await;
    let selection = TrackSelectionBuilder::for_config(&ctx.store, &config)
        .window(options.window)
        .build()
        .with_context(|| format!("building selection for storm {}", storm_name))?;

    let mut report = StormRunReport {
        storm_name: storm_name.to_string(),
        harvest,
        selection,
        written_to: None,
        write_calls: 0,
    };

    let target = match (&config.target_playlist, options.dry_run) {
        (Some(target), false) => target,
        (None, _) => {
            tracing::info!(storm = %storm_name, "no target playlist configured; skipping write-back");
            return Ok(report);
        }
        (Some(_), true) => {
            tracing::info!(storm = %storm_name, tracks = report.selection.tracks.len(), "dry run; skipping write-back");
            return Ok(report);
        }
    };

    let ids = report.selection.track_ids();
    let calls = write_tracks_to_playlist(ctx.source.as_ref(), target, &ids, true, ctx.settings.batch_size()).await?;
    ctx.emit(SyncEvent::TracksWritten {
        playlist_id: target.clone(),
        tracks: ids.len(),
        calls,
    });
    report.written_to = Some(target.clone());
    report.write_calls = calls;
    Ok(report)
}
