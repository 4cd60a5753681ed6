use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storm_sync as lib;
use lib::api::mock::MockCatalog;
use lib::api::spotify::SpotifyCatalog;
use lib::api::CatalogSource;
use lib::config::Config;
use lib::db::SqliteStore;
use lib::jobs::{
    AlbumTrackCollection, ArtistAlbumDiscovery, ArtistDiscovery, BlacklistSync, Job, JobReport,
    OperationOutcome, PlaylistSync, SyncContext,
};
use lib::models::{DateWindow, StormConfig};
use lib::store::{AlbumTrackPolicy, ArtistAlbumPolicy, CatalogStore, Collection};
use lib::storm::{run_storm, StormRunOptions};
use lib::util::days_ago;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "storm-sync", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve the remote catalog from a JSON fixture instead of Spotify
    #[arg(long, value_name = "FIXTURE")]
    mock: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate config file and exit
    ConfigValidate,
    /// Manage storm configs
    Storm {
        #[command(subcommand)]
        sub: StormCommands,
    },
    /// Sync a storm's input playlists and discover their artists
    SyncPlaylists {
        #[arg(long)]
        storm: String,
    },
    /// Fetch album lists for artists that are due
    DiscoverAlbums {
        /// Also re-check artists last checked more than this many days ago
        #[arg(long)]
        cutoff_days: Option<u32>,
    },
    /// Collect tracks for albums that are due
    CollectTracks {
        /// Also re-collect albums collected more than this many days ago
        #[arg(long)]
        refresh_days: Option<u32>,
    },
    /// Blacklist the artists of a playlist for a storm
    Blacklist {
        #[arg(long)]
        storm: String,
        /// Defaults to the storm's configured blacklist playlist
        #[arg(long)]
        playlist: Option<String>,
    },
    /// Harvest, select and write back one storm
    Run {
        #[arg(long)]
        storm: String,
        /// First release date to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last release date to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Select tracks but do not write them back
        #[arg(long)]
        dry_run: bool,
    },
    /// Show document counts per collection
    Status,
    /// Authorize Spotify playlist writes (interactive)
    Auth,
}

#[derive(Subcommand)]
enum StormCommands {
    /// Create a new storm config
    Create {
        #[arg(long)]
        name: String,
        /// Input playlist id (repeatable)
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,
        #[arg(long)]
        blacklist_playlist: Option<String>,
        /// Playlist the selection is written to
        #[arg(long)]
        target: Option<String>,
    },
    /// List storm configs
    List,
    /// Show one storm config
    Show { name: String },
}

fn init_logging(cfg: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "storm-sync.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stdout));

    tracing_subscriber_global::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");
    guard
}

fn build_source(cfg: &Config, mock: Option<&Path>) -> Result<Arc<dyn CatalogSource>> {
    if let Some(fixture) = mock {
        return Ok(Arc::new(MockCatalog::from_fixture_path(fixture)?));
    }
    if !cfg.spotify.has_credentials() {
        return Err(anyhow!(
            "Spotify credentials missing: set [spotify] client_id/client_secret or SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET"
        ));
    }
    Ok(Arc::new(SpotifyCatalog::new(cfg.spotify.clone())?))
}

fn print_job(report: &JobReport) {
    println!("{} (run {})", report.job, report.run_id);
    for outcome in &report.outcomes {
        match outcome {
            OperationOutcome::Completed(r) => println!(
                "  {:<24} processed={} failed={} rejected={} {}ms",
                r.operation,
                r.processed,
                r.failures.len(),
                r.rejected,
                r.elapsed_ms
            ),
            OperationOutcome::Failed { operation, error } => {
                println!("  {:<24} FAILED: {}", operation, error)
            }
        }
    }
}

fn print_config(config: &StormConfig) {
    println!("{}", config.storm_name);
    println!("  inputs:    {}", config.input_playlists.join(", "));
    println!(
        "  blacklist: {}",
        config.artist_blacklist_playlist.as_deref().unwrap_or("-")
    );
    println!("  target:    {}", config.target_playlist.as_deref().unwrap_or("-"));
}

fn require_config(store: &CatalogStore, name: &str) -> Result<StormConfig> {
    store
        .get_config(name)?
        .ok_or_else(|| anyhow!("no storm config named {}", name))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Resolve config path: explicit --config overrides; otherwise prefer
    // /etc/storm-sync/config.toml and fall back to the example config.
    let resolved_config_path: PathBuf = match &cli.config {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/storm-sync/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    };

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&resolved_config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = Config::from_path(&resolved_config_path)
        .with_context(|| format!("loading config from {}", resolved_config_path.display()))?;
    let _guard = init_logging(&cfg);

    if let Commands::Auth = cli.command {
        return lib::api::spotify_auth::run_spotify_auth(&cfg.spotify).await;
    }

    let store = CatalogStore::new(Arc::new(
        SqliteStore::open_or_create(&cfg.db_path)
            .with_context(|| format!("opening store at {}", cfg.db_path.display()))?,
    ));

    match cli.command {
        Commands::Storm { sub } => match sub {
            StormCommands::Create {
                name,
                inputs,
                blacklist_playlist,
                target,
            } => {
                let mut config = StormConfig::new(name, inputs);
                config.artist_blacklist_playlist = blacklist_playlist;
                config.target_playlist = target;
                store.create_config(&config)?;
                print_config(&config);
            }
            StormCommands::List => {
                for config in store.list_configs()? {
                    print_config(&config);
                }
            }
            StormCommands::Show { name } => match store.get_config(&name)? {
                Some(config) => print_config(&config),
                None => {
                    eprintln!("No storm config named {}", name);
                    std::process::exit(1);
                }
            },
        },
        Commands::Status => {
            for collection in Collection::ALL {
                println!("{:<18} {}", collection.name(), store.count(collection)?);
            }
        }
        command => {
            let source = build_source(&cfg, cli.mock.as_deref())?;
            let ctx = SyncContext::new(source, store.clone()).with_settings(cfg.sync.clone());
            match command {
                Commands::SyncPlaylists { storm } => {
                    let config = require_config(&store, &storm)?;
                    let job = Job::new("sync-playlists")
                        .then(PlaylistSync::new(config.input_playlists.clone()))
                        .then(ArtistDiscovery::new(config.input_playlists));
                    print_job(&job.run(&ctx).await);
                }
                Commands::DiscoverAlbums { cutoff_days } => {
                    let op = match cutoff_days {
                        Some(_) => ArtistAlbumDiscovery::with_policy(ArtistAlbumPolicy::from_cutoff(days_ago(cutoff_days))),
                        None => ArtistAlbumDiscovery::new(),
                    };
                    print_job(&Job::new("discover-albums").then(op).run(&ctx).await);
                }
                Commands::CollectTracks { refresh_days } => {
                    let op = match refresh_days {
                        Some(_) => AlbumTrackCollection::with_policy(AlbumTrackPolicy::from_cutoff(days_ago(refresh_days))),
                        None => AlbumTrackCollection::new(),
                    };
                    print_job(&Job::new("collect-tracks").then(op).run(&ctx).await);
                }
                Commands::Blacklist { storm, playlist } => {
                    let config = require_config(&store, &storm)?;
                    let playlist = playlist
                        .or(config.artist_blacklist_playlist)
                        .ok_or_else(|| anyhow!("storm {} has no blacklist playlist; pass --playlist", storm))?;
                    let job = Job::new("blacklist")
                        .then(PlaylistSync::new(vec![playlist.clone()]))
                        .then(BlacklistSync::new(storm.clone(), playlist));
                    print_job(&job.run(&ctx).await);
                    println!("{} artists blacklisted for {}", store.list_blacklisted(&storm)?.len(), storm);
                }
                Commands::Run {
                    storm,
                    start,
                    end,
                    dry_run,
                } => {
                    let options = StormRunOptions {
                        window: DateWindow::new(start, end),
                        dry_run,
                    };
                    let report = run_storm(&ctx, &storm, &options).await?;
                    print_job(&report.harvest);
                    println!(
                        "selected {} tracks from {} artists ({} blacklisted)",
                        report.selection.tracks.len(),
                        report.selection.artist_ids.len(),
                        report.selection.blacklisted.len()
                    );
                    match report.written_to {
                        Some(target) => println!("wrote to {} in {} calls", target, report.write_calls),
                        None => println!("nothing written"),
                    }
                }
                Commands::ConfigValidate | Commands::Auth | Commands::Storm { .. } | Commands::Status => {}
            }
        }
    }

    Ok(())
}
