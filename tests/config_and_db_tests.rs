use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

use storm_sync::config::{Config, SyncConfig};
use storm_sync::db;
use storm_sync::store::{AlbumTrackPolicy, ArtistAlbumPolicy};

#[test]
fn config_from_path_parses_toml() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    let mut f = File::create(&cfg_path).unwrap();
    let toml = r#"
db_path = "/tmp/storm-test.db"
log_dir = "/tmp"

[spotify]
client_id = "from-file"
client_secret = "secret"
market = "DE"
max_rate_limit_retries = 5

[sync]
album_fail_cap = 5
artist_refresh_days = 30
write_batch_size = 50
"#;
    f.write_all(toml.as_bytes()).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.db_path.to_str().unwrap(), "/tmp/storm-test.db");
    assert_eq!(cfg.spotify.client_id, "from-file");
    assert_eq!(cfg.spotify.market, "DE");
    assert_eq!(cfg.spotify.max_rate_limit_retries, 5);
    assert_eq!(cfg.spotify.api_base, "https://api.spotify.com/v1");
    assert!(cfg.spotify.has_credentials());
    assert_eq!(cfg.sync.album_fail_cap, 5);
    assert_eq!(cfg.sync.batch_size(), 50);
    assert!(matches!(cfg.sync.artist_policy(), ArtistAlbumPolicy::StaleOrNeverChecked { .. }));
    assert_eq!(cfg.sync.album_policy(), AlbumTrackPolicy::NeverCollected);
}

#[test]
fn empty_config_uses_defaults() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    File::create(&cfg_path).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.spotify.market, "US");
    assert_eq!(cfg.spotify.album_groups, "album,single");
    assert_eq!(cfg.sync.album_fail_cap, 3);
    assert_eq!(cfg.sync.batch_size(), 100);
    assert_eq!(cfg.sync.artist_policy(), ArtistAlbumPolicy::NeverChecked);
}

#[test]
fn example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/example-config.toml");
    let cfg = Config::from_path(&path).expect("example config parses");
    assert_eq!(cfg.sync.album_fail_cap, 3);
}

#[test]
fn batch_size_is_clamped_to_the_write_limit() {
    let big = SyncConfig {
        write_batch_size: 500,
        ..SyncConfig::default()
    };
    assert_eq!(big.batch_size(), 100);
    let zero = SyncConfig {
        write_batch_size: 0,
        ..SyncConfig::default()
    };
    assert_eq!(zero.batch_size(), 1);
}

#[test]
fn run_migrations_creates_tables() {
    let td = tempdir().unwrap();
    let db_path = td.path().join("test.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    db::run_migrations(&conn).expect("run migrations");
    // running twice is harmless
    db::run_migrations(&conn).expect("run migrations again");
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='documents'")
        .unwrap();
    let mut rows = stmt.query([]).unwrap();
    let found = rows.next().unwrap().is_some();
    assert!(found, "documents table should exist after migrations");
}
