//! Core library for storm-sync: incremental catalog harvesting into a local
//! document store, and date-ranged track selection over it.
pub mod api;
pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod observer;
pub mod pagination;
pub mod selection;
pub mod store;
pub mod storm;
pub mod util;
