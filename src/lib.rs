//! # Umbral Library
//!
//! Core of the Umbral dashboard service: region-level internet outage aggregation over an
//! upstream statistics API, a passthrough proxy, and scenario polls with one vote per voter.

pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod models;
pub mod regions;
pub mod repositories;
pub mod server;
pub mod signals;
pub mod telemetry;
pub mod upstream;
pub mod votes;
pub use migration;
