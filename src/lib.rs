//! Season-normalization and statistics-aggregation engine for club
//! player statistics stored in a hierarchical document store.
//!
//! [`service::StatsService`] is the one entry point; everything below it
//! is usable on its own for surfaces that need a single piece.

pub mod aggregate;
pub mod cancel;
pub mod club;
pub mod config;
pub mod error;
pub mod model;
pub mod player_record;
pub mod roster;
pub mod season_key;
pub mod season_summary;
pub mod service;
pub mod sqlite_store;
pub mod stats_cache;
pub mod store;

pub use aggregate::AggregatedStats;
pub use error::{EngineError, EngineResult};
pub use season_key::SeasonKey;
pub use service::{StatsRequest, StatsResponse, StatsService};
