#![forbid(unsafe_code)]

//! Core domain model and business logic for the caffeine tracker.
//!
//! This crate provides:
//! - Domain types (doses, health records, bands)
//! - Decay model and the 24-hour dose ledger
//! - Persistence (ledger store actor, JSONL health log, CSV export)
//! - The tracker facade that ties them together

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod decay;
pub mod ledger;
pub mod store;
pub mod health;
pub mod export;
pub mod tracker;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{find_drink, get_default_catalog};
pub use config::Config;
pub use decay::DecayModel;
pub use ledger::DoseLedger;
pub use store::{DoseStore, SaveOutcome, StoreHandle};
pub use health::{HealthRecordStore, JsonlHealthLog, LocalOnly};
pub use tracker::{Clock, Phase, SystemClock, Tracker, TrackerSettings, TrackerSnapshot};
