//! RugGuard: trust verification and risk scoring for social accounts.
//!
//! An account snapshot is turned into heuristic signals, checked against a
//! curated registry of trusted accounts for vouching, scored into a trust
//! level and rendered as a short report.

pub mod account;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod errors;
pub mod log_sink;
pub mod report;
pub mod scoring;
pub mod signals;
pub mod trigger;
pub mod trust_registry;
pub mod vouch;
pub mod web;
pub mod x_api;

pub use analysis::{AccountSource, AnalysisOutcome, Analyzer};
pub use errors::{GuardError, GuardResult};
