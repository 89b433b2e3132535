//! Payout engine library crate.
//!
//! Exposes the settlement calculator, advance approval workflow and payout ledger used by
//! the admin console, along with configuration and telemetry bootstrap for the service.

pub mod config;
pub mod error;
pub mod settlement;
pub mod telemetry;
