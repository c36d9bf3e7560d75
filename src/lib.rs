//! Core engine tracking the time-bounded training relationship between a
//! trainee teacher and a lead training provider.
//!
//! The `training` module owns the lifecycle state machine, the contract
//! calendar, schedule resolution, and partnership matching; `config` and
//! `telemetry` carry the runtime wiring shared with the surrounding
//! services.

pub mod config;
pub mod telemetry;
pub mod training;
