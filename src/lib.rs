//! # tasmota-sim
//!
//! Power simulation engine for virtual Tasmota smart plugs. The [`engine`]
//! module owns the simulation (profile catalog, assignment resolver,
//! consumption model, per-device state); [`api`] exposes it over the
//! Tasmota-compatible HTTP surface; [`publisher`] pushes periodic telemetry
//! frames; [`cli`] wraps both for the command line.

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod publisher;
pub mod telemetry;
