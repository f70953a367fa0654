//! Task Roster Library
//!
//! Employee and task tracking over SQLite, served as a JSON HTTP API.
//! This module exports the core components for testing and integration.

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;
pub mod validation;
