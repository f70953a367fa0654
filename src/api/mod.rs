//! JSON HTTP API.
//!
//! Exposes employee, task and dashboard operations over axum.

mod server;

pub use server::{ApiServer, ServerHandle, build_router, start_server};
