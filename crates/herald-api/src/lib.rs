//! Herald API crate - axum HTTP server and route handlers.
//!
//! Exposes triage, ingestion, reply and audit endpoints over the services
//! in `herald-triage`.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
