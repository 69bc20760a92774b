//! Herald core: configuration, the shared error type, and domain types.

pub mod config;
pub mod error;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use types::*;
