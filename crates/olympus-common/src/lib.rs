//! Common types, errors, and utilities for Olympus services.

pub mod error;
pub mod types;

pub use error::AppError;
pub use types::*;
