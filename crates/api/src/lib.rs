// API crate clippy configuration
#![allow(clippy::needless_borrows_for_generic_args)] // Sometimes needed for clarity
#![allow(clippy::format_in_format_args)] // Intentional in logging macros
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Bookly API Library
//!
//! REST API for the Bookly book library: accounts and authentication,
//! books, reviews and tags.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
