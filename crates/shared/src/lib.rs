// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Bookly Shared
//!
//! Database pool construction, embedded migrations and the mail queue wire
//! format used by both the API server and the background worker.

pub mod db;
pub mod mail;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use mail::{MailJob, MAIL_DEAD_LETTER_KEY, MAIL_QUEUE_KEY};
