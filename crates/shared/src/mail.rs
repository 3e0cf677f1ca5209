//! Mail queue wire format
//!
//! The API pushes [`MailJob`]s as JSON onto a Redis list and the worker pops
//! them for delivery. Both sides must agree on the key names below.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redis list holding pending mail jobs (LPUSH by producers, BRPOP by the worker)
pub const MAIL_QUEUE_KEY: &str = "bookly:mail:queue";

/// Redis list holding jobs that exhausted their delivery retries
pub const MAIL_DEAD_LETTER_KEY: &str = "bookly:mail:dead";

/// A single outbound email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailJob {
    pub id: Uuid,
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    /// Number of delivery rounds already attempted (including retries)
    #[serde(default)]
    pub attempts: u32,
}

impl MailJob {
    pub fn new(recipients: Vec<String>, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipients,
            subject: subject.into(),
            html_body: html_body.into(),
            attempts: 0,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
