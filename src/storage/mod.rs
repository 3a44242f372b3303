pub mod file_store;
pub mod memory;

pub use file_store::FileStore;
pub use memory::MemoryStore;

use crate::common::Result;
use crate::core::embedding::Embedding;
use crate::core::matcher::{Identity, MatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOutcome {
    Granted,
    Denied,
    Unknown,
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessOutcome::Granted => "granted",
            AccessOutcome::Denied => "denied",
            AccessOutcome::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One access decision. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub identity_id: Option<String>,
    pub name: Option<String>,
    pub outcome: AccessOutcome,
    pub confidence: i32,
    /// Seconds the door stays open, for granted events.
    pub unlock_duration: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    pub fn granted(matched: &MatchResult, unlock_duration: u32) -> Self {
        Self {
            identity_id: Some(matched.identity_id.clone()),
            name: Some(matched.name.clone()),
            outcome: AccessOutcome::Granted,
            confidence: matched.confidence,
            unlock_duration: Some(unlock_duration),
            timestamp: Utc::now(),
        }
    }

    /// A recognised but insufficiently confident face. The candidate
    /// identity is deliberately left off the record.
    pub fn denied(confidence: i32) -> Self {
        Self {
            identity_id: None,
            name: None,
            outcome: AccessOutcome::Denied,
            confidence,
            unlock_duration: None,
            timestamp: Utc::now(),
        }
    }
}

/// Where identities and the access log live.
pub trait Datastore {
    fn list_identities(&self) -> Result<Vec<Identity>>;

    fn identity_exists(&self, name: &str) -> Result<bool>;

    fn create_identity(&self, name: &str, embeddings: Vec<Embedding>) -> Result<Identity>;

    fn append_access_event(&self, event: &AccessEvent) -> Result<()>;

    /// Newest first, at most `limit` events.
    fn list_access_events(&self, limit: usize) -> Result<Vec<AccessEvent>>;
}

pub(crate) fn new_identity_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Newest first; events with equal timestamps keep reverse insertion order.
pub(crate) fn newest_first(mut events: Vec<AccessEvent>, limit: usize) -> Vec<AccessEvent> {
    events.reverse();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events.truncate(limit);
    events
}
