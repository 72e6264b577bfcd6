//! Change events emitted by the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Collection, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One committed document mutation, as delivered to trigger handlers.
///
/// `Created` carries only `after`, `Deleted` only `before`, `Updated` both.
/// Handlers must still tolerate a missing image: a record written by an
/// older version of the store or edited by an operator may lack one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: u64,
    pub collection: Collection,
    pub document_id: String,
    pub kind: ChangeKind,
    pub commit_time: DateTime<Utc>,
    #[serde(default)]
    pub before: Option<Snapshot>,
    #[serde(default)]
    pub after: Option<Snapshot>,
}

/// A change event plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub event: ChangeEvent,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            event,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    pub fn seq(&self) -> u64 {
        self.event.seq
    }
}

/// What happened to a change after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureDisposition {
    /// Still pending; will be redelivered on the next drain.
    Retrying { attempts: u32 },
    /// Moved to the dead-letter table.
    DeadLettered { attempts: u32 },
}
