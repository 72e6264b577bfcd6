//! Document store with an atomic write batch and a durable change feed.
//!
//! Documents are schemaless JSON objects grouped into a fixed set of
//! [`Collection`]s. Every mutation goes through a [`WriteBatch`], which the
//! store commits as one all-or-nothing transaction. Each effective write
//! appends a [`ChangeEvent`] to the change feed inside the same transaction,
//! so a committed document version always has exactly one pending change
//! waiting for the trigger dispatcher.

pub mod change;
pub mod db;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CrisisError, Result};

pub use change::{ChangeEvent, ChangeKind, ChangeRecord, FailureDisposition};
pub use db::RedbStore;

/// Field map of a single document.
pub type Document = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Incidents,
    ActionTemplates,
    Actions,
    ActionHistory,
}

impl Collection {
    pub fn all() -> &'static [Collection] {
        &[
            Collection::Incidents,
            Collection::ActionTemplates,
            Collection::Actions,
            Collection::ActionHistory,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Incidents => "incidents",
            Collection::ActionTemplates => "action_templates",
            Collection::Actions => "actions",
            Collection::ActionHistory => "action_history",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = CrisisError;

    fn from_str(s: &str) -> Result<Self> {
        Collection::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CrisisError::UnknownCollection(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Principal / Snapshot
// ---------------------------------------------------------------------------

/// Identity the hosting process authenticated for a write.
///
/// Captured by the store at commit time and stamped on every document
/// version the batch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
}

/// One committed version of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Starts at 1 and increases by one on every effective write.
    pub version: u64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    #[serde(default)]
    pub written_by: Option<Principal>,
    pub data: Document,
}

impl Snapshot {
    /// A snapshot with no fields carries no usable payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::Value::Object(self.data.clone());
        Ok(serde_json::from_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or overwrite.
    Set,
    /// Fail the whole batch if the document exists.
    Create,
    /// Leave an existing document untouched and emit no change.
    CreateIfAbsent,
    /// Merge top-level fields into an existing document.
    Update,
    /// Remove an existing document.
    Delete,
}

#[derive(Debug, Clone)]
pub struct WriteOp {
    pub collection: Collection,
    pub id: String,
    pub mode: WriteMode,
    pub data: Document,
    /// Fields the store fills with the commit timestamp.
    pub server_timestamps: Vec<String>,
}

impl WriteOp {
    pub fn server_timestamp(&mut self, field: impl Into<String>) -> &mut Self {
        self.server_timestamps.push(field.into());
        self
    }
}

/// An ordered set of writes committed as a single transaction.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    principal: Option<Principal>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn set<T: Serialize>(
        &mut self,
        collection: Collection,
        id: impl Into<String>,
        doc: &T,
    ) -> Result<&mut WriteOp> {
        self.push(collection, id.into(), WriteMode::Set, doc)
    }

    pub fn create<T: Serialize>(
        &mut self,
        collection: Collection,
        id: impl Into<String>,
        doc: &T,
    ) -> Result<&mut WriteOp> {
        self.push(collection, id.into(), WriteMode::Create, doc)
    }

    pub fn create_if_absent<T: Serialize>(
        &mut self,
        collection: Collection,
        id: impl Into<String>,
        doc: &T,
    ) -> Result<&mut WriteOp> {
        self.push(collection, id.into(), WriteMode::CreateIfAbsent, doc)
    }

    pub fn update<T: Serialize>(
        &mut self,
        collection: Collection,
        id: impl Into<String>,
        fields: &T,
    ) -> Result<&mut WriteOp> {
        self.push(collection, id.into(), WriteMode::Update, fields)
    }

    pub fn delete(&mut self, collection: Collection, id: impl Into<String>) -> &mut WriteOp {
        self.ops.push(WriteOp {
            collection,
            id: id.into(),
            mode: WriteMode::Delete,
            data: Document::new(),
            server_timestamps: Vec::new(),
        });
        let last = self.ops.len() - 1;
        &mut self.ops[last]
    }

    pub(crate) fn into_parts(self) -> (Vec<WriteOp>, Option<Principal>) {
        (self.ops, self.principal)
    }

    fn push<T: Serialize>(
        &mut self,
        collection: Collection,
        id: String,
        mode: WriteMode,
        doc: &T,
    ) -> Result<&mut WriteOp> {
        let data = match serde_json::to_value(doc)? {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(CrisisError::InvalidDocument {
                    collection: collection.to_string(),
                    id,
                })
            }
        };
        self.ops.push(WriteOp {
            collection,
            id,
            mode,
            data,
            server_timestamps: Vec::new(),
        });
        let last = self.ops.len() - 1;
        Ok(&mut self.ops[last])
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub commit_time: DateTime<Utc>,
    /// Sequence numbers of the changes appended by this commit.
    pub changes: Vec<u64>,
    /// Ids written (or deleted) by this commit, in batch order.
    pub written: Vec<String>,
    /// Ids left untouched by `CreateIfAbsent` or unchanged `Set`/`Update`.
    pub unchanged: Vec<String>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read and batch-write access to documents.
///
/// Handlers receive an `Arc<dyn DocumentStore>` at construction; the hosting
/// process owns the store's lifecycle.
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Snapshot>>;

    /// Every document of `collection`, ordered by id.
    fn list(&self, collection: Collection) -> Result<Vec<Snapshot>>;

    /// Apply every op of `batch` in one transaction. Any failing op aborts
    /// the commit and nothing is written.
    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt>;
}

/// The durable queue of change events produced by commits.
pub trait ChangeFeed: Send + Sync {
    /// Oldest pending changes first, at most `limit` of them.
    fn pending_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        self.pending_after(0, limit)
    }

    /// Pending changes with a sequence number greater than `after`, oldest first.
    fn pending_after(&self, after: u64, limit: usize) -> Result<Vec<ChangeRecord>>;

    /// Remove a delivered change from the feed.
    fn ack_change(&self, seq: u64) -> Result<()>;

    /// Record a failed delivery. Once `attempts` reaches `max_attempts` the
    /// change is moved to the dead-letter table.
    fn record_failure(&self, seq: u64, error: &str, max_attempts: u32)
        -> Result<FailureDisposition>;

    fn dead_letters(&self) -> Result<Vec<ChangeRecord>>;

    /// Move a dead-lettered change back to the feed with its attempt count reset.
    fn requeue(&self, seq: u64) -> Result<()>;
}
