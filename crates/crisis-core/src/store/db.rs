//! redb-backed implementation of [`DocumentStore`] and [`ChangeFeed`].
//!
//! # Table design
//!
//! ```text
//! documents     "<collection>/<id>"  -> JSON Snapshot
//! changes       seq: u64             -> JSON ChangeRecord   (pending feed)
//! dead_letters  seq: u64             -> JSON ChangeRecord
//! meta          "next_seq"           -> u64
//! ```
//!
//! Listing a collection is a single range scan over the key prefix
//! `"<collection>/"`. Because every commit runs in one redb write
//! transaction, documents and the changes describing them become visible
//! together or not at all.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};

use crate::error::{CrisisError, Result};

use super::change::{ChangeEvent, ChangeKind, ChangeRecord, FailureDisposition};
use super::{
    ChangeFeed, Collection, CommitReceipt, Document, DocumentStore, Principal, Snapshot,
    WriteBatch, WriteMode, WriteOp,
};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const CHANGES: TableDefinition<u64, &[u8]> = TableDefinition::new("changes");
const DEAD_LETTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("dead_letters");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEQ: &str = "next_seq";

fn db_err<E: std::fmt::Display>(e: E) -> CrisisError {
    CrisisError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn doc_key(collection: Collection, id: &str) -> String {
    format!("{}/{}", collection.as_str(), id)
}

/// Half-open key range covering every document of `collection`.
///
/// `'0'` is the byte after `'/'`, so `"actions/" .. "actions0"` holds exactly
/// the keys starting with `"actions/"`.
fn collection_range(collection: Collection) -> (String, String) {
    let name = collection.as_str();
    (format!("{name}/"), format!("{name}0"))
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path` and make sure every table exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(DOCUMENTS).map_err(db_err)?;
        wt.open_table(CHANGES).map_err(db_err)?;
        wt.open_table(DEAD_LETTERS).map_err(db_err)?;
        wt.open_table(META).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    fn apply(
        wt: &WriteTransaction,
        ops: Vec<WriteOp>,
        principal: Option<Principal>,
        commit_time: DateTime<Utc>,
    ) -> Result<CommitReceipt> {
        let mut docs = wt.open_table(DOCUMENTS).map_err(db_err)?;
        let mut changes = wt.open_table(CHANGES).map_err(db_err)?;
        let mut meta = wt.open_table(META).map_err(db_err)?;

        let mut seq = meta
            .get(NEXT_SEQ)
            .map_err(db_err)?
            .map(|g| g.value())
            .unwrap_or(1);

        let mut receipt = CommitReceipt {
            commit_time,
            changes: Vec::new(),
            written: Vec::new(),
            unchanged: Vec::new(),
        };

        for op in ops {
            let key = doc_key(op.collection, &op.id);
            let existing = read_snapshot(&docs, &key)?;

            let (kind, before, after) = match (op.mode, existing) {
                (WriteMode::Create, Some(_)) => {
                    return Err(CrisisError::DocumentExists {
                        collection: op.collection.to_string(),
                        id: op.id,
                    })
                }
                (WriteMode::CreateIfAbsent, Some(_)) => {
                    receipt.unchanged.push(op.id);
                    continue;
                }
                (WriteMode::Update | WriteMode::Delete, None) => {
                    return Err(CrisisError::DocumentNotFound {
                        collection: op.collection.to_string(),
                        id: op.id,
                    })
                }
                (WriteMode::Delete, Some(prev)) => {
                    docs.remove(key.as_str()).map_err(db_err)?;
                    (ChangeKind::Deleted, Some(prev), None)
                }
                (mode, prev) => {
                    let mut data = match (&mode, &prev) {
                        (WriteMode::Update, Some(p)) => {
                            let mut merged = p.data.clone();
                            merged.extend(op.data);
                            merged
                        }
                        _ => op.data,
                    };
                    stamp(&mut data, &op.server_timestamps, commit_time)?;

                    if let Some(p) = &prev {
                        if p.data == data {
                            receipt.unchanged.push(op.id);
                            continue;
                        }
                    }

                    let next = Snapshot {
                        id: op.id.clone(),
                        version: prev.as_ref().map(|p| p.version + 1).unwrap_or(1),
                        create_time: prev.as_ref().map(|p| p.create_time).unwrap_or(commit_time),
                        update_time: commit_time,
                        written_by: principal.clone(),
                        data,
                    };
                    let bytes = serde_json::to_vec(&next)?;
                    docs.insert(key.as_str(), bytes.as_slice()).map_err(db_err)?;
                    let kind = if prev.is_some() {
                        ChangeKind::Updated
                    } else {
                        ChangeKind::Created
                    };
                    (kind, prev, Some(next))
                }
            };

            let record = ChangeRecord::new(ChangeEvent {
                seq,
                collection: op.collection,
                document_id: op.id.clone(),
                kind,
                commit_time,
                before,
                after,
            });
            let bytes = serde_json::to_vec(&record)?;
            changes.insert(seq, bytes.as_slice()).map_err(db_err)?;
            receipt.changes.push(seq);
            receipt.written.push(op.id);
            seq += 1;
        }

        meta.insert(NEXT_SEQ, seq).map_err(db_err)?;
        Ok(receipt)
    }

    fn read_record<T>(table: &T, seq: u64) -> Result<Option<ChangeRecord>>
    where
        T: ReadableTable<u64, &'static [u8]>,
    {
        match table.get(seq).map_err(db_err)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn scan_records(
        &self,
        def: TableDefinition<'static, u64, &'static [u8]>,
        after: u64,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(def).map_err(db_err)?;
        let mut result = Vec::new();
        if after == u64::MAX {
            return Ok(result);
        }
        for entry in table.range(after + 1..).map_err(db_err)? {
            if result.len() >= limit {
                break;
            }
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

fn read_snapshot(docs: &Table<&'static str, &'static [u8]>, key: &str) -> Result<Option<Snapshot>> {
    match docs.get(key).map_err(db_err)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn stamp(data: &mut Document, fields: &[String], at: DateTime<Utc>) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let value = serde_json::to_value(at)?;
    for field in fields {
        data.insert(field.clone(), value.clone());
    }
    Ok(())
}

impl DocumentStore for RedbStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Snapshot>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(DOCUMENTS).map_err(db_err)?;
        let key = doc_key(collection, id);
        match table.get(key.as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list(&self, collection: Collection) -> Result<Vec<Snapshot>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(DOCUMENTS).map_err(db_err)?;
        let (start, end) = collection_range(collection);

        let mut result = Vec::new();
        for entry in table.range(start.as_str()..end.as_str()).map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        let (ops, principal) = batch.into_parts();
        let commit_time = Utc::now();
        let wt = self.db.begin_write().map_err(db_err)?;
        match Self::apply(&wt, ops, principal, commit_time) {
            Ok(receipt) => {
                wt.commit().map_err(db_err)?;
                Ok(receipt)
            }
            Err(e) => {
                wt.abort().map_err(db_err)?;
                Err(e)
            }
        }
    }
}

impl ChangeFeed for RedbStore {
    fn pending_after(&self, after: u64, limit: usize) -> Result<Vec<ChangeRecord>> {
        self.scan_records(CHANGES, after, limit)
    }

    fn ack_change(&self, seq: u64) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(CHANGES).map_err(db_err)?;
            table.remove(seq).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn record_failure(
        &self,
        seq: u64,
        error: &str,
        max_attempts: u32,
    ) -> Result<FailureDisposition> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let disposition = {
            let mut changes = wt.open_table(CHANGES).map_err(db_err)?;
            let mut record =
                Self::read_record(&changes, seq)?.ok_or(CrisisError::ChangeNotFound(seq))?;
            record.attempts += 1;
            record.last_error = Some(error.to_string());
            record.last_attempt_at = Some(Utc::now());
            let bytes = serde_json::to_vec(&record)?;

            if record.attempts >= max_attempts {
                changes.remove(seq).map_err(db_err)?;
                let mut dead = wt.open_table(DEAD_LETTERS).map_err(db_err)?;
                dead.insert(seq, bytes.as_slice()).map_err(db_err)?;
                FailureDisposition::DeadLettered {
                    attempts: record.attempts,
                }
            } else {
                changes.insert(seq, bytes.as_slice()).map_err(db_err)?;
                FailureDisposition::Retrying {
                    attempts: record.attempts,
                }
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(disposition)
    }

    fn dead_letters(&self) -> Result<Vec<ChangeRecord>> {
        self.scan_records(DEAD_LETTERS, 0, usize::MAX)
    }

    fn requeue(&self, seq: u64) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut dead = wt.open_table(DEAD_LETTERS).map_err(db_err)?;
            let mut record =
                Self::read_record(&dead, seq)?.ok_or(CrisisError::ChangeNotFound(seq))?;
            dead.remove(seq).map_err(db_err)?;
            record.attempts = 0;
            let bytes = serde_json::to_vec(&record)?;
            let mut changes = wt.open_table(CHANGES).map_err(db_err)?;
            changes.insert(seq, bytes.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
