//! Trigger delivery: reads the change feed and hands each change to the
//! handlers registered for it.
//!
//! Delivery is at-least-once. A change is acknowledged only after every
//! accepting handler returned `Ok`; otherwise the failure is recorded and the
//! whole change is redelivered on a later drain, until `max_attempts` moves
//! it to the dead-letter table. Handlers must therefore be idempotent.
//!
//! Changes to the same document are delivered in commit order. When one
//! fails, later changes to that document are held back for the rest of the
//! drain.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::{Config, TriggerConfig};
use crate::error::Result;
use crate::processors::{StatusHistoryRecorder, TemplateFanOut};
use crate::store::{
    ChangeEvent, ChangeFeed, ChangeRecord, Collection, DocumentStore, FailureDisposition,
};

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Why a handler finished without writing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The event carried no usable snapshot.
    MissingPayload,
    /// No action templates are configured.
    NoTemplates,
    /// The action's status did not change.
    StatusUnchanged,
    /// Every derived document already exists (redelivery).
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Applied { writes: usize },
    Skipped { reason: SkipReason },
}

impl Outcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped { reason }
    }
}

/// A stateless reaction to one kind of document change.
pub trait TriggerHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, event: &ChangeEvent) -> bool;

    /// Must be safe to run again from scratch for the same event.
    fn handle(&self, event: &ChangeEvent) -> Result<Outcome>;
}

// ---------------------------------------------------------------------------
// DrainReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Changes acknowledged after at least one handler ran.
    pub delivered: usize,
    /// Changes acknowledged with no handler interested in them.
    pub unrouted: usize,
    /// Documents written by handlers across all delivered changes.
    pub writes: usize,
    /// Failed changes left pending for another attempt.
    pub failed: usize,
    /// Failed changes moved to the dead-letter table.
    pub dead_lettered: usize,
    /// Changes not attempted because an earlier change to the same document failed.
    pub held_back: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: &DrainReport) {
        self.delivered += other.delivered;
        self.unrouted += other.unrouted;
        self.writes += other.writes;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
        self.held_back = other.held_back;
    }

    fn acknowledged(&self) -> usize {
        self.delivered + self.unrouted
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    feed: Arc<dyn ChangeFeed>,
    handlers: Vec<Box<dyn TriggerHandler>>,
    max_attempts: u32,
    batch_size: usize,
}

impl Dispatcher {
    pub fn new(feed: Arc<dyn ChangeFeed>, config: &TriggerConfig) -> Self {
        Self {
            feed,
            handlers: Vec::new(),
            max_attempts: config.max_attempts.max(1),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Dispatcher with the template fan-out and the status history recorder.
    pub fn standard<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: DocumentStore + ChangeFeed + 'static,
    {
        let docs: Arc<dyn DocumentStore> = store.clone();
        let mut dispatcher = Self::new(store, &config.triggers);
        dispatcher.register(Box::new(TemplateFanOut::new(docs.clone())));
        dispatcher.register(Box::new(StatusHistoryRecorder::new(docs, &config.history)));
        dispatcher
    }

    pub fn register(&mut self, handler: Box<dyn TriggerHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Deliver pending changes until the feed is empty or only holds changes
    /// that already failed during this call. Changes committed by handlers
    /// along the way are delivered too.
    pub fn drain(&self) -> Result<DrainReport> {
        let mut total = DrainReport::default();
        let mut failed_seqs = HashSet::new();
        loop {
            let pass = self.pass(&mut failed_seqs)?;
            total.absorb(&pass);
            if pass.acknowledged() == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// One pass over at most `batch_size` pending changes.
    pub fn drain_once(&self) -> Result<DrainReport> {
        self.pass(&mut HashSet::new())
    }

    /// Deliver up to `batch_size` changes, paging through the feed past
    /// changes that are skipped because their document is blocked.
    fn pass(&self, failed_seqs: &mut HashSet<u64>) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let mut blocked: HashSet<(Collection, String)> = HashSet::new();
        let mut cursor = 0;
        let mut attempted = 0;

        'feed: loop {
            let records = self.feed.pending_after(cursor, self.batch_size)?;
            if records.is_empty() {
                break;
            }
            for record in records {
                cursor = record.seq();
                if attempted == self.batch_size {
                    break 'feed;
                }
                if self.process(&record, failed_seqs, &mut blocked, &mut report)? {
                    attempted += 1;
                }
            }
        }

        Ok(report)
    }

    /// Handle one record of a pass. Returns whether delivery was attempted.
    fn process(
        &self,
        record: &ChangeRecord,
        failed_seqs: &mut HashSet<u64>,
        blocked: &mut HashSet<(Collection, String)>,
        report: &mut DrainReport,
    ) -> Result<bool> {
        let event = &record.event;
        let doc = (event.collection, event.document_id.clone());

        if failed_seqs.contains(&event.seq) {
            blocked.insert(doc);
            return Ok(false);
        }
        if blocked.contains(&doc) {
            report.held_back += 1;
            return Ok(false);
        }

        match self.deliver(event) {
            Ok(None) => {
                self.feed.ack_change(event.seq)?;
                report.unrouted += 1;
            }
            Ok(Some(writes)) => {
                self.feed.ack_change(event.seq)?;
                report.delivered += 1;
                report.writes += writes;
            }
            Err(e) => {
                let message = e.to_string();
                failed_seqs.insert(event.seq);
                match self
                    .feed
                    .record_failure(event.seq, &message, self.max_attempts)?
                {
                    FailureDisposition::Retrying { attempts } => {
                        warn!(
                            seq = event.seq,
                            collection = %event.collection,
                            document = %event.document_id,
                            attempts,
                            error = %message,
                            "trigger delivery failed; will retry"
                        );
                        report.failed += 1;
                        blocked.insert(doc);
                    }
                    FailureDisposition::DeadLettered { attempts } => {
                        error!(
                            seq = event.seq,
                            collection = %event.collection,
                            document = %event.document_id,
                            attempts,
                            error = %message,
                            "trigger delivery exhausted retries; change dead-lettered"
                        );
                        report.dead_lettered += 1;
                    }
                }
            }
        }

        Ok(true)
    }

    /// Run every accepting handler. `None` when no handler accepted the event.
    fn deliver(&self, event: &ChangeEvent) -> Result<Option<usize>> {
        let mut routed = false;
        let mut writes = 0;
        for handler in self.handlers.iter().filter(|h| h.accepts(event)) {
            routed = true;
            let outcome = handler.handle(event)?;
            debug!(
                handler = handler.name(),
                seq = event.seq,
                document = %event.document_id,
                ?outcome,
                "handled change"
            );
            if let Outcome::Applied { writes: n } = outcome {
                writes += n;
            }
        }
        Ok(routed.then_some(writes))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrisisError;
    use crate::store::{ChangeKind, RedbStore, WriteBatch};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails its first `failures` invocations, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl TriggerHandler for Arc<Flaky> {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn accepts(&self, event: &ChangeEvent) -> bool {
            event.collection == Collection::Incidents
        }

        fn handle(&self, event: &ChangeEvent) -> Result<Outcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(event.document_id.clone());
            if n < self.failures {
                return Err(CrisisError::Store("transient".into()));
            }
            Ok(Outcome::Applied { writes: 1 })
        }
    }

    fn setup(max_attempts: u32) -> (TempDir, Arc<RedbStore>, TriggerConfig) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(&dir.path().join("t.redb")).unwrap());
        let config = TriggerConfig {
            max_attempts,
            ..TriggerConfig::default()
        };
        (dir, store, config)
    }

    fn write_incident(store: &RedbStore, id: &str, title: &str) {
        let mut batch = WriteBatch::new();
        batch
            .set(Collection::Incidents, id, &serde_json::json!({ "title": title }))
            .unwrap();
        store.commit(batch).unwrap();
    }

    #[test]
    fn unrouted_changes_are_acknowledged() {
        let (_dir, store, config) = setup(3);
        let mut batch = WriteBatch::new();
        batch
            .set(Collection::ActionTemplates, "t1", &serde_json::json!({ "name": "n" }))
            .unwrap();
        store.commit(batch).unwrap();

        let dispatcher = Dispatcher::new(store.clone(), &config);
        let report = dispatcher.drain().unwrap();
        assert_eq!(report.unrouted, 1);
        assert!(store.pending_changes(10).unwrap().is_empty());
    }

    #[test]
    fn failed_change_stays_pending_and_is_retried_on_next_drain() {
        let (_dir, store, config) = setup(3);
        write_incident(&store, "E1", "Fire");

        let flaky = Arc::new(Flaky::new(1));
        let mut dispatcher = Dispatcher::new(store.clone(), &config);
        dispatcher.register(Box::new(flaky.clone()));

        let first = dispatcher.drain().unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.delivered, 0);
        let pending = store.pending_changes(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        let second = dispatcher.drain().unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(second.writes, 1);
        assert!(store.pending_changes(10).unwrap().is_empty());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn exhausted_change_is_dead_lettered() {
        let (_dir, store, config) = setup(2);
        write_incident(&store, "E1", "Fire");

        let mut dispatcher = Dispatcher::new(store.clone(), &config);
        dispatcher.register(Box::new(Arc::new(Flaky::new(usize::MAX))));

        dispatcher.drain().unwrap();
        let report = dispatcher.drain().unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(store.pending_changes(10).unwrap().is_empty());

        let dead = store.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].event.kind, ChangeKind::Created);
    }

    #[test]
    fn later_changes_to_a_failed_document_are_held_back() {
        let (_dir, store, config) = setup(5);
        write_incident(&store, "E1", "Fire");
        write_incident(&store, "E1", "Fire, spreading");
        write_incident(&store, "E2", "Flood");

        let flaky = Arc::new(Flaky::new(1));
        let mut dispatcher = Dispatcher::new(store.clone(), &config);
        dispatcher.register(Box::new(flaky.clone()));

        let report = dispatcher.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.held_back, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*flaky.seen.lock().unwrap(), vec!["E1", "E2"]);

        let report = dispatcher.drain().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(*flaky.seen.lock().unwrap(), vec!["E1", "E2", "E1", "E1"]);
    }

    #[test]
    fn held_back_changes_do_not_fill_the_batch() {
        let (_dir, store, mut config) = setup(5);
        config.batch_size = 2;
        write_incident(&store, "E1", "Fire");
        write_incident(&store, "E1", "Fire, spreading");
        write_incident(&store, "E1", "Fire, contained");
        write_incident(&store, "E2", "Flood");

        let flaky = Arc::new(Flaky::new(1));
        let mut dispatcher = Dispatcher::new(store.clone(), &config);
        dispatcher.register(Box::new(flaky.clone()));

        let report = dispatcher.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.held_back, 2);
        assert_eq!(*flaky.seen.lock().unwrap(), vec!["E1", "E2"]);

        let pending = store.pending_changes(10).unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|r| r.event.document_id == "E1"));
    }

    #[test]
    fn drain_once_respects_batch_size() {
        let (_dir, store, mut config) = setup(3);
        config.batch_size = 2;
        for i in 0..5 {
            write_incident(&store, &format!("E{i}"), "x");
        }
        let dispatcher = Dispatcher::new(store.clone(), &config);
        assert_eq!(dispatcher.drain_once().unwrap().unrouted, 2);
        assert_eq!(dispatcher.drain().unwrap().unrouted, 3);
    }

    #[test]
    fn standard_dispatcher_registers_both_processors() {
        let (_dir, store, _) = setup(3);
        let dispatcher = Dispatcher::standard(store, &Config::default());
        assert_eq!(
            dispatcher.handler_names(),
            vec!["template_fan_out", "status_history_recorder"]
        );
    }
}
