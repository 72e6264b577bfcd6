//! Appends an audit entry whenever an action's status changes.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::HistoryConfig;
use crate::dispatch::{Outcome, SkipReason, TriggerHandler};
use crate::error::Result;
use crate::history::{HistoryEntry, IdentitySource};
use crate::ids;
use crate::store::{ChangeEvent, ChangeKind, Collection, DocumentStore, Snapshot, WriteBatch};

/// The action fields a history entry is built from. Timestamps and any
/// fields this crate does not model are ignored.
#[derive(Debug, Default, Deserialize)]
struct ActionStatusView {
    #[serde(default)]
    incident_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    last_updated_by_id: String,
    #[serde(default)]
    last_updated_by_nom: String,
}

/// On action update, records `before.status -> after.status` when they differ.
///
/// Only the net transition between the two delivered versions is recorded.
/// If the store folded several writes into one event, intermediate statuses
/// are not reconstructed, and a round trip back to the original status
/// produces no entry.
pub struct StatusHistoryRecorder {
    store: Arc<dyn DocumentStore>,
    prefer_principal: bool,
}

impl StatusHistoryRecorder {
    pub fn new(store: Arc<dyn DocumentStore>, config: &HistoryConfig) -> Self {
        Self {
            store,
            prefer_principal: config.prefer_principal,
        }
    }

    fn actor(
        &self,
        after: &Snapshot,
        action: &ActionStatusView,
    ) -> (String, String, IdentitySource) {
        match (&after.written_by, self.prefer_principal) {
            (Some(p), true) => (p.id.clone(), p.name.clone(), IdentitySource::Principal),
            _ => (
                action.last_updated_by_id.clone(),
                action.last_updated_by_nom.clone(),
                IdentitySource::Client,
            ),
        }
    }
}

impl TriggerHandler for StatusHistoryRecorder {
    fn name(&self) -> &'static str {
        "status_history_recorder"
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        event.collection == Collection::Actions && event.kind == ChangeKind::Updated
    }

    fn handle(&self, event: &ChangeEvent) -> Result<Outcome> {
        let action_id = event.document_id.as_str();
        let (Some(before_snap), Some(after_snap)) = (&event.before, &event.after) else {
            debug!(action_id, "update event without both images; nothing to record");
            return Ok(Outcome::skipped(SkipReason::MissingPayload));
        };

        let before: ActionStatusView = before_snap.decode()?;
        let after: ActionStatusView = after_snap.decode()?;

        if before.status == after.status {
            debug!(action_id, status = %after.status, "status unchanged; no history entry");
            return Ok(Outcome::skipped(SkipReason::StatusUnchanged));
        }

        info!(
            action_id,
            from = %before.status,
            to = %after.status,
            "action status changed"
        );

        let (utilisateur_id, utilisateur_nom, identity_source) = self.actor(after_snap, &after);
        let entry = HistoryEntry {
            action_id: action_id.to_string(),
            incident_id: after.incident_id.clone(),
            timestamp: None,
            utilisateur_id,
            utilisateur_nom,
            action_name: after.name.clone(),
            previous_status: before.status.clone(),
            new_status: after.status.clone(),
            comment: after.comment.clone().unwrap_or_default(),
            identity_source,
        };

        let id = ids::history_id(action_id, &before.status, &after.status, after_snap.version);
        let mut batch = WriteBatch::new();
        batch
            .create_if_absent(Collection::ActionHistory, id, &entry)?
            .server_timestamp("timestamp");
        let receipt = self.store.commit(batch)?;

        if receipt.written.is_empty() {
            debug!(action_id, "history entry already recorded");
            return Ok(Outcome::skipped(SkipReason::AlreadyApplied));
        }
        Ok(Outcome::Applied { writes: 1 })
    }
}
