use crate::error::Result;
use crate::store::{Collection, DocumentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the actor fields of a [`HistoryEntry`] came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// The principal the store captured when the status write was committed.
    Principal,
    /// The `last_updated_by_*` fields the editor put on the action.
    #[default]
    Client,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::Principal => f.write_str("principal"),
            IdentitySource::Client => f.write_str("client"),
        }
    }
}

/// One status transition of one action.
///
/// Everything needed to read the entry is copied in, so it stays meaningful
/// after the action is renamed or deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action_id: String,
    pub incident_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub utilisateur_id: String,
    pub utilisateur_nom: String,
    pub action_name: String,
    pub previous_status: String,
    pub new_status: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub identity_source: IdentitySource,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter<'a> {
    pub incident_id: Option<&'a str>,
    pub action_id: Option<&'a str>,
}

/// Matching entries, oldest first.
pub fn list_history(
    store: &dyn DocumentStore,
    filter: &HistoryFilter<'_>,
) -> Result<Vec<(String, HistoryEntry)>> {
    let mut result = Vec::new();
    for snap in store.list(Collection::ActionHistory)? {
        let entry: HistoryEntry = snap.decode()?;
        if filter.incident_id.is_some_and(|id| id != entry.incident_id) {
            continue;
        }
        if filter.action_id.is_some_and(|id| id != entry.action_id) {
            continue;
        }
        result.push((snap.id, entry));
    }
    result.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RedbStore, WriteBatch};
    use tempfile::TempDir;

    fn entry(action_id: &str, incident_id: &str) -> HistoryEntry {
        HistoryEntry {
            action_id: action_id.into(),
            incident_id: incident_id.into(),
            previous_status: "not required".into(),
            new_status: "in progress".into(),
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn filters_by_incident_and_action() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("t.redb")).unwrap();
        let mut batch = WriteBatch::new();
        batch
            .create(Collection::ActionHistory, "h1", &entry("A1", "E1"))
            .unwrap()
            .server_timestamp("timestamp");
        batch
            .create(Collection::ActionHistory, "h2", &entry("A2", "E1"))
            .unwrap()
            .server_timestamp("timestamp");
        batch
            .create(Collection::ActionHistory, "h3", &entry("A3", "E2"))
            .unwrap()
            .server_timestamp("timestamp");
        store.commit(batch).unwrap();

        let all = list_history(&store, &HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let e1 = HistoryFilter {
            incident_id: Some("E1"),
            ..HistoryFilter::default()
        };
        assert_eq!(list_history(&store, &e1).unwrap().len(), 2);

        let a2 = HistoryFilter {
            incident_id: Some("E1"),
            action_id: Some("A2"),
        };
        let found = list_history(&store, &a2).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "h2");
    }

    #[test]
    fn identity_source_defaults_to_client_for_old_entries() {
        let json = serde_json::json!({
            "action_id": "A1",
            "incident_id": "E1",
            "utilisateur_id": "U2",
            "utilisateur_nom": "Op",
            "action_name": "Notify neighbors",
            "previous_status": "not required",
            "new_status": "done"
        });
        let entry: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(entry.identity_source, IdentitySource::Client);
        assert_eq!(entry.comment, "");
    }
}
