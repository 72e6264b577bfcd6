//! Checklist actions attached to an incident.
//!
//! Actions are created in bulk by the template fan-out and mutated afterwards
//! by editors. Every editor write goes through [`set_status`] or
//! [`set_comment`], which fill the `last_updated_*` trace fields.

use crate::error::{CrisisError, Result};
use crate::incident::IncidentCreator;
use crate::store::{Collection, CommitReceipt, DocumentStore, Principal, WriteBatch};
use crate::template::ActionTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status every generated action starts in.
pub const STATUS_NOT_REQUIRED: &str = "not required";

/// Statuses the CLI offers. Stored statuses are free text and compared by value.
pub const KNOWN_STATUSES: &[&str] = &[STATUS_NOT_REQUIRED, "to do", "in progress", "done"];

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub demandeur_id: String,
    #[serde(default)]
    pub demandeur_nom: String,
    /// Empty until the first editor write.
    #[serde(default, deserialize_with = "deserialize_empty_as_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated_by_id: String,
    #[serde(default)]
    pub last_updated_by_nom: String,
}

impl Action {
    /// Materialize `template` for an incident. The requester is the incident's
    /// creator; trace fields stay empty.
    pub fn from_template(
        incident_id: &str,
        creator: &IncidentCreator,
        template: &ActionTemplate,
    ) -> Self {
        Self {
            incident_id: incident_id.to_string(),
            name: template.name.clone(),
            category: template.category.clone(),
            status: STATUS_NOT_REQUIRED.to_string(),
            comment: Some(String::new()),
            created_at: None,
            demandeur_id: creator.createur_id.clone(),
            demandeur_nom: creator.createur_nom.clone(),
            last_updated_at: None,
            last_updated_by_id: String::new(),
            last_updated_by_nom: String::new(),
        }
    }
}

/// Writers outside this crate historically stored `""` for "never updated".
fn deserialize_empty_as_none<'de, D>(d: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Editor writes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EditorUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    last_updated_by_id: &'a str,
    last_updated_by_nom: &'a str,
}

fn editor_write(
    store: &dyn DocumentStore,
    action_id: &str,
    update: &EditorUpdate<'_>,
    editor: &Principal,
) -> Result<CommitReceipt> {
    let mut batch = WriteBatch::new().with_principal(Some(editor.clone()));
    batch
        .update(Collection::Actions, action_id, update)?
        .server_timestamp("last_updated_at");
    store.commit(batch)
}

/// Set the status of an action. Returns `None` without writing when the
/// action already has `status`.
pub fn set_status(
    store: &dyn DocumentStore,
    action_id: &str,
    status: &str,
    editor: &Principal,
) -> Result<Option<CommitReceipt>> {
    let snap = store
        .get(Collection::Actions, action_id)?
        .ok_or_else(|| CrisisError::DocumentNotFound {
            collection: Collection::Actions.to_string(),
            id: action_id.to_string(),
        })?;
    if snap.data.get("status").and_then(|v| v.as_str()) == Some(status) {
        return Ok(None);
    }
    let update = EditorUpdate {
        status: Some(status),
        comment: None,
        last_updated_by_id: &editor.id,
        last_updated_by_nom: &editor.name,
    };
    editor_write(store, action_id, &update, editor).map(Some)
}

pub fn set_comment(
    store: &dyn DocumentStore,
    action_id: &str,
    comment: &str,
    editor: &Principal,
) -> Result<CommitReceipt> {
    let update = EditorUpdate {
        status: None,
        comment: Some(comment),
        last_updated_by_id: &editor.id,
        last_updated_by_nom: &editor.name,
    };
    editor_write(store, action_id, &update, editor)
}

pub fn delete_action(
    store: &dyn DocumentStore,
    action_id: &str,
    principal: Option<Principal>,
) -> Result<()> {
    let mut batch = WriteBatch::new().with_principal(principal);
    batch.delete(Collection::Actions, action_id);
    store.commit(batch)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_action(store: &dyn DocumentStore, action_id: &str) -> Result<Action> {
    let snap = store
        .get(Collection::Actions, action_id)?
        .ok_or_else(|| CrisisError::DocumentNotFound {
            collection: Collection::Actions.to_string(),
            id: action_id.to_string(),
        })?;
    snap.decode()
}

/// Actions of one incident ordered by category, then name.
pub fn list_actions(store: &dyn DocumentStore, incident_id: &str) -> Result<Vec<(String, Action)>> {
    let mut result = Vec::new();
    for snap in store.list(Collection::Actions)? {
        let action: Action = snap.decode()?;
        if action.incident_id == incident_id {
            result.push((snap.id, action));
        }
    }
    result.sort_by(|a, b| {
        (a.1.category.as_str(), a.1.name.as_str()).cmp(&(b.1.category.as_str(), b.1.name.as_str()))
    });
    Ok(result)
}
