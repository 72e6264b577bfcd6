use crate::error::Result;
use crate::ids;
use crate::store::{Collection, DocumentStore, Principal, Snapshot, WriteBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// IncidentStatus / Kinetics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    #[default]
    #[serde(rename = "inevolution")]
    InEvolution,
    #[serde(rename = "controlled")]
    Controlled,
    #[serde(rename = "finish")]
    Finished,
    #[serde(rename = "archived")]
    Archived,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentStatus::InEvolution => "inevolution",
            IncidentStatus::Controlled => "controlled",
            IncidentStatus::Finished => "finish",
            IncidentStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// How fast the situation is developing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kinetics {
    #[default]
    Slow,
    Fast,
}

impl fmt::Display for Kinetics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kinetics::Slow => f.write_str("slow"),
            Kinetics::Fast => f.write_str("fast"),
        }
    }
}

impl FromStr for Kinetics {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "slow" => Ok(Kinetics::Slow),
            "fast" => Ok(Kinetics::Fast),
            other => Err(format!("unknown kinetics '{other}': expected slow or fast")),
        }
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

/// A crisis event being tracked.
///
/// Only the creator identity matters to the action fan-out, which decodes
/// [`IncidentCreator`] instead; the other fields are descriptive and owned by
/// whoever opened the incident.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub createur_id: String,
    #[serde(default)]
    pub createur_nom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub kinetics: Kinetics,
    #[serde(default)]
    pub is_exercise: bool,
}

impl Incident {
    pub fn new(title: impl Into<String>, creator: &Principal) -> Self {
        Self {
            createur_id: creator.id.clone(),
            createur_nom: creator.name.clone(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// The creator fields of an incident. Any other field, including values
/// this crate does not model, is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IncidentCreator {
    #[serde(default)]
    pub createur_id: String,
    #[serde(default)]
    pub createur_nom: String,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Write a new incident and return its id. `created_at` is assigned by the
/// store at commit time.
pub fn open_incident(
    store: &dyn DocumentStore,
    incident: &Incident,
    principal: Option<Principal>,
) -> Result<String> {
    let id = ids::random_id();
    let mut batch = WriteBatch::new().with_principal(principal);
    batch
        .create(Collection::Incidents, id.clone(), incident)?
        .server_timestamp("created_at");
    store.commit(batch)?;
    Ok(id)
}

pub fn get_incident(store: &dyn DocumentStore, id: &str) -> Result<Option<(Snapshot, Incident)>> {
    match store.get(Collection::Incidents, id)? {
        Some(snap) => {
            let incident = snap.decode()?;
            Ok(Some((snap, incident)))
        }
        None => Ok(None),
    }
}

/// All incidents, newest first.
pub fn list_incidents(store: &dyn DocumentStore) -> Result<Vec<(String, Incident)>> {
    let mut result = Vec::new();
    for snap in store.list(Collection::Incidents)? {
        let incident: Incident = snap.decode()?;
        result.push((snap.id, incident));
    }
    result.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
    Ok(result)
}
