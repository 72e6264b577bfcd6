use crate::error::{CrisisError, Result};
use crate::ids;
use crate::store::{Collection, DocumentStore, Principal, WriteBatch};
use serde::{Deserialize, Serialize};

/// A reusable checklist item, copied into every incident opened while it exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
}

pub fn add_template(
    store: &dyn DocumentStore,
    template: &ActionTemplate,
    principal: Option<Principal>,
) -> Result<String> {
    let id = ids::random_id();
    let mut batch = WriteBatch::new().with_principal(principal);
    batch.create(Collection::ActionTemplates, id.clone(), template)?;
    store.commit(batch)?;
    Ok(id)
}

/// Removing a template does not touch actions already generated from it.
pub fn remove_template(
    store: &dyn DocumentStore,
    id: &str,
    principal: Option<Principal>,
) -> Result<()> {
    let mut batch = WriteBatch::new().with_principal(principal);
    batch.delete(Collection::ActionTemplates, id);
    store.commit(batch)?;
    Ok(())
}

/// All templates ordered by category, then name.
pub fn list_templates(store: &dyn DocumentStore) -> Result<Vec<(String, ActionTemplate)>> {
    let mut result = Vec::new();
    for snap in store.list(Collection::ActionTemplates)? {
        let template: ActionTemplate = snap.decode()?;
        result.push((snap.id, template));
    }
    result.sort_by(|a, b| {
        (a.1.category.as_str(), a.1.name.as_str()).cmp(&(b.1.category.as_str(), b.1.name.as_str()))
    });
    Ok(result)
}

pub fn get_template(store: &dyn DocumentStore, id: &str) -> Result<ActionTemplate> {
    let snap = store
        .get(Collection::ActionTemplates, id)?
        .ok_or_else(|| CrisisError::DocumentNotFound {
            collection: Collection::ActionTemplates.to_string(),
            id: id.to_string(),
        })?;
    snap.decode()
}
