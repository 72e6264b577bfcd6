//! Materializes the action checklist of a newly opened incident.

use std::sync::Arc;

use tracing::{info, warn};

use crate::action::Action;
use crate::dispatch::{Outcome, SkipReason, TriggerHandler};
use crate::error::Result;
use crate::ids;
use crate::incident::IncidentCreator;
use crate::store::{ChangeEvent, ChangeKind, Collection, DocumentStore, WriteBatch};
use crate::template::ActionTemplate;

/// On incident creation, writes one action per template in a single batch.
///
/// Action ids are derived from `(incident_id, template_id)` and written with
/// create-if-absent, so a redelivered event neither duplicates the checklist
/// nor overwrites actions editors have already changed.
pub struct TemplateFanOut {
    store: Arc<dyn DocumentStore>,
}

impl TemplateFanOut {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl TriggerHandler for TemplateFanOut {
    fn name(&self) -> &'static str {
        "template_fan_out"
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        event.collection == Collection::Incidents && event.kind == ChangeKind::Created
    }

    fn handle(&self, event: &ChangeEvent) -> Result<Outcome> {
        let incident_id = event.document_id.as_str();

        let Some(snapshot) = event.after.as_ref().filter(|s| !s.is_empty()) else {
            warn!(incident_id, "incident created without data; no actions generated");
            return Ok(Outcome::skipped(SkipReason::MissingPayload));
        };
        let creator: IncidentCreator = snapshot.decode()?;

        info!(incident_id, "generating default actions");

        let templates = self.store.list(Collection::ActionTemplates)?;
        if templates.is_empty() {
            warn!(incident_id, "no action templates configured; no actions generated");
            return Ok(Outcome::skipped(SkipReason::NoTemplates));
        }

        let mut batch = WriteBatch::new();
        for template_snap in &templates {
            let template: ActionTemplate = template_snap.decode()?;
            let action = Action::from_template(incident_id, &creator, &template);
            batch
                .create_if_absent(
                    Collection::Actions,
                    ids::action_id(incident_id, &template_snap.id),
                    &action,
                )?
                .server_timestamp("created_at");
        }

        let receipt = self.store.commit(batch)?;
        if receipt.written.is_empty() {
            info!(incident_id, "default actions already present");
            return Ok(Outcome::skipped(SkipReason::AlreadyApplied));
        }

        info!(
            incident_id,
            created = receipt.written.len(),
            templates = templates.len(),
            "default actions created"
        );
        Ok(Outcome::Applied {
            writes: receipt.written.len(),
        })
    }
}
