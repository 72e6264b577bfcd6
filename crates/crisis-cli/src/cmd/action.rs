use super::{require_principal, Workspace};
use crate::output::{format_time, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use crisis_core::action::{self as action_ops, KNOWN_STATUSES};
use crisis_core::history::{list_history, HistoryFilter};
use crisis_core::store::Principal;
use std::path::Path;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// List the actions of an incident
    List {
        #[arg(long)]
        incident: String,
    },
    /// Change the status of an action (recorded in its history)
    SetStatus { id: String, status: String },
    /// Replace the comment on an action
    Comment {
        id: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Delete an action; its history is kept
    Delete { id: String },
}

pub fn run(
    root: &Path,
    subcmd: ActionSubcommand,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        ActionSubcommand::List { incident } => list(&ws, &incident, json),
        ActionSubcommand::SetStatus { id, status } => {
            set_status(&ws, &id, &status, &require_principal(principal)?, json)
        }
        ActionSubcommand::Comment { id, text } => {
            comment(&ws, &id, &text.join(" "), &require_principal(principal)?, json)
        }
        ActionSubcommand::Delete { id } => delete(&ws, &id, principal, json),
    }
}

fn list(ws: &Workspace, incident_id: &str, json: bool) -> anyhow::Result<()> {
    let actions = action_ops::list_actions(ws.store.as_ref(), incident_id)?;

    if json {
        let items: Vec<_> = actions
            .iter()
            .map(|(id, a)| -> anyhow::Result<serde_json::Value> {
                let mut value = serde_json::to_value(a)?;
                value["id"] = serde_json::Value::String(id.clone());
                Ok(value)
            })
            .collect::<anyhow::Result<_>>()?;
        print_json(&items)?;
        return Ok(());
    }

    if actions.is_empty() {
        println!("No actions for incident '{incident_id}'.");
        return Ok(());
    }
    let rows = actions
        .into_iter()
        .map(|(id, a)| {
            let updated = if a.last_updated_by_nom.is_empty() {
                "-".to_string()
            } else {
                format!("{} {}", format_time(a.last_updated_at), a.last_updated_by_nom)
            };
            vec![id, a.category, a.status, a.name, updated]
        })
        .collect();
    print_table(&["ID", "CATEGORY", "STATUS", "NAME", "LAST UPDATE"], rows);
    Ok(())
}

fn set_status(
    ws: &Workspace,
    id: &str,
    status: &str,
    editor: &Principal,
    json: bool,
) -> anyhow::Result<()> {
    if !KNOWN_STATUSES.contains(&status) {
        tracing::warn!(status, "status is not one of: {}", KNOWN_STATUSES.join(", "));
    }
    let changed = action_ops::set_status(ws.store.as_ref(), id, status, editor)
        .with_context(|| format!("failed to update action '{id}'"))?
        .is_some();
    ws.settle()?;
    let recorded = list_history(
        ws.store.as_ref(),
        &HistoryFilter {
            action_id: Some(id),
            ..HistoryFilter::default()
        },
    )?
    .len();

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "status": status,
            "changed": changed,
            "history_entries": recorded,
        }))?;
    } else if !changed {
        println!("Action [{id}] already has status '{status}'");
    } else {
        println!("Action [{id}] is now '{status}'");
    }
    Ok(())
}

fn comment(
    ws: &Workspace,
    id: &str,
    text: &str,
    editor: &Principal,
    json: bool,
) -> anyhow::Result<()> {
    action_ops::set_comment(ws.store.as_ref(), id, text, editor)
        .with_context(|| format!("failed to update action '{id}'"))?;
    ws.settle()?;

    if json {
        print_json(&serde_json::json!({ "id": id, "comment": text }))?;
    } else {
        println!("Commented on action [{id}]");
    }
    Ok(())
}

fn delete(
    ws: &Workspace,
    id: &str,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    action_ops::delete_action(ws.store.as_ref(), id, principal)
        .with_context(|| format!("failed to delete action '{id}'"))?;
    ws.settle()?;

    if json {
        print_json(&serde_json::json!({ "id": id, "deleted": true }))?;
    } else {
        println!("Deleted action [{id}]");
    }
    Ok(())
}
