use super::Workspace;
use crate::output::{format_time, print_json, print_table};
use clap::Subcommand;
use crisis_core::history::{list_history, HistoryFilter};
use std::path::Path;

#[derive(Subcommand)]
pub enum HistorySubcommand {
    /// List status transitions, oldest first
    List {
        /// Only transitions of actions belonging to this incident
        #[arg(long)]
        incident: Option<String>,
        /// Only transitions of this action
        #[arg(long)]
        action: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: HistorySubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        HistorySubcommand::List { incident, action } => {
            let filter = HistoryFilter {
                incident_id: incident.as_deref(),
                action_id: action.as_deref(),
            };
            list(&ws, &filter, json)
        }
    }
}

fn list(ws: &Workspace, filter: &HistoryFilter<'_>, json: bool) -> anyhow::Result<()> {
    let entries = list_history(ws.store.as_ref(), filter)?;

    if json {
        let items: Vec<_> = entries
            .iter()
            .map(|(id, e)| -> anyhow::Result<serde_json::Value> {
                let mut value = serde_json::to_value(e)?;
                value["id"] = serde_json::Value::String(id.clone());
                Ok(value)
            })
            .collect::<anyhow::Result<_>>()?;
        print_json(&items)?;
        return Ok(());
    }

    if entries.is_empty() {
        println!("No status changes recorded.");
        return Ok(());
    }
    let rows = entries
        .into_iter()
        .map(|(_, e)| {
            vec![
                format_time(e.timestamp),
                e.action_name,
                format!("{} -> {}", e.previous_status, e.new_status),
                format!("{} ({})", e.utilisateur_nom, e.utilisateur_id),
                e.comment,
            ]
        })
        .collect();
    print_table(&["WHEN", "ACTION", "TRANSITION", "BY", "COMMENT"], rows);
    Ok(())
}
