use super::Workspace;
use crate::output::{format_time, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use crisis_core::action;
use crisis_core::incident::{self as incident_ops, Incident, Kinetics};
use crisis_core::store::Principal;
use std::path::Path;

#[derive(Subcommand)]
pub enum IncidentSubcommand {
    /// Open an incident; its action checklist is generated from the templates
    Open {
        #[arg(long)]
        title: String,
        /// Id of the user opening the incident
        #[arg(long)]
        creator_id: String,
        /// Display name of the user opening the incident
        #[arg(long)]
        creator_name: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Expected pace of the incident: slow or fast
        #[arg(long, default_value = "slow")]
        kinetics: Kinetics,
        /// Mark the incident as a drill
        #[arg(long)]
        exercise: bool,
    },
    /// List incidents, newest first
    List,
    /// Show an incident and its action checklist
    Show { id: String },
}

pub fn run(
    root: &Path,
    subcmd: IncidentSubcommand,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        IncidentSubcommand::Open {
            title,
            creator_id,
            creator_name,
            location,
            description,
            kinetics,
            exercise,
        } => {
            let creator = Principal {
                id: creator_id,
                name: creator_name,
            };
            let mut incident = Incident::new(title, &creator);
            incident.location = location;
            incident.description = description;
            incident.kinetics = kinetics;
            incident.is_exercise = exercise;
            open(&ws, &incident, principal.or(Some(creator)), json)
        }
        IncidentSubcommand::List => list(&ws, json),
        IncidentSubcommand::Show { id } => show(&ws, &id, json),
    }
}

fn open(
    ws: &Workspace,
    incident: &Incident,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    let id = incident_ops::open_incident(ws.store.as_ref(), incident, principal)
        .context("failed to open incident")?;
    ws.settle()?;
    let actions = action::list_actions(ws.store.as_ref(), &id)?;

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "title": incident.title,
            "actions": actions.len(),
        }))?;
    } else {
        println!("Opened incident [{id}]: {}", incident.title);
        if ws.config.triggers.inline {
            println!("  {} action(s) generated", actions.len());
        } else {
            println!("  actions will be generated by `crisis worker`");
        }
    }
    Ok(())
}

fn list(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let incidents = incident_ops::list_incidents(ws.store.as_ref())?;

    if json {
        let items: Vec<_> = incidents
            .iter()
            .map(|(id, i)| -> anyhow::Result<serde_json::Value> {
                let mut value = serde_json::to_value(i)?;
                value["id"] = serde_json::Value::String(id.clone());
                Ok(value)
            })
            .collect::<anyhow::Result<_>>()?;
        print_json(&items)?;
        return Ok(());
    }

    if incidents.is_empty() {
        println!("No incidents.");
        return Ok(());
    }
    let rows = incidents
        .into_iter()
        .map(|(id, i)| {
            let title = if i.is_exercise {
                format!("{} (exercise)", i.title)
            } else {
                i.title
            };
            vec![
                id,
                i.status.to_string(),
                i.kinetics.to_string(),
                format_time(i.created_at),
                title,
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "KINETICS", "OPENED", "TITLE"], rows);
    Ok(())
}

fn show(ws: &Workspace, id: &str, json: bool) -> anyhow::Result<()> {
    let (snapshot, incident) = incident_ops::get_incident(ws.store.as_ref(), id)?
        .with_context(|| format!("incident '{id}' not found"))?;
    let actions = action::list_actions(ws.store.as_ref(), id)?;

    if json {
        let actions: Vec<_> = actions
            .iter()
            .map(|(action_id, a)| -> anyhow::Result<serde_json::Value> {
                let mut value = serde_json::to_value(a)?;
                value["id"] = serde_json::Value::String(action_id.clone());
                Ok(value)
            })
            .collect::<anyhow::Result<_>>()?;
        print_json(&serde_json::json!({
            "id": id,
            "version": snapshot.version,
            "incident": incident,
            "actions": actions,
        }))?;
        return Ok(());
    }

    println!("Incident:  {} [{id}]", incident.title);
    println!("Status:    {}", incident.status);
    println!("Kinetics:  {}", incident.kinetics);
    println!(
        "Opened:    {} by {} ({})",
        format_time(incident.created_at),
        incident.createur_nom,
        incident.createur_id
    );
    if !incident.location.is_empty() {
        println!("Location:  {}", incident.location);
    }
    if !incident.description.is_empty() {
        println!("\n{}", incident.description);
    }
    if incident.is_exercise {
        println!("\nThis incident is an exercise.");
    }

    println!("\nActions ({}):", actions.len());
    if actions.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    let rows = actions
        .into_iter()
        .map(|(action_id, a)| vec![action_id, a.category, a.status, a.name])
        .collect();
    print_table(&["ID", "CATEGORY", "STATUS", "NAME"], rows);
    Ok(())
}
