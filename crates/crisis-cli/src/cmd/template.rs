use super::Workspace;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use crisis_core::store::Principal;
use crisis_core::template::{self as template_ops, ActionTemplate};
use std::path::Path;

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// Add an action template; applies to incidents opened from now on
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// List action templates
    List,
    /// Remove an action template (existing actions are kept)
    Remove { id: String },
}

pub fn run(
    root: &Path,
    subcmd: TemplateSubcommand,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        TemplateSubcommand::Add { name, category } => add(&ws, name, category, principal, json),
        TemplateSubcommand::List => list(&ws, json),
        TemplateSubcommand::Remove { id } => remove(&ws, &id, principal, json),
    }
}

fn add(
    ws: &Workspace,
    name: String,
    category: String,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    let template = ActionTemplate { name, category };
    let id = template_ops::add_template(ws.store.as_ref(), &template, principal)
        .context("failed to add template")?;
    ws.settle()?;

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "name": template.name,
            "category": template.category,
        }))?;
    } else {
        println!("Added template [{id}]: {}", template.name);
    }
    Ok(())
}

fn list(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let templates = template_ops::list_templates(ws.store.as_ref())?;

    if json {
        let items: Vec<_> = templates
            .iter()
            .map(|(id, t)| serde_json::json!({ "id": id, "name": t.name, "category": t.category }))
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    if templates.is_empty() {
        println!("No action templates. Add one with: crisis template add --name <name>");
        return Ok(());
    }
    let rows = templates
        .into_iter()
        .map(|(id, t)| vec![id, t.category, t.name])
        .collect();
    print_table(&["ID", "CATEGORY", "NAME"], rows);
    Ok(())
}

fn remove(
    ws: &Workspace,
    id: &str,
    principal: Option<Principal>,
    json: bool,
) -> anyhow::Result<()> {
    template_ops::remove_template(ws.store.as_ref(), id, principal)
        .with_context(|| format!("failed to remove template '{id}'"))?;
    ws.settle()?;

    if json {
        print_json(&serde_json::json!({ "id": id, "removed": true }))?;
    } else {
        println!("Removed template [{id}]");
    }
    Ok(())
}
