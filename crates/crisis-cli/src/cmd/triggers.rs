use super::Workspace;
use crate::output::{format_time, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use crisis_core::dispatch::DrainReport;
use crisis_core::store::{ChangeFeed, ChangeRecord};
use std::path::Path;

#[derive(Subcommand)]
pub enum TriggersSubcommand {
    /// Deliver every pending change to the processors now
    Drain,
    /// Show changes waiting for delivery
    Pending {
        /// Maximum number of changes to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show changes that exhausted their delivery attempts
    DeadLetters,
    /// Put a dead-lettered change back on the feed with a fresh attempt budget
    Requeue { seq: u64 },
}

pub fn run(root: &Path, subcmd: TriggersSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        TriggersSubcommand::Drain => drain(&ws, json),
        TriggersSubcommand::Pending { limit } => {
            let records = ws.store.pending_changes(limit)?;
            show_records(&records, "No pending changes.", json)
        }
        TriggersSubcommand::DeadLetters => {
            let records = ws.store.dead_letters()?;
            show_records(&records, "No dead-lettered changes.", json)
        }
        TriggersSubcommand::Requeue { seq } => requeue(&ws, seq, json),
    }
}

fn drain(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let report = ws
        .dispatcher()
        .drain()
        .context("failed to drain change feed")?;
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &DrainReport) {
    println!(
        "delivered {}, unrouted {}, documents written {}",
        report.delivered, report.unrouted, report.writes
    );
    if report.failed > 0 || report.dead_lettered > 0 || report.held_back > 0 {
        println!(
            "failed {} (will retry), dead-lettered {}, held back {}",
            report.failed, report.dead_lettered, report.held_back
        );
    }
}

fn requeue(ws: &Workspace, seq: u64, json: bool) -> anyhow::Result<()> {
    ws.store
        .requeue(seq)
        .with_context(|| format!("failed to requeue change #{seq}"))?;
    let report = ws.settle()?;

    if json {
        print_json(&serde_json::json!({ "seq": seq, "requeued": true, "drain": report }))?;
    } else {
        println!("Requeued change #{seq}");
        if let Some(report) = report {
            print_report(&report);
        }
    }
    Ok(())
}

fn show_records(records: &[ChangeRecord], empty: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&records)?;
        return Ok(());
    }
    if records.is_empty() {
        println!("{empty}");
        return Ok(());
    }
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.seq().to_string(),
                format!("{}/{}", r.event.collection, r.event.document_id),
                format!("{:?}", r.event.kind).to_lowercase(),
                format_time(Some(r.event.commit_time)),
                r.attempts.to_string(),
                r.last_error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(
        &["SEQ", "DOCUMENT", "KIND", "COMMITTED", "ATTEMPTS", "LAST ERROR"],
        rows,
    );
    Ok(())
}
