use super::Workspace;
use crate::output::print_json;
use anyhow::Context;
use crisis_core::dispatch::DrainReport;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Host the trigger processors: drain the change feed every
/// `triggers.poll_interval_ms` until Ctrl-C.
///
/// The store file is locked while open, so each pass opens it, drains, and
/// closes it again to let other `crisis` commands write in between.
pub fn run(root: &Path, once: bool, json: bool) -> anyhow::Result<()> {
    if once {
        let report = drain_pass(root)?;
        if json {
            print_json(&report)?;
        } else {
            super::triggers::print_report(&report);
        }
        return Ok(());
    }

    let ws = Workspace::open(root)?;
    let interval = Duration::from_millis(ws.config.triggers.poll_interval_ms);
    info!(
        handlers = ?ws.dispatcher().handler_names(),
        poll_ms = ws.config.triggers.poll_interval_ms,
        "trigger worker started"
    );
    drop(ws);

    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();
    rt.block_on(async move {
        let result = tokio::select! {
            res = poll(root_buf, interval) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        };
        info!("trigger worker stopped");
        result
    })
}

fn drain_pass(root: &Path) -> anyhow::Result<DrainReport> {
    let ws = Workspace::open(root)?;
    ws.dispatcher()
        .drain()
        .context("failed to drain change feed")
}

async fn poll(root: PathBuf, interval: Duration) -> anyhow::Result<()> {
    loop {
        let pass_root = root.clone();
        match tokio::task::spawn_blocking(move || drain_pass(&pass_root)).await? {
            Ok(report) => log_report(&report),
            // Another crisis command may hold the store; retry next tick.
            Err(e) => warn!(error = %format!("{e:#}"), "drain pass failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

fn log_report(report: &DrainReport) {
    if report == &DrainReport::default() {
        return;
    }
    info!(
        delivered = report.delivered,
        unrouted = report.unrouted,
        writes = report.writes,
        failed = report.failed,
        dead_lettered = report.dead_lettered,
        held_back = report.held_back,
        "drained change feed"
    );
}
