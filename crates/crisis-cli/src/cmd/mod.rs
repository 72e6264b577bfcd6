pub mod action;
pub mod history;
pub mod incident;
pub mod init;
pub mod template;
pub mod triggers;
pub mod worker;

use anyhow::Context;
use crisis_core::config::{Config, WarnLevel};
use crisis_core::dispatch::{Dispatcher, DrainReport};
use crisis_core::store::{Principal, RedbStore};
use std::path::Path;
use std::sync::Arc;

/// An opened project: its config and a handle on the document store.
pub struct Workspace {
    pub config: Config,
    pub store: Arc<RedbStore>,
}

impl Workspace {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load .crisis/config.yaml")?;
        for warning in config.validate() {
            match warning.level {
                WarnLevel::Error => anyhow::bail!("invalid config: {}", warning.message),
                WarnLevel::Warning => tracing::warn!("config: {}", warning.message),
            }
        }
        let path = config.store_path(root);
        let store = RedbStore::open(&path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::standard(self.store.clone(), &self.config)
    }

    /// Run the processors for what was just written when triggers run inline.
    /// With `triggers.inline: false` the changes wait for `crisis worker`.
    pub fn settle(&self) -> anyhow::Result<Option<DrainReport>> {
        if !self.config.triggers.inline {
            return Ok(None);
        }
        let report = self
            .dispatcher()
            .drain()
            .context("failed to run triggers")?;
        if report.failed > 0 || report.dead_lettered > 0 {
            tracing::warn!(
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "some triggers failed; see `crisis triggers pending`"
            );
        }
        Ok(Some(report))
    }
}

pub fn require_principal(principal: Option<Principal>) -> anyhow::Result<Principal> {
    principal.context("no user given: pass --principal-id or set CRISIS_PRINCIPAL_ID")
}
