use anyhow::Context;
use crisis_core::{config::Config, io, paths, store::RedbStore};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing crisis in: {}", root.display());

    let dir = paths::crisis_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config.yaml")?
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let store_path = config.store_path(root);
    let existed = store_path.exists();
    RedbStore::open(&store_path)
        .with_context(|| format!("failed to open store at {}", store_path.display()))?;
    let verb = if existed { "exists: " } else { "created:" };
    println!("  {verb} {}", store_path.display());

    let entry = format!("{}/*.redb", paths::CRISIS_DIR);
    io::ensure_gitignore_entry(root, &entry).context("failed to update .gitignore")?;

    println!("\ncrisis initialized. Next: crisis template add --name <name> --category <category>");
    Ok(())
}
