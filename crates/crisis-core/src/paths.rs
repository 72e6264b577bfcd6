use std::path::{Path, PathBuf};

pub const CRISIS_DIR: &str = ".crisis";
pub const CONFIG_FILE: &str = ".crisis/config.yaml";
pub const DEFAULT_STORE_FILE: &str = "crisis.redb";

pub fn crisis_dir(root: &Path) -> PathBuf {
    root.join(CRISIS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured store path. Relative paths live under `.crisis/`.
pub fn store_path(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        crisis_dir(root).join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_store_path_lands_in_crisis_dir() {
        let root = Path::new("/srv/site");
        assert_eq!(
            store_path(root, Path::new("crisis.redb")),
            PathBuf::from("/srv/site/.crisis/crisis.redb")
        );
        assert_eq!(
            store_path(root, Path::new("/var/lib/crisis.redb")),
            PathBuf::from("/var/lib/crisis.redb")
        );
    }
}
