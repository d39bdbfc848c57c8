use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info};

/// Resolve where persisted entries live: explicit override, then the
/// `NLSTORE_DATA` environment variable, then `~/.nlstore`. The directory is
/// created when missing.
#[tracing::instrument(skip(override_dir))]
pub fn resolve_data_dir(override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        debug!(dir = %path.display(), "using data dir override");
        path.to_path_buf()
    } else if let Ok(env_dir) = std::env::var("NLSTORE_DATA") {
        debug!(dir = %env_dir, "using NLSTORE_DATA");
        PathBuf::from(env_dir)
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".nlstore"))
}
