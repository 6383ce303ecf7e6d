use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "jobgen";

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn jobgen_home() -> Option<PathBuf> {
    env::var_os("JOBGEN_HOME").map(PathBuf::from)
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = jobgen_home() {
        return ensure_dir(&base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join(APP_DIR));
    }

    ensure_dir(&home_dir()?.join(".config").join(APP_DIR))
}

pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = jobgen_home() {
        return ensure_dir(&base.join("state"));
    }

    if let Some(xdg) = env::var_os("XDG_STATE_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join(APP_DIR));
    }

    ensure_dir(&home_dir()?.join(".local").join("state").join(APP_DIR))
}

/// Holds the persisted theme choice.
pub fn preferences_path() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("preferences.json"))
}
