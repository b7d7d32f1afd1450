//! Configuration bootstrap for Ensemble binaries.
//!
//! Loads environment settings from the XDG `config.toml` and the project
//! `.env`, applying them to the process with priority
//! **existing env > .env > XDG**, and resolves the workspace root where
//! task sessions, memories, and scratch directories live.
//!
//! The core engine takes all configuration through injected values; this
//! crate exists so the CLI (and other binaries) have one place to gather
//! them from the environment.

mod dotenv;
mod xdg_toml;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable overriding the workspace root.
pub const WORKSPACE_ENV: &str = "ENSEMBLE_WORKSPACE";

/// Default workspace root, relative to the working directory.
pub const DEFAULT_WORKSPACE: &str = "workspace";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and an optional project `.env`, then
/// sets environment variables only for keys that are **not** already set
/// (existing env has highest priority).
///
/// Order of precedence when a key is missing from the process environment:
/// 1. Value from the project `.env` (current directory, or `override_dir`).
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table.
///
/// * `app_name`: e.g. `"ensemble"`, the XDG subdirectory name.
/// * `override_dir`: look for `.env` here instead of the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        let value = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)).cloned();
        if let Some(v) = value {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}

/// Resolves the workspace root: an explicit override wins, then
/// `$ENSEMBLE_WORKSPACE`, then `./workspace`.
///
/// The directory is not created here; stores create what they need.
pub fn workspace_dir(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(WORKSPACE_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(DEFAULT_WORKSPACE)
}
