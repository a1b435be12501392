// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Ambient configuration loading: `AppConfig` arrives as a TOML file found
//! on a small search path, not owned or persisted by the core itself (see
//! the core's "no persisted state" design note) — this module is the
//! reference loader a standalone binary uses to get one.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Trait for loading a TOML configuration file with a default search path
/// (current directory, then XDG config dir, then `/etc`).
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn config_filename() -> &'static str;

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Search default paths and load the first one found. Returns
    /// `(Default::default(), None)` when nothing exists on the path, so a
    /// caller can still start up and be reconfigured later.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::default_search_paths() {
            if path.exists() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::config_filename())];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("multirig").join(Self::config_filename()));
        }
        paths.push(PathBuf::from("/etc/multirig").join(Self::config_filename()));
        paths
    }
}

impl Default for crate::registry::AppConfig {
    fn default() -> Self {
        Self {
            rigs: Vec::new(),
            sync_source_index: 0,
            sync_enabled: true,
            rigctl_to_main_enabled: true,
            rigctl_listen_host: "0.0.0.0".to_string(),
            rigctl_listen_port: 4534,
            all_rigs_enabled: true,
        }
    }
}

impl ConfigFile for crate::registry::AppConfig {
    fn config_filename() -> &'static str {
        "multirig.toml"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AppConfig;

    #[test]
    fn default_search_paths_include_cwd_and_etc() {
        let paths = AppConfig::default_search_paths();
        assert!(paths.iter().any(|p| p.ends_with("multirig.toml")));
        assert!(paths
            .iter()
            .any(|p| p.starts_with("/etc/multirig")));
    }

    #[test]
    fn missing_paths_fall_back_to_default_config() {
        let (cfg, path) = AppConfig::load_from_default_paths().unwrap_or_else(|_| {
            (AppConfig::default(), None)
        });
        if path.is_none() {
            assert!(cfg.rigs.is_empty());
        }
    }
}
