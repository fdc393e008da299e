// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TOML configuration file support (spec.md §6, ambient stack).
//!
//! Grounded on the teacher's `trx-app::config::ConfigFile` trait: a
//! default-search-path lookup (CWD → XDG config dir → `/etc`) with
//! `serde`/`toml` deserialization and a `thiserror` error enum. The
//! teacher's combined multi-binary config file (`trx-rs.toml` with a
//! per-binary section key) is dropped here since this crate ships a single
//! binary, so there is no section to disambiguate.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Trait for loading a TOML config file from a set of default search paths.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn config_filename() -> &'static str;

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::config_filename())];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sdrfm").join(Self::config_filename()));
        }
        paths.push(PathBuf::from("/etc/sdrfm").join(Self::config_filename()));
        paths
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Search default paths and load the first one found. Returns the
    /// compiled-in default (not an error) when no config file exists.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::default_search_paths() {
            if path.exists() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }
}

/// Receiver defaults that a user may override in `sdrfm.toml`; every field
/// is also settable from the CLI (spec.md §6), with CLI flags taking
/// precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub device: String,
    pub device_index: u32,
    pub device_config: String,
    pub buffer_seconds: f32,
    pub squelch_db: f32,
    pub multipath_stages: Option<usize>,
    pub ppm_offset: f64,
    pub pps_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            device: "rtlsdr".to_string(),
            device_index: 0,
            device_config: String::new(),
            buffer_seconds: 0.2,
            squelch_db: -150.0,
            multipath_stages: None,
            ppm_offset: 0.0,
            pps_file: None,
            log_level: None,
        }
    }
}

impl ConfigFile for ReceiverConfig {
    fn config_filename() -> &'static str {
        "sdrfm.toml"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let (cfg, path) = ReceiverConfig::load_from_default_paths().unwrap();
        if path.is_none() {
            assert_eq!(cfg.device, "rtlsdr");
        }
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_defaults() {
        let toml_text = "squelch_db = -12.0\n";
        let parsed: ReceiverConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(parsed.squelch_db, -12.0);
        assert_eq!(parsed.device, "rtlsdr");
    }
}
