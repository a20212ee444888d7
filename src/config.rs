// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Configuration management for the terrapin CLI.
//!
//! Settings come from, in increasing priority: built-in defaults, the first
//! `terrapin.toml` found (project directory, then the user config
//! directory), `TERRAPIN_*` environment variables and command line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use terrapin_compiler::{Addressing, CompilerOptions, VmOptions};
use tracing::debug;

use crate::error::{CliError, Result};

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "terrapin.toml";

/// Prefix of the environment variables that override settings.
const ENV_PREFIX: &str = "TERRAPIN_";

/// Configuration for the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings for compilation
    pub compiler: CompilerOptions,

    /// Settings for `terrapin run`
    pub vm: VmOptions,

    /// File the settings were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a project rooted at `project_dir`.
    ///
    /// `explicit` replaces the file search when given.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => search_paths(project_dir).into_iter().find(|p| p.is_file()),
        };
        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };
        config.apply_env(std::env::vars())?;
        debug!(source = ?config.source, "configuration loaded");
        Ok(config)
    }

    /// Reads one configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
        let mut config: Config = toml::from_str(&content).map_err(|source| CliError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Applies every `TERRAPIN_*` variable in `vars`.
    pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (key, value) in vars {
            if let Some(setting) = key.strip_prefix(ENV_PREFIX) {
                self.set(&setting.to_lowercase().replace('_', "-"), &value)?;
            }
        }
        Ok(())
    }

    /// Sets one value by its dashed name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "module-name" => self.compiler.module_name = value.to_string(),
            "vendor" => self.compiler.vendor = value.to_string(),
            "version" => self.compiler.version = parse_version(value)?,
            "addressing" => self.compiler.addressing = parse_addressing(value)?,
            "max-steps" => {
                self.vm.max_steps = value
                    .parse()
                    .map_err(|_| CliError::Config(format!("max-steps: '{}' is not a count", value)))?;
            }
            _ => debug!(key, "ignoring unknown setting"),
        }
        Ok(())
    }
}

/// Candidate configuration files, highest priority first.
pub fn search_paths(project_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![project_dir.join(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("terrapin").join(CONFIG_FILE));
    }
    paths
}

/// Parses `fixed` or `relative`.
pub fn parse_addressing(value: &str) -> Result<Addressing> {
    match value.to_ascii_lowercase().as_str() {
        "fixed" => Ok(Addressing::Fixed),
        "relative" => Ok(Addressing::Relative),
        other => Err(CliError::Config(format!(
            "addressing must be 'fixed' or 'relative', not '{}'",
            other
        ))),
    }
}

/// Parses a dotted version with up to four parts.
pub fn parse_version(value: &str) -> Result<[u16; 4]> {
    let mut version = [0u16; 4];
    let parts: Vec<&str> = value.split('.').collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(CliError::Config(format!("version '{}' has too many parts", value)));
    }
    for (slot, part) in version.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| CliError::Config(format!("version '{}' is not numeric", value)))?;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(search_paths(dir.path())[0], dir.path().join(CONFIG_FILE));
        let mut config = Config::default();
        config.apply_env(Vec::new()).unwrap();
        assert_eq!(config.compiler, CompilerOptions::default());
        assert_eq!(config.source, None);
    }

    #[test]
    fn test_project_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[compiler]\nmodule_name = \"spiral\"\naddressing = \"relative\"\n\n[vm]\nmax_steps = 500\n",
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.compiler.module_name, "spiral");
        assert_eq!(config.compiler.addressing, Addressing::Relative);
        assert_eq!(config.compiler.version, [1, 0, 0, 0]);
        assert_eq!(config.vm.max_steps, 500);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_bad_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[compiler\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::Toml { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(vec![
                ("TERRAPIN_MODULE_NAME".to_string(), "turtle".to_string()),
                ("TERRAPIN_ADDRESSING".to_string(), "Relative".to_string()),
                ("TERRAPIN_VERSION".to_string(), "2.1".to_string()),
                ("TERRAPIN_MAX_STEPS".to_string(), "42".to_string()),
                ("HOME".to_string(), "/nowhere".to_string()),
            ])
            .unwrap();
        assert_eq!(config.compiler.module_name, "turtle");
        assert_eq!(config.compiler.addressing, Addressing::Relative);
        assert_eq!(config.compiler.version, [2, 1, 0, 0]);
        assert_eq!(config.vm.max_steps, 42);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("addressing", "absolute").is_err());
        assert!(config.set("max-steps", "lots").is_err());
        assert!(config.set("version", "1.2.3.4.5").is_err());
        assert!(config.set("version", "1.x").is_err());
        config.set("colour", "blue").unwrap();
    }
}
