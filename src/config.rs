//! Runtime configuration.
//!
//! Defaults match the host's conventions. A JSON file may override any
//! subset of fields, and `JUNO_*` environment variables override both.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ACTIVATION_HOOK, DEACTIVATION_HOOK, DEFAULT_SOCKET_PATH, MAX_FRAME_SIZE, READ_BUFFER_SIZE,
};

/// Configuration for a [`JunoModule`](crate::JunoModule).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ModuleConfig {
    /// Path of the host's Unix domain socket.
    pub socket_path: PathBuf,
    /// Hook name the host triggers to activate the module.
    pub activation_hook: String,
    /// Hook name the host triggers to deactivate the module.
    pub deactivation_hook: String,
    /// Inbound frames longer than this many bytes are dropped.
    pub max_frame_size: usize,
    /// Size of each transport read.
    pub read_buffer_size: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            activation_hook: ACTIVATION_HOOK.to_string(),
            deactivation_hook: DEACTIVATION_HOOK.to_string(),
            max_frame_size: MAX_FRAME_SIZE,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

impl ModuleConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load from a JSON file, then apply environment overrides.
    ///
    /// Fields missing from the file keep their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override fields from `JUNO_*` environment variables.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(socket_path) = var("JUNO_SOCKET_PATH") {
            self.socket_path = PathBuf::from(socket_path);
        }

        if let Some(hook) = var("JUNO_ACTIVATION_HOOK") {
            self.activation_hook = hook;
        }

        if let Some(hook) = var("JUNO_DEACTIVATION_HOOK") {
            self.deactivation_hook = hook;
        }

        if let Some(max_frame_size) = var("JUNO_MAX_FRAME_SIZE") {
            if let Ok(size) = max_frame_size.parse::<usize>() {
                self.max_frame_size = size;
            }
        }

        if let Some(read_buffer_size) = var("JUNO_READ_BUFFER_SIZE") {
            if let Ok(size) = read_buffer_size.parse::<usize>() {
                self.read_buffer_size = size;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ModuleConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("../juno.sock"));
        assert_eq!(config.activation_hook, "juno.activated");
        assert_eq!(config.deactivation_hook, "juno.deactivated");
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("JUNO_SOCKET_PATH", "/tmp/host.sock"),
            ("JUNO_ACTIVATION_HOOK", "host.up"),
            ("JUNO_MAX_FRAME_SIZE", "1024"),
            ("JUNO_READ_BUFFER_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ModuleConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.socket_path, PathBuf::from("/tmp/host.sock"));
        assert_eq!(config.activation_hook, "host.up");
        assert_eq!(config.deactivation_hook, "juno.deactivated");
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("juno.json");
        fs::write(&path, r#"{"socket_path": "/run/juno.sock", "max_frame_size": 4096}"#).unwrap();

        let config = ModuleConfig::load_from_file(&path).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/juno.sock"));
        assert_eq!(config.max_frame_size, 4096);
        assert_eq!(config.activation_hook, "juno.activated");
        assert_eq!(config.deactivation_hook, "juno.deactivated");
        assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModuleConfig::load_from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{nope").unwrap();
        let err = ModuleConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
