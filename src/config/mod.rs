//! Persistent key/value configuration store
//!
//! Credentials and identifiers live in a flat TOML mapping. Resolution order:
//! an explicit `--config FILE` path wins, then a per-project `.wpforge.toml`
//! in the working directory, then the user-scoped `~/.wpforge.toml` (created
//! on first write). `created_at` and `updated_at` are reserved, system-managed
//! keys; they are stored like any other entry but excluded from user-facing
//! listing and editing.

pub mod resolve;

use crate::error::ConfigError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = ".wpforge.toml";

/// Keys the store manages itself; hidden from listing and editing
pub const RESERVED_KEYS: &[&str] = &["created_at", "updated_at"];

/// Get the global config file path (~/.wpforge.toml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

/// Get the local config file path (project/.wpforge.toml)
pub fn local_config_path(project_path: &Path) -> PathBuf {
    project_path.join(CONFIG_FILE_NAME)
}

/// Flat key/value store backed by a single TOML file
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Open the store, resolving the file path per the precedence rules.
    ///
    /// A missing file is not an error; it materializes on first write.
    pub fn open(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let local = local_config_path(Path::new("."));
                if local.exists() {
                    local
                } else {
                    global_config_path().ok_or(ConfigError::NoHome)?
                }
            }
        };
        Self::open_at(path)
    }

    /// Open the store at an exact path
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a single value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Write a value and persist immediately
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let now = Utc::now().to_rfc3339();
        if !self.values.contains_key("created_at") {
            self.values.insert("created_at".to_string(), now.clone());
        }
        self.values.insert("updated_at".to_string(), now);
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    /// Remove a key and persist; returns whether the key existed
    pub fn delete(&mut self, key: &str) -> Result<bool, ConfigError> {
        let existed = self.values.remove(key).is_some();
        if existed {
            self.values
                .insert("updated_at".to_string(), Utc::now().to_rfc3339());
            self.save()?;
        }
        Ok(existed)
    }

    /// The full mapping, reserved keys included
    pub fn read(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Entries suitable for display: reserved timestamp keys filtered out
    pub fn visible_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.values)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, content).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
