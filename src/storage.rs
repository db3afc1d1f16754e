/// Persistent key-value storage used for command history.
/// `UserDataStore` keeps values in a ConfigFile under `user://`, the engine's
/// per-user data directory. Tests use the in-memory `MemoryStore`.
#[cfg(test)]
use std::collections::HashMap;

use godot::classes::ConfigFile;
use godot::global::Error as GError;
use godot::prelude::*;
use thiserror::Error;

pub const USER_DATA_FILE: &str = "user://line_console.cfg";
const SECTION: &str = "storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write `{key}`: {reason}")]
    Write { key: String, reason: String },
}

/// A string-keyed store of string values.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Key under which the command history of a console is persisted.
pub fn history_key(storage_id: &str) -> String {
    format!("{} command history", storage_id)
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    read_only: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail, like a browser store over quota.
    pub fn read_only() -> Self {
        Self {
            values: HashMap::new(),
            read_only: true,
        }
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "store is read-only".to_string(),
            });
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a ConfigFile in the user data directory.
pub struct UserDataStore {
    path: GString,
    file: Gd<ConfigFile>,
}

impl UserDataStore {
    pub fn open(path: &str) -> Self {
        let path = GString::from(path);
        let mut file = ConfigFile::new_gd();
        // A missing file is the normal first-run case.
        let err = file.load(&path);
        if err != GError::OK && err != GError::ERR_FILE_NOT_FOUND {
            godot_warn!("LineConsole: Could not read {}: {:?}", path, err);
        }
        Self { path, file }
    }
}

impl KeyValueStore for UserDataStore {
    fn get(&self, key: &str) -> Option<String> {
        if !self.file.has_section_key(SECTION, key) {
            return None;
        }
        let value = self.file.get_value(SECTION, key);
        value.try_to::<GString>().ok().map(|s| s.to_string())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.file
            .set_value(SECTION, key, &GString::from(value.as_str()).to_variant());
        let err = self.file.save(&self.path);
        if err == GError::OK {
            Ok(())
        } else {
            Err(StoreError::Write {
                key: key.to_string(),
                reason: format!("{:?}", err),
            })
        }
    }
}
