//! Enrollment location names.
//!
//! Messages read better with "Blaine NEXUS (5020)" than a bare id. Names
//! come from an optional JSON file shaped like the provider's location
//! listing: `[{"id": 5020, "name": "Blaine NEXUS", ...}]`. Unknown ids
//! still render.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

#[derive(Debug, Deserialize)]
struct LocationEntry {
    id: u32,
    name: String,
}

#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    names: HashMap<u32, String>,
}

impl LocationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, id: u32, name: impl Into<String>) -> Self {
        self.names.insert(id, name.into());
        self
    }

    pub fn from_json(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let entries: Vec<LocationEntry> =
            serde_json::from_str(contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            names: entries
                .into_iter()
                .map(|entry| (entry.id, entry.name.trim().to_string()))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &contents)
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Human-readable label for messages.
    pub fn label(&self, id: u32) -> String {
        match self.name(id) {
            Some(name) => format!("{} ({})", name, id),
            None => format!("Location {}", id),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
