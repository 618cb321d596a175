use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::constants::FIELD_STORE_FILE;
use crate::models::HttpMethod;

/// Remembers what the user typed into endpoint fields between runs
pub struct FieldStore {
    values: BTreeMap<String, String>,
    path: Option<PathBuf>,
}

impl FieldStore {
    /// Cache file in the working directory
    pub fn new() -> Self {
        Self::at(PathBuf::from(FIELD_STORE_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        let mut store = FieldStore {
            values: BTreeMap::new(),
            path: Some(path.into()),
        };

        // Try to load saved data
        if let Err(e) = store.load() {
            tracing::warn!(error = %e, "Ignoring unreadable field cache");
        }
        store
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        FieldStore {
            values: BTreeMap::new(),
            path: None,
        }
    }

    /// Cache key for one field of one endpoint
    pub fn key(template: &str, method: HttpMethod, field: &str) -> String {
        format!("{template}-{method}-{field}")
    }

    /// Saved value, empty when nothing was saved
    pub fn get(&self, key: &str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.into(), value.into());
        self.save()
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path)?;
        self.values = serde_json::from_str(&content)?;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&self.values)?;
            fs::write(path, content)?;
        }
        Ok(())
    }
}

impl Default for FieldStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_empty() {
        let store = FieldStore::in_memory();
        assert_eq!(store.get("nope"), "");
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".apitester.json");

        let key = FieldStore::key("users/{{id}}", HttpMethod::GET, "id");
        assert_eq!(key, "users/{{id}}-GET-id");

        let mut store = FieldStore::at(&path);
        store.set(key.clone(), "42").unwrap();

        let reopened = FieldStore::at(&path);
        assert_eq!(reopened.get(&key), "42");
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".apitester.json");
        fs::write(&path, "not json").unwrap();

        let store = FieldStore::at(&path);
        assert_eq!(store.get("anything"), "");
    }
}
