//! Live config - snapshot swapping, change detection and appended entries

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::loader::{ConfigError, ConfigModel};
use crate::config::settings::Settings;
use crate::models::{HttpMethod, UrlEntry, UrlNode};
use crate::plugins::PluginRegistry;
use crate::template::Template;

/// Identity of the file contents at the last successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

fn toml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn toml_key(name: &str) -> String {
    let bare = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        name.to_string()
    } else {
        toml_string(name)
    }
}

/// Owns the config file and the current immutable snapshot
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
    registry: Arc<PluginRegistry>,
    current: Arc<ConfigModel>,
    loaded: Option<Fingerprint>,
}

impl ConfigStore {
    /// Initial load; any error here is fatal for the caller
    pub fn open(
        path: impl Into<PathBuf>,
        settings: Settings,
        registry: Arc<PluginRegistry>,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let loaded = fingerprint(&path);
        let model = ConfigModel::load(&path, &settings, &registry)?;
        tracing::info!(path = %path.display(), endpoints = model.urls.leaves().len(), auth = model.auth.type_tag(), "Loaded config");

        Ok(ConfigStore {
            path,
            settings,
            registry,
            current: Arc::new(model),
            loaded,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Arc<ConfigModel> {
        Arc::clone(&self.current)
    }

    /// True when the file changed since the last successful load
    pub fn check_reload(&self) -> bool {
        fingerprint(&self.path) != self.loaded
    }

    /// Re-read the file; on failure the previous snapshot stays active
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let seen = fingerprint(&self.path);
        match ConfigModel::load(&self.path, &self.settings, &self.registry) {
            Ok(model) => {
                tracing::info!(path = %self.path.display(), "Reloaded config");
                self.current = Arc::new(model);
                self.loaded = seen;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Config reload failed, keeping previous config");
                Err(e)
            }
        }
    }

    /// Reload only when the file changed; returns whether a new snapshot is active
    pub fn reload_if_changed(&mut self) -> Result<bool, ConfigError> {
        if !self.check_reload() {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    /// Make `name` a live top-level endpoint and record it, commented out, in the file
    pub fn add_entry(&mut self, name: &str, url: &str, method: HttpMethod) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() || name.contains('.') || name.contains(char::is_control) {
            return Err(ConfigError::Validation {
                message: format!("invalid entry name {name:?}"),
            });
        }
        if url.contains(char::is_control) {
            return Err(ConfigError::Validation {
                message: format!("url for '{name}' must be a single line"),
            });
        }
        let template = Template::parse(url).map_err(|e| ConfigError::Template {
            location: format!("urls.{name}"),
            source: e,
        })?;

        let mut model = (*self.current).clone();
        model
            .urls
            .insert(name, UrlNode::Leaf(UrlEntry::new(template, method, Vec::new())));

        let line = format!(
            "\n# {} = {{ url = {}, method = \"{method}\" }}",
            toml_key(name),
            toml_string(url)
        );
        OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| ConfigError::Write {
                path: self.path.clone(),
                source: e,
            })?;

        tracing::info!(name, url, method = %method, "Added endpoint");
        self.current = Arc::new(model);
        // Our own append is not an external change
        self.loaded = fingerprint(&self.path);
        Ok(())
    }
}
