use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::config::auth::AuthConfig;
use crate::config::settings::Settings;
use crate::models::{HttpMethod, UrlEntry, UrlNode, UrlTree};
use crate::plugins::PluginRegistry;
use crate::template::{resolve_auth_url, Template, TemplateError};

/// Errors that can occur when loading or updating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Config entry 'urls.{path}' defines a url and also nests entries")]
    AmbiguousNode { path: String },

    #[error("Unknown auth type '{tag}': no built-in or registered plugin provides it")]
    UnknownAuthType { tag: String },

    #[error("Invalid template in '{location}': {source}")]
    Template {
        location: String,
        #[source]
        source: TemplateError,
    },
}

/// A validated configuration snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigModel {
    pub auth: AuthConfig,
    pub urls: UrlTree,
    pub settings: Settings,
}

impl ConfigModel {
    /// Reads, parses and validates the config file at `path`.
    pub fn load(
        path: &Path,
        settings: &Settings,
        registry: &PluginRegistry,
    ) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path, settings, registry)
    }

    /// Parses config text; `path` is only used in error messages.
    pub fn parse(
        content: &str,
        path: &Path,
        settings: &Settings,
        registry: &PluginRegistry,
    ) -> Result<Self, ConfigError> {
        let raw: toml::Table = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        for key in raw.keys().filter(|k| *k != "auth" && *k != "urls") {
            tracing::warn!(key = %key, "Ignoring unknown top-level config key");
        }

        let urls = match raw.get("urls") {
            Some(toml::Value::Table(table)) => parse_tree(table, "")?,
            Some(_) => {
                return Err(ConfigError::Validation {
                    message: "[urls] must be a table".to_string(),
                })
            }
            None => {
                return Err(ConfigError::Validation {
                    message: "missing [urls] section".to_string(),
                })
            }
        };

        let auth_table = match raw.get("auth") {
            Some(toml::Value::Table(table)) => Some(table),
            Some(_) => {
                return Err(ConfigError::Validation {
                    message: "[auth] must be a table".to_string(),
                })
            }
            None => None,
        };
        let mut auth = AuthConfig::from_table(auth_table, registry)?;

        if let Some(template) = auth.url_template().map(str::to_string) {
            let base = &settings.base_url;
            let context = json!({
                "urls": urls.to_context(base),
                "base_url": base,
            });
            let resolved = resolve_auth_url(&template, &context, base).map_err(|source| {
                ConfigError::Template {
                    location: "auth.url".to_string(),
                    source,
                }
            })?;
            tracing::debug!(template = %template, resolved = %resolved, "Resolved auth url");
            auth.set_resolved_url(resolved);
        }

        Ok(ConfigModel {
            auth,
            urls,
            settings: settings.clone(),
        })
    }

    pub fn service_name(&self) -> String {
        self.settings.service_name()
    }

    pub fn entry(&self, path: &str) -> Option<&UrlEntry> {
        self.urls.entry(path)
    }
}

fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Malformed endpoint templates load as literal text
fn parse_template(source: &str, path: &str) -> Template {
    Template::parse(source).unwrap_or_else(|e| {
        tracing::warn!(endpoint = %path, error = %e, "Malformed url template, using it literally");
        Template::literal(source)
    })
}

fn parse_tree(table: &toml::Table, prefix: &str) -> Result<UrlTree, ConfigError> {
    let mut tree = UrlTree::new();
    for (name, value) in table {
        let path = child_path(prefix, name);
        let node = match value {
            toml::Value::String(url) => UrlNode::Leaf(UrlEntry::new(
                parse_template(url, &path),
                HttpMethod::GET,
                Vec::new(),
            )),
            toml::Value::Table(inner) if inner.contains_key("url") => {
                UrlNode::Leaf(parse_leaf(inner, &path)?)
            }
            toml::Value::Table(inner) => UrlNode::Group(parse_tree(inner, &path)?),
            other => {
                return Err(ConfigError::Validation {
                    message: format!(
                        "urls.{path} must be a string or a table, found {}",
                        other.type_str()
                    ),
                })
            }
        };
        tree.insert(name.clone(), node);
    }
    Ok(tree)
}

fn parse_leaf(table: &toml::Table, path: &str) -> Result<UrlEntry, ConfigError> {
    if table.values().any(toml::Value::is_table) {
        return Err(ConfigError::AmbiguousNode {
            path: path.to_string(),
        });
    }

    let invalid = |message: String| ConfigError::Validation { message };

    let url = table
        .get("url")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| invalid(format!("urls.{path}.url must be a string")))?;

    let method = match table.get("method") {
        None => HttpMethod::GET,
        Some(toml::Value::String(m)) => m
            .parse::<HttpMethod>()
            .map_err(|e| invalid(format!("urls.{path}.method: {e}")))?,
        Some(_) => return Err(invalid(format!("urls.{path}.method must be a string"))),
    };

    let fields = match table.get("fields") {
        None => Vec::new(),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(format!("urls.{path}.fields must be a list of strings")))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(invalid(format!(
                "urls.{path}.fields must be a list of strings"
            )))
        }
    };

    if let Some(unknown) = table
        .keys()
        .find(|k| !matches!(k.as_str(), "url" | "method" | "fields"))
    {
        return Err(invalid(format!("unknown key '{unknown}' in urls.{path}")));
    }

    Ok(UrlEntry::new(parse_template(url, path), method, fields))
}
