//! `[auth]` section - the closed set of auth configurations

use serde::Deserialize;

use crate::config::loader::ConfigError;
use crate::constants::DEFAULT_TOKEN_HEADER;
use crate::plugins::{FlowKind, PluginRegistry};

/// Auth `type` tags handled without a plugin
pub const BUILTIN_AUTH_TYPES: [&str; 4] = ["none", "bearer", "header", "basic"];

fn default_token_headers() -> Vec<String> {
    vec![DEFAULT_TOKEN_HEADER.to_string()]
}

fn default_token_path() -> String {
    "token".to_string()
}

/// Login exchange: POST credentials to `url`, read the token at `token_path`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BearerAuth {
    pub url: String,
    /// Header names that carry the token
    #[serde(default = "default_token_headers")]
    pub headers: Vec<String>,
    #[serde(default = "default_token_path")]
    pub token_path: String,
}

/// Static API key sent in a header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderAuth {
    pub key: String,
}

/// Auth type declared by a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginAuth {
    pub type_tag: String,
    pub flow: FlowKind,
    /// Resolved absolute URL when the section has a `url`
    pub url: Option<String>,
    pub fields: toml::Table,
}

impl PluginAuth {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(toml::Value::as_str)
    }

    pub fn field_list(&self, name: &str) -> Option<Vec<String>> {
        self.fields.get(name)?.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthConfig {
    #[default]
    None,
    Bearer(BearerAuth),
    Header(HeaderAuth),
    Basic,
    Plugin(PluginAuth),
}

impl AuthConfig {
    /// Parse the raw `[auth]` table; `url` stays an unresolved template
    pub fn from_table(
        table: Option<&toml::Table>,
        registry: &PluginRegistry,
    ) -> Result<Self, ConfigError> {
        let Some(table) = table else {
            return Ok(AuthConfig::None);
        };

        let tag = match table.get("type") {
            None => return Ok(AuthConfig::None),
            Some(toml::Value::String(tag)) => tag.as_str(),
            Some(_) => {
                return Err(ConfigError::Validation {
                    message: "auth.type must be a string".to_string(),
                })
            }
        };

        let mut rest = table.clone();
        rest.remove("type");

        let invalid = |e: toml::de::Error| ConfigError::Validation {
            message: format!("invalid [auth] section for type '{tag}': {}", e.message()),
        };

        match tag {
            "none" => Ok(AuthConfig::None),
            "basic" => Ok(AuthConfig::Basic),
            "bearer" => Ok(AuthConfig::Bearer(
                toml::Value::Table(rest).try_into().map_err(invalid)?,
            )),
            "header" => Ok(AuthConfig::Header(
                toml::Value::Table(rest).try_into().map_err(invalid)?,
            )),
            other => {
                let schema = registry
                    .auth_schema(other)
                    .ok_or_else(|| ConfigError::UnknownAuthType {
                        tag: other.to_string(),
                    })?;
                schema
                    .validate(&rest)
                    .map_err(|message| ConfigError::Validation { message })?;
                Ok(AuthConfig::Plugin(PluginAuth {
                    type_tag: other.to_string(),
                    flow: schema.flow,
                    url: None,
                    fields: rest,
                }))
            }
        }
    }

    pub fn type_tag(&self) -> &str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::Bearer(_) => "bearer",
            AuthConfig::Header(_) => "header",
            AuthConfig::Basic => "basic",
            AuthConfig::Plugin(plugin) => &plugin.type_tag,
        }
    }

    /// The deferred `url` template, before resolution
    pub fn url_template(&self) -> Option<&str> {
        match self {
            AuthConfig::Bearer(bearer) => Some(&bearer.url),
            AuthConfig::Plugin(plugin) => plugin.field_str("url"),
            _ => None,
        }
    }

    pub fn set_resolved_url(&mut self, resolved: String) {
        match self {
            AuthConfig::Bearer(bearer) => bearer.url = resolved,
            AuthConfig::Plugin(plugin) => plugin.url = Some(resolved),
            _ => {}
        }
    }
}
