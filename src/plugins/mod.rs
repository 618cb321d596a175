//! Plugin hook bus - request contributors and the auth types they provide
//!
//! Contributors are registered once at startup into a [`PluginRegistry`];
//! at request time the registry layers their headers and cookies over the
//! values the auth strategy produced.

pub mod builtin;
pub mod registry;

use std::collections::BTreeMap;
use std::error::Error as StdError;

use thiserror::Error;

pub use builtin::{LoginAuth, XdebugCookies};
pub use registry::{Collected, PluginRegistry, RegistryError};

/// Result of a single contributor hook; `Ok(None)` means "nothing to add"
pub type HookResult = Result<Option<BTreeMap<String, String>>, Box<dyn StdError + Send + Sync>>;

/// Which hooks a contributor advertises in plugin listings.
///
/// Collection always calls `headers()` and `cookies()`; these flags only
/// describe the plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub headers: bool,
    pub cookies: bool,
}

/// A pluggable source of request headers, cookies and auth types
pub trait RequestContributor: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Listing flags; they never gate the hooks
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn headers(&self) -> HookResult {
        Ok(None)
    }

    fn cookies(&self) -> HookResult {
        Ok(None)
    }

    /// Auth type this contributor adds to the config's `auth.type` values
    fn auth_schema(&self) -> Option<AuthSchema> {
        None
    }
}

/// Hook that failed while collecting contributions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Headers,
    Cookies,
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Headers => f.write_str("headers"),
            Hook::Cookies => f.write_str("cookies"),
        }
    }
}

/// A contributor failed or panicked; the others still applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin '{plugin}' failed to contribute {hook}: {reason}")]
pub struct PluginContributionError {
    pub plugin: String,
    pub hook: Hook,
    pub reason: String,
}

/// Interaction an auth type needs from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    None,
    Login,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    StringList,
}

/// A config key accepted by a plugin auth type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl SchemaField {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        SchemaField {
            name: name.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        SchemaField {
            name: name.to_string(),
            kind,
            required: false,
        }
    }
}

/// Declaration of an auth type provided by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSchema {
    pub type_tag: String,
    pub description: String,
    pub flow: FlowKind,
    pub fields: Vec<SchemaField>,
}

impl AuthSchema {
    /// Check an `[auth]` table (minus `type`) against the declared fields
    pub fn validate(&self, table: &toml::Table) -> Result<(), String> {
        for field in &self.fields {
            match table.get(&field.name) {
                None if field.required => {
                    return Err(format!(
                        "auth type '{}' requires field '{}'",
                        self.type_tag, field.name
                    ))
                }
                None => {}
                Some(value) => {
                    let ok = match field.kind {
                        FieldKind::String => value.is_str(),
                        FieldKind::StringList => value
                            .as_array()
                            .is_some_and(|items| items.iter().all(toml::Value::is_str)),
                    };
                    if !ok {
                        return Err(format!(
                            "auth field '{}' must be a {}",
                            field.name,
                            match field.kind {
                                FieldKind::String => "string",
                                FieldKind::StringList => "list of strings",
                            }
                        ));
                    }
                }
            }
        }

        if let Some(unknown) = table
            .keys()
            .find(|k| *k != "type" && !self.fields.iter().any(|f| &f.name == *k))
        {
            return Err(format!(
                "unknown field '{}' for auth type '{}'",
                unknown, self.type_tag
            ));
        }
        Ok(())
    }
}

/// Summary of a registered plugin for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRegistration {
    pub name: String,
    pub description: Option<String>,
    pub provides_auth_types: Vec<AuthSchema>,
    pub contributes_headers: bool,
    pub contributes_cookies: bool,
}
