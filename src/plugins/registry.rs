//! Ordered, append-only registry of request contributors

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::config::auth::BUILTIN_AUTH_TYPES;
use crate::plugins::builtin::{LoginAuth, XdebugCookies};
use crate::plugins::{
    AuthSchema, Hook, HookResult, PluginContributionError, PluginRegistration, RequestContributor,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is already registered")]
    DuplicateName(String),

    #[error("auth type '{tag}' from plugin '{plugin}' is already provided by {existing}")]
    AuthTypeCollision {
        tag: String,
        plugin: String,
        existing: String,
    },
}

/// Values layered from every contributor plus the failures that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub values: BTreeMap<String, String>,
    pub warnings: Vec<PluginContributionError>,
}

#[derive(Default)]
pub struct PluginRegistry {
    contributors: Vec<Arc<dyn RequestContributor>>,
    schemas: Vec<(String, AuthSchema)>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("contributors", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in contributors first, then `external` in the given order
    pub fn with_builtins(
        external: Vec<Arc<dyn RequestContributor>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(XdebugCookies))?;
        registry.register(Arc::new(LoginAuth))?;
        for contributor in external {
            registry.register(contributor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, contributor: Arc<dyn RequestContributor>) -> Result<(), RegistryError> {
        let name = contributor.name().to_string();
        if self.contributors.iter().any(|c| c.name() == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let schema = contributor.auth_schema();
        if let Some(schema) = &schema {
            let tag = &schema.type_tag;
            if BUILTIN_AUTH_TYPES.contains(&tag.as_str()) {
                return Err(RegistryError::AuthTypeCollision {
                    tag: tag.clone(),
                    plugin: name,
                    existing: "a built-in auth type".to_string(),
                });
            }
            if let Some((owner, _)) = self.schemas.iter().find(|(_, s)| &s.type_tag == tag) {
                return Err(RegistryError::AuthTypeCollision {
                    tag: tag.clone(),
                    plugin: name,
                    existing: format!("plugin '{owner}'"),
                });
            }
        }

        tracing::info!(plugin = %name, "Registered plugin");
        if let Some(schema) = schema {
            self.schemas.push((name, schema));
        }
        self.contributors.push(contributor);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.name()).collect()
    }

    /// Layer contributor headers over `initial`, later registrations winning.
    ///
    /// Header names are case-insensitive, so every name comes back lowercased.
    pub fn collect_headers(&self, initial: BTreeMap<String, String>) -> Collected {
        self.collect(Hook::Headers, initial)
    }

    /// Layer contributor cookies over `initial`, later registrations winning
    pub fn collect_cookies(&self, initial: BTreeMap<String, String>) -> Collected {
        self.collect(Hook::Cookies, initial)
    }

    fn collect(&self, hook: Hook, initial: BTreeMap<String, String>) -> Collected {
        let mut collected = Collected {
            values: normalize(hook, initial),
            warnings: Vec::new(),
        };

        for contributor in &self.contributors {
            let outcome = catch_unwind(AssertUnwindSafe(|| -> HookResult {
                match hook {
                    Hook::Headers => contributor.headers(),
                    Hook::Cookies => contributor.cookies(),
                }
            }));

            let failure = match outcome {
                Ok(Ok(Some(values))) => {
                    collected.values.extend(normalize(hook, values));
                    continue;
                }
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };

            let warning = PluginContributionError {
                plugin: contributor.name().to_string(),
                hook,
                reason: failure,
            };
            tracing::warn!(error = %warning, "Skipping plugin contribution");
            collected.warnings.push(warning);
        }

        collected
    }

    /// Every auth schema provided by registered plugins
    pub fn collect_auth_schemas(&self) -> Vec<&AuthSchema> {
        self.schemas.iter().map(|(_, schema)| schema).collect()
    }

    pub fn auth_schema(&self, tag: &str) -> Option<&AuthSchema> {
        self.schemas
            .iter()
            .map(|(_, schema)| schema)
            .find(|schema| schema.type_tag == tag)
    }

    pub fn registrations(&self) -> Vec<PluginRegistration> {
        self.contributors
            .iter()
            .map(|c| {
                let caps = c.capabilities();
                PluginRegistration {
                    name: c.name().to_string(),
                    description: c.description().map(str::to_string),
                    provides_auth_types: c.auth_schema().into_iter().collect(),
                    contributes_headers: caps.headers,
                    contributes_cookies: caps.cookies,
                }
            })
            .collect()
    }
}

fn normalize(hook: Hook, values: BTreeMap<String, String>) -> BTreeMap<String, String> {
    match hook {
        Hook::Headers => values
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect(),
        Hook::Cookies => values,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Capabilities, FlowKind};

    struct StaticHeaders {
        name: &'static str,
        headers: Vec<(&'static str, &'static str)>,
    }

    impl RequestContributor for StaticHeaders {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                headers: true,
                cookies: false,
            }
        }

        fn headers(&self) -> HookResult {
            Ok(Some(
                self.headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ))
        }
    }

    struct Broken {
        panic: bool,
    }

    impl RequestContributor for Broken {
        fn name(&self) -> &str {
            if self.panic {
                "panicky"
            } else {
                "failing"
            }
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                headers: true,
                cookies: true,
            }
        }

        fn headers(&self) -> HookResult {
            if self.panic {
                panic!("boom");
            }
            Err("backend down".into())
        }
    }

    struct CustomAuth(&'static str, &'static str);

    impl RequestContributor for CustomAuth {
        fn name(&self) -> &str {
            self.0
        }

        fn auth_schema(&self) -> Option<AuthSchema> {
            Some(AuthSchema {
                type_tag: self.1.to_string(),
                description: "custom".to_string(),
                flow: FlowKind::ApiKey,
                fields: Vec::new(),
            })
        }
    }

    fn initial() -> BTreeMap<String, String> {
        BTreeMap::from([("accept".to_string(), "application/json".to_string())])
    }

    #[test]
    fn test_last_registered_wins() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(StaticHeaders {
                name: "a",
                headers: vec![("X-Env", "a"), ("X-Only-A", "1")],
            }))
            .unwrap();
        registry
            .register(Arc::new(StaticHeaders {
                name: "b",
                headers: vec![("X-Env", "b"), ("accept", "text/plain")],
            }))
            .unwrap();

        let collected = registry.collect_headers(initial());
        assert_eq!(collected.values["x-env"], "b");
        assert_eq!(collected.values["x-only-a"], "1");
        assert_eq!(collected.values["accept"], "text/plain");
        assert!(collected.warnings.is_empty());
    }

    #[test]
    fn test_failing_contributors_are_isolated() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Broken { panic: false })).unwrap();
        registry.register(Arc::new(Broken { panic: true })).unwrap();
        registry
            .register(Arc::new(StaticHeaders {
                name: "ok",
                headers: vec![("X-Ok", "yes")],
            }))
            .unwrap();

        let collected = registry.collect_headers(initial());
        assert_eq!(collected.values["x-ok"], "yes");
        assert_eq!(collected.values["accept"], "application/json");
        assert_eq!(collected.warnings.len(), 2);
        assert_eq!(collected.warnings[0].plugin, "failing");
        assert!(collected.warnings[1].reason.contains("boom"));

        // Default cookie hook returns nothing, so no warnings there
        let cookies = registry.collect_cookies(BTreeMap::new());
        assert!(cookies.warnings.is_empty());
    }

    #[test]
    fn test_header_names_collide_case_insensitively() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(StaticHeaders {
                name: "a",
                headers: vec![("Accept", "text/plain"), ("x-trace", "a")],
            }))
            .unwrap();
        registry
            .register(Arc::new(StaticHeaders {
                name: "b",
                headers: vec![("X-TRACE", "b")],
            }))
            .unwrap();

        let mut start = initial();
        start.insert("Authorization".to_string(), "Bearer tok".to_string());
        let collected = registry.collect_headers(start);
        assert_eq!(
            collected.values,
            BTreeMap::from([
                ("accept".to_string(), "text/plain".to_string()),
                ("authorization".to_string(), "Bearer tok".to_string()),
                ("x-trace".to_string(), "b".to_string()),
            ])
        );

        // Cookie names are case-sensitive and kept as given
        let cookies = registry.collect_cookies(BTreeMap::from([("Sid".to_string(), "1".to_string())]));
        assert_eq!(cookies.values["Sid"], "1");
    }

    struct Undeclared;

    impl RequestContributor for Undeclared {
        fn name(&self) -> &str {
            "undeclared"
        }

        fn headers(&self) -> HookResult {
            Ok(Some(BTreeMap::from([("X-Extra".to_string(), "1".to_string())])))
        }
    }

    #[test]
    fn test_hooks_run_without_declared_capabilities() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Undeclared)).unwrap();

        let collected = registry.collect_headers(BTreeMap::new());
        assert_eq!(collected.values["x-extra"], "1");
        assert!(!registry.registrations()[0].contributes_headers);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(CustomAuth("x", "sso"))).unwrap();
        assert_eq!(
            registry.register(Arc::new(CustomAuth("x", "other"))).unwrap_err(),
            RegistryError::DuplicateName("x".to_string())
        );
    }

    #[test]
    fn test_auth_tag_collisions_rejected() {
        let mut registry = PluginRegistry::with_builtins(Vec::new()).unwrap();
        assert!(matches!(
            registry.register(Arc::new(CustomAuth("mine", "bearer"))),
            Err(RegistryError::AuthTypeCollision { .. })
        ));
        assert!(matches!(
            registry.register(Arc::new(CustomAuth("mine", "login"))),
            Err(RegistryError::AuthTypeCollision { .. })
        ));
        registry.register(Arc::new(CustomAuth("mine", "sso"))).unwrap();
        assert!(registry.auth_schema("sso").is_some());
    }

    #[test]
    fn test_builtins_registered_first() {
        let registry = PluginRegistry::with_builtins(vec![Arc::new(StaticHeaders {
            name: "ext",
            headers: Vec::new(),
        })])
        .unwrap();
        assert_eq!(registry.names(), vec!["xdebug", "loginauth", "ext"]);

        let cookies = registry.collect_cookies(BTreeMap::new());
        assert_eq!(cookies.values["XDEBUG_SESSION"], "start");

        let tags: Vec<&str> = registry
            .collect_auth_schemas()
            .iter()
            .map(|s| s.type_tag.as_str())
            .collect();
        assert_eq!(tags, vec!["login"]);

        let registrations = registry.registrations();
        assert!(registrations[0].contributes_cookies);
        assert_eq!(registrations[1].provides_auth_types.len(), 1);
    }
}
