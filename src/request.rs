//! Request assembly - entry, auth session and plugins combined into one request

use std::collections::BTreeMap;

use crate::auth::{AuthSession, BasicCredentials};
use crate::models::{HttpMethod, UrlEntry};
use crate::plugins::{PluginContributionError, PluginRegistry};

/// Everything the transport needs to send one request
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub basic: Option<BasicCredentials>,
    /// Extra fields not used in the URL
    pub form: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Value for the `Cookie` header, if there are any cookies
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug)]
pub struct Assembled {
    pub request: PreparedRequest,
    pub warnings: Vec<PluginContributionError>,
}

/// Headers every request starts from
pub fn initial_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("accept".to_string(), "application/json".to_string())])
}

/// Build the request for `entry`.
///
/// Header precedence, lowest first: the initial headers, the auth
/// contribution, then each plugin in registration order. Header names
/// are lowercased so differently-cased names replace each other.
pub fn assemble(
    entry: &UrlEntry,
    base_url: &str,
    session: &AuthSession,
    registry: &PluginRegistry,
) -> Assembled {
    let auth = session.contribution();

    let mut headers = initial_headers();
    headers.extend(auth.headers);
    let headers = registry.collect_headers(headers);
    let cookies = registry.collect_cookies(auth.cookies);

    let url = entry.render(base_url);
    tracing::debug!(url = %url, method = %entry.method, "Assembled request");

    let mut warnings = headers.warnings;
    warnings.extend(cookies.warnings);

    Assembled {
        request: PreparedRequest {
            method: entry.method,
            url,
            headers: headers.values,
            cookies: cookies.values,
            basic: auth.basic,
            form: entry.form_body(),
        },
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthFlow, Credential, GuardedStore, MemoryStore};
    use crate::plugins::{Capabilities, HookResult, RequestContributor};
    use crate::template::Template;
    use std::sync::Arc;

    struct Override;

    impl RequestContributor for Override {
        fn name(&self) -> &str {
            "override"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                headers: true,
                cookies: false,
            }
        }

        fn headers(&self) -> HookResult {
            Ok(Some(BTreeMap::from([(
                "Authorization".to_string(),
                "Plugin value".to_string(),
            )])))
        }
    }

    fn session(flow: AuthFlow) -> AuthSession {
        AuthSession::new(flow, GuardedStore::new(Box::new(MemoryStore::new())))
    }

    fn login_flow() -> AuthFlow {
        AuthFlow::Login {
            url: "http://localhost/login".to_string(),
            token_path: "token".to_string(),
            headers: vec!["Authorization".to_string()],
        }
    }

    #[test]
    fn test_assemble_layers_auth_and_plugins() {
        let registry = PluginRegistry::with_builtins(Vec::new()).unwrap();
        let mut session = session(login_flow());
        session.begin().unwrap();
        session
            .complete_login(Credential::new("ada", "pw"), "tok".to_string(), false)
            .unwrap();

        let mut entry = UrlEntry::new(
            Template::parse("users/{{id}}").unwrap(),
            HttpMethod::PUT,
            vec!["name".to_string()],
        );
        entry.set("id", "3");
        entry.set("name", "ada");

        let assembled = assemble(&entry, "http://localhost/api/", &session, &registry);
        let request = assembled.request;
        assert_eq!(request.url, "http://localhost/api/users/3");
        assert_eq!(request.headers["accept"], "application/json");
        assert_eq!(request.headers["authorization"], "Bearer tok");
        assert_eq!(request.cookie_header().as_deref(), Some("XDEBUG_SESSION=start"));
        assert_eq!(request.form, vec![("name".to_string(), "ada".to_string())]);
        assert!(assembled.warnings.is_empty());
    }

    #[test]
    fn test_plugins_override_auth_headers() {
        let registry = PluginRegistry::with_builtins(vec![Arc::new(Override)]).unwrap();
        let mut session = session(login_flow());
        session.begin().unwrap();
        session
            .complete_login(Credential::new("ada", "pw"), "tok".to_string(), false)
            .unwrap();

        let entry = UrlEntry::parse("me").unwrap();
        let assembled = assemble(&entry, "http://localhost/", &session, &registry);
        assert_eq!(assembled.request.headers["authorization"], "Plugin value");
        assert_eq!(assembled.request.headers.len(), 2);
    }

    struct PlainText;

    impl RequestContributor for PlainText {
        fn name(&self) -> &str {
            "plaintext"
        }

        fn headers(&self) -> HookResult {
            Ok(Some(BTreeMap::from([(
                "Accept".to_string(),
                "text/plain".to_string(),
            )])))
        }
    }

    #[test]
    fn test_differently_cased_plugin_header_replaces_initial() {
        let registry = PluginRegistry::with_builtins(vec![Arc::new(PlainText)]).unwrap();
        let session = session(AuthFlow::None);
        let entry = UrlEntry::parse("me").unwrap();

        let request = assemble(&entry, "http://localhost/", &session, &registry).request;
        assert_eq!(
            request.headers,
            BTreeMap::from([("accept".to_string(), "text/plain".to_string())])
        );
    }

    #[test]
    fn test_unauthenticated_request_has_no_auth() {
        let registry = PluginRegistry::new();
        let session = session(AuthFlow::Basic);
        let entry = UrlEntry::parse("me").unwrap();

        let request = assemble(&entry, "http://localhost/", &session, &registry).request;
        assert!(request.basic.is_none());
        assert!(request.cookie_header().is_none());
        assert_eq!(request.headers.len(), 1);
    }
}
