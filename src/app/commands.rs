//! Command handlers - business logic for processing app events

use secrecy::ExposeSecret;

use crate::app::state::{EndpointView, PendingLogin};
use crate::app::AppState;
use crate::auth::{AuthFlow, Credential};
use crate::messages::{
    EndpointSnapshot, EndpointSummary, NetworkCommand, NetworkResponse, NoticeLevel, ViewState,
};
use crate::models::{HttpMethod, Response};
use crate::request;
use crate::storage::FieldStore;

impl AppState {
    // ========================
    // Endpoint selection
    // ========================

    /// Open the endpoint at `path`, pre-filling inputs from the field cache
    pub fn select_endpoint(&mut self, path: &str) -> bool {
        let snapshot = self.config.snapshot();
        let Some(entry) = snapshot.entry(path) else {
            self.notify(NoticeLevel::Error, format!("No endpoint named '{path}'"));
            return false;
        };

        let mut entry = entry.clone();
        for name in entry.input_fields() {
            let key = FieldStore::key(entry.template().source(), entry.method, &name);
            let value = self.fields.get(&key);
            entry.set(name, value);
        }

        self.selected = Some(EndpointView {
            path: path.to_string(),
            entry,
            pending_request_id: None,
            response: None,
            error: None,
        });
        true
    }

    pub fn set_field(&mut self, name: &str, value: &str) {
        let Some(view) = self.selected.as_mut() else {
            return;
        };
        if !view.entry.input_fields().iter().any(|f| f == name) {
            return;
        }
        view.entry.set(name, value);

        let key = FieldStore::key(view.entry.template().source(), view.entry.method, name);
        if let Err(e) = self.fields.set(key, value) {
            tracing::warn!(error = %e, "Failed to save field value");
        }
    }

    // ========================
    // Requests
    // ========================

    pub fn send_request(&mut self) -> Option<NetworkCommand> {
        let view = self.selected.as_ref()?;
        if view.is_loading() {
            self.notify(NoticeLevel::Warning, "A request is already in flight");
            return None;
        }

        let base_url = self.config.settings().base_url.clone();
        let assembled = request::assemble(&view.entry, &base_url, &self.auth, &self.registry);
        for warning in &assembled.warnings {
            self.notify(NoticeLevel::Warning, warning.to_string());
        }

        let id = self.next_id();
        if let Some(view) = self.selected.as_mut() {
            view.pending_request_id = Some(id);
            view.response = None;
            view.error = None;
        }
        Some(NetworkCommand::ExecuteRequest {
            id,
            request: assembled.request,
        })
    }

    pub fn cancel_request(&mut self) -> Option<NetworkCommand> {
        if let Some(id) = self.selected.as_ref().and_then(|v| v.pending_request_id) {
            return Some(NetworkCommand::CancelRequest(id));
        }
        self.pending_login
            .as_ref()
            .map(|login| NetworkCommand::CancelRequest(login.id))
    }

    pub fn handle_response(&mut self, response: NetworkResponse) {
        if self.pending_login.as_ref().map(|l| l.id) == Some(response.id()) {
            self.handle_login_response(response);
            return;
        }

        let Some(view) = self
            .selected
            .as_mut()
            .filter(|v| v.pending_request_id == Some(response.id()))
        else {
            tracing::debug!(id = response.id(), "Dropping response for a closed view");
            return;
        };
        view.pending_request_id = None;

        match response {
            NetworkResponse::Success {
                status,
                body,
                time_ms,
                ..
            } => {
                view.response = Some(Response::new(Some(status), body, time_ms));
            }
            NetworkResponse::Error { kind, message, .. } => {
                view.error = Some(format!("[{kind}] {message}"));
            }
            NetworkResponse::Cancelled { .. } => {
                view.error = Some("Request cancelled".to_string());
            }
            NetworkResponse::LoginSucceeded { .. } | NetworkResponse::LoginFailed { .. } => {}
        }
    }

    fn handle_login_response(&mut self, response: NetworkResponse) {
        let Some(pending) = self.pending_login.take() else {
            return;
        };
        match response {
            NetworkResponse::LoginSucceeded { token, .. } => {
                match self.auth.complete_login(
                    pending.credential,
                    token.expose_secret().to_string(),
                    pending.remember,
                ) {
                    Ok(()) => self.notify(NoticeLevel::Info, "Logged in"),
                    Err(e) => tracing::warn!(error = %e, "Ignoring stale login response"),
                }
            }
            NetworkResponse::LoginFailed { message, .. } => {
                self.auth.fail(message.clone());
                self.notify(NoticeLevel::Error, format!("Login failed: {message}"));
            }
            NetworkResponse::Cancelled { .. } => self.auth.fail("Login cancelled"),
            NetworkResponse::Error { message, .. } => self.auth.fail(message),
            NetworkResponse::Success { .. } => {}
        }
    }

    // ========================
    // Config
    // ========================

    /// Reload the config file if it changed; an in-flight login for a
    /// replaced auth flow is abandoned and its cancel command returned
    pub fn reload_config(&mut self) -> Option<NetworkCommand> {
        let mut cancel = None;
        match self.config.reload_if_changed() {
            Ok(false) => self.notify(NoticeLevel::Info, "Config unchanged"),
            Ok(true) => {
                let snapshot = self.config.snapshot();
                let flow = AuthFlow::from_config(&snapshot.auth);
                if &flow != self.auth.flow() {
                    cancel = self.abandon_login();
                }
                self.auth.reconfigure(flow);

                // Keep the open endpoint if it still exists, with its values
                if let Some(view) = self.selected.as_mut() {
                    match snapshot.entry(&view.path) {
                        Some(entry) => {
                            let bound = std::mem::take(&mut view.entry.bound);
                            view.entry = entry.clone();
                            view.entry.bound = bound;
                        }
                        None => self.selected = None,
                    }
                }
                self.notify(NoticeLevel::Info, "Config reloaded");
            }
            Err(e) => self.notify(NoticeLevel::Error, format!("Config reload failed: {e}")),
        }
        cancel
    }

    pub fn add_url(&mut self, name: &str, url: &str, method: HttpMethod) {
        match self.config.add_entry(name, url, method) {
            Ok(()) => self.notify(NoticeLevel::Info, format!("Added '{name}'")),
            Err(e) => self.notify(NoticeLevel::Error, e.to_string()),
        }
    }

    // ========================
    // Auth
    // ========================

    pub fn submit_login(
        &mut self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Option<NetworkCommand> {
        let AuthFlow::Login { url, token_path, .. } = self.auth.flow().clone() else {
            self.notify(NoticeLevel::Error, "The configured auth type has no login");
            return None;
        };
        if let Err(e) = self.auth.begin() {
            self.notify(NoticeLevel::Warning, e.to_string());
            return None;
        }

        let id = self.next_id();
        let credential = Credential::new(username, password);
        self.pending_login = Some(PendingLogin {
            id,
            credential: credential.clone(),
            remember,
        });
        Some(NetworkCommand::Login {
            id,
            url,
            credential,
            token_path,
        })
    }

    pub fn submit_api_key(&mut self, key: &str, remember: bool) {
        if let Err(e) = self.auth.set_api_key(key.to_string(), remember) {
            self.notify(NoticeLevel::Error, e.to_string());
        }
    }

    pub fn submit_basic(&mut self, username: &str, password: &str, remember: bool) {
        if let Err(e) = self.auth.set_basic(Credential::new(username, password), remember) {
            self.notify(NoticeLevel::Error, e.to_string());
        }
    }

    pub fn clear_credentials(&mut self) -> Option<NetworkCommand> {
        let cancel = self.abandon_login();
        self.auth.remove();
        self.notify(NoticeLevel::Info, "Credentials removed");
        cancel
    }

    /// Forget the in-flight login so its reply is dropped
    fn abandon_login(&mut self) -> Option<NetworkCommand> {
        self.pending_login
            .take()
            .map(|login| NetworkCommand::CancelRequest(login.id))
    }

    // ========================
    // View
    // ========================

    pub fn to_view_state(&self) -> ViewState {
        let snapshot = self.config.snapshot();
        let base_url = &self.config.settings().base_url;

        ViewState {
            base_url: base_url.clone(),
            endpoints: snapshot
                .urls
                .leaves()
                .into_iter()
                .map(|(path, entry)| EndpointSummary {
                    path,
                    method: entry.method,
                    url: entry.template().source().to_string(),
                })
                .collect(),
            selected: self.selected.as_ref().map(|view| EndpointSnapshot {
                path: view.path.clone(),
                method: view.entry.method,
                url: view.entry.render(base_url),
                fields: view
                    .entry
                    .input_fields()
                    .into_iter()
                    .map(|name| {
                        let value = view.entry.get(&name).to_string();
                        (name, value)
                    })
                    .collect(),
                is_loading: view.is_loading(),
                response: view.response.clone(),
                error: view.error.clone(),
            }),
            auth_kind: self.auth.flow().kind(),
            auth_state: self.auth.state().clone(),
            login_prompt: self.auth.flow().prompt(),
            remembered_username: self.auth.remembered_username().map(str::to_string),
            plugins: self.registry.registrations(),
            notices: self.notices.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthState, CredentialStore, GuardedStore, MemoryStore};
    use crate::config::{ConfigStore, Settings};
    use crate::plugins::PluginRegistry;
    use secrecy::SecretString;
    use std::fs;
    use std::sync::Arc;

    const CONFIG: &str = r#"
[auth]
type = "bearer"
url = "{{ urls.login }}"
token_path = "data.token"

[urls]
login = { url = "auth/login", method = "POST" }

[urls.users]
detail = "users/{{ id }}"
create = { url = "users", method = "POST", fields = ["name"] }
"#;

    fn state(dir: &tempfile::TempDir) -> AppState {
        let path = dir.path().join("api-conf.toml");
        fs::write(&path, CONFIG).unwrap();
        let registry = Arc::new(PluginRegistry::with_builtins(Vec::new()).unwrap());
        let config = ConfigStore::open(path, Settings::default(), registry).unwrap();
        AppState::new(
            config,
            GuardedStore::new(Box::new(MemoryStore::new())),
            FieldStore::at(dir.path().join(".apitester.json")),
        )
    }

    #[test]
    fn test_select_and_fill_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);

        assert!(!state.select_endpoint("users"));
        assert!(state.select_endpoint("users.detail"));
        state.set_field("id", "42");
        state.set_field("unrelated", "x");

        let view = state.to_view_state();
        let selected = view.selected.unwrap();
        assert_eq!(selected.url, "http://localhost/users/42");
        assert_eq!(selected.fields, vec![("id".to_string(), "42".to_string())]);
        assert_eq!(view.endpoints.len(), 3);

        // Values come back from the field cache
        state.selected = None;
        state.select_endpoint("users.detail");
        assert_eq!(state.selected.as_ref().unwrap().entry.get("id"), "42");
    }

    #[test]
    fn test_send_blocks_until_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);
        state.select_endpoint("users.create");
        state.set_field("name", "ada");

        let Some(NetworkCommand::ExecuteRequest { id, request }) = state.send_request() else {
            panic!("expected a request");
        };
        assert_eq!(request.method, HttpMethod::POST);
        assert_eq!(request.form, vec![("name".to_string(), "ada".to_string())]);
        assert!(state.send_request().is_none());

        assert!(matches!(
            state.cancel_request(),
            Some(NetworkCommand::CancelRequest(c)) if c == id
        ));

        state.handle_response(NetworkResponse::Success {
            id,
            status: 201,
            body: "{}".to_string(),
            time_ms: 5,
        });
        let view = state.selected.as_ref().unwrap();
        assert!(!view.is_loading());
        assert_eq!(view.response.as_ref().unwrap().status_code, Some(201));
        assert!(state.send_request().is_some());
    }

    #[test]
    fn test_error_and_stale_responses() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);
        state.select_endpoint("users.detail");
        let Some(NetworkCommand::ExecuteRequest { id, .. }) = state.send_request() else {
            panic!("expected a request");
        };

        state.handle_response(NetworkResponse::Cancelled { id: id + 100 });
        assert!(state.selected.as_ref().unwrap().is_loading());

        state.handle_response(NetworkResponse::Error {
            id,
            kind: "connect",
            message: "Connection failed: refused".to_string(),
            time_ms: 1,
        });
        let view = state.selected.as_ref().unwrap();
        assert_eq!(view.error.as_deref(), Some("[connect] Connection failed: refused"));
    }

    #[test]
    fn test_login_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);

        let Some(NetworkCommand::Login { id, url, token_path, .. }) =
            state.submit_login("ada", "pw", false)
        else {
            panic!("expected a login command");
        };
        assert_eq!(url, "http://localhost/auth/login");
        assert_eq!(token_path, "data.token");
        assert_eq!(state.auth.state(), &AuthState::Authenticating);
        assert!(state.submit_login("ada", "pw", false).is_none());

        state.handle_response(NetworkResponse::LoginSucceeded {
            id,
            token: SecretString::from("tok".to_string()),
        });
        assert!(state.auth.is_authenticated());

        state.select_endpoint("users.detail");
        let Some(NetworkCommand::ExecuteRequest { request, .. }) = state.send_request() else {
            panic!("expected a request");
        };
        assert_eq!(request.headers["authorization"], "Bearer tok");
    }

    #[test]
    fn test_login_failure_is_kept_for_display() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);
        let Some(NetworkCommand::Login { id, .. }) = state.submit_login("ada", "bad", true) else {
            panic!("expected a login command");
        };
        state.handle_response(NetworkResponse::LoginFailed {
            id,
            message: "HTTP 401: denied".to_string(),
        });
        assert_eq!(state.auth.last_error(), Some("HTTP 401: denied"));
        assert_eq!(state.notices.last().unwrap().level, NoticeLevel::Error);
    }

    #[test]
    fn test_clearing_credentials_drops_pending_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api-conf.toml");
        fs::write(&path, CONFIG).unwrap();
        let registry = Arc::new(PluginRegistry::with_builtins(Vec::new()).unwrap());
        let config = ConfigStore::open(path, Settings::default(), registry).unwrap();
        let backend = Arc::new(MemoryStore::new());
        let mut state = AppState::new(
            config,
            GuardedStore::new(Box::new(Arc::clone(&backend))),
            FieldStore::at(dir.path().join(".apitester.json")),
        );

        let Some(NetworkCommand::Login { id, .. }) = state.submit_login("ada", "pw", true) else {
            panic!("expected a login command");
        };
        assert!(matches!(
            state.clear_credentials(),
            Some(NetworkCommand::CancelRequest(c)) if c == id
        ));
        assert!(state.pending_login.is_none());

        state.handle_response(NetworkResponse::LoginSucceeded {
            id,
            token: SecretString::from("tok".to_string()),
        });
        assert!(!state.auth.is_authenticated());
        assert!(state.auth.remembered_login().is_none());
        assert!(backend.get_login().unwrap().is_none());
        assert!(state.clear_credentials().is_none());
    }

    #[test]
    fn test_flow_change_drops_pending_login() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);
        let Some(NetworkCommand::Login { id, .. }) = state.submit_login("ada", "pw", false) else {
            panic!("expected a login command");
        };

        fs::write(
            state.config.path(),
            "[auth]\ntype = \"header\"\nkey = \"X-Api-Key\"\n\n[urls]\nme = \"me\"\n",
        )
        .unwrap();
        assert!(matches!(
            state.reload_config(),
            Some(NetworkCommand::CancelRequest(c)) if c == id
        ));

        state.handle_response(NetworkResponse::LoginSucceeded {
            id,
            token: SecretString::from("tok".to_string()),
        });
        assert!(!state.auth.is_authenticated());
        assert_eq!(state.auth.flow().kind(), crate::plugins::FlowKind::ApiKey);
    }

    #[test]
    fn test_reload_and_add_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(&dir);
        state.select_endpoint("users.detail");
        state.set_field("id", "7");

        state.add_url("health", "/health", HttpMethod::GET);
        assert!(state.select_endpoint("health"));
        state.select_endpoint("users.detail");

        fs::write(
            state.config.path(),
            "[auth]\ntype = \"header\"\nkey = \"X-Api-Key\"\n\n[urls.users]\ndetail = \"v2/users/{{ id }}\"\n",
        )
        .unwrap();
        state.reload_config();

        let view = state.to_view_state();
        assert_eq!(view.selected.unwrap().url, "http://localhost/v2/users/7");
        assert_eq!(view.auth_kind, crate::plugins::FlowKind::ApiKey);

        state.submit_api_key("secret", false);
        assert!(state.auth.is_authenticated());
        state.clear_credentials();
        assert!(!state.auth.is_authenticated());

        fs::write(state.config.path(), "[urls\n").unwrap();
        state.reload_config();
        assert!(state.notices.last().unwrap().message.starts_with("Config reload failed"));
        assert!(state.config.snapshot().entry("users.detail").is_some());
    }
}
