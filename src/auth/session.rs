//! Auth session - in-memory secrets and the authentication state machine

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::auth::credentials::{Credential, GuardedStore};
use crate::auth::extract::ExtractionError;
use crate::auth::strategy::{token_headers, AuthContribution, AuthFlow, BasicCredentials};
use crate::constants::API_KEY_ACCOUNT;
use crate::network::client::RequestError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Request(#[from] RequestError),

    #[error("token not found in login response: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("a login is already in progress")]
    AlreadyInProgress,

    #[error("no login is in progress")]
    NotInProgress,

    #[error("the configured auth type does not use {0}")]
    WrongFlow(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// `last_error` keeps the reason of the last failed attempt for display
    Unauthenticated { last_error: Option<String> },
    Authenticating,
    Authenticated,
}

fn initial_state(flow: &AuthFlow) -> AuthState {
    match flow {
        AuthFlow::None => AuthState::Authenticated,
        _ => AuthState::Unauthenticated { last_error: None },
    }
}

pub struct AuthSession {
    flow: AuthFlow,
    state: AuthState,
    token: Option<SecretString>,
    login: Option<Credential>,
    api_key: Option<SecretString>,
    store: GuardedStore,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("flow", &self.flow)
            .field("state", &self.state)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl AuthSession {
    pub fn new(flow: AuthFlow, store: GuardedStore) -> Self {
        AuthSession {
            state: initial_state(&flow),
            flow,
            token: None,
            login: None,
            api_key: None,
            store,
        }
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.state {
            AuthState::Unauthenticated { last_error } => last_error.as_deref(),
            _ => None,
        }
    }

    /// Username of a remembered login, for pre-filling the login form
    pub fn remembered_username(&self) -> Option<&str> {
        self.login.as_ref().map(|c| c.username.as_str())
    }

    pub fn remembered_login(&self) -> Option<&Credential> {
        self.login.as_ref()
    }

    /// Remembered pair to send as a login; other flows are restored already
    pub fn login_to_replay(&self) -> Option<&Credential> {
        match self.flow {
            AuthFlow::Login { .. } if !self.is_authenticated() => self.login.as_ref(),
            _ => None,
        }
    }

    /// Load remembered credentials for the current flow.
    ///
    /// API key and basic flows authenticate silently; the login flow only
    /// keeps the pair for the form since the token itself is never stored.
    pub fn restore(&mut self) {
        match &self.flow {
            AuthFlow::None => {}
            AuthFlow::ApiKey { .. } => {
                if let Some(key) = self.store.get_key(API_KEY_ACCOUNT) {
                    self.api_key = Some(key);
                    self.state = AuthState::Authenticated;
                }
            }
            AuthFlow::Basic => {
                if let Some(login) = self.store.get_login() {
                    self.login = Some(login);
                    self.state = AuthState::Authenticated;
                }
            }
            AuthFlow::Login { .. } => {
                self.login = self.store.get_login();
            }
        }
    }

    /// Switch to a new flow after a config reload; secrets of the old one are dropped
    pub fn reconfigure(&mut self, flow: AuthFlow) {
        if flow == self.flow {
            return;
        }
        tracing::info!(kind = ?flow.kind(), "Auth flow changed");
        self.state = initial_state(&flow);
        self.flow = flow;
        self.token = None;
        self.login = None;
        self.api_key = None;
        self.restore();
    }

    /// Enter `Authenticating` before the login request is sent
    pub fn begin(&mut self) -> Result<(), AuthError> {
        if !matches!(self.flow, AuthFlow::Login { .. }) {
            return Err(AuthError::WrongFlow("a login request"));
        }
        if self.state == AuthState::Authenticating {
            return Err(AuthError::AlreadyInProgress);
        }
        self.state = AuthState::Authenticating;
        Ok(())
    }

    /// Accept a token; only valid while `Authenticating`
    pub fn complete_login(
        &mut self,
        credential: Credential,
        token: String,
        remember: bool,
    ) -> Result<(), AuthError> {
        if self.state != AuthState::Authenticating {
            return Err(AuthError::NotInProgress);
        }
        self.remember_login(&credential, remember);
        self.login = Some(credential);
        self.token = Some(SecretString::from(token));
        self.state = AuthState::Authenticated;
        tracing::info!("Login succeeded");
        Ok(())
    }

    /// Record a failed attempt; never retried automatically
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Authentication failed");
        self.token = None;
        self.state = AuthState::Unauthenticated {
            last_error: Some(reason),
        };
    }

    pub fn set_api_key(&mut self, key: String, remember: bool) -> Result<(), AuthError> {
        if !matches!(self.flow, AuthFlow::ApiKey { .. }) {
            return Err(AuthError::WrongFlow("an API key"));
        }
        let key = SecretString::from(key);
        if remember {
            self.store.set_key(API_KEY_ACCOUNT, &key);
        } else {
            self.store.delete_key(API_KEY_ACCOUNT);
        }
        self.api_key = Some(key);
        self.state = AuthState::Authenticated;
        Ok(())
    }

    pub fn set_basic(&mut self, credential: Credential, remember: bool) -> Result<(), AuthError> {
        if self.flow != AuthFlow::Basic {
            return Err(AuthError::WrongFlow("basic credentials"));
        }
        self.remember_login(&credential, remember);
        self.login = Some(credential);
        self.state = AuthState::Authenticated;
        Ok(())
    }

    fn remember_login(&self, credential: &Credential, remember: bool) {
        if remember {
            self.store.set_login(credential);
        } else {
            self.store.delete_login();
        }
    }

    /// Forget every secret, in memory and in the keychain
    pub fn remove(&mut self) {
        self.token = None;
        self.login = None;
        self.api_key = None;
        self.store.delete_login();
        self.store.delete_key(API_KEY_ACCOUNT);
        self.state = initial_state(&self.flow);
        tracing::info!("Cleared stored credentials");
    }

    /// Headers, cookies and basic credentials for the next request
    pub fn contribution(&self) -> AuthContribution {
        let mut contribution = AuthContribution::default();
        match &self.flow {
            AuthFlow::None => {}
            AuthFlow::Login { headers, .. } => {
                if let Some(token) = &self.token {
                    contribution.headers = token_headers(headers, token.expose_secret());
                }
            }
            AuthFlow::ApiKey { header } => {
                if let Some(key) = &self.api_key {
                    contribution
                        .headers
                        .insert(header.clone(), key.expose_secret().to_string());
                }
            }
            AuthFlow::Basic => {
                if let Some(login) = &self.login {
                    contribution.basic = Some(BasicCredentials {
                        username: login.username.clone(),
                        password: SecretString::from(login.password.expose_secret().to_string()),
                    });
                }
            }
        }
        contribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::MemoryStore;
    use crate::auth::CredentialStore;
    use std::sync::Arc;

    fn login_flow() -> AuthFlow {
        AuthFlow::Login {
            url: "http://localhost/login".to_string(),
            token_path: "token".to_string(),
            headers: vec!["Authorization".to_string()],
        }
    }

    fn session(flow: AuthFlow) -> (AuthSession, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        let store = GuardedStore::new(Box::new(Arc::clone(&backend)));
        (AuthSession::new(flow, store), backend)
    }

    #[test]
    fn test_login_state_machine() {
        let (mut session, backend) = session(login_flow());
        assert_eq!(session.state(), &AuthState::Unauthenticated { last_error: None });

        session.begin().unwrap();
        assert!(matches!(session.begin(), Err(AuthError::AlreadyInProgress)));

        session.fail("401 Unauthorized");
        assert_eq!(session.last_error(), Some("401 Unauthorized"));
        assert!(session.contribution().headers.is_empty());

        session.begin().unwrap();
        session
            .complete_login(Credential::new("ada", "pw"), "tok".to_string(), true)
            .unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.contribution().headers["Authorization"], "Bearer tok");
        assert_eq!(backend.get_login().unwrap().unwrap().username, "ada");
    }

    #[test]
    fn test_not_remembering_removes_stored_login() {
        let (mut session, backend) = session(login_flow());
        backend.set_login(&Credential::new("old", "pw")).unwrap();

        session.begin().unwrap();
        session
            .complete_login(Credential::new("ada", "pw"), "tok".to_string(), false)
            .unwrap();
        assert!(backend.get_login().unwrap().is_none());
    }

    #[test]
    fn test_completion_requires_login_in_progress() {
        let (mut session, backend) = session(login_flow());
        assert!(matches!(
            session.complete_login(Credential::new("ada", "pw"), "tok".to_string(), true),
            Err(AuthError::NotInProgress)
        ));

        session.begin().unwrap();
        session.remove();
        assert!(session
            .complete_login(Credential::new("ada", "pw"), "tok".to_string(), true)
            .is_err());
        assert!(!session.is_authenticated());
        assert!(backend.get_login().unwrap().is_none());
    }

    #[test]
    fn test_only_login_flow_replays_remembered_pair() {
        let (mut login, backend) = session(login_flow());
        backend.set_login(&Credential::new("ada", "pw")).unwrap();
        login.restore();
        assert_eq!(login.login_to_replay().map(|c| c.username.as_str()), Some("ada"));

        let (mut basic, backend) = session(AuthFlow::Basic);
        backend.set_login(&Credential::new("ada", "pw")).unwrap();
        basic.restore();
        assert!(basic.is_authenticated());
        assert!(basic.remembered_login().is_some());
        assert!(basic.login_to_replay().is_none());
    }

    #[test]
    fn test_restore_per_flow() {
        let (mut login, backend) = session(login_flow());
        backend.set_login(&Credential::new("ada", "pw")).unwrap();
        login.restore();
        assert_eq!(login.remembered_username(), Some("ada"));
        assert!(!login.is_authenticated());

        let (mut basic, backend) = session(AuthFlow::Basic);
        backend.set_login(&Credential::new("bob", "pw")).unwrap();
        basic.restore();
        assert!(basic.is_authenticated());
        let contribution = basic.contribution();
        let creds = contribution.basic.unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password.expose_secret(), "pw");

        let (mut key, backend) = session(AuthFlow::ApiKey {
            header: "X-Api-Key".to_string(),
        });
        backend
            .set_key(API_KEY_ACCOUNT, &SecretString::from("k1".to_string()))
            .unwrap();
        key.restore();
        assert_eq!(key.contribution().headers["X-Api-Key"], "k1");
    }

    #[test]
    fn test_remove_clears_everything() {
        let (mut session, backend) = session(AuthFlow::ApiKey {
            header: "X-Api-Key".to_string(),
        });
        session.set_api_key("k".to_string(), true).unwrap();
        assert!(backend.get_key(API_KEY_ACCOUNT).unwrap().is_some());

        session.remove();
        assert!(!session.is_authenticated());
        assert!(session.contribution().headers.is_empty());
        assert!(backend.get_key(API_KEY_ACCOUNT).unwrap().is_none());
    }

    #[test]
    fn test_wrong_flow_rejected() {
        let (mut session, _) = session(AuthFlow::None);
        assert!(session.is_authenticated());
        assert!(matches!(session.begin(), Err(AuthError::WrongFlow(_))));
        assert!(session.set_basic(Credential::new("a", "b"), false).is_err());
    }

    #[test]
    fn test_unavailable_keychain_degrades() {
        let store = GuardedStore::new(Box::new(MemoryStore::unavailable()));
        let mut session = AuthSession::new(AuthFlow::Basic, store);
        session.restore();
        assert!(!session.is_authenticated());
        session.set_basic(Credential::new("a", "b"), true).unwrap();
        assert!(session.is_authenticated());
    }
}
