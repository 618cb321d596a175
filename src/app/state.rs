//! App state - the application context, owned by the App actor

use std::sync::Arc;

use crate::auth::{AuthFlow, AuthSession, Credential, GuardedStore};
use crate::config::ConfigStore;
use crate::messages::{Notice, NoticeLevel};
use crate::models::{Response, UrlEntry};
use crate::plugins::PluginRegistry;
use crate::storage::FieldStore;

/// Notices kept for display
const MAX_NOTICES: usize = 20;

/// The endpoint currently open, with its bound values and last outcome
#[derive(Clone, Debug)]
pub struct EndpointView {
    pub path: String,
    pub entry: UrlEntry,
    pub pending_request_id: Option<u64>,
    pub response: Option<Response>,
    pub error: Option<String>,
}

impl EndpointView {
    pub fn is_loading(&self) -> bool {
        self.pending_request_id.is_some()
    }
}

/// Login request waiting for its response
#[derive(Debug)]
pub struct PendingLogin {
    pub id: u64,
    pub credential: Credential,
    pub remember: bool,
}

/// Main application state
pub struct AppState {
    pub config: ConfigStore,
    pub registry: Arc<PluginRegistry>,
    pub auth: AuthSession,
    pub fields: FieldStore,

    pub selected: Option<EndpointView>,
    pub pending_login: Option<PendingLogin>,
    pub next_request_id: u64,

    pub notices: Vec<Notice>,
}

impl AppState {
    /// Build the context from a loaded config; remembered credentials are restored
    pub fn new(config: ConfigStore, credentials: GuardedStore, fields: FieldStore) -> Self {
        let registry = Arc::clone(config.registry());
        let flow = AuthFlow::from_config(&config.snapshot().auth);
        let mut auth = AuthSession::new(flow, credentials);
        auth.restore();

        AppState {
            config,
            registry,
            auth,
            fields,
            selected: None,
            pending_login: None,
            next_request_id: 1,
            notices: Vec::new(),
        }
    }

    /// Generate a unique request ID
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        if self.notices.len() >= MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(Notice::new(level, message));
    }
}
