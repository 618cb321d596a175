//! View state - snapshot sent from App layer to the front end for rendering

use crate::auth::{AuthState, PromptField};
use crate::models::{HttpMethod, Response};
use crate::plugins::{FlowKind, PluginRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message shown to the user
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Notice {
            level,
            message: message.into(),
            at: chrono::Utc::now(),
        }
    }
}

/// One row of the endpoint tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    pub path: String,
    pub method: HttpMethod,
    pub url: String,
}

/// The open endpoint with its inputs and last outcome
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub path: String,
    pub method: HttpMethod,
    pub url: String,
    pub fields: Vec<(String, String)>,
    pub is_loading: bool,
    pub response: Option<Response>,
    pub error: Option<String>,
}

/// Complete state needed by the front end to render
#[derive(Debug, Clone)]
pub struct ViewState {
    pub base_url: String,
    pub endpoints: Vec<EndpointSummary>,
    pub selected: Option<EndpointSnapshot>,
    pub auth_kind: FlowKind,
    pub auth_state: AuthState,
    pub login_prompt: Vec<PromptField>,
    pub remembered_username: Option<String>,
    pub plugins: Vec<PluginRegistration>,
    pub notices: Vec<Notice>,
}
