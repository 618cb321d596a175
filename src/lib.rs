//! # apitester
//!
//! A terminal-based API tester driven by a TOML config of templated endpoints.
//!
//! ## Features
//! - `{{ placeholder }}` URL templates resolved against a base URL
//! - Nested endpoint groups, live reload and appended entries
//! - Auth: none, bearer login flow, static header key, basic, plugin types
//! - Remembered credentials in the system keychain
//! - Plugins contributing headers, cookies and auth types
//!
//! ## Architecture
//! Actor-based with channels:
//! - Front end - sends `AppEvent`s, renders `ViewState`s
//! - App Layer (State machine)
//! - Network Layer (Tokio runtime)

pub mod constants;
pub mod template;
pub mod models;
pub mod config;
pub mod auth;
pub mod plugins;
pub mod request;
pub mod storage;
pub mod messages;
pub mod app;
pub mod network;

// Re-export commonly used types
pub use models::{HttpMethod, UrlEntry, UrlNode, UrlTree, Response};
pub use template::{parse_variables, render, resolve_auth_url, Template, TemplateError};
pub use config::{AuthConfig, ConfigError, ConfigModel, ConfigStore, Settings};
pub use auth::{AuthFlow, AuthSession, AuthState};
pub use plugins::{PluginRegistry, RequestContributor};
pub use messages::{AppEvent, NetworkCommand, NetworkResponse, ViewState};
pub use app::{AppState, AppActor};
pub use network::NetworkActor;
