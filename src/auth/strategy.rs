//! Auth flows - what each auth kind asks for and what it adds to requests

use std::collections::BTreeMap;

use secrecy::SecretString;

use crate::config::AuthConfig;
use crate::constants::DEFAULT_TOKEN_HEADER;
use crate::plugins::FlowKind;

/// A value the user has to enter for an auth flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptField {
    pub name: &'static str,
    pub secret: bool,
}

const USERNAME: PromptField = PromptField {
    name: "username",
    secret: false,
};
const PASSWORD: PromptField = PromptField {
    name: "password",
    secret: true,
};
const API_KEY: PromptField = PromptField {
    name: "api_key",
    secret: true,
};

/// Interaction and request-time behavior of the configured auth kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFlow {
    None,
    /// Credentials are exchanged for a token at `url`
    Login {
        url: String,
        token_path: String,
        headers: Vec<String>,
    },
    /// A key entered once and sent in `header`
    ApiKey { header: String },
    Basic,
}

impl AuthFlow {
    pub fn from_config(auth: &AuthConfig) -> Self {
        match auth {
            AuthConfig::None => AuthFlow::None,
            AuthConfig::Bearer(bearer) => AuthFlow::Login {
                url: bearer.url.clone(),
                token_path: bearer.token_path.clone(),
                headers: bearer.headers.clone(),
            },
            AuthConfig::Header(header) => AuthFlow::ApiKey {
                header: header.key.clone(),
            },
            AuthConfig::Basic => AuthFlow::Basic,
            AuthConfig::Plugin(plugin) => match plugin.flow {
                FlowKind::None => AuthFlow::None,
                FlowKind::Basic => AuthFlow::Basic,
                FlowKind::ApiKey => AuthFlow::ApiKey {
                    header: plugin.field_str("key").unwrap_or("X-API-Key").to_string(),
                },
                FlowKind::Login => AuthFlow::Login {
                    url: plugin.url.clone().unwrap_or_default(),
                    token_path: plugin.field_str("token_path").unwrap_or("token").to_string(),
                    headers: plugin
                        .field_list("headers")
                        .filter(|h| !h.is_empty())
                        .unwrap_or_else(|| vec![DEFAULT_TOKEN_HEADER.to_string()]),
                },
            },
        }
    }

    pub fn kind(&self) -> FlowKind {
        match self {
            AuthFlow::None => FlowKind::None,
            AuthFlow::Login { .. } => FlowKind::Login,
            AuthFlow::ApiKey { .. } => FlowKind::ApiKey,
            AuthFlow::Basic => FlowKind::Basic,
        }
    }

    /// Fields the login form has to show
    pub fn prompt(&self) -> Vec<PromptField> {
        match self {
            AuthFlow::None => Vec::new(),
            AuthFlow::Login { .. } | AuthFlow::Basic => vec![USERNAME, PASSWORD],
            AuthFlow::ApiKey { .. } => vec![API_KEY],
        }
    }
}

/// Username/password sent as HTTP basic auth
#[derive(Debug)]
pub struct BasicCredentials {
    pub username: String,
    pub password: SecretString,
}

/// What the auth session adds to an outgoing request
#[derive(Debug, Default)]
pub struct AuthContribution {
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub basic: Option<BasicCredentials>,
}

/// Token header values; `Authorization` gets the `Bearer` scheme
pub fn token_headers(names: &[String], token: &str) -> BTreeMap<String, String> {
    names
        .iter()
        .map(|name| {
            let value = if name.eq_ignore_ascii_case(DEFAULT_TOKEN_HEADER) {
                format!("Bearer {token}")
            } else {
                token.to_string()
            };
            (name.clone(), value)
        })
        .collect()
}
