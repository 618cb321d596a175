//! Process settings read from the environment

use crate::constants::{APP_NAME, BASE_URL_ENV, DEFAULT_BASE_URL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Settings {
            base_url: base_url.into(),
        }
    }

    /// `BASE_URL` if set and non-empty, otherwise the default
    pub fn from_env() -> Self {
        match std::env::var(BASE_URL_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::new(value.trim()),
            _ => Self::default(),
        }
    }

    /// Keychain service name credentials are stored under
    pub fn service_name(&self) -> String {
        format!("{}:{}", APP_NAME, self.base_url)
    }
}
