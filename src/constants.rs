//! Application constants
//!
//! Centralized location for magic strings and configuration defaults.

/// Application name, also the keychain service prefix
pub const APP_NAME: &str = "apitester";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base URL used when `BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "http://localhost/";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "BASE_URL";

/// Config file loaded when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "api-conf.toml";

/// Field value cache, relative to the working directory
pub const FIELD_STORE_FILE: &str = ".apitester.json";

/// Log file written by the binary
pub const LOG_FILE: &str = "apitester.log";

/// Header carrying the bearer token when the config names none
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";

/// Keychain account holding an API key
pub const API_KEY_ACCOUNT: &str = "api_key";

/// Request timeout for endpoint calls and the login exchange
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
