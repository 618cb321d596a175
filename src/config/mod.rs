//! Configuration model - the TOML endpoint tree, auth section and live reloads

pub mod auth;
pub mod loader;
pub mod settings;
pub mod store;

pub use auth::{AuthConfig, BearerAuth, HeaderAuth, PluginAuth};
pub use loader::{ConfigError, ConfigModel};
pub use settings::Settings;
pub use store::ConfigStore;
