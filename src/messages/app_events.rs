//! App events - user actions delivered by the front end

use crate::models::HttpMethod;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Open the endpoint at a dotted tree path
    SelectEndpoint(String),
    /// Edit one input of the selected endpoint
    SetField { name: String, value: String },
    SendRequest,
    CancelRequest,
    /// Reload the config file if it changed on disk
    ReloadConfig,
    AddUrl {
        name: String,
        url: String,
        method: HttpMethod,
    },
    SubmitLogin {
        username: String,
        password: String,
        remember: bool,
    },
    SubmitApiKey { key: String, remember: bool },
    SubmitBasic {
        username: String,
        password: String,
        remember: bool,
    },
    ClearCredentials,
    Quit,
}
