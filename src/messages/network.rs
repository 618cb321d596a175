//! Network messages - communication between App and Network layers

use secrecy::SecretString;

use crate::auth::Credential;
use crate::request::PreparedRequest;

/// Commands sent from App layer to Network layer
#[derive(Debug)]
pub enum NetworkCommand {
    /// Execute an assembled endpoint request
    ExecuteRequest { id: u64, request: PreparedRequest },
    /// Exchange credentials for a token
    Login {
        id: u64,
        url: String,
        credential: Credential,
        token_path: String,
    },
    /// Cancel a pending request or login
    CancelRequest(u64),
    /// Shutdown the network actor
    Shutdown,
}

/// Responses sent from Network layer to App layer
#[derive(Debug)]
pub enum NetworkResponse {
    /// HTTP response of any status
    Success {
        id: u64,
        status: u16,
        body: String,
        time_ms: u64,
    },
    /// Transport failure; `kind` is the short error label
    Error {
        id: u64,
        kind: &'static str,
        message: String,
        time_ms: u64,
    },
    /// Request was cancelled
    Cancelled { id: u64 },
    LoginSucceeded { id: u64, token: SecretString },
    LoginFailed { id: u64, message: String },
}

impl NetworkResponse {
    /// Get the request ID from the response
    pub fn id(&self) -> u64 {
        match self {
            NetworkResponse::Success { id, .. } => *id,
            NetworkResponse::Error { id, .. } => *id,
            NetworkResponse::Cancelled { id } => *id,
            NetworkResponse::LoginSucceeded { id, .. } => *id,
            NetworkResponse::LoginFailed { id, .. } => *id,
        }
    }
}
