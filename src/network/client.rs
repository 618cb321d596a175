//! HTTP client wrapper - executes requests and formats responses

use std::time::{Duration, Instant};

use base64::Engine;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::auth::{extract_token, AuthError, Credential};
use crate::constants::REQUEST_TIMEOUT_SECS;
use crate::messages::NetworkResponse;
use crate::models::HttpMethod;
use crate::request::PreparedRequest;

/// Transport failures, labelled for inline display
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request timed out ({0}s)")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Error reading body: {0}")]
    Body(String),

    #[error("Response is not JSON: {0}")]
    NotJson(String),
}

impl RequestError {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Timeout(_) => "timeout",
            RequestError::Connect(_) => "connect",
            RequestError::Transport(_) => "transport",
            RequestError::Status { .. } => "status",
            RequestError::Body(_) => "body",
            RequestError::NotJson(_) => "not-json",
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout(REQUEST_TIMEOUT_SECS)
        } else if e.is_connect() {
            RequestError::Connect(e.to_string())
        } else {
            RequestError::Transport(e.to_string())
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
        HttpMethod::PUT => reqwest::Method::PUT,
        HttpMethod::PATCH => reqwest::Method::PATCH,
        HttpMethod::DELETE => reqwest::Method::DELETE,
        HttpMethod::HEAD => reqwest::Method::HEAD,
        HttpMethod::OPTIONS => reqwest::Method::OPTIONS,
    }
}

/// Build a request from the prepared parameters
fn build_request(client: &reqwest::Client, request: &PreparedRequest) -> reqwest::RequestBuilder {
    let mut req_builder = client.request(to_reqwest_method(request.method), &request.url);

    for (name, value) in &request.headers {
        req_builder = req_builder.header(name, value);
    }

    if let Some(cookie) = request.cookie_header() {
        req_builder = req_builder.header(reqwest::header::COOKIE, cookie);
    }

    if let Some(basic) = &request.basic {
        let credentials = format!("{}:{}", basic.username, basic.password.expose_secret());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        req_builder = req_builder.header(reqwest::header::AUTHORIZATION, format!("Basic {}", encoded));
    }

    // Extra fields travel as a form body, or as the query string for bodiless methods
    if !request.form.is_empty() {
        req_builder = if request.method.has_body() {
            req_builder.form(&request.form)
        } else {
            req_builder.query(&request.form)
        };
    }

    req_builder
}

/// Execute an HTTP request and return the response (buffered)
pub async fn execute_request(
    client: &reqwest::Client,
    request: PreparedRequest,
    request_id: u64,
) -> NetworkResponse {
    let start = Instant::now();
    let result = build_request(client, &request).send().await;
    let elapsed = start.elapsed().as_millis() as u64;

    let error = match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.text().await {
                Ok(body) => {
                    let formatted = if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                        serde_json::to_string_pretty(&json).unwrap_or(body)
                    } else {
                        body
                    };
                    return NetworkResponse::Success {
                        id: request_id,
                        status,
                        body: formatted,
                        time_ms: start.elapsed().as_millis() as u64,
                    };
                }
                Err(e) => RequestError::Body(e.to_string()),
            }
        }
        Err(e) => RequestError::from(e),
    };

    NetworkResponse::Error {
        id: request_id,
        kind: error.kind(),
        message: error.to_string(),
        time_ms: elapsed,
    }
}

/// POST the login form and pull the token out of the JSON reply
pub async fn request_token(
    client: &reqwest::Client,
    url: &str,
    credential: &Credential,
    token_path: &str,
) -> Result<String, AuthError> {
    let form = [
        ("username", credential.username.as_str()),
        ("password", credential.password.expose_secret()),
    ];
    let resp = client
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(RequestError::from)?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| RequestError::Body(e.to_string()))?;
    if !status.is_success() {
        return Err(RequestError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let json: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| RequestError::NotJson(e.to_string()))?;
    Ok(extract_token(&json, token_path)?)
}

/// Run the login exchange as a network response
pub async fn execute_login(
    client: &reqwest::Client,
    url: String,
    credential: Credential,
    token_path: String,
    request_id: u64,
) -> NetworkResponse {
    match request_token(client, &url, &credential, &token_path).await {
        Ok(token) => NetworkResponse::LoginSucceeded {
            id: request_id,
            token: token.into(),
        },
        Err(e) => NetworkResponse::LoginFailed {
            id: request_id,
            message: e.to_string(),
        },
    }
}

/// Create an HTTP client with default configuration
pub fn create_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
