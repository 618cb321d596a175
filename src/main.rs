//! apitester - browse a TOML endpoint config and fire templated requests
//!
//! Usage: `apitester [CONFIG] [ENDPOINT [FIELD=VALUE]...]`
//!
//! Without an endpoint the resolved endpoint tree, auth kind and plugins are
//! printed. With one, the request runs through the App and Network actors.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;

use apitester::app::{AppActor, AppState};
use apitester::auth::{AuthState, GuardedStore, KeyringStore};
use apitester::config::{ConfigStore, Settings};
use apitester::constants::{APP_NAME, APP_VERSION, DEFAULT_CONFIG_PATH, LOG_FILE};
use apitester::messages::{AppEvent, NetworkCommand, NetworkResponse, ViewState};
use apitester::network::NetworkActor;
use apitester::plugins::PluginRegistry;
use apitester::storage::FieldStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging to file
    let file_appender = tracing_appender::rolling::never(".", LOG_FILE);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let endpoint = args.next();
    let assignments = args
        .map(|arg| parse_assignment(&arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let settings = Settings::from_env();
    let registry = Arc::new(PluginRegistry::with_builtins(Vec::new())?);
    let config = ConfigStore::open(config_path.clone(), settings.clone(), registry)
        .with_context(|| format!("Cannot start without a valid config ({config_path})"))?;
    let credentials = GuardedStore::new(Box::new(KeyringStore::new(settings.service_name())));
    let state = AppState::new(config, credentials, FieldStore::new());

    match endpoint {
        None => {
            print_overview(&state.to_view_state());
            Ok(())
        }
        Some(path) => run_endpoint(state, path, assignments).await,
    }
}

fn parse_assignment(arg: &str) -> anyhow::Result<(String, String)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => bail!("Expected FIELD=VALUE, got '{arg}'"),
    }
}

fn print_overview(view: &ViewState) {
    println!("{APP_NAME} {APP_VERSION} - base URL {}", view.base_url);
    println!("Auth: {:?} ({:?})", view.auth_kind, view.auth_state);

    println!("Endpoints:");
    let width = view.endpoints.iter().map(|e| e.path.len()).max().unwrap_or(0);
    for endpoint in &view.endpoints {
        println!(
            "  {:<7} {:<width$}  {}",
            endpoint.method.as_str(),
            endpoint.path,
            endpoint.url
        );
    }

    println!("Plugins:");
    for plugin in &view.plugins {
        let mut provides = Vec::new();
        if plugin.contributes_headers {
            provides.push("headers".to_string());
        }
        if plugin.contributes_cookies {
            provides.push("cookies".to_string());
        }
        provides.extend(
            plugin
                .provides_auth_types
                .iter()
                .map(|s| format!("auth: {}", s.type_tag)),
        );
        println!(
            "  {} - {} [{}]",
            plugin.name,
            plugin.description.as_deref().unwrap_or(""),
            provides.join(", ")
        );
    }
}

/// Wait for the first view state matching `done`
async fn wait_for(
    view_rx: &mut mpsc::UnboundedReceiver<ViewState>,
    done: impl Fn(&ViewState) -> bool,
) -> anyhow::Result<ViewState> {
    while let Some(view) = view_rx.recv().await {
        if done(&view) {
            return Ok(view);
        }
    }
    bail!("App actor stopped unexpectedly")
}

async fn run_endpoint(
    state: AppState,
    path: String,
    assignments: Vec<(String, String)>,
) -> anyhow::Result<()> {
    if state.config.snapshot().entry(&path).is_none() {
        bail!("No endpoint named '{path}'");
    }
    let remembered = state.auth.login_to_replay().cloned();

    // Create channels
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (net_cmd_tx, net_cmd_rx) = mpsc::unbounded_channel::<NetworkCommand>();
    let (net_resp_tx, net_resp_rx) = mpsc::unbounded_channel::<NetworkResponse>();
    let (view_tx, mut view_rx) = mpsc::unbounded_channel::<ViewState>();

    // Spawn network actor
    let network_actor = NetworkActor::new(net_resp_tx);
    tokio::spawn(network_actor.run(net_cmd_rx));

    // Spawn app actor
    let app_actor = AppActor::new(state, net_cmd_tx, view_tx);
    tokio::spawn(app_actor.run(event_rx, net_resp_rx));

    if let Some(credential) = remembered {
        use secrecy::ExposeSecret;
        let _ = event_tx.send(AppEvent::SubmitLogin {
            username: credential.username.clone(),
            password: credential.password.expose_secret().to_string(),
            remember: true,
        });
        let view = wait_for(&mut view_rx, |v| {
            matches!(
                v.auth_state,
                AuthState::Authenticated | AuthState::Unauthenticated { last_error: Some(_) }
            )
        })
        .await?;
        if let AuthState::Unauthenticated {
            last_error: Some(reason),
        } = &view.auth_state
        {
            eprintln!("Login failed: {reason}");
        }
    }

    let _ = event_tx.send(AppEvent::SelectEndpoint(path));
    for (name, value) in assignments {
        let _ = event_tx.send(AppEvent::SetField { name, value });
    }
    let _ = event_tx.send(AppEvent::SendRequest);

    let view = wait_for(&mut view_rx, |v| {
        v.selected.as_ref().is_some_and(|s| {
            !s.is_loading && (s.response.is_some() || s.error.is_some())
        })
    })
    .await?;
    let _ = event_tx.send(AppEvent::Quit);

    for notice in &view.notices {
        eprintln!("{:?}: {}", notice.level, notice.message);
    }
    let Some(selected) = view.selected else {
        bail!("Endpoint view closed before the response arrived");
    };
    println!("{} {}", selected.method, selected.url);
    if let Some(error) = selected.error {
        bail!(error);
    }
    if let Some(response) = selected.response {
        if let Some(status) = response.status_code {
            println!("HTTP {} ({} ms)", status, response.time_ms);
        }
        println!("{}", response.body);
    }
    Ok(())
}
