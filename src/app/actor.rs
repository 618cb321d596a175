//! App actor - message loop processing app events and network responses

use tokio::sync::mpsc;

use crate::app::state::AppState;
use crate::messages::{AppEvent, NetworkCommand, NetworkResponse, ViewState};

/// App actor that processes app events and network responses
pub struct AppActor {
    state: AppState,
    network_tx: mpsc::UnboundedSender<NetworkCommand>,
    view_tx: mpsc::UnboundedSender<ViewState>,
}

impl AppActor {
    pub fn new(
        state: AppState,
        network_tx: mpsc::UnboundedSender<NetworkCommand>,
        view_tx: mpsc::UnboundedSender<ViewState>,
    ) -> Self {
        AppActor {
            state,
            network_tx,
            view_tx,
        }
    }

    /// Run the actor message loop
    pub async fn run(
        mut self,
        mut event_rx: mpsc::UnboundedReceiver<AppEvent>,
        mut net_rx: mpsc::UnboundedReceiver<NetworkResponse>,
    ) {
        // Send initial view state
        let _ = self.view_tx.send(self.state.to_view_state());

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    if self.handle_event(event) {
                        // Quit signal received
                        let _ = self.network_tx.send(NetworkCommand::Shutdown);
                        break;
                    }
                    let _ = self.view_tx.send(self.state.to_view_state());
                }
                Some(response) = net_rx.recv() => {
                    self.state.handle_response(response);
                    let _ = self.view_tx.send(self.state.to_view_state());
                }
                else => break,
            }
        }
    }

    fn dispatch(&self, command: Option<NetworkCommand>) {
        if let Some(cmd) = command {
            let _ = self.network_tx.send(cmd);
        }
    }

    /// Handle an app event, returns true if quit was requested
    fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            // Endpoints
            AppEvent::SelectEndpoint(path) => {
                self.state.select_endpoint(&path);
            }
            AppEvent::SetField { name, value } => self.state.set_field(&name, &value),

            // Requests
            AppEvent::SendRequest => {
                let cmd = self.state.send_request();
                self.dispatch(cmd);
            }
            AppEvent::CancelRequest => {
                let cmd = self.state.cancel_request();
                self.dispatch(cmd);
            }

            // Config
            AppEvent::ReloadConfig => {
                let cmd = self.state.reload_config();
                self.dispatch(cmd);
            }
            AppEvent::AddUrl { name, url, method } => self.state.add_url(&name, &url, method),

            // Auth
            AppEvent::SubmitLogin {
                username,
                password,
                remember,
            } => {
                let cmd = self.state.submit_login(&username, &password, remember);
                self.dispatch(cmd);
            }
            AppEvent::SubmitApiKey { key, remember } => self.state.submit_api_key(&key, remember),
            AppEvent::SubmitBasic {
                username,
                password,
                remember,
            } => self.state.submit_basic(&username, &password, remember),
            AppEvent::ClearCredentials => {
                let cmd = self.state.clear_credentials();
                self.dispatch(cmd);
            }

            // System
            AppEvent::Quit => return true,
        }

        false
    }
}
