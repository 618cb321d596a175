//! Network actor - runs HTTP requests and logins in the Tokio async runtime

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::messages::{NetworkCommand, NetworkResponse};
use crate::network::client::{create_client, execute_login, execute_request};

/// Tracks an active request for cancellation
struct ActiveRequest {
    cancel_tx: oneshot::Sender<()>,
}

/// Network actor that processes request and login commands
pub struct NetworkActor {
    client: reqwest::Client,
    response_tx: mpsc::UnboundedSender<NetworkResponse>,
    active_requests: JoinSet<u64>,
    cancel_handles: HashMap<u64, ActiveRequest>,
}

impl NetworkActor {
    pub fn new(response_tx: mpsc::UnboundedSender<NetworkResponse>) -> Self {
        NetworkActor {
            client: create_client(),
            response_tx,
            active_requests: JoinSet::new(),
            cancel_handles: HashMap::new(),
        }
    }

    /// Run `task` until it completes or its cancel handle fires
    fn spawn_cancellable<F>(&mut self, id: u64, task: F)
    where
        F: Future<Output = NetworkResponse> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.cancel_handles.insert(id, ActiveRequest { cancel_tx });
        let response_tx = self.response_tx.clone();

        self.active_requests.spawn(async move {
            tokio::select! {
                biased;

                _ = &mut cancel_rx => {}
                result = task => {
                    let _ = response_tx.send(result);
                }
            }
            id
        });
    }

    /// Run the network actor message loop
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<NetworkCommand>) {
        loop {
            tokio::select! {
                biased;

                // Handle incoming commands
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(NetworkCommand::ExecuteRequest { id, request }) => {
                            tracing::info!(id, url = %request.url, method = %request.method, "Executing request");
                            let client = self.client.clone();
                            self.spawn_cancellable(id, async move {
                                let result = execute_request(&client, request, id).await;
                                tracing::info!(id, "Request completed");
                                result
                            });
                        }

                        Some(NetworkCommand::Login { id, url, credential, token_path }) => {
                            tracing::info!(id, url = %url, username = %credential.username, "Logging in");
                            let client = self.client.clone();
                            self.spawn_cancellable(id, async move {
                                execute_login(&client, url, credential, token_path, id).await
                            });
                        }

                        Some(NetworkCommand::CancelRequest(id)) => {
                            if let Some(active) = self.cancel_handles.remove(&id) {
                                tracing::info!(id, "Cancelling request");
                                let _ = active.cancel_tx.send(());
                                let _ = self.response_tx.send(NetworkResponse::Cancelled { id });
                            }
                        }

                        Some(NetworkCommand::Shutdown) => {
                            // Cancel all active requests
                            for (_, active) in self.cancel_handles.drain() {
                                let _ = active.cancel_tx.send(());
                            }
                            break;
                        }

                        None => break,
                    }
                }

                // Clean up completed tasks
                Some(result) = self.active_requests.join_next() => {
                    if let Ok(id) = result {
                        self.cancel_handles.remove(&id);
                    }
                }
            }
        }
    }
}
