//! Remote signing coordinator
//!
//! The coordinator lets a server obtain signatures from signers living in
//! another process, typically a browser wallet, connected over WebSocket.
//! Each sign request is keyed by a fresh correlation id, delivered to one or
//! more connected signers according to a [`SelectionPolicy`], and resolved
//! exactly once: by a response, an error, the timeout, the coordinator
//! stopping, the caller dropping the future, or (when enabled) every target
//! disconnecting.
//!
//! # Architecture
//!
//! - [`config`] - Listener address, path, timeout and dispatch policy
//! - [`protocol`] - JSON frames exchanged with signers
//! - [`server`] - axum WebSocket endpoint feeding the coordinator
//!
//! The coordinator itself is transport-agnostic: [`SigningCoordinator::connect`]
//! registers a connection and hands back its outbound queue, and
//! [`SigningCoordinator::handle_message`] consumes inbound frames. The
//! WebSocket endpoint is one user of that surface.
//!
//! # Examples
//!
//! ```no_run
//! use x402_challenge::coordinator::{CoordinatorConfig, SigningCoordinator};
//! use x402_challenge::types::Challenge;
//!
//! # async fn example() -> x402_challenge::Result<()> {
//! let coordinator = SigningCoordinator::new(CoordinatorConfig::default());
//! let addr = coordinator.start().await?;
//! println!("signers connect to ws://{}/x402/ws", addr);
//!
//! let challenge = Challenge::new("0.01", "USDC", 8453, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0");
//! let proof = coordinator.request_signature(&challenge).await?;
//! println!("signed by {}", proof.signer);
//!
//! coordinator.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod server;

#[cfg(test)]
mod tests;

pub use config::{CoordinatorConfig, SelectionPolicy};
pub use protocol::{Outbound, SignerMessage, CONNECTED_MESSAGE};

use crate::signer::PaymentSigner;
use crate::types::{Challenge, PaymentProof};
use crate::{Result, X402Error};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long `stop` waits for the listener to drain before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A registered signer connection
#[derive(Debug)]
struct SignerConnection {
    sequence: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// A sign request awaiting its single resolution
#[derive(Debug)]
struct PendingSignRequest {
    dispatched_to: Vec<String>,
    deadline: Instant,
    responder: oneshot::Sender<Result<PaymentProof>>,
}

#[derive(Debug)]
struct ServerHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    config: CoordinatorConfig,
    clients: DashMap<String, SignerConnection>,
    pending: DashMap<String, PendingSignRequest>,
    running: AtomicBool,
    next_sequence: AtomicU64,
    cursor: AtomicUsize,
    server: Mutex<Option<ServerHandle>>,
}

/// Correlation-keyed remote signing over long-lived connections
///
/// Cheap to clone; clones share the same registries and listener.
#[derive(Debug, Clone)]
pub struct SigningCoordinator {
    inner: Arc<Inner>,
}

impl SigningCoordinator {
    /// Create a stopped coordinator
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clients: DashMap::new(),
                pending: DashMap::new(),
                running: AtomicBool::new(false),
                next_sequence: AtomicU64::new(0),
                cursor: AtomicUsize::new(0),
                server: Mutex::new(None),
            }),
        }
    }

    /// Create a coordinator from `X402_WS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(CoordinatorConfig::from_env()?))
    }

    /// Configuration in use
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Bind the listener and serve the WebSocket endpoint
    ///
    /// Returns the bound address. Calling `start` on a running coordinator
    /// returns the existing address without binding again.
    pub async fn start(&self) -> Result<SocketAddr> {
        let config = &self.inner.config;
        config.validate()?;

        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| X402Error::config(format!("Failed to bind to {}: {}", bind_addr, e)))?;
        let addr = listener.local_addr()?;

        let mut slot = self.server_slot();
        if let Some(existing) = slot.as_ref() {
            // Lost a race with a concurrent start; keep the first listener
            return Ok(existing.addr);
        }

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = server::router(self.clone(), &config.path);
        self.inner.running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Signing coordinator listener failed: {}", e);
            }
        });

        *slot = Some(ServerHandle {
            addr,
            shutdown,
            task,
        });

        tracing::info!(
            "x402 signing coordinator listening on ws://{}{}",
            addr,
            config.path
        );
        Ok(addr)
    }

    /// Stop serving, close every connection and cancel every pending request
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);

        let client_ids: Vec<String> = self
            .inner
            .clients
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in client_ids {
            if let Some((_, connection)) = self.inner.clients.remove(&id) {
                let _ = connection.outbound.send(Outbound::Close);
            }
        }

        let pending_ids: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let cancelled = pending_ids.len();
        for id in pending_ids {
            if let Some((_, request)) = self.inner.pending.remove(&id) {
                let _ = request.responder.send(Err(X402Error::Cancelled));
            }
        }

        let handle = self.server_slot().take();
        if let Some(ServerHandle {
            shutdown, mut task, ..
        }) = handle
        {
            let _ = shutdown.send(());
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::warn!("Signing coordinator listener did not drain in time; aborting");
                task.abort();
            }
        }

        tracing::info!(cancelled, "x402 signing coordinator stopped");
    }

    /// Whether the listener is serving
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of connected signers
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Number of unresolved sign requests
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server_slot().as_ref().map(|handle| handle.addr)
    }

    /// Register a signer connection
    ///
    /// Returns the connection id and the queue of frames to deliver to it.
    /// The `connected` acknowledgement is already queued.
    pub fn connect(&self) -> (String, mpsc::UnboundedReceiver<Outbound>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (outbound, rx) = mpsc::unbounded_channel();
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);

        match SignerMessage::connected(&id).to_json() {
            Ok(text) => {
                let _ = outbound.send(Outbound::Text(text));
            }
            Err(e) => tracing::warn!("Failed to encode connected ack: {}", e),
        }

        self.inner
            .clients
            .insert(id.clone(), SignerConnection { sequence, outbound });
        tracing::info!(client_id = %id, clients = self.client_count(), "Signer connected");

        (id, rx)
    }

    /// Unregister a signer connection
    ///
    /// Pending requests stay pending (and eventually time out) unless
    /// `cancel_on_disconnect` is set, in which case requests with no
    /// remaining target fail with [`X402Error::SignerDisconnected`].
    pub fn disconnect(&self, connection_id: &str) {
        if self.inner.clients.remove(connection_id).is_none() {
            return;
        }
        tracing::info!(
            client_id = %connection_id,
            clients = self.client_count(),
            "Signer disconnected"
        );

        if !self.inner.config.cancel_on_disconnect {
            return;
        }

        let orphaned: Vec<String> = self
            .inner
            .pending
            .iter()
            .filter(|entry| self.is_orphaned(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        for id in orphaned {
            if let Some((_, request)) = self
                .inner
                .pending
                .remove_if(&id, |_, request| self.is_orphaned(request))
            {
                tracing::debug!(request_id = %id, "Failing sign request: signer gone");
                let _ = request.responder.send(Err(X402Error::SignerDisconnected));
            }
        }
    }

    /// Ask a connected signer to sign `challenge`
    ///
    /// Fails immediately with [`X402Error::NoSignerConnected`] when nobody is
    /// connected. Dropping the returned future withdraws the request.
    ///
    /// Only a connection the request was sent to can resolve it; an answer
    /// carrying the right id from any other connection is ignored.
    pub async fn request_signature(&self, challenge: &Challenge) -> Result<PaymentProof> {
        let targets = self.select_targets();
        if targets.is_empty() {
            return Err(X402Error::NoSignerConnected);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let frame = SignerMessage::SignRequest {
            id: id.clone(),
            challenge: challenge.clone(),
        }
        .to_json()?;

        let timeout = self.inner.config.timeout;
        let deadline = config::deadline_after(timeout).ok_or_else(|| {
            X402Error::config(format!(
                "Sign timeout is too large: {}s",
                timeout.as_secs_f64()
            ))
        })?;
        let (responder, mut rx) = oneshot::channel();

        self.inner.pending.insert(
            id.clone(),
            PendingSignRequest {
                dispatched_to: targets.iter().map(|(conn_id, _)| conn_id.clone()).collect(),
                deadline,
                responder,
            },
        );
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: &id,
        };

        let mut delivered = 0;
        for (conn_id, outbound) in &targets {
            if outbound.send(Outbound::Text(frame.clone())).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(client_id = %conn_id, "Signer queue closed; skipping");
            }
        }
        if delivered == 0 {
            return Err(X402Error::NoSignerConnected);
        }
        tracing::debug!(request_id = %id, targets = delivered, "Sign request dispatched");

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(X402Error::Cancelled),
            Err(_) => {
                if self.inner.pending.remove(&id).is_some() {
                    tracing::warn!(request_id = %id, "Sign request timed out");
                    Err(X402Error::Timeout { timeout })
                } else {
                    // Resolved concurrently with the deadline; take that outcome
                    rx.await.unwrap_or(Err(X402Error::Cancelled))
                }
            }
        }
    }

    /// Process one inbound frame from a connection
    ///
    /// Malformed or unexpected frames are answered with an `error` frame on
    /// that connection only and never disturb pending requests. A
    /// `sign-response` or `error` frame resolves a pending request only when
    /// `connection_id` is one of the connections that request was sent to.
    pub fn handle_message(&self, connection_id: &str, raw: &str) {
        let message = match SignerMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(client_id = %connection_id, "Malformed signer frame: {}", e);
                self.send_to(
                    connection_id,
                    SignerMessage::error(format!("Invalid message: {}", e)),
                );
                return;
            }
        };

        match message {
            SignerMessage::SignResponse { id, result, error } => {
                let outcome = match (result, error) {
                    (_, Some(error)) if !error.is_empty() => Err(X402Error::signer_rejected(error)),
                    (Some(proof), _) => Ok(proof),
                    (None, _) => Err(X402Error::signer_rejected(
                        "Signer returned neither a result nor an error",
                    )),
                };
                self.resolve(connection_id, &id, outcome);
            }
            SignerMessage::Error {
                id: Some(id),
                error,
            } => {
                self.resolve(connection_id, &id, Err(X402Error::signer_rejected(error)));
            }
            SignerMessage::Error { id: None, error } => {
                tracing::warn!(client_id = %connection_id, "Signer reported error: {}", error);
            }
            SignerMessage::Pong => {
                tracing::trace!(client_id = %connection_id, "pong");
            }
            other @ (SignerMessage::Connected { .. } | SignerMessage::SignRequest { .. }) => {
                tracing::warn!(
                    client_id = %connection_id,
                    kind = other.kind(),
                    "Unexpected frame from signer"
                );
                self.send_to(
                    connection_id,
                    SignerMessage::error(format!("Unexpected message type: {}", other.kind())),
                );
            }
        }
    }

    /// Deliver a resolution to the request's waiter, if it is still waiting
    fn resolve(&self, connection_id: &str, request_id: &str, outcome: Result<PaymentProof>) {
        let removed = self.inner.pending.remove_if(request_id, |_, request| {
            request.dispatched_to.iter().any(|target| target == connection_id)
        });

        match removed {
            Some((_, request)) => {
                let remaining = request.deadline.saturating_duration_since(Instant::now());
                tracing::debug!(
                    request_id = %request_id,
                    ok = outcome.is_ok(),
                    remaining_ms = remaining.as_millis() as u64,
                    "Sign request resolved"
                );
                let _ = request.responder.send(outcome);
            }
            None => {
                tracing::warn!(
                    client_id = %connection_id,
                    request_id = %request_id,
                    "Ignoring response for unknown or expired request"
                );
            }
        }
    }

    fn send_to(&self, connection_id: &str, message: SignerMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode frame: {}", e);
                return;
            }
        };
        if let Some(connection) = self.inner.clients.get(connection_id) {
            let _ = connection.outbound.send(Outbound::Text(text));
        }
    }

    fn select_targets(&self) -> Vec<(String, mpsc::UnboundedSender<Outbound>)> {
        let mut connections: Vec<(u64, String, mpsc::UnboundedSender<Outbound>)> = self
            .inner
            .clients
            .iter()
            .map(|entry| {
                (
                    entry.sequence,
                    entry.key().clone(),
                    entry.outbound.clone(),
                )
            })
            .collect();
        if connections.is_empty() {
            return Vec::new();
        }
        connections.sort_by_key(|(sequence, _, _)| *sequence);

        let chosen = match self.inner.config.policy {
            SelectionPolicy::FirstAvailable => connections.into_iter().take(1).collect(),
            SelectionPolicy::RoundRobin => {
                let index =
                    self.inner.cursor.fetch_add(1, Ordering::Relaxed) % connections.len();
                connections.into_iter().skip(index).take(1).collect()
            }
            SelectionPolicy::BroadcastFirstWins => connections,
        };

        chosen
            .into_iter()
            .map(|(_, id, outbound)| (id, outbound))
            .collect()
    }

    fn is_orphaned(&self, request: &PendingSignRequest) -> bool {
        request
            .dispatched_to
            .iter()
            .all(|target| !self.inner.clients.contains_key(target))
    }

    fn server_slot(&self) -> MutexGuard<'_, Option<ServerHandle>> {
        self.inner
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a pending entry when its waiter goes away
struct PendingGuard<'a> {
    pending: &'a DashMap<String, PendingSignRequest>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

#[async_trait]
impl PaymentSigner for SigningCoordinator {
    async fn sign_payment(&self, challenge: &Challenge) -> Result<PaymentProof> {
        self.request_signature(challenge).await
    }

    async fn address(&self) -> Option<String> {
        None
    }

    async fn is_ready(&self) -> bool {
        self.client_count() > 0
    }
}
