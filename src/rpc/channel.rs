// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC client over a framed duplex byte stream.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use super::codec::ContentLengthCodec;
use super::error::{error_codes, RpcError};
use super::transport::{take_stdio, RpcRead, RpcWrite};
use super::types::{
    error_response, notification_message, request_message, Incoming, Notification, RpcConfig,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{names, GLOBAL_METRICS};

type Outcome = Result<Value, RpcError>;

/// An outstanding request awaiting its response.
struct PendingRequest {
    method: String,
    respond: oneshot::Sender<Outcome>,
}

/// State shared between the channel handle and its reader/writer tasks.
struct Shared {
    config: RpcConfig,
    /// Whoever removes an entry from this table is the one party allowed to
    /// settle it.
    pending: Mutex<HashMap<u64, PendingRequest>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    notifications: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
    destroyed: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, PendingRequest>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, message: Value) -> bool {
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Settle request `id` if it is still pending. Sending happens under the
    /// table lock so a concurrent timeout observes either the entry or the
    /// delivered outcome, never neither.
    fn settle(&self, id: u64, outcome: Outcome) -> bool {
        let mut pending = self.pending();
        match pending.remove(&id) {
            Some(request) => {
                trace!(channel = %self.config.name, id, method = %request.method, "Settling request");
                let _ = request.respond.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Reject every pending request. Returns how many were rejected.
    fn fail_all(&self, error: impl Fn() -> RpcError) -> usize {
        let mut pending = self.pending();
        let count = pending.len();
        for (_, request) in pending.drain() {
            let _ = request.respond.send(Err(error()));
        }
        count
    }

    fn dispatch(&self, message: Value) {
        match Incoming::classify(message) {
            Incoming::Response { id, outcome } => {
                #[cfg(feature = "telemetry")]
                {
                    if outcome.is_err() {
                        GLOBAL_METRICS.increment(names::RPC_REMOTE_ERROR);
                    }
                }
                if !self.settle(id, outcome) {
                    debug!(channel = %self.config.name, id, "Response for unknown or settled request");
                }
            }
            Incoming::Notification(notification) => {
                trace!(channel = %self.config.name, method = %notification.method, "Notification received");
                if let Some(tx) = self
                    .notifications
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .as_ref()
                {
                    let _ = tx.send(notification);
                }
            }
            Incoming::Request { id, method } => {
                debug!(channel = %self.config.name, %method, "Rejecting server-initiated request");
                self.send(error_response(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("Method not found: {}", method),
                ));
            }
            Incoming::Unknown(message) => {
                debug!(channel = %self.config.name, %message, "Ignoring unrecognized message");
            }
        }
    }

    fn transport_closed(&self) {
        if self.destroyed.load(Ordering::SeqCst) || self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let rejected = self.fail_all(|| RpcError::ProcessExited);
        info!(channel = %self.config.name, rejected, "Transport closed");
    }
}

/// Removes a request from the pending table if the caller stops waiting.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
    rx: oneshot::Receiver<Outcome>,
    settled: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.pending().remove(&self.id);
        }
    }
}

/// A JSON-RPC client bound to one transport.
///
/// Requests carry monotonically increasing ids and are settled exactly once
/// by whichever comes first: the matching response, the timeout, the
/// transport closing, or [`destroy`](Self::destroy).
pub struct RpcChannel {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    notifications_taken: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl RpcChannel {
    /// Wrap a transport. `incoming` carries frames from the far side and
    /// `outgoing` carries ours.
    ///
    /// Must be called from within a tokio runtime; the channel spawns one
    /// reader and one writer task.
    pub fn connect<R: RpcRead, W: RpcWrite>(incoming: R, outgoing: W, config: RpcConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            pending: Mutex::new(HashMap::new()),
            outgoing: Mutex::new(Some(tx)),
            notifications: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let reader = tokio::spawn(Self::read_loop(incoming, Arc::clone(&shared)));
        let writer = tokio::spawn(Self::write_loop(outgoing, rx, Arc::clone(&shared)));
        debug!(channel = %shared.config.name, "RPC channel connected");

        Self {
            shared,
            next_id: AtomicU64::new(1),
            notifications_taken: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Wrap a spawned tool server's stdout/stdin.
    pub fn from_child(child: &mut Child, config: RpcConfig) -> Result<Self, RpcError> {
        let (stdout, stdin) = take_stdio(child)?;
        Ok(Self::connect(stdout, stdin, config))
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// Whether the transport has closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    /// Take the receiver for server-initiated notifications.
    ///
    /// Notifications that arrive before this is called are dropped. Returns
    /// `None` after the first call.
    pub fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        if self.notifications_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .shared
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Some(rx)
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout` falls back to the configured default.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] if the far side answers with an error
    /// - [`RpcError::Timeout`] if no response arrives in time
    /// - [`RpcError::ProcessExited`] if the transport closes first
    /// - [`RpcError::Destroyed`] if the channel is (or gets) destroyed; a
    ///   destroyed channel fails fast without writing anything
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }
        if self.is_closed() {
            return Err(RpcError::ProcessExited);
        }

        let timeout =
            timeout.unwrap_or_else(|| Duration::from_millis(self.shared.config.default_timeout_ms));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(
            id,
            PendingRequest {
                method: method.to_string(),
                respond: tx,
            },
        );
        let mut guard = PendingGuard {
            shared: &self.shared,
            id,
            rx,
            settled: false,
        };

        // The transport may have closed between the check above and the
        // insert, after its sweep of the pending table already ran.
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }
        if self.is_closed() {
            return Err(RpcError::ProcessExited);
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.increment(names::RPC_REQUEST);
        trace!(channel = %self.name(), id, method, "Sending request");

        if !self.shared.send(request_message(id, method, params)) {
            return Err(if self.is_destroyed() {
                RpcError::Destroyed
            } else {
                RpcError::ProcessExited
            });
        }

        let result = tokio::time::timeout(timeout, &mut guard.rx).await;
        guard.settled = true;

        match result {
            Ok(Ok(outcome)) => outcome,
            // Every path that removes an entry sends first, so a dropped
            // sender only happens if the channel itself went away.
            Ok(Err(_)) => Err(RpcError::Destroyed),
            Err(_) => {
                if self.shared.pending().remove(&id).is_some() {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.increment(names::RPC_TIMEOUT);
                    warn!(channel = %self.name(), id, method, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                    return Err(RpcError::Timeout {
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // Settled just as the timer fired; the outcome is waiting.
                guard.rx.try_recv().unwrap_or_else(|_| {
                    Err(RpcError::Timeout {
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                })
            }
        }
    }

    /// Send a notification. Nothing is tracked and delivery failures are not
    /// reported.
    pub fn notify(&self, method: &str, params: Option<Value>) {
        if self.is_destroyed() || self.is_closed() {
            debug!(channel = %self.name(), method, "Dropping notification on unusable channel");
            return;
        }
        trace!(channel = %self.name(), method, "Sending notification");
        self.shared.send(notification_message(method, params));
    }

    /// Tear the channel down.
    ///
    /// Rejects every pending request with [`RpcError::Destroyed`] and stops
    /// listening to the transport. Frames already queued for writing are
    /// still flushed. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let rejected = self.shared.fail_all(|| RpcError::Destroyed);

        // Dropping the sender lets the writer drain and exit.
        self.shared
            .outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.shared
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(reader) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            reader.abort();
        }
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();

        debug!(channel = %self.name(), rejected, "RPC channel destroyed");
    }

    async fn read_loop<R: RpcRead>(incoming: R, shared: Arc<Shared>) {
        let read = async {
            let mut frames = FramedRead::new(incoming, ContentLengthCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(message) => shared.dispatch(message),
                    Err(e) => {
                        warn!(channel = %shared.config.name, error = %e, "Transport read failed");
                        break;
                    }
                }
            }
        };
        // Pending requests must be rejected however the reader ends.
        if AssertUnwindSafe(read).catch_unwind().await.is_err() {
            warn!(channel = %shared.config.name, "Transport reader panicked");
        }
        shared.transport_closed();
    }

    async fn write_loop<W: RpcWrite>(
        outgoing: W,
        mut rx: mpsc::UnboundedReceiver<Value>,
        shared: Arc<Shared>,
    ) {
        let mut sink = FramedWrite::new(outgoing, ContentLengthCodec::new());
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                warn!(channel = %shared.config.name, error = %e, "Transport write failed");
                shared.transport_closed();
                break;
            }
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("name", &self.name())
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
