//! Gateway client — the connection manager.
//!
//! An actor task owns the transport, the pending-request map, and the
//! subscriber registry; all connection state is mutated only from that task.
//! Callers talk to it over an mpsc command channel, so concurrent `call`s
//! never interfere with each other's correlation entries.
//!
//! Reconnection: once the handshake has completed at least once, a transport
//! drop rejects every pending call immediately, then redials with bounded
//! backoff and re-runs the full challenge → connect handshake. Exhausting
//! the budget surfaces a terminal classified connect failure; only a fresh
//! `connect()` reconnects after that.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use helm_core::frames::{
    CHALLENGE_EVENT, CONNECT_METHOD, ConnectChallenge, ConnectParams, Frame, HandshakeResult,
    MAX_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION,
};
use helm_core::{ConnectFailureKind, GatewayError, ids};

use crate::config::GatewayConfig;
use crate::state::ConnectionState;
use crate::transport::{Transport, TransportDialer};

/// Local event name emitted when the connection is voluntarily closed.
pub const DISCONNECTED_EVENT: &str = "disconnected";

/// Local event name emitted when the reconnect budget is exhausted.
pub const CONNECT_ERROR_EVENT: &str = "connect-error";

/// Command sent from the client handle to the actor task.
enum Command {
    Call {
        method: String,
        params: Option<Value>,
        reply: oneshot::Sender<Result<Value, GatewayError>>,
    },
    Subscribe {
        event: String,
        tx: mpsc::UnboundedSender<Value>,
        reply: oneshot::Sender<u64>,
    },
    Unsubscribe {
        token: u64,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// One in-flight call awaiting its response or deadline.
struct PendingCall {
    method: String,
    reply: oneshot::Sender<Result<Value, GatewayError>>,
    deadline: Instant,
}

/// Handle to a live gateway connection.
///
/// Cheap to clone-by-share (`Arc` it); dropping the last handle shuts the
/// actor down.
#[derive(Debug)]
pub struct GatewayClient {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    last_error: Arc<Mutex<Option<GatewayError>>>,
    handshake: Arc<Mutex<Option<HandshakeResult>>>,
}

/// A registration for one inbound event name.
///
/// Delivery is per-subscription and unbounded; a subscriber that falls
/// behind or goes away only loses its own deliveries. Dropping the
/// subscription unregisters it.
pub struct Subscription {
    token: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    cmd_tx: mpsc::Sender<Command>,
}

impl Subscription {
    /// Receive the next event payload. `None` after the client shuts down.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(Command::Unsubscribe { token: self.token });
    }
}

impl GatewayClient {
    /// Open the transport, run the challenge → connect handshake, and spawn
    /// the connection actor.
    ///
    /// Fails with [`GatewayError::Handshake`] if the gateway rejects the
    /// connect call, or [`GatewayError::Timeout`] if no challenge or
    /// response arrives within the request timeout.
    pub async fn connect(
        endpoint: impl Into<String>,
        credentials: Option<Value>,
        config: GatewayConfig,
        dialer: Arc<dyn TransportDialer>,
    ) -> Result<(Self, HandshakeResult), GatewayError> {
        let endpoint = endpoint.into();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let mut transport = dialer.dial(&endpoint).await?;
        let _ = state_tx.send(ConnectionState::Authenticating);
        let result =
            match perform_handshake(transport.as_mut(), &config, credentials.as_ref()).await {
                Ok(r) => r,
                Err(e) => {
                    transport.close().await;
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    return Err(e);
                }
            };
        let _ = state_tx.send(ConnectionState::Connected);
        info!(endpoint, protocol = result.protocol, "gateway handshake complete");

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let last_error = Arc::new(Mutex::new(None));
        let handshake = Arc::new(Mutex::new(Some(result.clone())));

        let actor = Actor {
            dialer,
            endpoint,
            credentials,
            config,
            cmd_rx,
            state_tx,
            pending: HashMap::new(),
            listeners: HashMap::new(),
            next_token: 1,
            last_error: Arc::clone(&last_error),
            handshake: Arc::clone(&handshake),
        };
        drop(tokio::spawn(actor.run(transport)));

        Ok((
            Self {
                cmd_tx,
                state_rx,
                last_error,
                handshake,
            },
            result,
        ))
    }

    /// Send a request and await its response payload.
    ///
    /// Awaits the ready gate first: while the connection is re-handshaking
    /// the call parks, and once the connection is terminally down it fails
    /// fast with [`GatewayError::NotConnected`]. Transient timeouts are the
    /// caller's to retry.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, GatewayError> {
        self.await_ready().await?;
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Call {
                method: method.into(),
                params,
                reply,
            })
            .await
            .map_err(|_| GatewayError::NotConnected)?;
        rx.await.map_err(|_| GatewayError::Disconnected)?
    }

    /// Register for inbound events by name.
    pub async fn subscribe(&self, event: impl Into<String>) -> Result<Subscription, GatewayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe {
                event: event.into(),
                tx,
                reply,
            })
            .await
            .map_err(|_| GatewayError::NotConnected)?;
        let token = reply_rx.await.map_err(|_| GatewayError::NotConnected)?;
        Ok(Subscription {
            token,
            rx,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Close the connection, rejecting all pending calls with
    /// [`GatewayError::Disconnected`]. Terminal: a new `connect()` is
    /// required afterwards.
    pub async fn disconnect(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Disconnect { done }).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel over the connection state; also serves as the ready
    /// gate used by [`Self::call`].
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The terminal connect failure, if reconnection gave up.
    pub fn last_error(&self) -> Option<GatewayError> {
        self.last_error.lock().clone()
    }

    /// The most recent handshake result.
    pub fn handshake_result(&self) -> Option<HandshakeResult> {
        self.handshake.lock().clone()
    }

    /// Wait until the connection is ready for calls.
    async fn await_ready(&self) -> Result<(), GatewayError> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => return Err(GatewayError::NotConnected),
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(GatewayError::NotConnected);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct Actor {
    dialer: Arc<dyn TransportDialer>,
    endpoint: String,
    credentials: Option<Value>,
    config: GatewayConfig,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    pending: HashMap<String, PendingCall>,
    listeners: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Value>)>>,
    next_token: u64,
    last_error: Arc<Mutex<Option<GatewayError>>>,
    handshake: Arc<Mutex<Option<HandshakeResult>>>,
}

impl Actor {
    #[tracing::instrument(skip_all, name = "gateway_actor", fields(endpoint = %self.endpoint))]
    async fn run(mut self, mut transport: Box<dyn Transport>) {
        loop {
            if !self.connected_phase(transport.as_mut()).await {
                transport.close().await;
                return;
            }
            transport.close().await;

            // Transport dropped after a completed handshake: reject every
            // pending call now so callers observe failure promptly, then
            // redial under the backoff policy.
            self.reject_all(&GatewayError::Disconnected);
            self.set_state(ConnectionState::Reconnecting);
            match self.reconnect().await {
                Some(t) => transport = t,
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    /// Serve one connected transport. Returns `true` on involuntary drop
    /// (caller should reconnect), `false` on shutdown.
    async fn connected_phase(&mut self, transport: &mut dyn Transport) -> bool {
        loop {
            let next_deadline = self.pending.values().map(|p| p.deadline).min();
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.shutdown();
                        return false;
                    };
                    match cmd {
                        Command::Call { method, params, reply } => {
                            let id = ids::request_id();
                            let frame = Frame::request(&id, &method, params);
                            if let Err(e) = transport.send(frame).await {
                                warn!(method, error = %e, "send failed, treating as drop");
                                let _ = reply.send(Err(GatewayError::Disconnected));
                                return true;
                            }
                            let deadline = Instant::now() + self.config.request_timeout();
                            let _ = self.pending.insert(id, PendingCall { method, reply, deadline });
                        }
                        Command::Subscribe { event, tx, reply } => {
                            let _ = reply.send(self.add_listener(event, tx));
                        }
                        Command::Unsubscribe { token } => self.remove_listener(token),
                        Command::Disconnect { done } => {
                            self.reject_all(&GatewayError::Disconnected);
                            self.emit_local(DISCONNECTED_EVENT, json!({}));
                            self.set_state(ConnectionState::Disconnected);
                            let _ = done.send(());
                            self.shutdown();
                            return false;
                        }
                    }
                }
                frame = transport.recv() => {
                    match frame {
                        Some(Ok(frame)) => self.dispatch(frame),
                        Some(Err(e)) => warn!(error = %e, "dropping malformed frame"),
                        None => return true,
                    }
                }
                () = deadline_elapsed(next_deadline) => self.expire_pending(),
            }
        }
    }

    /// Redial and re-handshake under the backoff policy.
    ///
    /// Returns the new transport, or `None` once terminally failed (budget
    /// exhausted, auth rejected, or protocol mismatch).
    async fn reconnect(&mut self) -> Option<Box<dyn Transport>> {
        let policy = self.config.reconnect.clone();
        let mut last_failure = GatewayError::Transport("gateway unreachable".into());
        let mut attempt = 0;
        while policy.allows(attempt) {
            let delay = policy.delay_for(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect backoff");
            if self.wait_offline(delay).await {
                // Voluntary disconnect while backing off.
                return None;
            }

            self.set_state(ConnectionState::Connecting);
            match self.dialer.dial(&self.endpoint).await {
                Err(e) => {
                    warn!(attempt, error = %e, "redial failed");
                    last_failure = e;
                }
                Ok(mut transport) => {
                    self.set_state(ConnectionState::Authenticating);
                    match perform_handshake(
                        transport.as_mut(),
                        &self.config,
                        self.credentials.as_ref(),
                    )
                    .await
                    {
                        Ok(result) => {
                            info!(attempt, protocol = result.protocol, "re-handshake complete");
                            *self.handshake.lock() = Some(result);
                            self.set_state(ConnectionState::Connected);
                            return Some(transport);
                        }
                        Err(e @ GatewayError::Handshake { .. }) => {
                            // The gateway looked at our connect params and
                            // said no. Retrying the same params is pointless.
                            transport.close().await;
                            self.fail_terminal(classify_handshake_failure(&e), e);
                            return None;
                        }
                        Err(e) => {
                            warn!(attempt, error = %e, "re-handshake failed");
                            transport.close().await;
                            last_failure = e;
                        }
                    }
                }
            }
            self.set_state(ConnectionState::Reconnecting);
            attempt += 1;
        }
        self.fail_terminal(ConnectFailureKind::Unreachable, last_failure);
        None
    }

    /// Sleep while remaining responsive to commands. Returns `true` if a
    /// disconnect was requested.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let end = Instant::now() + delay;
        loop {
            tokio::select! {
                () = sleep_until(end) => return false,
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.shutdown();
                        return true;
                    };
                    match cmd {
                        Command::Call { reply, .. } => {
                            let _ = reply.send(Err(GatewayError::Disconnected));
                        }
                        Command::Subscribe { event, tx, reply } => {
                            let _ = reply.send(self.add_listener(event, tx));
                        }
                        Command::Unsubscribe { token } => self.remove_listener(token),
                        Command::Disconnect { done } => {
                            self.emit_local(DISCONNECTED_EVENT, json!({}));
                            self.set_state(ConnectionState::Disconnected);
                            let _ = done.send(());
                            self.shutdown();
                            return true;
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        match frame {
            Frame::Response { id, ok, payload, error } => {
                let Some(call) = self.pending.remove(&id) else {
                    debug!(id, "response with no pending call");
                    return;
                };
                let result = if ok {
                    Ok(payload.unwrap_or(Value::Null))
                } else {
                    let (code, message) = error
                        .map(|e| (e.code, e.message))
                        .unwrap_or_else(|| ("UNKNOWN".into(), "gateway returned ok=false".into()));
                    Err(GatewayError::Remote { code, message })
                };
                let _ = call.reply.send(result);
            }
            Frame::Event { event, payload, seq } => {
                debug!(event, seq, "inbound event");
                self.emit_local(&event, payload);
            }
            Frame::Request { method, .. } => {
                warn!(method, "gateway sent a request frame; ignoring");
            }
        }
    }

    fn emit_local(&mut self, event: &str, payload: Value) {
        if let Some(subs) = self.listeners.get_mut(event) {
            // Prune subscribers whose receiver is gone; the rest each get
            // their own copy so one consumer cannot affect another.
            subs.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
            if subs.is_empty() {
                let _ = self.listeners.remove(event);
            }
        }
    }

    fn add_listener(&mut self, event: String, tx: mpsc::UnboundedSender<Value>) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.listeners.entry(event).or_default().push((token, tx));
        token
    }

    fn remove_listener(&mut self, token: u64) {
        for subs in self.listeners.values_mut() {
            subs.retain(|(t, _)| *t != token);
        }
        self.listeners.retain(|_, subs| !subs.is_empty());
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(call) = self.pending.remove(&id) {
                warn!(method = call.method, "call deadline elapsed");
                let _ = call.reply.send(Err(GatewayError::Timeout {
                    timeout_ms: self.config.request_timeout_ms,
                    context: format!("call {}", call.method),
                }));
            }
        }
    }

    fn reject_all(&mut self, error: &GatewayError) {
        for (_, call) in self.pending.drain() {
            let _ = call.reply.send(Err(error.clone()));
        }
    }

    fn fail_terminal(&mut self, kind: ConnectFailureKind, cause: GatewayError) {
        warn!(%kind, error = %cause, "giving up on reconnection");
        let error = GatewayError::ConnectFailed {
            kind,
            message: cause.to_string(),
        };
        self.emit_local(
            CONNECT_ERROR_EVENT,
            json!({ "kind": kind, "message": error.to_string() }),
        );
        *self.last_error.lock() = Some(error);
    }

    fn shutdown(&mut self) {
        self.reject_all(&GatewayError::Disconnected);
        self.listeners.clear();
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}

/// Wait for the earliest pending deadline; parks forever when none.
async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

fn classify_handshake_failure(error: &GatewayError) -> ConnectFailureKind {
    match error {
        GatewayError::Handshake { code, .. } if code.contains("PROTOCOL") => {
            ConnectFailureKind::ProtocolMismatch
        }
        GatewayError::Handshake { .. } => ConnectFailureKind::AuthRejected,
        _ => ConnectFailureKind::Unreachable,
    }
}

/// Run the challenge → connect handshake on a fresh transport.
async fn perform_handshake(
    transport: &mut dyn Transport,
    config: &GatewayConfig,
    credentials: Option<&Value>,
) -> Result<HandshakeResult, GatewayError> {
    let deadline = config.request_timeout();

    // 1. The gateway speaks first with a challenge event.
    let challenge = timeout(deadline, await_challenge(transport))
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: config.request_timeout_ms,
            context: "handshake challenge".into(),
        })??;

    // 2. Answer with the connect call.
    let params = ConnectParams {
        min_protocol: MIN_PROTOCOL_VERSION,
        max_protocol: MAX_PROTOCOL_VERSION,
        client: config.client.clone(),
        role: config.role.clone(),
        scopes: config.scopes.clone(),
        caps: config.caps.clone(),
        auth: Some(json!({
            "nonce": challenge.nonce,
            "credentials": credentials,
        })),
        user_agent: config.user_agent.clone(),
        locale: config.locale.clone(),
    };
    let id = ids::request_id();
    let params_value = serde_json::to_value(&params)
        .map_err(|e| GatewayError::Transport(format!("serialize connect params: {e}")))?;
    transport
        .send(Frame::request(&id, CONNECT_METHOD, Some(params_value)))
        .await?;

    // 3. Await the matching response.
    let result = timeout(deadline, await_connect_response(transport, &id))
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: config.request_timeout_ms,
            context: "connect response".into(),
        })??;

    if !(MIN_PROTOCOL_VERSION..=MAX_PROTOCOL_VERSION).contains(&result.protocol) {
        return Err(GatewayError::Handshake {
            code: "PROTOCOL_MISMATCH".into(),
            message: format!(
                "gateway negotiated protocol {} outside {MIN_PROTOCOL_VERSION}..={MAX_PROTOCOL_VERSION}",
                result.protocol
            ),
        });
    }
    Ok(result)
}

async fn await_challenge(transport: &mut dyn Transport) -> Result<ConnectChallenge, GatewayError> {
    loop {
        match transport.recv().await {
            None => return Err(GatewayError::Disconnected),
            Some(Err(e)) => warn!(error = %e, "dropping malformed frame during handshake"),
            Some(Ok(Frame::Event { event, payload, .. })) if event == CHALLENGE_EVENT => {
                return serde_json::from_value(payload)
                    .map_err(|e| GatewayError::Transport(format!("parse challenge: {e}")));
            }
            // Stale frames from before the drop; not ours to answer.
            Some(Ok(_)) => {}
        }
    }
}

async fn await_connect_response(
    transport: &mut dyn Transport,
    id: &str,
) -> Result<HandshakeResult, GatewayError> {
    loop {
        match transport.recv().await {
            None => return Err(GatewayError::Disconnected),
            Some(Err(e)) => warn!(error = %e, "dropping malformed frame during handshake"),
            Some(Ok(Frame::Response { id: rid, ok, payload, error })) if rid == id => {
                if !ok {
                    let (code, message) = error
                        .map(|e| (e.code, e.message))
                        .unwrap_or_else(|| ("UNKNOWN".into(), "connect rejected".into()));
                    return Err(GatewayError::Handshake { code, message });
                }
                return serde_json::from_value(payload.unwrap_or(Value::Null))
                    .map_err(|e| GatewayError::Transport(format!("parse handshake result: {e}")));
            }
            Some(Ok(_)) => {}
        }
    }
}
