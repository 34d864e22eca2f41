//! The peer engine (C5): owns one transport socket, drives the
//! receive-dispatch loop, and issues outbound calls through the shared
//! multiplexer.
//!
//! One reactor task per [`Peer`] owns the socket exclusively — sends go
//! through an internal command channel rather than a shared `&mut` — so
//! the same struct works whether that task is spawned with `tokio::spawn`
//! (parallel-threaded flavor) or `tokio::task::spawn_local` inside a
//! caller-owned `LocalSet` (single-thread cooperative flavor). Both flavors
//! share this file; [`Runtime`] only selects which spawn function drives
//! the loop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hooteproto::frame::{Envelope, Kind};
use hooteproto::payload::{self, Args, Kwargs};
use hootrpc_core::auth::{AuthAction, AuthBackend};
use hootrpc_core::error::{RpcError, Result};
use hootrpc_core::heartbeat::HeartbeatBackend;
use hootrpc_core::mux::{CallIssuer, CallMultiplexer, CallOutcome};
use hootrpc_core::registry::{CallFailure, Registry};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::socket::RpcSocket;

/// Which spawn function drives a [`Peer`]'s reactor task. The reactor code
/// itself (this whole module) is identical either way: both flavors share
/// an `Arc<Mutex<..>>` pending-call table and `tokio::sync` primitives,
/// which are `Send` regardless of which executor drives them. The only
/// place this choice matters is `Peer::start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    /// Drive the reactor with `tokio::spawn` on the default multi-thread
    /// executor.
    Threaded,
    /// Drive the reactor with `tokio::task::spawn_local`. The caller must
    /// be running inside a `tokio::task::LocalSet` (directly, or via
    /// `LocalSet::run_until`) when calling [`Peer::bind`]/[`Peer::connect`].
    Cooperative,
}

/// Construction-time configuration for one [`Peer`].
pub struct PeerConfig {
    /// This endpoint's own identity, used as the transport socket's ZMQ
    /// identity.
    pub identity: Bytes,
    /// Default target for calls made without an explicit
    /// [`hootrpc_core::CallBuilder::with_target`] — the only peer this
    /// endpoint talks to, in the common client/server topology.
    pub default_target: Option<Bytes>,
    /// How long an outbound call waits for a reply before resolving with
    /// [`RpcError::Timeout`].
    pub timeout: Duration,
    /// Where local `WORK` dispatch falls back to when the local registry
    /// misses. Mirrors the source's `proxy_to` behavior (SPEC_FULL.md
    /// §4.5.3).
    pub proxy_to: Option<Arc<Registry>>,
    /// How often the reactor emits an explicit `HEARTBEAT` to
    /// `default_target` and asks the heartbeat backend to re-check known
    /// peers for staleness (SPEC_FULL.md §4.4: "a time-based backend that
    /// periodically emits HEARTBEAT messages and evicts peers unseen for N
    /// intervals").
    pub heartbeat_interval: Duration,
}

impl PeerConfig {
    pub fn new(identity: impl Into<Bytes>) -> Self {
        Self {
            identity: identity.into(),
            default_target: None,
            timeout: Duration::from_secs(5),
            proxy_to: None,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn with_default_target(mut self, peer_id: impl Into<Bytes>) -> Self {
        self.default_target = Some(peer_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy_to(mut self, proxy_to: Arc<Registry>) -> Self {
        self.proxy_to = Some(proxy_to);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

enum Command {
    Send(Envelope),
}

/// C5: the central per-endpoint dispatcher. Binds or connects one
/// routing-capable socket, owns a procedure [`Registry`], and multiplexes
/// outbound calls through a [`CallMultiplexer`] shared between the send and
/// receive paths.
pub struct Peer {
    config: PeerConfig,
    registry: Arc<Registry>,
    auth: Box<dyn AuthBackend>,
    heartbeat: Box<dyn HeartbeatBackend>,
    mux: Arc<CallMultiplexer>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    /// Peers seen authenticated at least once, so the heartbeat ticker
    /// knows which peers to ask the backend to re-check for staleness.
    known_peers: Mutex<HashSet<Bytes>>,
}

impl Peer {
    pub fn new(
        config: PeerConfig,
        registry: Arc<Registry>,
        auth: Box<dyn AuthBackend>,
        heartbeat: Box<dyn HeartbeatBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            auth,
            heartbeat,
            mux: Arc::new(CallMultiplexer::new()),
            cmd_tx: Mutex::new(None),
            known_peers: Mutex::new(HashSet::new()),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Bind a ROUTER socket at `endpoint` and start the reactor.
    pub async fn bind(self: &Arc<Self>, endpoint: &str, runtime: Runtime) -> anyhow::Result<()> {
        self.auth.configure();
        self.heartbeat.configure();
        let ctx = tmq::Context::new();
        let socket = crate::socket::create_router_and_bind(&ctx, endpoint, &self.config.identity).await?;
        self.spawn_reactor(socket, runtime);
        self.spawn_heartbeat_ticker(runtime);
        Ok(())
    }

    /// Connect a ROUTER socket to `endpoint` and start the reactor. See
    /// [`crate::socket::create_router_and_connect`] for why the connecting
    /// side is also ROUTER rather than DEALER.
    pub async fn connect(self: &Arc<Self>, endpoint: &str, runtime: Runtime) -> anyhow::Result<()> {
        self.auth.configure();
        self.heartbeat.configure();
        let ctx = tmq::Context::new();
        let socket = crate::socket::create_router_and_connect(&ctx, endpoint, &self.config.identity).await?;
        self.spawn_reactor(socket, runtime);
        self.spawn_heartbeat_ticker(runtime);
        Ok(())
    }

    /// Drive the explicit-heartbeat half of C4: periodically nudge the
    /// heartbeat backend to re-check known peers for staleness, and, if a
    /// `default_target` is configured, send it an explicit `HEARTBEAT`
    /// frame as a client-side keep-alive.
    fn spawn_heartbeat_ticker(self: &Arc<Self>, runtime: Runtime) {
        let interval = self.config.heartbeat_interval;
        let this = Arc::clone(self);
        let fut = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; arm the period instead
            loop {
                ticker.tick().await;
                this.on_heartbeat_tick();
            }
        };
        match runtime {
            Runtime::Threaded => {
                tokio::spawn(fut);
            }
            Runtime::Cooperative => {
                tokio::task::spawn_local(fut);
            }
        }
    }

    fn on_heartbeat_tick(&self) {
        let peers: Vec<Bytes> = self.known_peers.lock().expect("peer lock poisoned").iter().cloned().collect();
        for peer in &peers {
            self.heartbeat.handle_timeout_detection(peer);
        }
        if let Some(target) = &self.config.default_target {
            self.send(Envelope::routed(target.clone(), Uuid::new_v4(), Kind::Heartbeat, Bytes::new()));
        }
    }

    fn spawn_reactor(self: &Arc<Self>, socket: impl RpcSocket + 'static, runtime: Runtime) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock().expect("peer lock poisoned") = Some(cmd_tx);
        let this = Arc::clone(self);
        let fut = async move { this.run(socket, cmd_rx).await };
        match runtime {
            Runtime::Threaded => {
                tokio::spawn(fut);
            }
            Runtime::Cooperative => {
                tokio::task::spawn_local(fut);
            }
        }
    }

    #[instrument(skip_all, fields(identity = %String::from_utf8_lossy(&self.config.identity)))]
    async fn run(self: Arc<Self>, mut socket: impl RpcSocket, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        debug!("reactor started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Send(envelope)) => {
                            let frames: tmq::Multipart = envelope.to_frames().into();
                            if let Err(error) = socket.send(frames).await {
                                warn!(%error, "send failed");
                            }
                        }
                        None => break,
                    }
                }
                incoming = socket.next() => {
                    match incoming {
                        Some(Ok(multipart)) => {
                            let frames: Vec<Bytes> = multipart
                                .into_iter()
                                .map(|frame| Bytes::copy_from_slice(&frame))
                                .collect();
                            self.handle_inbound(frames).await;
                        }
                        Some(Err(error)) => warn!(%error, "socket recv error"),
                        None => break,
                    }
                }
            }
        }
        debug!("reactor stopped");
        self.mux.shutdown();
    }

    async fn handle_inbound(self: &Arc<Self>, frames: Vec<Bytes>) {
        let envelope = match Envelope::from_frames(&frames) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "malformed envelope, dropping");
                return;
            }
        };

        let peer_id = match &envelope.peer_id {
            Some(peer_id) => peer_id.clone(),
            None => {
                warn!("routed socket received a delimiter-less envelope, dropping");
                return;
            }
        };

        if !self.auth.is_authenticated(&peer_id) {
            let action = if envelope.kind == Kind::Hello {
                self.auth.handle_hello(&peer_id, envelope.request_uuid, &envelope.payload)
            } else {
                self.auth.handle_authentication(&peer_id, envelope.request_uuid)
            };
            self.apply_auth_action(action);
            return;
        }

        // Every message from an authenticated peer counts as a heartbeat,
        // not only explicit HEARTBEAT frames (SPEC_FULL.md §3 invariant 3).
        self.heartbeat.handle_heartbeat(&peer_id);
        self.known_peers.lock().expect("peer lock poisoned").insert(peer_id.clone());

        match envelope.kind {
            Kind::Work => self.dispatch_work(envelope, peer_id).await,
            Kind::Ok => match payload::unpack_result::<rmpv::Value>(&envelope.payload) {
                Ok(value) => self.mux.complete_ok(envelope.request_uuid, value),
                Err(error) => warn!(%error, "malformed OK payload, dropping"),
            },
            Kind::Error => match payload::unpack_error(&envelope.payload) {
                Ok((name, message, traceback)) => {
                    self.mux.complete_error(envelope.request_uuid, &name, &message, &traceback)
                }
                Err(error) => warn!(%error, "malformed ERROR payload, dropping"),
            },
            Kind::Authenticated => {
                let action = self.auth.handle_authenticated(&peer_id, &envelope.payload);
                self.apply_auth_action(action);
            }
            Kind::Unauthorized => {
                let action = self.auth.handle_authentication(&peer_id, envelope.request_uuid);
                self.apply_auth_action(action);
            }
            Kind::Hello => {
                let action = self.auth.handle_hello(&peer_id, envelope.request_uuid, &envelope.payload);
                self.apply_auth_action(action);
            }
            Kind::Heartbeat => {}
        }
    }

    fn apply_auth_action(&self, action: AuthAction) {
        let envelope = match action {
            AuthAction::SendAuthenticated { peer_id, request_uuid } => {
                Envelope::routed(peer_id, request_uuid, Kind::Authenticated, Bytes::new())
            }
            AuthAction::SendUnauthorized { peer_id, request_uuid } => {
                Envelope::routed(peer_id, request_uuid, Kind::Unauthorized, Bytes::new())
            }
            AuthAction::SendHello { peer_id, request_uuid, payload } => {
                Envelope::routed(peer_id, request_uuid, Kind::Hello, payload)
            }
            AuthAction::None => return,
        };
        self.send(envelope);
    }

    /// Dispatch a `WORK` message to the local registry, falling back to
    /// `proxy_to` on a miss, and reply `OK`/`ERROR` once the procedure
    /// returns. Runs each call on its own task so one slow handler never
    /// blocks the reactor loop or other in-flight calls.
    async fn dispatch_work(self: &Arc<Self>, envelope: Envelope, peer_id: Bytes) {
        let (name, args, kwargs) = match payload::unpack_call(&envelope.payload) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, "malformed WORK payload, dropping");
                return;
            }
        };
        let this = Arc::clone(self);
        let request_uuid = envelope.request_uuid;
        tokio::spawn(async move {
            let outcome = this.invoke_local(&peer_id, &name, &args, &kwargs);
            let reply = match outcome {
                Ok(value) => match payload::pack_result(&value) {
                    Ok(body) => Envelope::routed(peer_id, request_uuid, Kind::Ok, body),
                    Err(error) => {
                        warn!(%error, "failed to pack OK result");
                        return;
                    }
                },
                Err(failure) => match payload::pack_error(&failure.exception_name, &failure.message, &failure.traceback) {
                    Ok(body) => Envelope::routed(peer_id, request_uuid, Kind::Error, body),
                    Err(error) => {
                        warn!(%error, "failed to pack ERROR result");
                        return;
                    }
                },
            };
            this.send(reply);
        });
    }

    fn invoke_local(
        &self,
        caller_peer_id: &[u8],
        name: &str,
        args: &Args,
        kwargs: &Kwargs,
    ) -> std::result::Result<rmpv::Value, CallFailure> {
        let procedure = match self.registry.lookup(name) {
            Ok(procedure) => procedure,
            Err(RpcError::ServiceNotFound(_)) => match &self.config.proxy_to {
                Some(proxy) => match proxy.lookup(name) {
                    Ok(procedure) => procedure,
                    Err(_) => return Err(CallFailure::new("ServiceNotFound", name, String::new())),
                },
                None => return Err(CallFailure::new("ServiceNotFound", name, String::new())),
            },
            Err(other) => return Err(CallFailure::new("RuntimeError", other.to_string(), String::new())),
        };

        // A registered procedure panicking is this target language's analogue of
        // the source raising an uncaught exception: catch it here so the caller
        // still gets an ERROR reply instead of the call silently timing out
        // because its task vanished. The traceback sent over the wire is left
        // raw (not pre-formatted with `format_remote_traceback`) — folding it
        // into the delimited traceback block is the client's job, done once
        // on reconstruction (`hootrpc_core::mux::reconstruct_exception`), the
        // same way the source's client-side handler does the join.
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| procedure(caller_peer_id, args, kwargs))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                let traceback = format!("{name}: {message}");
                Err(CallFailure::new("RuntimeError", message, traceback))
            }
        }
    }

    fn send(&self, envelope: Envelope) {
        let guard = self.cmd_tx.lock().expect("peer lock poisoned");
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Command::Send(envelope)).is_err() {
                    warn!("reactor gone, dropping outbound envelope");
                }
            }
            None => warn!("send attempted before bind()/connect()"),
        }
    }

    /// Stop the reactor and cancel every outstanding call with
    /// [`RpcError::Shutdown`]. Dropping the command sender ends the
    /// reactor's `select!` loop on its next iteration.
    pub async fn stop(&self) {
        self.auth.stop();
        self.heartbeat.stop();
        self.mux.shutdown();
        *self.cmd_tx.lock().expect("peer lock poisoned") = None;
    }

    pub fn outstanding_calls(&self) -> usize {
        self.mux.outstanding_count()
    }
}

#[async_trait]
impl CallIssuer for Peer {
    async fn issue_call(&self, target: Option<Bytes>, name: String, args: Args, kwargs: Kwargs) -> CallOutcome {
        let initialized = self.cmd_tx.lock().expect("peer lock poisoned").is_some();
        if !initialized {
            return Err(RpcError::NotInitialized);
        }

        let target = target.or_else(|| self.config.default_target.clone());
        let Some(target) = target else {
            return Err(RpcError::Transport(anyhow::anyhow!(
                "no target peer: pass with_target() or configure a default_target"
            )));
        };

        let request_uuid = self.mux.allocate_request_uuid();
        let rx = self.mux.register(request_uuid, Some(target.clone()), self.config.timeout);

        let body = payload::pack_call(&name, &args, &kwargs).map_err(|error| RpcError::Transport(error.into()))?;
        self.auth.save_last_work(&target, body.clone());
        self.send(Envelope::routed(target, request_uuid, Kind::Work, body));

        rx.await.unwrap_or(Err(RpcError::Shutdown))
    }
}

/// Extract a human-readable message from a caught panic payload. Panics
/// almost always carry either a `&'static str` or a `String`; anything else
/// (a custom payload type) falls back to a fixed placeholder rather than
/// failing to build the ERROR reply at all.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "registered procedure panicked".to_string()
    }
}

/// Convenience entry point for `peer.call("a.b.c").invoke(args, kwargs)`.
pub fn call<'a>(peer: &'a Arc<Peer>, name: impl Into<String>) -> hootrpc_core::CallBuilder<'a, Peer> {
    hootrpc_core::CallBuilder::new(peer, name)
}
