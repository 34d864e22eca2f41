//! The minimal synchronous, client-only runtime flavor (SPEC_FULL.md §5,
//! flavor 3).
//!
//! Shares the wire codec (`hooteproto`), the error taxonomy, and the
//! request-id/timeout conventions with the async peer engine in
//! `hootrpc-tokio`, but has none of its machinery: no receive-dispatch
//! loop, no registry dispatch, no auth/heartbeat backends, no background
//! tasks. `send_message` blocks: it sends, blocks on `recv` with a
//! transport-level timeout, and processes the reply inline on the calling
//! thread. A synchronous peer cannot act as a server — attempts to do so
//! fail with [`hootrpc_core::RpcError::Unsupported`] rather than silently
//! no-op, so a caller that mistakenly builds one into a server role finds
//! out immediately.
//!
//! The socket kind matches the request-reply side of the envelope format
//! in SPEC_FULL.md §3: a REQ socket only ever sees the 4-frame
//! `[version, request_uuid, kind, payload]` layout, since REQ's
//! empty-delimiter framing is handled by the transport itself.

use std::time::Duration;

use bytes::Bytes;
use hooteproto::frame::{Envelope, Kind};
use hooteproto::payload::{self, Args, Kwargs};
use hootrpc_core::error::{Result, RpcError};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

mod socket;

pub use socket::{connect_req, connect_req_with_curve};

/// Construction-time configuration for one [`SyncPeer`].
pub struct SyncPeerConfig {
    /// This endpoint's own identity, used as the REQ socket's ZMQ identity.
    /// `None` lets the transport assign one.
    pub identity: Option<Bytes>,
    /// How long `call` waits for a reply before resolving with
    /// [`RpcError::Timeout`].
    pub timeout: Duration,
    /// CURVE keypair and the server's public key, applied to the REQ socket
    /// before connecting (SPEC_FULL.md §6, `public_key`/`secret_key`/
    /// `peer_public_key`). `None` leaves the socket on PLAIN/no security,
    /// matching `noop`/`trusted` auth.
    pub public_key: Option<Bytes>,
    pub secret_key: Option<Bytes>,
    pub peer_public_key: Option<Bytes>,
}

impl Default for SyncPeerConfig {
    fn default() -> Self {
        Self {
            identity: None,
            timeout: Duration::from_secs(5),
            public_key: None,
            secret_key: None,
            peer_public_key: None,
        }
    }
}

impl SyncPeerConfig {
    pub fn with_identity(mut self, identity: impl Into<Bytes>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_curve_keys(
        mut self,
        public_key: impl Into<Bytes>,
        secret_key: impl Into<Bytes>,
        peer_public_key: impl Into<Bytes>,
    ) -> Self {
        self.public_key = Some(public_key.into());
        self.secret_key = Some(secret_key.into());
        self.peer_public_key = Some(peer_public_key.into());
        self
    }
}

/// The minimal client-only peer: one connected REQ socket, blocking calls.
pub struct SyncPeer {
    socket: zmq::Socket,
}

impl SyncPeer {
    /// Connect to `endpoint`. There is no `bind()` for this flavor — a
    /// synchronous peer can only dial out, never accept (SPEC_FULL.md §5,
    /// flavor 3: "minimal; client-only").
    pub fn connect(endpoint: &str, config: SyncPeerConfig) -> Result<Self> {
        let socket = socket::connect_req_with_curve(
            endpoint,
            config.identity.as_deref(),
            config.timeout,
            config.public_key.as_deref(),
            config.secret_key.as_deref(),
            config.peer_public_key.as_deref(),
        )
        .map_err(RpcError::Transport)?;
        Ok(Self { socket })
    }

    /// Issue a call and block for the reply. Equivalent in outcome to the
    /// async variants' `peer.<dotted.name>(args…).await`, minus the
    /// completion handle: the value or reconstructed exception is returned
    /// directly on this thread.
    #[instrument(skip(self, args, kwargs), fields(name))]
    pub fn call(&self, name: &str, args: Args, kwargs: Kwargs) -> Result<rmpv::Value> {
        let request_uuid = Uuid::new_v4();
        let body = payload::pack_call(name, &args, &kwargs).map_err(|error| RpcError::Transport(error.into()))?;
        let envelope = Envelope::direct(request_uuid, Kind::Work, body);

        self.send_frames(&envelope)?;
        let reply = self.recv_envelope()?;

        if reply.request_uuid != request_uuid {
            warn!(
                expected = %request_uuid,
                got = %reply.request_uuid,
                "reply request_uuid mismatch on REQ socket; transport guarantees ping-pong so this should never happen"
            );
        }

        match reply.kind {
            Kind::Ok => payload::unpack_result::<rmpv::Value>(&reply.payload)
                .map_err(|error| RpcError::Transport(error.into())),
            Kind::Error => {
                let (name, message, traceback) =
                    payload::unpack_error(&reply.payload).map_err(|error| RpcError::Transport(error.into()))?;
                Err(hootrpc_core::mux::reconstruct_exception(&name, &message, &traceback))
            }
            other => Err(RpcError::Transport(anyhow::anyhow!(
                "unexpected reply kind {other:?} on synchronous client"
            ))),
        }
    }

    /// Explicit attribute-chain builder: `peer.call_named("a.b.c").invoke(args, kwargs)`.
    pub fn call_named<'a>(&'a self, name: impl Into<String>) -> SyncCallBuilder<'a> {
        SyncCallBuilder {
            peer: self,
            name: name.into(),
        }
    }

    fn send_frames(&self, envelope: &Envelope) -> Result<()> {
        let frames = envelope.to_frames();
        let parts: Vec<&[u8]> = frames.iter().map(|frame| frame.as_ref()).collect();
        self.socket
            .send_multipart(parts, 0)
            .map_err(|error| RpcError::Transport(error.into()))
    }

    fn recv_envelope(&self) -> Result<Envelope> {
        let parts = self
            .socket
            .recv_multipart(0)
            .map_err(|error| RpcError::Transport(error.into()))?;
        if parts.len() == 1 && parts[0].is_empty() {
            // A REQ socket times out by returning EAGAIN, which the zmq
            // crate surfaces as an I/O error from recv, not an empty
            // frame — this branch exists for transports that signal
            // timeout by message instead, kept defensive rather than
            // assumed.
            return Err(RpcError::Timeout);
        }
        let frames: Vec<Bytes> = parts.into_iter().map(Bytes::from).collect();
        Envelope::from_frames(&frames).map_err(|error| RpcError::Transport(error.into()))
    }

    /// Server-role duties are a Non-goal for this flavor. `Unsupported`
    /// rather than a silent no-op so a misconfigured caller notices
    /// immediately rather than finding out when dispatch never happens.
    pub fn register_rpc<F>(&self, _name: &str, _callable: F) -> Result<()>
    where
        F: Fn(&[u8], &Args, &Kwargs) -> std::result::Result<rmpv::Value, hootrpc_core::registry::CallFailure>
            + Send
            + Sync
            + 'static,
    {
        Err(RpcError::Unsupported(
            "register_rpc: the synchronous client cannot act as a server",
        ))
    }

    pub fn start(&self) -> Result<()> {
        Err(RpcError::Unsupported(
            "start: the synchronous client has no receive-dispatch loop",
        ))
    }

    pub fn read_forever(&self) -> Result<()> {
        Err(RpcError::Unsupported(
            "read_forever: the synchronous client has no background receive loop",
        ))
    }
}

/// Explicit attribute-chain builder for the synchronous client. No
/// `with_target`: a REQ socket only ever talks to the single peer it
/// connected to, so targeting is meaningless for this flavor.
pub struct SyncCallBuilder<'a> {
    peer: &'a SyncPeer,
    name: String,
}

impl<'a> SyncCallBuilder<'a> {
    pub fn invoke(self, args: Args, kwargs: Kwargs) -> Result<rmpv::Value> {
        debug!(name = %self.name, "issuing synchronous call");
        self.peer.call(&self.name, args, kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn free_tcp_endpoint(ctx: &zmq::Context) -> (zmq::Socket, String) {
        let router = ctx.socket(zmq::ROUTER).unwrap();
        router.bind("tcp://127.0.0.1:*").unwrap();
        let endpoint = router.get_last_endpoint().unwrap().unwrap();
        (router, endpoint)
    }

    #[test]
    fn echo_round_trip_over_real_sockets() {
        let ctx = zmq::Context::new();
        let (router, endpoint) = free_tcp_endpoint(&ctx);

        let peer = SyncPeer::connect(&endpoint, SyncPeerConfig::default().with_timeout(Duration::from_secs(2)))
            .expect("connect");

        // Minimal inline "server": receive one WORK, echo the first
        // positional arg back as OK. ROUTER sees the 6-frame layout; REQ
        // stripped the peer-id/delimiter pair off on the way in and will
        // expect the same pair prefixed on the way back.
        let server_thread = std::thread::spawn(move || {
            let parts = router.recv_multipart(0).unwrap();
            assert_eq!(parts.len(), 6, "router should see identity+delimiter+4 body frames");
            let peer_id = parts[0].clone();
            let request_uuid = parts[3].clone();

            let (_name, args, _kwargs) = payload::unpack_call(&parts[5]).unwrap();
            let body = payload::pack_result(&args[0]).unwrap();

            router
                .send_multipart(
                    vec![peer_id, vec![], vec![hooteproto::frame::VERSION], request_uuid, vec![Kind::Ok.to_u8()], body.to_vec()],
                    0,
                )
                .unwrap();
        });

        let args: Args = vec![rmpv::Value::from("hello")];
        let result = peer.call("echo", args, Kwargs::new()).expect("call should succeed");
        assert_eq!(result, rmpv::Value::from("hello"));

        server_thread.join().unwrap();
    }

    #[test]
    fn remote_error_reconstructs_as_zero_division() {
        let ctx = zmq::Context::new();
        let (router, endpoint) = free_tcp_endpoint(&ctx);

        let peer = SyncPeer::connect(&endpoint, SyncPeerConfig::default().with_timeout(Duration::from_secs(2)))
            .expect("connect");

        let server_thread = std::thread::spawn(move || {
            let parts = router.recv_multipart(0).unwrap();
            let peer_id = parts[0].clone();
            let request_uuid = parts[3].clone();
            let body = payload::pack_error("ZeroDivisionError", "x", "boom: x").unwrap();
            router
                .send_multipart(
                    vec![peer_id, vec![], vec![hooteproto::frame::VERSION], request_uuid, vec![Kind::Error.to_u8()], body.to_vec()],
                    0,
                )
                .unwrap();
        });

        let err = peer.call("boom", vec![], BTreeMap::new()).unwrap_err();
        match err {
            RpcError::ReconstructedBuiltin {
                kind: hootrpc_core::error::BuiltinExceptionKind::ZeroDivisionError,
                message,
                traceback,
            } => {
                assert!(message.contains('x'));
                assert!(message.contains("-- Beginning of remote traceback --"));
                assert_eq!(traceback, "boom: x");
            }
            other => panic!("expected ReconstructedBuiltin, got {other:?}"),
        }

        server_thread.join().unwrap();
    }

    #[test]
    fn server_role_operations_are_unsupported() {
        let ctx = zmq::Context::new();
        let (_router, endpoint) = free_tcp_endpoint(&ctx);
        let peer = SyncPeer::connect(&endpoint, SyncPeerConfig::default()).unwrap();

        assert!(matches!(peer.start(), Err(RpcError::Unsupported(_))));
        assert!(matches!(peer.read_forever(), Err(RpcError::Unsupported(_))));
        assert!(matches!(
            peer.register_rpc("echo", |_peer_id: &[u8], _a: &Args, _k: &Kwargs| Ok(rmpv::Value::Nil)),
            Err(RpcError::Unsupported(_))
        ));
    }

    #[test]
    fn call_named_builder_composes_dotted_name() {
        let ctx = zmq::Context::new();
        let (router, endpoint) = free_tcp_endpoint(&ctx);
        let peer = SyncPeer::connect(&endpoint, SyncPeerConfig::default().with_timeout(Duration::from_secs(2))).unwrap();

        let server_thread = std::thread::spawn(move || {
            let parts = router.recv_multipart(0).unwrap();
            let (name, _args, _kwargs) = payload::unpack_call(&parts[5]).unwrap();
            assert_eq!(name, "math.square");
            let peer_id = parts[0].clone();
            let request_uuid = parts[3].clone();
            let body = payload::pack_result(&49i64).unwrap();
            router
                .send_multipart(
                    vec![peer_id, vec![], vec![hooteproto::frame::VERSION], request_uuid, vec![Kind::Ok.to_u8()], body.to_vec()],
                    0,
                )
                .unwrap();
        });

        let result = peer.call_named("math.square").invoke(vec![rmpv::Value::from(7)], Kwargs::new()).unwrap();
        assert_eq!(result, rmpv::Value::from(49));
        server_thread.join().unwrap();
    }
}
