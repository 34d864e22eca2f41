//! REQ socket setup. Unlike `hootrpc-tokio`'s `socket.rs`, this one
//! configures and uses a single `zmq::Socket` directly — there is no
//! `tmq` reactor wrapping it, so there is no risk of the options landing
//! on a socket the caller never actually uses.

use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::SyncPeerConfig;

const DEFAULT_RECONNECT_IVL_MS: i32 = 1000;
const DEFAULT_RECONNECT_IVL_MAX_MS: i32 = 60_000;

fn apply_common_options(raw: &zmq::Socket, identity: Option<&[u8]>, timeout: Duration) -> Result<()> {
    if let Some(identity) = identity {
        raw.set_identity(identity).context("set_identity")?;
    }
    raw.set_linger(0).context("set_linger")?;
    raw.set_reconnect_ivl(DEFAULT_RECONNECT_IVL_MS)
        .context("set_reconnect_ivl")?;
    raw.set_reconnect_ivl_max(DEFAULT_RECONNECT_IVL_MAX_MS)
        .context("set_reconnect_ivl_max")?;
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    raw.set_rcvtimeo(timeout_ms).context("set_rcvtimeo")?;
    raw.set_sndtimeo(timeout_ms).context("set_sndtimeo")?;
    Ok(())
}

/// Apply CURVE keypair options to a raw socket before `connect`. Unlike the
/// async peer engine's `tmq`-built ROUTER sockets, this REQ socket is built
/// directly from `zmq::Socket`, so the transport's native CURVE passthrough
/// is reachable here (SPEC_FULL.md §4.3, `curve` auth backend). A noop when
/// no keypair is configured.
fn apply_curve_keys(
    raw: &zmq::Socket,
    public_key: Option<&[u8]>,
    secret_key: Option<&[u8]>,
    peer_public_key: Option<&[u8]>,
) -> Result<()> {
    if let (Some(public_key), Some(secret_key)) = (public_key, secret_key) {
        raw.set_curve_publickey(public_key).context("set_curve_publickey")?;
        raw.set_curve_secretkey(secret_key).context("set_curve_secretkey")?;
        if let Some(peer_public_key) = peer_public_key {
            raw.set_curve_serverkey(peer_public_key)
                .context("set_curve_serverkey")?;
        }
    }
    Ok(())
}

/// Create a REQ socket connected to `endpoint`, configured with the same
/// linger/reconnect posture as the async peer's ROUTER sockets, plus a
/// send/recv timeout so a single blocking `call` cannot hang forever.
pub fn connect_req(endpoint: &str, identity: Option<&[u8]>, timeout: Duration) -> Result<zmq::Socket> {
    connect_req_with_curve(endpoint, identity, timeout, None, None, None)
}

/// As [`connect_req`], additionally applying a CURVE keypair (and, for a
/// client dialing a known server, that server's public key) before
/// connecting.
pub fn connect_req_with_curve(
    endpoint: &str,
    identity: Option<&[u8]>,
    timeout: Duration,
    public_key: Option<&[u8]>,
    secret_key: Option<&[u8]>,
    peer_public_key: Option<&[u8]>,
) -> Result<zmq::Socket> {
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::REQ).context("create REQ socket")?;
    apply_common_options(&socket, identity, timeout)?;
    apply_curve_keys(&socket, public_key, secret_key, peer_public_key)?;
    socket.connect(endpoint).context("connect REQ socket")?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_req_applies_options_and_connects() {
        let socket = connect_req("tcp://127.0.0.1:1", None, Duration::from_millis(50)).unwrap();
        assert_eq!(socket.get_socket_type().unwrap(), zmq::REQ);
    }

    #[test]
    fn connect_req_rejects_unparseable_endpoint() {
        let result = connect_req("not-an-endpoint", None, Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[test]
    fn connect_req_with_curve_applies_keypair() {
        let pair = zmq::CurveKeyPair::new().unwrap();
        let socket = connect_req_with_curve(
            "tcp://127.0.0.1:1",
            None,
            Duration::from_millis(50),
            Some(&pair.public_key),
            Some(&pair.secret_key),
            Some(&pair.public_key),
        )
        .unwrap();
        assert_eq!(socket.get_socket_type().unwrap(), zmq::REQ);
    }

    #[test]
    fn sync_peer_config_builder_sets_identity_and_timeout() {
        let config = SyncPeerConfig::default()
            .with_identity("client-a")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.identity.as_deref(), Some(b"client-a".as_ref()));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }
}
