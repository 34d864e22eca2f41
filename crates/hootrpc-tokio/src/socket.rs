//! Socket setup helpers (C5 responsibility 1).
//!
//! Centralizes the ZMQ socket options every peer engine wants regardless of
//! direction: zero linger on close and a capped reconnect backoff, applied
//! through `tmq`'s builder the same way the source's `socket_config.rs`
//! does — chained setters on the builder itself, not a side-channel raw
//! socket. `tmq`'s builder surface only forwards linger/reconnect/identity;
//! it has no passthrough for `ROUTER_MANDATORY` or native ZMTP heartbeat,
//! so (like the source, which defines heartbeat constants it never wires
//! through this same builder) those stay outside the transport and are the
//! heartbeat backend's job instead of the socket's.

use anyhow::{Context as _, Result};
use futures::{Sink, Stream};
use tmq::Multipart;

pub const DEFAULT_RECONNECT_IVL_MS: i32 = 1000;
pub const DEFAULT_RECONNECT_IVL_MAX_MS: i32 = 60_000;

/// A socket usable by the peer engine's single reactor task: it both
/// receives and sends multipart messages. Satisfied by `tmq`'s
/// `RouterSocket` and `DealerSocket` alike, so the engine can stay generic
/// over which kind it was constructed with.
pub trait RpcSocket:
    Stream<Item = std::result::Result<Multipart, tmq::TmqError>>
    + Sink<Multipart, Error = tmq::TmqError>
    + Unpin
    + Send
{
}

impl<T> RpcSocket for T where
    T: Stream<Item = std::result::Result<Multipart, tmq::TmqError>>
        + Sink<Multipart, Error = tmq::TmqError>
        + Unpin
        + Send
{
}

/// Create a ROUTER socket bound at `endpoint`.
pub async fn create_router_and_bind(
    ctx: &tmq::Context,
    endpoint: &str,
    identity: &[u8],
) -> Result<impl RpcSocket> {
    tmq::router(ctx)
        .set_linger(0)
        .set_reconnect_ivl(DEFAULT_RECONNECT_IVL_MS)
        .set_reconnect_ivl_max(DEFAULT_RECONNECT_IVL_MAX_MS)
        .set_identity(identity)
        .bind(endpoint)
        .with_context(|| format!("bind router socket to {endpoint}"))
}

/// Create a ROUTER socket connected to `endpoint`. Used for both the
/// client role (issuing calls to a bound server) and the peer-to-peer role
/// (an endpoint that is simultaneously client and server to the same
/// remote). ROUTER is used on both sides of every async connection, bound
/// or connecting, so the 6-frame envelope layout (explicit peer id on both
/// send and receive) is symmetric regardless of which side dialed: a plain
/// DEALER would have ZMQ silently strip the identity framing this protocol
/// depends on for routing replies back to a specific peer.
pub async fn create_router_and_connect(
    ctx: &tmq::Context,
    endpoint: &str,
    identity: &[u8],
) -> Result<impl RpcSocket> {
    tmq::router(ctx)
        .set_linger(0)
        .set_reconnect_ivl(DEFAULT_RECONNECT_IVL_MS)
        .set_reconnect_ivl_max(DEFAULT_RECONNECT_IVL_MAX_MS)
        .set_identity(identity)
        .connect(endpoint)
        .with_context(|| format!("connect router socket to {endpoint}"))
}
