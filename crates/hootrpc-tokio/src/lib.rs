//! hootrpc-tokio - the async peer engine (C5) for the hootrpc RPC
//! framework: both the parallel-threaded and single-thread cooperative
//! runtime flavors share this module (SPEC_FULL.md §5, flavors 1 and 2).
//!
//! Everything transport-agnostic (registry, auth/heartbeat contracts, the
//! call multiplexer, the error taxonomy) lives in `hootrpc-core`; this
//! crate adds the one thing that needs a concrete transport library: a
//! [`Peer`] that owns a ROUTER socket and drives the receive-dispatch loop.

pub mod engine;
pub mod socket;

pub use engine::{call, Peer, PeerConfig, Runtime};
pub use socket::RpcSocket;
