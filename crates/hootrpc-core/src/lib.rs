//! hootrpc-core - procedure registry, pluggable auth/heartbeat backends,
//! call multiplexer, and error taxonomy for the hootrpc RPC framework.
//!
//! This crate is runtime-agnostic: it knows nothing about sockets. The
//! peer engine that drives an actual transport socket lives in
//! `hootrpc-tokio` (async, both runtime flavors) or `hootrpc-sync`
//! (minimal blocking client).

pub mod auth;
pub mod error;
pub mod heartbeat;
pub mod mux;
pub mod registry;

pub use auth::AuthBackend;
pub use error::{RpcError, Result};
pub use heartbeat::HeartbeatBackend;
pub use mux::{CallBuilder, CallIssuer, CallMultiplexer, CallOutcome};
pub use registry::{CallFailure, Registry};
