//! hooteproto - wire envelope and payload codec for the hootrpc message bus.
//!
//! This crate is the Wire codec layer (C1) of the RPC core: it knows how to
//! lay an [`Envelope`] out as 4 or 6 ZMQ-style frames and how to pack/unpack
//! the `WORK`/`OK`/`ERROR` payload bodies those frames carry. It does not
//! know about sockets, registries, or auth — those live in `hootrpc-core`
//! and `hootrpc-tokio`/`hootrpc-sync`.

pub mod frame;
pub mod payload;

pub use frame::{Envelope, FrameError, Kind, VERSION};
pub use payload::{Args, Kwargs, PayloadError};
