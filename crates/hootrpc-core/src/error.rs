//! The error taxonomy RPC callers see.
//!
//! Protocol-level failures (`MalformedEnvelope`, `MalformedPayload`) never
//! reach this type: the peer engine logs and drops those at the point they
//! occur. Everything here is something a caller can legitimately observe as
//! the outcome of a call.

use thiserror::Error;

/// The error taxonomy a call can resolve to.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A call was attempted before `connect`/`bind`.
    #[error("endpoint not initialized: call connect() or bind() first")]
    NotInitialized,

    /// Registry lookup missed, with no proxy or the proxy also missed.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// No reply arrived within the call's configured timeout.
    #[error("call timed out waiting for a reply")]
    Timeout,

    /// The remote side raised something this endpoint doesn't recognize
    /// as a standard exception; the name is preserved as data. `message`
    /// already has the delimited remote traceback folded in by
    /// [`crate::mux::reconstruct_exception`] (mirroring the original's
    /// client-side join); `traceback` is the raw text underneath it, kept
    /// for callers that want it on its own.
    #[error("remote exception {name}: {message}")]
    RemoteException {
        name: String,
        message: String,
        traceback: String,
    },

    /// The remote side raised something matching an entry in the builtin
    /// allowlist (see [`crate::mux::builtin_exception`]). `message` already
    /// has the delimited remote traceback folded in, same as
    /// [`RpcError::RemoteException`].
    #[error("{kind}: {message}")]
    ReconstructedBuiltin {
        kind: BuiltinExceptionKind,
        message: String,
        traceback: String,
    },

    /// The endpoint was shut down while this call was still outstanding.
    #[error("endpoint shut down with call still pending")]
    Shutdown,

    /// The auth backend rejected the handshake.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// An operation the synchronous client-only variant cannot perform
    /// (server-role duties, background tasks, periodic callbacks).
    #[error("unsupported on the synchronous client: {0}")]
    Unsupported(&'static str),

    /// Registering at a path that is already an internal (non-leaf) node.
    #[error("registry conflict registering {0:?}: path is an internal node")]
    RegistryConflict(String),

    /// The underlying transport returned an error outside the RPC taxonomy.
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Standard exception names this reimplementation can reconstruct directly,
/// matching the original source's allowlist-by-name fallback (see §9 of the
/// design notes: targets without reflective builtin lookup need an explicit
/// table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinExceptionKind {
    ValueError,
    TypeError,
    KeyError,
    IndexError,
    ZeroDivisionError,
    AttributeError,
    RuntimeError,
    NotImplementedError,
    TimeoutError,
}

impl std::fmt::Display for BuiltinExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuiltinExceptionKind::ValueError => "ValueError",
            BuiltinExceptionKind::TypeError => "TypeError",
            BuiltinExceptionKind::KeyError => "KeyError",
            BuiltinExceptionKind::IndexError => "IndexError",
            BuiltinExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            BuiltinExceptionKind::AttributeError => "AttributeError",
            BuiltinExceptionKind::RuntimeError => "RuntimeError",
            BuiltinExceptionKind::NotImplementedError => "NotImplementedError",
            BuiltinExceptionKind::TimeoutError => "TimeoutError",
        };
        f.write_str(name)
    }
}

impl BuiltinExceptionKind {
    /// Look up a builtin kind by the exception name a remote peer reported.
    /// Anything not in this table is not a lookup failure — it just means
    /// the caller should fall back to [`RpcError::RemoteException`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ValueError" => Some(Self::ValueError),
            "TypeError" => Some(Self::TypeError),
            "KeyError" => Some(Self::KeyError),
            "IndexError" => Some(Self::IndexError),
            "ZeroDivisionError" => Some(Self::ZeroDivisionError),
            "AttributeError" => Some(Self::AttributeError),
            "RuntimeError" => Some(Self::RuntimeError),
            "NotImplementedError" => Some(Self::NotImplementedError),
            "TimeoutError" => Some(Self::TimeoutError),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
