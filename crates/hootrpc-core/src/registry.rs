//! Procedure registry (C2): a tree of name components mapping dotted names
//! to callables, with hierarchical lookup.
//!
//! A flat map would work for lookup, but a tree lets a plugin register a
//! bundle of procedures under a prefix (`"cas.*"`) without the endpoint
//! knowing each individual leaf name in advance, and keeps `register`able
//! at any depth.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hooteproto::payload::{Args, Kwargs};

use crate::error::{Result, RpcError};

/// A registered procedure: takes the identity of the peer that issued the
/// call (so handlers like the seed scenario's `"id"` procedure can report
/// it back) plus the call's positional and keyword arguments, and returns a
/// packed MessagePack result or an error triple suitable for
/// [`hooteproto::payload::pack_error`].
pub type Procedure = dyn Fn(&[u8], &Args, &Kwargs) -> std::result::Result<rmpv::Value, CallFailure>
    + Send
    + Sync;

/// What a procedure reports when it fails. Holds exactly the three fields
/// the wire `ERROR` triple carries.
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub exception_name: String,
    pub message: String,
    pub traceback: String,
}

impl CallFailure {
    pub fn new(exception_name: impl Into<String>, message: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            exception_name: exception_name.into(),
            message: message.into(),
            traceback: traceback.into(),
        }
    }
}

enum Node {
    Leaf(Arc<Procedure>),
    Internal(BTreeMap<String, Node>),
}

/// One local registry scoped to an endpoint identity.
pub struct Registry {
    identity: String,
    root: Mutex<BTreeMap<String, Node>>,
}

impl Registry {
    /// Factory: a fresh registry scoped to a string identity. Mirrors the
    /// "one default registry per endpoint identity" convention; callers
    /// may also construct a bare `Registry` directly and share it.
    pub fn local_for(identity: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.into(),
            root: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Register a procedure under a dotted name, creating intermediate
    /// nodes as needed. A collision on an existing leaf replaces it.
    /// Registering at a path that is already an internal node fails with
    /// [`RpcError::RegistryConflict`].
    pub fn register<F>(&self, name: &str, callable: F) -> Result<()>
    where
        F: Fn(&[u8], &Args, &Kwargs) -> std::result::Result<rmpv::Value, CallFailure> + Send + Sync + 'static,
    {
        let parts: Vec<&str> = name.split('.').collect();
        let mut root = self.root.lock().expect("registry lock poisoned");
        Self::insert(&mut root, &parts, Arc::new(callable), name)
    }

    fn insert(
        level: &mut BTreeMap<String, Node>,
        parts: &[&str],
        callable: Arc<Procedure>,
        full_name: &str,
    ) -> Result<()> {
        let (head, tail) = parts.split_first().expect("dotted name must have at least one part");
        if tail.is_empty() {
            match level.get(*head) {
                Some(Node::Internal(_)) => {
                    return Err(RpcError::RegistryConflict(full_name.to_string()))
                }
                _ => {
                    level.insert(head.to_string(), Node::Leaf(callable));
                    Ok(())
                }
            }
        } else {
            let entry = level
                .entry(head.to_string())
                .or_insert_with(|| Node::Internal(BTreeMap::new()));
            match entry {
                Node::Internal(children) => Self::insert(children, tail, callable, full_name),
                Node::Leaf(_) => Err(RpcError::RegistryConflict(full_name.to_string())),
            }
        }
    }

    /// Walk the dotted path. Failure at any step is `ServiceNotFound(name)`.
    pub fn lookup(&self, name: &str) -> Result<Arc<Procedure>> {
        let parts: Vec<&str> = name.split('.').collect();
        let root = self.root.lock().expect("registry lock poisoned");
        Self::walk(&root, &parts).ok_or_else(|| RpcError::ServiceNotFound(name.to_string()))
    }

    fn walk(level: &BTreeMap<String, Node>, parts: &[&str]) -> Option<Arc<Procedure>> {
        let (head, tail) = parts.split_first()?;
        match level.get(*head)? {
            Node::Leaf(callable) if tail.is_empty() => Some(callable.clone()),
            Node::Internal(children) if !tail.is_empty() => Self::walk(children, tail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ok(value: i64) -> std::result::Result<rmpv::Value, CallFailure> {
        Ok(rmpv::Value::from(value))
    }

    #[test]
    fn flat_register_and_lookup() {
        let registry = Registry::local_for("test");
        registry.register("echo", |_peer, _args, _kwargs| ok(1)).unwrap();
        assert!(registry.lookup("echo").is_ok());
    }

    #[test]
    fn nested_register_creates_intermediate_nodes() {
        let registry = Registry::local_for("test");
        registry.register("math.square", |_peer, _a, _k| ok(49)).unwrap();
        assert!(registry.lookup("math.square").is_ok());
        assert!(matches!(
            registry.lookup("math").unwrap_err(),
            RpcError::ServiceNotFound(_)
        ));
    }

    #[test]
    fn lookup_miss_is_service_not_found() {
        let registry = Registry::local_for("test");
        assert!(matches!(
            registry.lookup("nope").unwrap_err(),
            RpcError::ServiceNotFound(name) if name == "nope"
        ));
    }

    #[test]
    fn registering_over_internal_node_conflicts() {
        let registry = Registry::local_for("test");
        registry.register("a.b", |_peer, _a, _k| ok(1)).unwrap();
        let err = registry.register("a", |_peer, _a, _k| ok(2)).unwrap_err();
        assert!(matches!(err, RpcError::RegistryConflict(_)));
    }

    #[test]
    fn leaf_collision_replaces() {
        let registry = Registry::local_for("test");
        registry.register("echo", |_peer, _a, _k| ok(1)).unwrap();
        registry.register("echo", |_peer, _a, _k| ok(2)).unwrap();
        let proc = registry.lookup("echo").unwrap();
        let empty_args = Args::new();
        let empty_kwargs = Kwargs::new();
        assert_eq!(proc(b"caller", &empty_args, &empty_kwargs).unwrap(), rmpv::Value::from(2));
    }

    #[test]
    fn procedure_observes_caller_identity() {
        let registry = Registry::local_for("test");
        registry
            .register("id", |peer, _a, _k| Ok(rmpv::Value::from(peer.to_vec())))
            .unwrap();
        let proc = registry.lookup("id").unwrap();
        let empty_args = Args::new();
        let empty_kwargs = Kwargs::new();
        assert_eq!(
            proc(b"client-a", &empty_args, &empty_kwargs).unwrap(),
            rmpv::Value::from(b"client-a".to_vec())
        );
        assert_eq!(
            proc(b"client-b", &empty_args, &empty_kwargs).unwrap(),
            rmpv::Value::from(b"client-b".to_vec())
        );
    }
}
