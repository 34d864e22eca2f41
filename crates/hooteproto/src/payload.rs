//! Packing and unpacking of `WORK`, `OK`, and `ERROR` bodies.
//!
//! All three share one codec: a MessagePack-encoded tuple. `WORK` carries
//! `(name, positional_args, keyword_args)`; `OK` carries a single packed
//! return value; `ERROR` carries `(exception_name, message, traceback_string)`.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Ordered positional arguments to a call.
pub type Args = Vec<rmpv::Value>;
/// String-keyed keyword arguments to a call. `BTreeMap` rather than
/// `HashMap` so wire output is deterministic, which matters for tests that
/// compare packed bytes directly.
pub type Kwargs = BTreeMap<String, rmpv::Value>;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Pack a `WORK` body: `(name, args, kwargs)`.
pub fn pack_call(name: &str, args: &Args, kwargs: &Kwargs) -> Result<Bytes, PayloadError> {
    let bytes = rmp_serde::to_vec(&(name, args, kwargs))?;
    Ok(Bytes::from(bytes))
}

/// Unpack a `WORK` body.
pub fn unpack_call(body: &[u8]) -> Result<(String, Args, Kwargs), PayloadError> {
    let (name, args, kwargs): (String, Args, Kwargs) = rmp_serde::from_slice(body)?;
    Ok((name, args, kwargs))
}

/// Pack an `OK` body carrying an arbitrary serializable return value.
pub fn pack_result<T: Serialize>(value: &T) -> Result<Bytes, PayloadError> {
    Ok(Bytes::from(rmp_serde::to_vec(value)?))
}

/// Unpack an `OK` body.
pub fn unpack_result<T: DeserializeOwned>(body: &[u8]) -> Result<T, PayloadError> {
    Ok(rmp_serde::from_slice(body)?)
}

/// Pack an `ERROR` body: `(exception_name, message, traceback_string)`.
pub fn pack_error(name: &str, message: &str, traceback: &str) -> Result<Bytes, PayloadError> {
    let bytes = rmp_serde::to_vec(&(name, message, traceback))?;
    Ok(Bytes::from(bytes))
}

/// Unpack an `ERROR` body.
pub fn unpack_error(body: &[u8]) -> Result<(String, String, String), PayloadError> {
    let (name, message, traceback): (String, String, String) = rmp_serde::from_slice(body)?;
    Ok((name, message, traceback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_roundtrip() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("scale".to_string(), rmpv::Value::from(2));
        let args: Args = vec![rmpv::Value::from(7), rmpv::Value::from("hi")];

        let packed = pack_call("math.square", &args, &kwargs).unwrap();
        let (name, args2, kwargs2) = unpack_call(&packed).unwrap();

        assert_eq!(name, "math.square");
        assert_eq!(args2, args);
        assert_eq!(kwargs2, kwargs);
    }

    #[test]
    fn result_roundtrip() {
        let packed = pack_result(&49i64).unwrap();
        let value: i64 = unpack_result(&packed).unwrap();
        assert_eq!(value, 49);
    }

    #[test]
    fn error_roundtrip() {
        let packed = pack_error("ZeroDivisionError", "x", "-- Beginning of remote traceback --").unwrap();
        let (name, message, traceback) = unpack_error(&packed).unwrap();
        assert_eq!(name, "ZeroDivisionError");
        assert_eq!(message, "x");
        assert!(traceback.contains("Beginning of remote traceback"));
    }
}
