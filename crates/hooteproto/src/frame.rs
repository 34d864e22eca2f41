//! Wire envelope for the hootrpc protocol.
//!
//! A message on the wire is either 4 or 6 opaque frames, depending on the
//! underlying socket:
//!
//! ```text
//! Routing-capable socket (ROUTER, or peer-to-peer DEALER):
//!   [peer_id, empty_delimiter, version, request_uuid, kind, payload]   (6 frames)
//!
//! Request-reply socket (REQ, synchronous client):
//!   [version, request_uuid, kind, payload]                            (4 frames)
//! ```
//!
//! `version` and `kind` are both single bytes. `request_uuid` is 16 bytes.
//! `payload` is interpreted according to `kind` — see the pack/unpack
//! helpers in [`crate::payload`].

use bytes::Bytes;
use uuid::Uuid;

/// Protocol version. Peers MUST reject envelopes carrying any other value.
pub const VERSION: u8 = 0x02;

/// Message kind, one byte on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Hello = 0x01,
    Ok = 0x02,
    Work = 0x03,
    Error = 0x04,
    Authenticated = 0x05,
    Unauthorized = 0x06,
    Heartbeat = 0x07,
}

impl Kind {
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x01 => Ok(Kind::Hello),
            0x02 => Ok(Kind::Ok),
            0x03 => Ok(Kind::Work),
            0x04 => Ok(Kind::Error),
            0x05 => Ok(Kind::Authenticated),
            0x06 => Ok(Kind::Unauthorized),
            0x07 => Ok(Kind::Heartbeat),
            other => Err(FrameError::InvalidKind(other)),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A parsed envelope. `peer_id` is `Some` only when the envelope came off
/// (or is destined for) a routing-capable socket.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub peer_id: Option<Bytes>,
    pub request_uuid: Uuid,
    pub kind: Kind,
    pub payload: Bytes,
}

/// Errors during envelope parsing. Fatal for the message only: the caller
/// logs and drops, never propagates to an RPC waiter.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unexpected frame count: got {0}, expected 4 or 6")]
    WrongFrameCount(usize),
    #[error("missing empty delimiter frame in routed envelope")]
    MissingDelimiter,
    #[error("protocol version mismatch: expected {expected:#04x}, got {actual:#04x}")]
    VersionMismatch { expected: u8, actual: u8 },
    #[error("invalid message kind: {0:#04x}")]
    InvalidKind(u8),
    #[error("invalid request_uuid")]
    InvalidUuid,
}

impl Envelope {
    /// Build an envelope destined for a routing-capable socket.
    pub fn routed(peer_id: Bytes, request_uuid: Uuid, kind: Kind, payload: Bytes) -> Self {
        Self {
            peer_id: Some(peer_id),
            request_uuid,
            kind,
            payload,
        }
    }

    /// Build an envelope destined for a request-reply socket.
    pub fn direct(request_uuid: Uuid, kind: Kind, payload: Bytes) -> Self {
        Self {
            peer_id: None,
            request_uuid,
            kind,
            payload,
        }
    }

    /// Lay out the envelope as the 4 or 6 frames it will be sent as.
    pub fn to_frames(&self) -> Vec<Bytes> {
        let mut frames = Vec::with_capacity(6);
        if let Some(peer_id) = &self.peer_id {
            frames.push(peer_id.clone());
            frames.push(Bytes::new());
        }
        frames.push(Bytes::copy_from_slice(&[VERSION]));
        frames.push(Bytes::copy_from_slice(self.request_uuid.as_bytes()));
        frames.push(Bytes::copy_from_slice(&[self.kind.to_u8()]));
        frames.push(self.payload.clone());
        frames
    }

    /// Parse a multipart message into an envelope. Rejects any frame count
    /// other than 4 or 6, any version other than [`VERSION`], and any
    /// unknown `kind`.
    pub fn from_frames(frames: &[Bytes]) -> Result<Self, FrameError> {
        let (peer_id, rest) = match frames.len() {
            4 => (None, frames),
            6 => {
                if !frames[1].is_empty() {
                    return Err(FrameError::MissingDelimiter);
                }
                (Some(frames[0].clone()), &frames[2..])
            }
            other => return Err(FrameError::WrongFrameCount(other)),
        };

        let version = rest[0].first().copied().unwrap_or(0);
        if version != VERSION {
            return Err(FrameError::VersionMismatch {
                expected: VERSION,
                actual: version,
            });
        }

        let request_uuid = Uuid::from_slice(&rest[1]).map_err(|_| FrameError::InvalidUuid)?;
        let kind = Kind::from_u8(rest[2].first().copied().unwrap_or(0))?;
        let payload = rest[3].clone();

        Ok(Self {
            peer_id,
            request_uuid,
            kind,
            payload,
        })
    }

    /// Build a reply envelope echoing this envelope's `request_uuid` and
    /// (if present) targeting its sender.
    pub fn reply(&self, kind: Kind, payload: Bytes) -> Self {
        Self {
            peer_id: self.peer_id.clone(),
            request_uuid: self.request_uuid,
            kind,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn direct_envelope_roundtrip() {
        let env = Envelope::direct(Uuid::new_v4(), Kind::Work, Bytes::from_static(b"payload"));
        let frames = env.to_frames();
        assert_eq!(frames.len(), 4);

        let parsed = Envelope::from_frames(&frames).unwrap();
        assert_eq!(parsed.peer_id, None);
        assert_eq!(parsed.request_uuid, env.request_uuid);
        assert_eq!(parsed.kind, Kind::Work);
        assert_eq!(parsed.payload, env.payload);
    }

    #[test]
    fn routed_envelope_roundtrip() {
        let peer_id = Bytes::from_static(b"peer-42");
        let env = Envelope::routed(
            peer_id.clone(),
            Uuid::new_v4(),
            Kind::Ok,
            Bytes::from_static(b"result"),
        );
        let frames = env.to_frames();
        assert_eq!(frames.len(), 6);
        assert!(frames[1].is_empty());

        let parsed = Envelope::from_frames(&frames).unwrap();
        assert_eq!(parsed.peer_id, Some(peer_id));
        assert_eq!(parsed.kind, Kind::Ok);
    }

    #[test]
    fn rejects_wrong_frame_count() {
        let frames = vec![Bytes::new(); 5];
        assert!(matches!(
            Envelope::from_frames(&frames),
            Err(FrameError::WrongFrameCount(5))
        ));
    }

    #[test]
    fn rejects_version_mismatch() {
        let env = Envelope::direct(Uuid::new_v4(), Kind::Work, Bytes::new());
        let mut frames = env.to_frames();
        frames[0] = Bytes::copy_from_slice(&[0x99]);
        let err = Envelope::from_frames(&frames).unwrap_err();
        assert!(matches!(err, FrameError::VersionMismatch { actual: 0x99, .. }));
    }

    #[test]
    fn rejects_unknown_kind() {
        let env = Envelope::direct(Uuid::new_v4(), Kind::Work, Bytes::new());
        let mut frames = env.to_frames();
        frames[2] = Bytes::copy_from_slice(&[0xFF]);
        assert!(matches!(
            Envelope::from_frames(&frames),
            Err(FrameError::InvalidKind(0xFF))
        ));
    }

    #[test]
    fn rejects_missing_delimiter() {
        let peer_id = Bytes::from_static(b"peer");
        let env = Envelope::routed(peer_id, Uuid::new_v4(), Kind::Work, Bytes::new());
        let mut frames = env.to_frames();
        frames[1] = Bytes::from_static(b"not-empty");
        assert!(matches!(
            Envelope::from_frames(&frames),
            Err(FrameError::MissingDelimiter)
        ));
    }

    #[test]
    fn kind_roundtrip() {
        for (byte, kind) in [
            (0x01, Kind::Hello),
            (0x02, Kind::Ok),
            (0x03, Kind::Work),
            (0x04, Kind::Error),
            (0x05, Kind::Authenticated),
            (0x06, Kind::Unauthorized),
            (0x07, Kind::Heartbeat),
        ] {
            assert_eq!(Kind::from_u8(byte).unwrap(), kind);
            assert_eq!(kind.to_u8(), byte);
        }
        assert!(Kind::from_u8(0x00).is_err());
    }

    #[test]
    fn reply_echoes_request_uuid_and_target() {
        let peer_id = Bytes::from_static(b"peer");
        let request = Envelope::routed(peer_id.clone(), Uuid::new_v4(), Kind::Work, Bytes::new());
        let reply = request.reply(Kind::Ok, Bytes::from_static(b"42"));
        assert_eq!(reply.request_uuid, request.request_uuid);
        assert_eq!(reply.peer_id, Some(peer_id));
    }
}
