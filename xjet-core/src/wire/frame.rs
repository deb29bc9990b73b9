// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{WireProtocolError, XJetError};
use bytes::{BufMut, Bytes, BytesMut};

/// Width, in bytes, of the `suiteId` header field.
pub const SUITE_ID_LEN: usize = 14;
/// Width, in bytes, of the `runnerId` header field.
pub const RUNNER_ID_LEN: usize = 14;

const HEADER_LEN: usize = 1 + SUITE_ID_LEN + RUNNER_ID_LEN;

/// The kind of a frame, occupying the header's first byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FrameKind {
    Log = 0,
    Test = 1,
    Suite = 2,
    Describe = 3,
    Error = 4,
    Status = 5,
    Action = 6,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Result<Self, WireProtocolError> {
        match byte {
            0 => Ok(Self::Log),
            1 => Ok(Self::Test),
            2 => Ok(Self::Suite),
            3 => Ok(Self::Describe),
            4 => Ok(Self::Error),
            5 => Ok(Self::Status),
            6 => Ok(Self::Action),
            other => Err(WireProtocolError::invalid_kind(other)),
        }
    }

    fn to_byte(self) -> u8 {
        self as u8
    }
}

/// One fully-assembled `HEADER || PAYLOAD` message on the host↔runner wire.
///
/// Decoding trims the fixed-width, `\0`-padded `suiteId`/`runnerId` fields back down to their
/// logical length; encoding pads them back out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub suite_id: String,
    pub runner_id: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(
        kind: FrameKind,
        suite_id: impl Into<String>,
        runner_id: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<Self, XJetError> {
        let suite_id = suite_id.into();
        let runner_id = runner_id.into();
        check_id_field("suiteId", &suite_id, SUITE_ID_LEN)?;
        check_id_field("runnerId", &runner_id, RUNNER_ID_LEN)?;
        Ok(Self {
            kind,
            suite_id,
            runner_id,
            payload: payload.into(),
        })
    }

    /// Encodes this frame to its wire representation: fixed header, then raw payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.kind.to_byte());
        put_padded_id(&mut buf, &self.suite_id, SUITE_ID_LEN);
        put_padded_id(&mut buf, &self.runner_id, RUNNER_ID_LEN);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes a whole frame (header plus payload) from a transport-delivered message.
    ///
    /// The caller is responsible for frame assembly (buffering until a complete message has
    /// arrived); this only validates and parses a message it is given in full.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireProtocolError::short_header(bytes.len(), HEADER_LEN));
        }
        let kind = FrameKind::from_byte(bytes[0])?;
        let suite_id = read_padded_id(&bytes[1..1 + SUITE_ID_LEN], "suiteId")?;
        let runner_id = read_padded_id(
            &bytes[1 + SUITE_ID_LEN..HEADER_LEN],
            "runnerId",
        )?;
        let payload = Bytes::copy_from_slice(&bytes[HEADER_LEN..]);
        Ok(Self {
            kind,
            suite_id,
            runner_id,
            payload,
        })
    }
}

fn check_id_field(field: &'static str, value: &str, width: usize) -> Result<(), XJetError> {
    if !value.is_ascii() {
        return Err(XJetError::new(format!("`{field}` must be ASCII, got `{value}`")));
    }
    if value.len() > width {
        return Err(XJetError::new(format!(
            "`{field}` is {} bytes, exceeds the {width}-byte header field",
            value.len()
        )));
    }
    Ok(())
}

fn put_padded_id(buf: &mut BytesMut, value: &str, width: usize) {
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, width - value.len());
}

fn read_padded_id(field: &[u8], name: &'static str) -> Result<String, WireProtocolError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| WireProtocolError::non_utf8_id(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_preserves_kind_ids_and_payload() {
        let payload = br#"{"action":"SUCCESS","description":"x","ancestry":["S"],"duration":12}"#;
        let frame = Frame::new(FrameKind::Test, "abc0000000000", "local000000000", &payload[..])
            .unwrap();
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_LEN + payload.len());

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.suite_id, "abc0000000000");
        assert_eq!(decoded.runner_id, "local000000000");
        assert_eq!(decoded.payload.as_ref(), &payload[..]);
    }

    #[test]
    fn header_is_29_bytes() {
        assert_eq!(HEADER_LEN, 29);
    }

    #[test]
    fn decode_rejects_short_header() {
        let err = Frame::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err.to_string(), s if s.contains("malformed frame header")));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let mut bytes = vec![200u8];
        bytes.extend(std::iter::repeat_n(0u8, SUITE_ID_LEN + RUNNER_ID_LEN));
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown kind byte"));
    }

    #[test]
    fn new_rejects_oversized_id() {
        let err = Frame::new(FrameKind::Log, "this-id-is-too-long", "r", &b""[..]).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }
}
