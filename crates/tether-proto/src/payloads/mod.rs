//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for cheap routing; payloads use CBOR for
//! type safety and forward compatibility. Because the header's opcode
//! already identifies the payload type, no variant tag is serialized,
//! only the inner struct content. This also prevents a peer from sending
//! mismatched opcode/payload pairs.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (the `match` in
//! [`Payload::opcode`] is exhaustive, so adding a variant without wiring
//! it everywhere fails to compile). Encoding then decoding under the same
//! opcode must reproduce the value.

pub mod app;
pub mod control;
pub mod session;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    Frame, FrameHeader, Opcode,
};

/// All possible frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Identity claim with sealed session key.
    Register(session::Register),
    /// Registration accepted.
    RegisterAck(session::RegisterAck),
    /// Registration rejected.
    RegisterFail(session::RegisterFail),
    /// Liveness probe.
    Ping,
    /// Liveness probe response.
    Pong,
    /// Encrypted application message.
    AppMessage(app::AppMessage),
    /// Acknowledgment of an accepted application message.
    MessageAck(app::MessageAck),
    /// Graceful teardown notice.
    Goodbye(session::Goodbye),
    /// Out-of-band server key request.
    KeyRequest,
    /// Server public key response.
    KeyResponse(control::KeyResponse),
    /// Health probe request.
    HealthRequest,
    /// Health probe response.
    HealthResponse(control::HealthResponse),
    /// Error notice.
    Error(ErrorPayload),
}

impl Payload {
    /// The opcode this payload travels under.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Register(_) => Opcode::Register,
            Self::RegisterAck(_) => Opcode::RegisterAck,
            Self::RegisterFail(_) => Opcode::RegisterFail,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::AppMessage(_) => Opcode::AppMessage,
            Self::MessageAck(_) => Opcode::MessageAck,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::KeyRequest => Opcode::KeyRequest,
            Self::KeyResponse(_) => Opcode::KeyResponse,
            Self::HealthRequest => Opcode::HealthRequest,
            Self::HealthResponse(_) => Opcode::HealthResponse,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode this payload into a complete frame.
    ///
    /// Unit payloads (`Ping`, `Pong`, …) produce an empty payload body.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Encode`] if CBOR serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let opcode = self.opcode();
        let body = match &self {
            Self::Register(p) => encode_cbor(p)?,
            Self::RegisterAck(p) => encode_cbor(p)?,
            Self::RegisterFail(p) => encode_cbor(p)?,
            Self::AppMessage(p) => encode_cbor(p)?,
            Self::MessageAck(p) => encode_cbor(p)?,
            Self::Goodbye(p) => encode_cbor(p)?,
            Self::KeyResponse(p) => encode_cbor(p)?,
            Self::HealthResponse(p) => encode_cbor(p)?,
            Self::Error(p) => encode_cbor(p)?,
            Self::Ping | Self::Pong | Self::KeyRequest | Self::HealthRequest => Vec::new(),
        };

        Ok(Frame::new(FrameHeader::new(opcode), body))
    }

    /// Decode a frame's payload bytes into the type its opcode demands.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is unknown
    /// - [`ProtocolError::InvalidPayload`] if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        match opcode {
            Opcode::Register => Ok(Self::Register(decode_cbor(opcode, &frame.payload)?)),
            Opcode::RegisterAck => Ok(Self::RegisterAck(decode_cbor(opcode, &frame.payload)?)),
            Opcode::RegisterFail => Ok(Self::RegisterFail(decode_cbor(opcode, &frame.payload)?)),
            Opcode::Ping => Ok(Self::Ping),
            Opcode::Pong => Ok(Self::Pong),
            Opcode::AppMessage => Ok(Self::AppMessage(decode_cbor(opcode, &frame.payload)?)),
            Opcode::MessageAck => Ok(Self::MessageAck(decode_cbor(opcode, &frame.payload)?)),
            Opcode::Goodbye => Ok(Self::Goodbye(decode_cbor(opcode, &frame.payload)?)),
            Opcode::KeyRequest => Ok(Self::KeyRequest),
            Opcode::KeyResponse => Ok(Self::KeyResponse(decode_cbor(opcode, &frame.payload)?)),
            Opcode::HealthRequest => Ok(Self::HealthRequest),
            Opcode::HealthResponse => {
                Ok(Self::HealthResponse(decode_cbor(opcode, &frame.payload)?))
            },
            Opcode::Error => Ok(Self::Error(decode_cbor(opcode, &frame.payload)?)),
        }
    }
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Numeric error code.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Frame arrived on a connection that has not completed registration.
    pub const NOT_REGISTERED: u16 = 1;
    /// Frame was structurally valid but rejected by the server.
    pub const FRAME_REJECTED: u16 = 2;

    /// Build a "not registered" error.
    #[must_use]
    pub fn not_registered() -> Self {
        Self {
            code: Self::NOT_REGISTERED,
            message: "registration required before application messages".to_string(),
        }
    }

    /// Build a generic rejection error.
    #[must_use]
    pub fn frame_rejected(message: impl Into<String>) -> Self {
        Self { code: Self::FRAME_REJECTED, message: message.into() }
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(body)
}

fn decode_cbor<T: DeserializeOwned>(opcode: Opcode, bytes: &Bytes) -> Result<T> {
    ciborium::from_reader(bytes.as_ref())
        .map_err(|e| ProtocolError::InvalidPayload { opcode, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: Payload) {
        let frame = payload.clone().into_frame().unwrap();
        assert_eq!(frame.header.opcode_enum(), Some(payload.opcode()));
        assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn register_round_trips() {
        round_trip(Payload::Register(session::Register {
            username: "alice".to_string(),
            ephemeral_public: vec![1; 32],
            nonce: vec![2; 24],
            sealed_key: vec![3; 48],
        }));
    }

    #[test]
    fn unit_payloads_have_empty_bodies() {
        for payload in [Payload::Ping, Payload::Pong, Payload::KeyRequest, Payload::HealthRequest] {
            let frame = payload.clone().into_frame().unwrap();
            assert!(frame.payload.is_empty());
            assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
        }
    }

    #[test]
    fn app_message_round_trips() {
        round_trip(Payload::AppMessage(app::AppMessage {
            message_id: 42,
            sender: Some("bob".to_string()),
            nonce: vec![7; 24],
            ciphertext: vec![8; 19],
        }));
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        // A RegisterAck body under the Register opcode must not decode.
        let ack = Payload::RegisterAck(session::RegisterAck { session_id: 7 });
        let frame = ack.into_frame().unwrap();
        let forged = Frame::new(FrameHeader::new(Opcode::Register), frame.payload);

        assert!(matches!(
            Payload::from_frame(&forged),
            Err(ProtocolError::InvalidPayload { opcode: Opcode::Register, .. })
        ));
    }
}
