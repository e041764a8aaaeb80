//! Property tests for frame encoding.

use proptest::prelude::*;
use tether_proto::{Frame, FrameHeader, Opcode, ProtocolError};

fn arb_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Register),
        Just(Opcode::RegisterAck),
        Just(Opcode::RegisterFail),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
        Just(Opcode::AppMessage),
        Just(Opcode::MessageAck),
        Just(Opcode::Goodbye),
        Just(Opcode::KeyRequest),
        Just(Opcode::KeyResponse),
        Just(Opcode::HealthRequest),
        Just(Opcode::HealthResponse),
        Just(Opcode::Error),
    ]
}

proptest! {
    #[test]
    fn frame_round_trip(opcode in arb_opcode(), payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let frame = Frame::new(FrameHeader::new(opcode), payload);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed.header.opcode_enum(), Some(opcode));
        prop_assert_eq!(parsed.payload, frame.payload);
    }

    #[test]
    fn truncated_frames_never_panic(opcode in arb_opcode(), payload in proptest::collection::vec(any::<u8>(), 1..512), cut in any::<usize>()) {
        let frame = Frame::new(FrameHeader::new(opcode), payload);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let cut = cut % wire.len();
        let result = Frame::decode(&wire[..cut]);
        let is_truncation_error = matches!(
            result,
            Err(ProtocolError::HeaderTruncated { .. } | ProtocolError::FrameTruncated { .. })
        );
        prop_assert!(is_truncation_error);
    }
}
