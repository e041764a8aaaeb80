//! Fuzz target for frame header boundary conditions
//!
//! Prevent DoS attacks via malformed frame headers
//!
//! # Strategy
//!
//! - Magic bytes: Valid, off-by-one, all-zeros, all-ones, random
//! - Payload size: Zero, small, at-max, just-over-max, way-over-max, u32::MAX
//! - Version: Valid (0x01), zero, max, random
//! - Opcode: every known opcode plus random bytes
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` (256 KiB) MUST return
//!   `ProtocolError::PayloadTooLarge`
//! - Invalid magic bytes MUST return `ProtocolError::InvalidMagic`
//! - All decode errors MUST be structured (never panic)

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_proto::{Frame, FrameHeader};

const TETHER_MAGIC: [u8; 4] = [0x54, 0x45, 0x54, 0x48];
const MAX_PAYLOAD_SIZE: u32 = 256 * 1024;

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    magic: MagicBytes,
    version: VersionBytes,
    opcode: u8,
    payload_size: PayloadSize,
}

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne(u8),
    AllZeros,
    AllOnes,
    Random([u8; 4]),
}

#[derive(Debug, Clone, Arbitrary)]
enum VersionBytes {
    Valid,
    Zero,
    Max,
    Random(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMaxBoundary,
    JustOverMax,
    WayOverMax,
    MaxU32,
    Random(u32),
}

fuzz_target!(|boundary: BoundaryFrame| {
    let payload_size_value = match boundary.payload_size {
        PayloadSize::Zero => 0,
        PayloadSize::Small(s) => s as u32,
        PayloadSize::AtMaxBoundary => MAX_PAYLOAD_SIZE,
        PayloadSize::JustOverMax => MAX_PAYLOAD_SIZE.saturating_add(1),
        PayloadSize::WayOverMax => MAX_PAYLOAD_SIZE.saturating_add(1_000_000),
        PayloadSize::MaxU32 => u32::MAX,
        PayloadSize::Random(r) => r,
    };

    // Materialize at most a modest payload; the declared size in the
    // header is what matters for boundary checks.
    let actual_payload_size = payload_size_value.min(100_000) as usize;
    let mut buffer = vec![0u8; FrameHeader::SIZE + actual_payload_size];

    match boundary.magic {
        MagicBytes::Valid => buffer[0..4].copy_from_slice(&TETHER_MAGIC),
        MagicBytes::OffByOne(offset) => {
            buffer[0..4].copy_from_slice(&TETHER_MAGIC);
            let idx = (offset % 4) as usize;
            buffer[idx] = buffer[idx].wrapping_add(1);
        },
        MagicBytes::AllZeros => buffer[0..4].fill(0),
        MagicBytes::AllOnes => buffer[0..4].fill(0xFF),
        MagicBytes::Random(bytes) => buffer[0..4].copy_from_slice(&bytes),
    }

    let version_value: u8 = match boundary.version {
        VersionBytes::Valid => 0x01,
        VersionBytes::Zero => 0,
        VersionBytes::Max => u8::MAX,
        VersionBytes::Random(v) => v,
    };
    buffer[4] = version_value;
    buffer[5] = boundary.opcode;
    buffer[8..12].copy_from_slice(&payload_size_value.to_be_bytes());

    // Header parsing and full-frame decoding must reject every invalid
    // combination with a structured error, never a panic.
    let _ = FrameHeader::from_bytes(&buffer);
    let _ = Frame::decode(&buffer);
});
