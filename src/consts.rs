//! Constants used across the framing and FEC implementation.
//!
//! This module defines the protocol-wide constants used for buffer sizing,
//! frame delimiting, CRC computation and Reed-Solomon block layout.
//!
//! ## Key Concepts
//!
//! - **Delimiter**: A single reserved byte value marking a frame start. Literal
//!   occurrences inside a frame are transmitted doubled.
//! - **Length field**: 16-bit little-endian count of payload bytes plus the two CRC bytes.
//! - **Preamble**: A fixed two-byte correlation pattern sent ahead of every FEC-coded frame.
//! - **Header block**: `[last_block_len, block_count, xor]` plus parity, RS-protected on its own.
//! - **Buffer sizing**: `max_frame_len` gives the worst-case stuffed size of a frame, which
//!   is what the encoder demands from its destination buffer.
//!
//! These values should be used wherever framing or buffer logic is implemented to ensure
//! consistent frame boundaries between sender and receiver.

/// The frame start delimiter.
///
/// The only unescaped occurrence of this value inside a stream marks a frame start.
/// Every payload, length or CRC byte equal to it is sent twice.
pub const DELIMITER: u8 = 0xFF;

/// Feedback mask of the reflected CRC-16 (ARC family) protecting each frame.
pub const CRC_POLYNOMIAL: u16 = 0xA001;

/// Largest payload a single frame may carry.
///
/// The top of the 16-bit length space is reserved, leaving room for the CRC bytes
/// that are counted in the length field.
pub const MAX_PAYLOAD_LEN: usize = 0xFEFF;

/// Number of bytes accounted for by the length field on top of the payload (the CRC).
pub const CRC_LEN: usize = 2;

/// Fixed correlation pattern sent in front of every FEC-coded frame.
pub const PREAMBLE: [u8; 2] = [0x1F, 0x35];

/// Number of matching preamble bits (out of 16) that must be *exceeded* before
/// the FEC decoder treats the last two bytes as a probable frame start.
pub const CORRELATION_THRESHOLD: u32 = 9;

/// Plaintext length of the FEC header: `last_block_len`, `block_count`, checksum.
pub const FEC_HEADER_LEN: usize = 3;

/// Upper bound on the number of parity bytes per Reed-Solomon block.
///
/// Polynomial scratch space in the decoder is sized from this value.
pub const MAX_PARITY: usize = 32;

/// Capacity of the polynomial scratch buffers used during decoding.
pub const MAX_POLY_LEN: usize = 2 * MAX_PARITY;

/// Longest Reed-Solomon codeword over GF(256).
pub const MAX_CODEWORD_LEN: usize = 255;

/// Highest block count representable in the one-byte header field.
pub const MAX_BLOCK_COUNT: usize = 254;

/// Smallest number of data bytes an FEC payload block must carry.
pub const MIN_DATA_PER_BLOCK: usize = 6;

/// Longest possible FEC header block (header plus the maximum parity).
pub const MAX_HEADER_BLOCK_LEN: usize = FEC_HEADER_LEN + MAX_PARITY;

/// Default number of parity bytes per block.
pub const DEFAULT_PARITY: usize = 4;

/// Default total size of an FEC block (data plus parity).
pub const DEFAULT_BLOCK_SIZE: usize = 20;

/// Worst-case size of a stuffed frame carrying `payload_len` bytes.
///
/// Every byte after the leading delimiter may be doubled:
/// `1 + 2 * (2 + payload_len + 2)`.
pub const fn max_frame_len(payload_len: usize) -> usize {
    2 * (payload_len + CRC_LEN) + 5
}
