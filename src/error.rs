//! Error types returned at the call sites of the encoders and the Reed-Solomon codec.
//!
//! The byte-intake paths never return these: a decoder reports trouble on the stream
//! through [`FrameEvent`](crate::smp::FrameEvent)s and its counters, and keeps running.

use thiserror::Error;

/// Caller misuse on an encode path. No state is mutated when one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EncodeError {
    /// The destination buffer cannot hold the worst-case encoded size.
    #[error("destination buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available in the destination.
        available: usize,
    },

    /// The payload is longer than a frame can carry.
    #[error("payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
        /// Largest accepted payload length.
        max: usize,
    },

    /// The framed message needs more blocks than the one-byte header can count.
    #[error("frame needs {blocks} FEC blocks, at most {max} are supported")]
    TooManyBlocks {
        /// Blocks the frame would need.
        blocks: usize,
        /// Largest representable block count.
        max: usize,
    },
}

/// Failure of a Reed-Solomon operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RsError {
    /// The parity count is zero or above [`MAX_PARITY`](crate::consts::MAX_PARITY).
    #[error("invalid parity count {parity}")]
    InvalidParity {
        /// Requested parity count.
        parity: usize,
    },

    /// The block does not fit a GF(256) codeword with the configured parity.
    #[error("invalid codeword length {len}")]
    InvalidLength {
        /// Length of the offending block.
        len: usize,
    },

    /// More erasures than parity bytes were supplied.
    #[error("{count} erasures given, at most {max} can be corrected")]
    TooManyErasures {
        /// Number of erasures supplied.
        count: usize,
        /// Parity count of the code.
        max: usize,
    },

    /// An erasure index points past the end of the codeword.
    #[error("erasure at {position} is outside a codeword of {len} bytes")]
    ErasureOutOfRange {
        /// The offending index.
        position: usize,
        /// Length of the codeword.
        len: usize,
    },

    /// The error pattern exceeds what the code can correct.
    #[error("uncorrectable error pattern")]
    Uncorrectable,
}

/// Rejected FEC configuration.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ConfigError {
    /// The parity count is zero or above [`MAX_PARITY`](crate::consts::MAX_PARITY).
    #[error("invalid parity count {parity}")]
    InvalidParity {
        /// Requested parity count.
        parity: usize,
    },

    /// The block size leaves too little room for data or exceeds a codeword.
    #[error("block size {block_size} is invalid with {parity} parity bytes")]
    InvalidBlockSize {
        /// Requested block size.
        block_size: usize,
        /// Requested parity count.
        parity: usize,
    },
}
