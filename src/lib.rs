//! # smp-fec
//!
//! A portable, no_std Rust implementation of a byte-stuffed serial framing protocol with
//! optional Reed-Solomon forward error correction, for unreliable point-to-point links
//! such as microcontroller UARTs.
//!
//! This crate provides:
//! - self-delimiting frames with a CRC-16 trailer that a receiver resynchronizes to on
//!   its own after noise or truncation
//! - a GF(256) Reed-Solomon codec with a runtime parity count and erasure support
//! - an FEC layer that splits a frame into RS blocks behind a preamble and a protected
//!   header, and still recognizes plain frames on the same line
//! - interrupt-safe decoder access with `critical-section`, or a blocking receive loop
//!
//! ## Crate features
//! | Feature            | Description |
//! |--------------------|-------------|
//! | `std`              | Disables `#![no_std]` and enables `std` support in dependencies |
//! | `delay-loop`       | Blocking receive loop using `embedded_hal::delay::DelayNs` |
//! | `rx-isr` (default) | Global decoder helpers using `critical_section::with` |
//! | `defmt-0-3`        | Uses `defmt` logging |
//! | `log`              | Uses `log` logging |
//!
//! ## Modules
//!
//! - [`smp`]: frame encoder and the byte-at-a-time [`smp::FrameDecoder`]
//! - [`rs`]: the [`rs::ReedSolomon`] block code
//! - [`fec`]: [`fec::FecEncoder`] and [`fec::FecDecoder`]
//! - [`link`]: UART glue, idle timeouts, ISR and polling receive paths
//! - [`gf256`], [`crc`]: arithmetic underneath
//!
//! ## Usage
//!
//! ```rust
//! use smp_fec::smp::{FrameDecoder, FrameEvent, encode_frame};
//!
//! let mut wire = [0u8; 32];
//! let len = encode_frame(b"hello", &mut wire).unwrap();
//!
//! let mut decoder: FrameDecoder<64> = FrameDecoder::new();
//! decoder.feed_bytes(&wire[..len], |event| {
//!     if let FrameEvent::FrameReady(payload) = event {
//!         assert_eq!(payload, b"hello");
//!     }
//! });
//! ```
//!
//! With forward error correction:
//!
//! ```rust
//! use smp_fec::fec::{FecDecoder, FecEncoder};
//! use smp_fec::smp::FrameEvent;
//!
//! let encoder = FecEncoder::default();
//! let mut wire = encoder.encode_vec::<128>(b"survives noise").unwrap();
//! wire[12] ^= 0x5a;
//!
//! let mut decoder: FecDecoder<256, 64> = FecDecoder::default();
//! let mut delivered = false;
//! decoder.feed_bytes(&wire, |event| {
//!     if let FrameEvent::FrameReady(payload) = event {
//!         delivered = payload == b"survives noise";
//!     }
//! });
//! assert!(delivered);
//! ```
//!
//! ## Integration Notes
//!
//! - Keep one decoder per link. Decoders are not shared between threads; the field
//!   tables in [`gf256`] are the only shared data and are read-only.
//! - Decoders have no timeout. Use [`link::idle_timeout_polls`] with the receive loop,
//!   or call `global_decoder_idle` from an idle-line interrupt.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "rx-isr")]
pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod consts;
pub mod crc;
pub mod error;
pub mod fec;
pub mod gf256;
pub mod link;
pub mod rs;
pub mod smp;
