//! Serial link integration for the frame decoders.
//!
//! The codecs in [`crate::smp`] and [`crate::fec`] only see bytes. This module connects
//! them to a UART, either from a receive interrupt using `critical_section::with`
//! (`rx-isr` feature) or from a blocking polling loop driven by a `DelayNs` provider
//! (`delay-loop` feature).
//!
//! Contains:
//! - [`ByteDecoder`]: the byte intake shared by [`FrameDecoder`] and [`FecDecoder`]
//! - [`transmit`]: pushes encoded bytes into an `nb` byte writer
//! - [`byte_time_us`] and [`idle_timeout_polls`]: runtime idle timeout arithmetic
//! - [`const_idle_timeout_polls`]: compile-time idle timeout arithmetic
//! - `global_decoder_feed` and `init_global_decoder!()`: interrupt-side intake
//!   (feature `rx-isr`)
//! - `run_receive_loop`: blocking receive loop (feature `delay-loop`)
//!
//! The decoders have no notion of time. A frame cut short by a dead line stays in
//! progress until the next delimiter arrives, so both receive paths reset the decoder
//! once the line has been quiet for a few character times.
//!
//! Character times at 10 bits per character (start, 8 data, stop):
//!
//! | Baud   | µs per byte |
//! |--------|-------------|
//! |   9600 |      1041.7 |
//! |  19200 |       520.8 |
//! |  57600 |       173.6 |
//! | 115200 |        86.8 |

use crate::fec::FecDecoder;
use crate::smp::{FrameDecoder, FrameEvent};

use libm::ceil;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "rx-isr")]
mod isr;
#[cfg_attr(feature = "rx-isr", allow(unused_imports))]
#[cfg(feature = "rx-isr")]
pub use isr::*;

#[cfg(feature = "rx-isr")]
mod macros;
#[cfg_attr(feature = "rx-isr", allow(unused_imports))]
#[cfg(feature = "rx-isr")]
pub use macros::*;

/// Bits on the wire per character for 8N1 framing.
pub const BITS_PER_CHAR_8N1: u8 = 10;

/// Default number of quiet character times before a frame in progress is abandoned.
pub const DEFAULT_IDLE_CHARS: u16 = 4;

/// A receive state machine that consumes one byte at a time.
///
/// Implemented by [`FrameDecoder`] and [`FecDecoder`] so the link helpers can drive
/// either one.
pub trait ByteDecoder {
    /// Feeds one received byte, passing every resulting event to `handler`.
    fn feed_byte_with<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>);

    /// `true` while a frame is partially received.
    fn is_receiving(&self) -> bool;

    /// Drops any frame in progress.
    fn reset(&mut self);

    /// Tells the decoder the line has gone quiet.
    ///
    /// # Returns
    /// - `true` if a partially received frame was discarded
    fn line_idle<F>(&mut self, handler: &mut F) -> bool
    where
        F: FnMut(FrameEvent<'_>),
    {
        let _ = handler;
        if self.is_receiving() {
            self.reset();
            true
        } else {
            false
        }
    }
}

impl<const N: usize> ByteDecoder for FrameDecoder<N> {
    fn feed_byte_with<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        if let Some(event) = self.feed_byte(byte) {
            handler(event);
        }
    }

    fn is_receiving(&self) -> bool {
        FrameDecoder::is_receiving(self)
    }

    fn reset(&mut self) {
        FrameDecoder::reset(self);
    }
}

impl<const N: usize, const M: usize> ByteDecoder for FecDecoder<N, M> {
    fn feed_byte_with<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        self.feed_byte(byte, handler);
    }

    fn is_receiving(&self) -> bool {
        FecDecoder::is_receiving(self)
    }

    fn reset(&mut self) {
        FecDecoder::reset(self);
    }

    /// Releases a held header candidate to the plain decoder before giving up on the
    /// rest, so an un-coded frame that ended just before the pause is still delivered.
    fn line_idle<F>(&mut self, handler: &mut F) -> bool
    where
        F: FnMut(FrameEvent<'_>),
    {
        self.flush(&mut *handler);
        if FecDecoder::is_receiving(self) {
            FecDecoder::reset(self);
            true
        } else {
            false
        }
    }
}

/// Sends `bytes` through a non-blocking byte writer, spinning while it would block.
///
/// # Arguments
/// - `bytes`: an encoded frame, e.g. from [`crate::smp::encode_frame`]
/// - `write`: writes one byte, typically `|b| serial.write(b)` on an
///   `embedded-hal-nb` serial port
///
/// # Errors
/// The first error the writer reports. Bytes before it have been sent.
pub fn transmit<E, W>(bytes: &[u8], mut write: W) -> Result<(), E>
where
    W: FnMut(u8) -> nb::Result<(), E>,
{
    for &byte in bytes {
        nb::block!(write(byte))?;
    }
    Ok(())
}

/// Time one character occupies on the line.
///
/// # Arguments
/// - `baud`: line rate in bits per second
/// - `bits_per_char`: start, data, parity and stop bits, e.g. [`BITS_PER_CHAR_8N1`]
///
/// # Returns
/// - Microseconds per character
pub fn byte_time_us(baud: u32, bits_per_char: u8) -> f32 {
    f32::from(bits_per_char) * 1_000_000.0 / baud as f32
}

/// Number of empty polls that make up an idle timeout.
///
/// # Arguments
/// - `baud`: line rate in bits per second
/// - `bits_per_char`: bits on the wire per character
/// - `poll_us`: delay between two polls of the receiver, in microseconds
/// - `idle_chars`: quiet character times that end a frame in progress
///
/// # Returns
/// - Poll count, rounded up so the timeout is never shorter than requested.
///   `0` (timeout disabled) if `baud` or `poll_us` is zero.
pub fn idle_timeout_polls(baud: u32, bits_per_char: u8, poll_us: u32, idle_chars: u16) -> u32 {
    if baud == 0 || poll_us == 0 {
        return 0;
    }
    let quiet_us = f64::from(idle_chars) * f64::from(byte_time_us(baud, bits_per_char));
    ceil(quiet_us / f64::from(poll_us)) as u32
}

/// Compile-time idle timeout calculator
///
/// Integer version of [`idle_timeout_polls`] for use in `const` items.
pub const fn const_idle_timeout_polls(
    baud: u32,
    bits_per_char: u8,
    poll_us: u32,
    idle_chars: u16,
) -> u32 {
    let denominator = baud as u64 * poll_us as u64;
    if denominator == 0 {
        return 0;
    }
    let numerator = idle_chars as u64 * bits_per_char as u64 * 1_000_000;
    numerator.div_ceil(denominator) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::max_frame_len;
    use crate::fec::{FecConfig, encode_fec_frame};
    use crate::smp::encode_frame;
    use std::vec::Vec as StdVec;

    const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog";

    fn plain_frame(payload: &[u8]) -> StdVec<u8> {
        let mut buf = vec![0u8; max_frame_len(payload.len())];
        let len = encode_frame(payload, &mut buf).unwrap();
        buf.truncate(len);
        buf
    }

    fn feed_all<D: ByteDecoder>(decoder: &mut D, bytes: &[u8]) -> StdVec<StdVec<u8>> {
        let mut ready = StdVec::new();
        for &b in bytes {
            decoder.feed_byte_with(b, &mut |e| {
                if let FrameEvent::FrameReady(p) = e {
                    ready.push(p.to_vec());
                }
            });
        }
        ready
    }

    #[test]
    fn test_byte_time() {
        assert!((byte_time_us(115_200, BITS_PER_CHAR_8N1) - 86.805_56).abs() < 0.01);
        assert!((byte_time_us(9_600, BITS_PER_CHAR_8N1) - 1_041.666_7).abs() < 0.1);
    }

    #[test]
    fn test_idle_timeout_polls() {
        assert_eq!(idle_timeout_polls(115_200, 10, 100, 2), 2);
        assert_eq!(idle_timeout_polls(9_600, 10, 100, 2), 21);
        assert_eq!(idle_timeout_polls(9_600, 10, 1_000, 3), 4);
        assert_eq!(idle_timeout_polls(0, 10, 100, 2), 0);
        assert_eq!(idle_timeout_polls(9_600, 10, 0, 2), 0);
    }

    #[test]
    fn test_const_idle_timeout_polls_matches_runtime() {
        const POLLS: u32 = const_idle_timeout_polls(57_600, BITS_PER_CHAR_8N1, 50, 4);
        assert_eq!(POLLS, 14);
        for (baud, poll_us, chars) in [(9_600, 100, 2), (115_200, 100, 2), (19_200, 250, 4)] {
            assert_eq!(
                const_idle_timeout_polls(baud, 10, poll_us, chars),
                idle_timeout_polls(baud, 10, poll_us, chars)
            );
        }
        assert_eq!(const_idle_timeout_polls(9_600, 10, 0, 2), 0);
    }

    #[test]
    fn test_transmit_retries_would_block() {
        let frame = plain_frame(b"hi");
        let mut sent = StdVec::new();
        let mut busy = false;
        let result: Result<(), ()> = transmit(&frame, |b| {
            // every other call reports a full transmit register
            busy = !busy;
            if busy {
                Err(nb::Error::WouldBlock)
            } else {
                sent.push(b);
                Ok(())
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(sent, frame);
    }

    #[test]
    fn test_transmit_stops_on_error() {
        let mut sent = 0;
        let result = transmit(&[1, 2, 3, 4], |_| {
            if sent == 2 {
                return Err(nb::Error::Other("uart fault"));
            }
            sent += 1;
            Ok(())
        });
        assert_eq!(result, Err("uart fault"));
        assert_eq!(sent, 2);
    }

    #[test]
    fn test_frame_decoder_through_trait() {
        let mut decoder: FrameDecoder<64> = FrameDecoder::new();
        assert_eq!(feed_all(&mut decoder, &plain_frame(FOX)), vec![FOX.to_vec()]);
        assert!(!ByteDecoder::is_receiving(&decoder));
    }

    #[test]
    fn test_line_idle_drops_partial_frame() {
        let frame = plain_frame(b"interrupted");
        let mut decoder: FrameDecoder<64> = FrameDecoder::new();
        assert!(feed_all(&mut decoder, &frame[..6]).is_empty());
        assert!(ByteDecoder::is_receiving(&decoder));

        assert!(decoder.line_idle(&mut |_| panic!("no event expected")));
        assert!(!ByteDecoder::is_receiving(&decoder));
        assert!(!decoder.line_idle(&mut |_| panic!("no event expected")));

        assert_eq!(feed_all(&mut decoder, &frame), vec![b"interrupted".to_vec()]);
    }

    #[test]
    fn test_fec_decoder_through_trait() {
        let config = FecConfig::default();
        let mut buf = vec![0u8; config.max_encoded_len(FOX.len())];
        let len = encode_fec_frame(FOX, &config, &mut buf).unwrap();

        let mut decoder: FecDecoder<256, 64> = FecDecoder::default();
        assert_eq!(feed_all(&mut decoder, &buf[..len]), vec![FOX.to_vec()]);
        assert_eq!(decoder.stats.messages, 1);
    }

    #[test]
    fn test_fec_line_idle_releases_plain_frame() {
        let mut decoder: FecDecoder<256, 64> = FecDecoder::default();
        let mut ready = feed_all(&mut decoder, &plain_frame(FOX));
        let dropped = decoder.line_idle(&mut |e| {
            if let FrameEvent::FrameReady(p) = e {
                ready.push(p.to_vec());
            }
        });
        assert!(!dropped);
        assert_eq!(ready, vec![FOX.to_vec()]);
    }

    #[test]
    fn test_fec_line_idle_drops_partial_message() {
        let config = FecConfig::default();
        let mut buf = vec![0u8; config.max_encoded_len(FOX.len())];
        let len = encode_fec_frame(FOX, &config, &mut buf).unwrap();

        let mut decoder: FecDecoder<256, 64> = FecDecoder::default();
        assert!(feed_all(&mut decoder, &buf[..len / 2]).is_empty());
        assert!(decoder.line_idle(&mut |_| {}));
        assert!(!ByteDecoder::is_receiving(&decoder));
        assert_eq!(feed_all(&mut decoder, &buf[..len]), vec![FOX.to_vec()]);
    }
}
