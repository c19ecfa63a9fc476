//! Byte-stuffed framing with a CRC-16 trailer.
//!
//! This module provides [`encode_frame`], which wraps an opaque payload into a
//! self-delimiting frame, and [`FrameDecoder`], a byte-at-a-time receive state machine
//! that recovers payloads from a noisy stream and resynchronizes on its own.
//!
//! ## Wire format
//!
//! ```text
//! DELIM | len_lo | len_hi | payload[len - 2] | crc_hi | crc_lo
//! ```
//!
//! - `DELIM` is [`DELIMITER`] (`0xFF`) and is never escaped.
//! - `len` is the payload length plus the two CRC bytes, little-endian.
//! - The CRC is [`crc16`](crate::crc::crc16) over the raw payload, sent high byte first.
//! - Every byte after the leading delimiter that equals `0xFF` is sent twice.
//!
//! ## Resynchronization
//!
//! While idle, any `0xFF` starts a frame, so a length byte that is itself `0xFF`
//! (`FF FF FF len_hi`) is read correctly. Inside a frame, an unpaired `0xFF` followed by
//! any other byte means "frame start". A frame that was in progress at that moment is
//! reported as a [`FrameEvent::RogueFrame`] and dropped, so a corrupted or truncated
//! frame costs at most itself.
//!
//! A frame that overflows the buffer or declares an impossible length is not abandoned
//! on the spot. Its remaining bytes are unescaped and skipped in
//! [`DecoderState::Discarding`], so an escaped `FF FF` left over in its tail cannot pose
//! as the next frame's delimiter.
//!
//! ## Limitations
//!
//! - A stream cut in the middle of an escaped `0xFF` pair leaves a dangling half that
//!   pairs up with the next frame's delimiter. The CRC stage recovers the common case
//!   (see [`FrameDecoder::feed_byte`]); in other positions the next frame is lost too.
//! - After an impossible length the rest of the frame is skipped up to the next
//!   `FF x` frame start. A following frame whose low length byte is `0xFF` is lost too.
//! - There is no timeout. A caller that needs one resets the decoder externally, see
//!   [`crate::link`].

use crate::consts::{CRC_LEN, DELIMITER, MAX_PAYLOAD_LEN, max_frame_len};
use crate::crc::{crc16, crc16_update, hi8, lo8};
use crate::error::EncodeError;

use heapless::Vec;

/// Writes bytes into a destination, doubling every delimiter value.
struct Stuffer<'a> {
    dst: &'a mut [u8],
    pos: usize,
}

impl Stuffer<'_> {
    fn raw(&mut self, byte: u8) {
        self.dst[self.pos] = byte;
        self.pos += 1;
    }

    fn stuffed(&mut self, byte: u8) {
        self.raw(byte);
        if byte == DELIMITER {
            self.raw(byte);
        }
    }
}

fn stuffed_len(byte: u8) -> usize {
    if byte == DELIMITER { 2 } else { 1 }
}

fn check_payload_len(payload: &[u8]) -> Result<(), EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

/// Exact size of the frame [`encode_frame`] produces for `payload`.
///
/// Unlike [`max_frame_len`] this looks at the data, so it is the size to budget when
/// the payload is already known.
///
/// # Errors
/// [`EncodeError::PayloadTooLarge`] if the payload exceeds [`MAX_PAYLOAD_LEN`].
pub fn encoded_frame_len(payload: &[u8]) -> Result<usize, EncodeError> {
    check_payload_len(payload)?;
    let length = (payload.len() + CRC_LEN) as u16;
    let crc = crc16(payload);
    let header_and_crc = [lo8(length), hi8(length), hi8(crc), lo8(crc)];
    Ok(1 + header_and_crc
        .iter()
        .chain(payload)
        .map(|&b| stuffed_len(b))
        .sum::<usize>())
}

/// Writes the frame without checking `dst`; the caller guarantees room for it.
pub(crate) fn write_frame(payload: &[u8], dst: &mut [u8]) -> usize {
    let crc = crc16(payload);
    let length = (payload.len() + CRC_LEN) as u16;

    let mut out = Stuffer { dst, pos: 0 };
    out.raw(DELIMITER);
    out.stuffed(lo8(length));
    out.stuffed(hi8(length));
    for &b in payload {
        out.stuffed(b);
    }
    out.stuffed(hi8(crc));
    out.stuffed(lo8(crc));
    out.pos
}

/// Encodes `payload` as a frame into `dst` and returns the number of bytes written.
///
/// # Arguments
/// - `payload`: The bytes to send, at most [`MAX_PAYLOAD_LEN`] long
/// - `dst`: The output buffer. It must hold the worst case,
///   [`max_frame_len`]`(payload.len())`, even if the actual frame is shorter.
///
/// # Errors
/// - [`EncodeError::PayloadTooLarge`] if the payload exceeds [`MAX_PAYLOAD_LEN`]
/// - [`EncodeError::BufferTooSmall`] if `dst` is shorter than the worst-case size
///
/// Nothing is written to `dst` when an error is returned.
pub fn encode_frame(payload: &[u8], dst: &mut [u8]) -> Result<usize, EncodeError> {
    check_payload_len(payload)?;
    let needed = max_frame_len(payload.len());
    if dst.len() < needed {
        return Err(EncodeError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }
    Ok(write_frame(payload, dst))
}

/// Encodes `payload` into a fixed-capacity vector.
///
/// # Errors
/// As [`encode_frame`]; `N` must cover the worst-case frame size.
pub fn encode_frame_vec<const N: usize>(payload: &[u8]) -> Result<Vec<u8, N>, EncodeError> {
    let needed = max_frame_len(payload.len());
    let too_small = EncodeError::BufferTooSmall {
        needed,
        available: N,
    };
    if needed > N {
        return Err(too_small);
    }
    let mut frame = Vec::new();
    frame.resize(needed, 0).map_err(|_| too_small)?;
    let len = encode_frame(payload, &mut frame)?;
    frame.truncate(len);
    Ok(frame)
}

/// Receive state of a [`FrameDecoder`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecoderState {
    /// Waiting for a frame start. Everything but a delimiter is ignored.
    #[default]
    Idle,
    /// A frame start was seen; the next byte is the low length byte.
    AwaitLengthLow,
    /// The next byte completes the length field.
    AwaitLengthHigh,
    /// Payload bytes are being collected and folded into the CRC.
    ReceivingPayload,
    /// The next byte is the high CRC byte.
    AwaitCrcHigh,
    /// The next byte is the low CRC byte; the frame is checked when it arrives.
    AwaitCrcLow,
    /// The rest of an overflowed or malformed frame is being skipped.
    ///
    /// Escaped pairs are still unescaped so leftover `0xFF` bytes cannot open a frame.
    /// Ends when the declared length runs out or a new frame starts.
    Discarding,
}

/// Outcome of feeding the decoder.
///
/// Slices borrow the decoder's payload buffer and are valid until the next byte is fed.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameEvent<'a> {
    /// A complete frame passed the CRC check.
    FrameReady(&'a [u8]),
    /// A frame was abandoned: CRC mismatch, invalid length, or a new frame start
    /// arrived before it completed. Carries whatever payload had been collected.
    RogueFrame(&'a [u8]),
    /// The payload outgrew the decoder buffer. The partial frame was dropped.
    Overflow,
}

/// Streaming frame decoder with a fixed payload capacity of `N` bytes.
///
/// Bytes must be fed in the order they came off the wire. The decoder never allocates
/// and never blocks; each byte is processed in constant time and yields at most one
/// [`FrameEvent`].
///
/// ## Example
///
/// ```rust
/// use smp_fec::smp::{FrameDecoder, FrameEvent, encode_frame};
///
/// let mut wire = [0u8; 32];
/// let len = encode_frame(b"ping", &mut wire).unwrap();
///
/// let mut decoder: FrameDecoder<64> = FrameDecoder::new();
/// let mut got = None;
/// for &b in &wire[..len] {
///     if let Some(FrameEvent::FrameReady(payload)) = decoder.feed_byte(b) {
///         got = Some(payload.len());
///     }
/// }
/// assert_eq!(got, Some(4));
/// ```
#[derive(Debug)]
pub struct FrameDecoder<const N: usize> {
    state: DecoderState,
    /// An unpaired delimiter was seen and not yet classified.
    pending_delimiter: bool,
    /// The last byte fed started a new frame.
    frame_started: bool,
    length_low: u8,
    bytes_to_receive: u16,
    crc: u16,
    crc_high: u8,
    buf: Vec<u8, N>,

    /// Frames that passed the CRC check.
    pub rx_good: u16,

    /// Frames dropped as rogue: CRC mismatch, bad length or interrupted.
    pub rx_bad: u16,

    /// Frames dropped because the payload did not fit the buffer.
    pub rx_overflow: u16,
}

impl<const N: usize> Default for FrameDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameDecoder<N> {
    /// Creates an idle decoder.
    pub const fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            pending_delimiter: false,
            frame_started: false,
            length_low: 0,
            bytes_to_receive: 0,
            crc: 0,
            crc_high: 0,
            buf: Vec::new(),
            rx_good: 0,
            rx_bad: 0,
            rx_overflow: 0,
        }
    }

    /// Current receive state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// `true` while a frame is in progress.
    pub fn is_receiving(&self) -> bool {
        self.state != DecoderState::Idle
    }

    /// `true` if the byte most recently fed was classified as the start of a new frame.
    pub fn frame_started(&self) -> bool {
        self.frame_started
    }

    /// Bytes still missing from the current frame, CRC included.
    ///
    /// Only meaningful once the length field is complete; zero while idle or while the
    /// length is still being read.
    pub fn bytes_to_receive(&self) -> u16 {
        match self.state {
            DecoderState::Idle | DecoderState::AwaitLengthLow | DecoderState::AwaitLengthHigh => 0,
            _ => self.bytes_to_receive,
        }
    }

    /// `true` if the last byte fed was a delimiter that has not been paired up yet.
    ///
    /// The next byte decides: another delimiter makes it a literal `0xFF`, anything else
    /// starts a new frame.
    pub fn delimiter_pending(&self) -> bool {
        self.pending_delimiter
    }

    /// Payload capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drops any frame in progress and returns to [`DecoderState::Idle`].
    ///
    /// Counters are kept.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.pending_delimiter = false;
        self.frame_started = false;
        self.bytes_to_receive = 0;
        self.crc = 0;
        self.buf.clear();
    }

    /// Feeds one byte from the wire.
    ///
    /// While idle, a delimiter starts a frame and everything else is ignored. Inside a
    /// frame, a delimiter followed by a second delimiter is a literal `0xFF` byte; a
    /// delimiter followed by anything else starts a new frame, and the frame in progress
    /// is reported as rogue if its length field was complete.
    ///
    /// When the CRC check fails and the high CRC byte was a literal `0xFF`, that byte is
    /// taken to be the swallowed delimiter of a new frame: the current byte becomes its
    /// low length byte and decoding continues in [`DecoderState::AwaitLengthHigh`].
    ///
    /// # Returns
    /// - `Some(event)` when a frame completed, was dropped, or overflowed the buffer
    /// - `None` otherwise
    pub fn feed_byte(&mut self, byte: u8) -> Option<FrameEvent<'_>> {
        self.frame_started = false;

        if self.state == DecoderState::Idle {
            if byte == DELIMITER {
                trace!("frame start");
                self.frame_started = true;
                self.state = DecoderState::AwaitLengthLow;
            }
            return None;
        }

        if byte == DELIMITER {
            if self.pending_delimiter {
                self.pending_delimiter = false;
                return self.process(byte);
            }
            self.pending_delimiter = true;
            return None;
        }

        if self.pending_delimiter {
            self.pending_delimiter = false;
            let partial = self.partial_len();
            self.frame_started = true;
            self.length_low = byte;
            self.state = DecoderState::AwaitLengthHigh;
            if let Some(len) = partial {
                self.rx_bad = self.rx_bad.wrapping_add(1);
                warn!("frame interrupted by a new frame start after {} bytes", len);
                return Some(FrameEvent::RogueFrame(&self.buf[..len]));
            }
            return None;
        }

        self.process(byte)
    }

    /// Feeds a buffer byte by byte, handing every event to `handler` in order.
    pub fn feed_bytes<F>(&mut self, bytes: &[u8], mut handler: F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        for &b in bytes {
            if let Some(event) = self.feed_byte(b) {
                handler(event);
            }
        }
    }

    /// Payload collected so far, once the length field is complete.
    fn partial_len(&self) -> Option<usize> {
        match self.state {
            DecoderState::ReceivingPayload
            | DecoderState::AwaitCrcHigh
            | DecoderState::AwaitCrcLow => Some(self.buf.len()),
            _ => None,
        }
    }

    /// Runs an unescaped byte through the state machine.
    fn process(&mut self, byte: u8) -> Option<FrameEvent<'_>> {
        match self.state {
            DecoderState::Idle => None,
            DecoderState::AwaitLengthLow => {
                self.length_low = byte;
                self.state = DecoderState::AwaitLengthHigh;
                None
            }
            DecoderState::AwaitLengthHigh => {
                let length = u16::from_le_bytes([self.length_low, byte]);
                if (length as usize) < CRC_LEN || length as usize > MAX_PAYLOAD_LEN + CRC_LEN {
                    warn!("invalid frame length {}", length);
                    self.rx_bad = self.rx_bad.wrapping_add(1);
                    // the real extent is unknown, skip until the next frame start
                    self.bytes_to_receive = 0;
                    self.state = DecoderState::Discarding;
                    return Some(FrameEvent::RogueFrame(&[]));
                }
                self.buf.clear();
                self.crc = 0;
                self.bytes_to_receive = length;
                self.state = if length as usize == CRC_LEN {
                    DecoderState::AwaitCrcHigh
                } else {
                    DecoderState::ReceivingPayload
                };
                None
            }
            DecoderState::ReceivingPayload => {
                if self.buf.push(byte).is_err() {
                    warn!("frame exceeds the {} byte receive buffer", N);
                    self.rx_overflow = self.rx_overflow.wrapping_add(1);
                    self.buf.clear();
                    self.bytes_to_receive -= 1;
                    self.state = DecoderState::Discarding;
                    return Some(FrameEvent::Overflow);
                }
                self.crc = crc16_update(self.crc, byte);
                self.bytes_to_receive -= 1;
                if self.bytes_to_receive as usize == CRC_LEN {
                    self.state = DecoderState::AwaitCrcHigh;
                }
                None
            }
            DecoderState::Discarding => {
                if self.bytes_to_receive > 0 {
                    self.bytes_to_receive -= 1;
                    if self.bytes_to_receive == 0 {
                        self.state = DecoderState::Idle;
                    }
                }
                None
            }
            DecoderState::AwaitCrcHigh => {
                self.crc_high = byte;
                self.bytes_to_receive = 1;
                self.state = DecoderState::AwaitCrcLow;
                None
            }
            DecoderState::AwaitCrcLow => {
                self.bytes_to_receive = 0;
                if u16::from_be_bytes([self.crc_high, byte]) == self.crc {
                    self.state = DecoderState::Idle;
                    self.rx_good = self.rx_good.wrapping_add(1);
                    debug!("frame received, {} bytes", self.buf.len());
                    return Some(FrameEvent::FrameReady(&self.buf));
                }

                self.rx_bad = self.rx_bad.wrapping_add(1);
                warn!("crc mismatch on a {} byte frame", self.buf.len());
                if self.crc_high == DELIMITER {
                    self.frame_started = true;
                    self.length_low = byte;
                    self.state = DecoderState::AwaitLengthHigh;
                } else {
                    self.state = DecoderState::Idle;
                }
                Some(FrameEvent::RogueFrame(&self.buf))
            }
        }
    }
}
