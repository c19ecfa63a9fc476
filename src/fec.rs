//! Reed-Solomon protected framing.
//!
//! An FEC message wraps an ordinary [`smp`](crate::smp) frame: the stuffed frame is cut
//! into blocks of `data_per_block` bytes, each block gets its own parity, and a preamble
//! plus a separately protected header block go in front.
//!
//! ```text
//! preamble(2) | header block(3 + parity) | block 1 | ... | block N
//! header block = [last_block_len, block_count, last_block_len ^ block_count] ‖ parity
//! block        = data(data_per_block, last one: last_block_len) ‖ parity
//! ```
//!
//! The receiver ([`FecDecoder`]) hunts for the preamble with a bit correlation and feeds
//! every byte to a plain [`FrameDecoder`] at the same time, so un-coded frames on the
//! same stream still come through. When the plain decoder sees a frame start, the bytes
//! just before it are checked as a header block; a valid one means the preamble was
//! missed and FEC reception starts retroactively.
//!
//! Corrected blocks are fed back through the plain decoder, so the frame CRC has the
//! final word on every delivered payload.

use crate::consts::{
    CORRELATION_THRESHOLD, DEFAULT_BLOCK_SIZE, DEFAULT_PARITY, DELIMITER, FEC_HEADER_LEN,
    MAX_BLOCK_COUNT, MAX_CODEWORD_LEN, MAX_HEADER_BLOCK_LEN, MAX_PARITY, MIN_DATA_PER_BLOCK,
    PREAMBLE, max_frame_len,
};
use crate::error::{ConfigError, EncodeError};
use crate::rs::ReedSolomon;
use crate::smp::{FrameDecoder, FrameEvent, encoded_frame_len, write_frame};

use heapless::{Deque, Vec};

/// Raw bytes remembered while hunting: a header block plus a frame start of up to
/// four bytes (delimiter, escaped low length byte, high length byte).
const HISTORY_LEN: usize = MAX_HEADER_BLOCK_LEN + 4;

/// Block geometry shared by encoder and decoder.
///
/// Both ends of a link must use the same configuration; nothing on the wire announces it.
#[derive(Debug, Clone)]
pub struct FecConfig {
    parity: usize,
    block_size: usize,
    code: ReedSolomon,
}

impl Default for FecConfig {
    /// Four parity bytes in 20 byte blocks.
    fn default() -> Self {
        Self {
            parity: DEFAULT_PARITY,
            block_size: DEFAULT_BLOCK_SIZE,
            code: ReedSolomon::with_parity(DEFAULT_PARITY),
        }
    }
}

impl FecConfig {
    /// Creates a configuration with `parity` parity bytes in blocks of `block_size` bytes.
    ///
    /// # Arguments
    /// - `parity`: Parity bytes per block, `1..=MAX_PARITY`. Each block corrects up to
    ///   `parity / 2` corrupted bytes.
    /// - `block_size`: Total block size including parity, at most 255, leaving at least
    ///   [`MIN_DATA_PER_BLOCK`] data bytes.
    ///
    /// # Errors
    /// [`ConfigError::InvalidParity`] or [`ConfigError::InvalidBlockSize`].
    pub fn new(parity: usize, block_size: usize) -> Result<Self, ConfigError> {
        if parity == 0 || parity > MAX_PARITY {
            return Err(ConfigError::InvalidParity { parity });
        }
        if block_size > MAX_CODEWORD_LEN || block_size < parity + MIN_DATA_PER_BLOCK {
            return Err(ConfigError::InvalidBlockSize { block_size, parity });
        }
        Ok(Self {
            parity,
            block_size,
            code: ReedSolomon::with_parity(parity),
        })
    }

    /// Parity bytes per block.
    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Total block size, data plus parity.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Data bytes in every block but the last.
    pub fn data_per_block(&self) -> usize {
        self.block_size - self.parity
    }

    /// Length of the header block on the wire.
    pub fn header_block_len(&self) -> usize {
        FEC_HEADER_LEN + self.parity
    }

    /// Longest stuffed frame an FEC message can carry.
    pub fn max_frame_len(&self) -> usize {
        MAX_BLOCK_COUNT * self.data_per_block()
    }

    /// Longest payload that always fits, whatever its content.
    pub fn max_payload_len(&self) -> usize {
        (self.max_frame_len() - max_frame_len(0)) / 2
    }

    /// Number of blocks needed for a stuffed frame of `frame_len` bytes.
    pub fn block_count(&self, frame_len: usize) -> usize {
        frame_len.div_ceil(self.data_per_block())
    }

    /// Size on the wire of an FEC message carrying a stuffed frame of `frame_len` bytes.
    pub fn encoded_len(&self, frame_len: usize) -> usize {
        PREAMBLE.len()
            + self.header_block_len()
            + frame_len
            + self.block_count(frame_len) * self.parity
    }

    /// Worst-case message size for a payload of `payload_len` bytes.
    pub fn max_encoded_len(&self, payload_len: usize) -> usize {
        self.encoded_len(max_frame_len(payload_len))
    }

    /// The block code in use.
    pub fn code(&self) -> &ReedSolomon {
        &self.code
    }
}

/// Encodes `payload` as an FEC message into `dst` and returns the number of bytes written.
///
/// # Arguments
/// - `payload`: Bytes to send
/// - `config`: Block geometry, must match the receiver's
/// - `dst`: Output buffer, at least [`FecConfig::encoded_len`] of the stuffed frame
///
/// # Errors
/// - [`EncodeError::PayloadTooLarge`] if the payload does not fit a frame
/// - [`EncodeError::TooManyBlocks`] if the frame needs more than 254 blocks
/// - [`EncodeError::BufferTooSmall`] if `dst` cannot hold the message
///
/// Nothing is written to `dst` when an error is returned.
pub fn encode_fec_frame(
    payload: &[u8],
    config: &FecConfig,
    dst: &mut [u8],
) -> Result<usize, EncodeError> {
    let frame_len = encoded_frame_len(payload)?;
    let blocks = config.block_count(frame_len);
    if blocks > MAX_BLOCK_COUNT {
        return Err(EncodeError::TooManyBlocks {
            blocks,
            max: MAX_BLOCK_COUNT,
        });
    }
    let needed = config.encoded_len(frame_len);
    if dst.len() < needed {
        return Err(EncodeError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }

    let p = config.parity;
    let dpb = config.data_per_block();
    let header_start = PREAMBLE.len();
    let offset = header_start + config.header_block_len();

    // the frame goes in contiguously, then blocks are spread out back to front
    let _ = write_frame(payload, &mut dst[offset..]);
    let last_len = frame_len - (blocks - 1) * dpb;
    let data_len = |i: usize| if i == blocks - 1 { last_len } else { dpb };
    for i in (1..blocks).rev() {
        let src = offset + i * dpb;
        dst.copy_within(src..src + data_len(i), offset + i * config.block_size);
    }
    for i in 0..blocks {
        let start = offset + i * config.block_size;
        let (data, parity) = dst[start..start + data_len(i) + p].split_at_mut(data_len(i));
        config.code.write_parity(data, parity);
    }

    dst[..header_start].copy_from_slice(&PREAMBLE);
    let header = [last_len as u8, blocks as u8, last_len as u8 ^ blocks as u8];
    let (plain, parity) = dst[header_start..offset].split_at_mut(FEC_HEADER_LEN);
    plain.copy_from_slice(&header);
    config.code.write_parity(plain, parity);

    Ok(needed)
}

/// Encoder bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct FecEncoder {
    config: FecConfig,
}

impl FecEncoder {
    /// Creates an encoder for `config`.
    pub fn new(config: FecConfig) -> Self {
        Self { config }
    }

    /// The configuration messages are encoded with.
    pub fn config(&self) -> &FecConfig {
        &self.config
    }

    /// See [`encode_fec_frame`].
    ///
    /// # Errors
    /// As [`encode_fec_frame`].
    pub fn encode(&self, payload: &[u8], dst: &mut [u8]) -> Result<usize, EncodeError> {
        encode_fec_frame(payload, &self.config, dst)
    }

    /// Encodes into a fixed-capacity vector.
    ///
    /// # Errors
    /// As [`encode_fec_frame`]; `N` must hold the encoded message.
    pub fn encode_vec<const N: usize>(&self, payload: &[u8]) -> Result<Vec<u8, N>, EncodeError> {
        let frame_len = encoded_frame_len(payload)?;
        let needed = self.config.encoded_len(frame_len);
        let too_small = EncodeError::BufferTooSmall {
            needed,
            available: N,
        };
        if needed > N {
            return Err(too_small);
        }
        let mut message = Vec::new();
        message.resize(needed, 0).map_err(|_| too_small)?;
        let len = self.encode(payload, &mut message)?;
        message.truncate(len);
        Ok(message)
    }
}

/// Receive state of a [`FecDecoder`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FecState {
    /// Hunting for a preamble while passing bytes to the plain decoder.
    #[default]
    WaitSync,
    /// Collecting the header block after a preamble match.
    ReceivingHeaderBlock,
    /// Collecting the payload blocks announced by the header.
    ReceivingPayloadBlocks,
}

/// Counters kept by a [`FecDecoder`]. All of them wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FecStats {
    /// Header blocks that decoded and passed the checksum.
    pub headers_accepted: u16,
    /// Preamble matches whose header block turned out invalid.
    pub headers_rejected: u16,
    /// Payload blocks that needed and got correction.
    pub blocks_corrected: u16,
    /// Payload blocks delivered uncorrected because they were beyond repair.
    pub blocks_uncorrectable: u16,
    /// Frames delivered out of FEC messages.
    pub messages: u16,
    /// Messages dropped because they did not fit the block buffer.
    pub overflows: u16,
    /// Messages picked up through their header block after a missed preamble.
    pub retroactive_syncs: u16,
}

/// Streaming FEC receiver.
///
/// - `N`: capacity of the block buffer; an incoming message needs
///   [`FecConfig::encoded_len`] minus preamble and header bytes.
/// - `M`: payload capacity of the inner [`FrameDecoder`].
///
/// A single byte can produce several events (a replayed header candidate, or the
/// payload blocks of a finished message), so events go to a handler instead of a
/// return value.
#[derive(Debug)]
pub struct FecDecoder<const N: usize, const M: usize> {
    config: FecConfig,
    state: FecState,
    plain: FrameDecoder<M>,
    header: Vec<u8, MAX_HEADER_BLOCK_LEN>,
    blocks: Vec<u8, N>,
    history: Deque<u8, HISTORY_LEN>,
    correlation: u8,
    expected: usize,

    /// Receive statistics.
    pub stats: FecStats,
}

impl<const N: usize, const M: usize> Default for FecDecoder<N, M> {
    fn default() -> Self {
        Self::new(FecConfig::default())
    }
}

impl<const N: usize, const M: usize> FecDecoder<N, M> {
    /// Creates a decoder hunting for sync.
    pub fn new(config: FecConfig) -> Self {
        Self {
            config,
            state: FecState::WaitSync,
            plain: FrameDecoder::new(),
            header: Vec::new(),
            blocks: Vec::new(),
            history: Deque::new(),
            correlation: !PREAMBLE[0],
            expected: 0,
            stats: FecStats::default(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &FecConfig {
        &self.config
    }

    /// Current receive state.
    pub fn state(&self) -> FecState {
        self.state
    }

    /// The plain decoder used for un-coded frames and for decoded FEC payloads.
    pub fn frame_decoder(&self) -> &FrameDecoder<M> {
        &self.plain
    }

    /// `true` while an FEC message or a plain frame is in progress.
    pub fn is_receiving(&self) -> bool {
        self.state != FecState::WaitSync || self.plain.is_receiving()
    }

    /// Drops everything in progress and goes back to hunting. Counters are kept.
    pub fn reset(&mut self) {
        self.state = FecState::WaitSync;
        self.plain.reset();
        self.header.clear();
        self.blocks.clear();
        self.history.clear();
        self.correlation = !PREAMBLE[0];
        self.expected = 0;
    }

    /// Feeds one byte from the wire, passing every resulting event to `handler`.
    pub fn feed_byte<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        match self.state {
            FecState::WaitSync => self.hunt(byte, handler),
            FecState::ReceivingHeaderBlock => self.receive_header(byte, handler),
            FecState::ReceivingPayloadBlocks => self.receive_payload(byte, handler),
        }
    }

    /// Feeds a buffer byte by byte.
    pub fn feed_bytes<F>(&mut self, bytes: &[u8], mut handler: F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        for &b in bytes {
            self.feed_byte(b, &mut handler);
        }
    }

    /// Gives up on a pending header candidate and replays its bytes as if no preamble
    /// had matched.
    ///
    /// After a false preamble match the decoder holds up to a header block of bytes
    /// before it knows whether they belong to an un-coded frame. Call this when the
    /// line goes idle so a frame ending in that window is not held back.
    pub fn flush<F>(&mut self, mut handler: F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        // a replayed byte may match the preamble again; the new window is always shorter
        while self.state == FecState::ReceivingHeaderBlock {
            self.state = FecState::WaitSync;
            let pending = core::mem::take(&mut self.header);
            for &b in &pending {
                self.feed_byte(b, &mut handler);
            }
        }
    }

    /// Counts the bits of the last two bytes that match the preamble.
    fn correlate(&mut self, byte: u8) -> bool {
        let prev = core::mem::replace(&mut self.correlation, byte);
        let matching = (prev ^ !PREAMBLE[0]).count_ones() + (byte ^ !PREAMBLE[1]).count_ones();
        matching > CORRELATION_THRESHOLD
    }

    fn remember(&mut self, byte: u8) {
        if self.history.is_full() {
            let _ = self.history.pop_front();
        }
        let _ = self.history.push_back(byte);
    }

    /// Copies history into `dst`, ending `skip` bytes before the newest byte.
    fn copy_history(&self, skip: usize, dst: &mut [u8]) -> bool {
        let n = self.history.len();
        if n < skip + dst.len() {
            return false;
        }
        let start = n - skip - dst.len();
        for (d, &s) in dst.iter_mut().zip(self.history.iter().skip(start)) {
            *d = s;
        }
        true
    }

    fn hunt<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        let correlated = self.correlate(byte);
        self.remember(byte);
        // a header ending in 0xFF pairs up with the delimiter behind it
        let escaped_pair = byte == DELIMITER && self.plain.delimiter_pending();

        if let Some(event) = self.plain.feed_byte(byte) {
            handler(event);
        }
        if (self.plain.frame_started() || escaped_pair) && self.sync_retroactively(handler) {
            return;
        }

        if correlated {
            debug!("preamble matched, collecting header block");
            self.header.clear();
            self.state = FecState::ReceivingHeaderBlock;
        }
    }

    /// Checks whether the bytes before a plain frame start form a header block.
    ///
    /// Depending on the plain decoder's state the start was seen on the delimiter itself,
    /// on the length byte after it, or on the high length byte after an escaped low one
    /// (`DELIM FF FF len_hi`). Those bytes already belong to the first payload block and
    /// are carried over.
    ///
    /// Inside a plain frame, a header whose last byte is `0xFF` swallows the delimiter as
    /// an escaped pair and no frame start is seen at all. That case is checked on the
    /// second byte of the pair, like a start seen on the delimiter.
    fn sync_retroactively<F>(&mut self, handler: &mut F) -> bool
    where
        F: FnMut(FrameEvent<'_>),
    {
        let hbl = self.config.header_block_len();
        for carry in [1usize, 2, 4] {
            let mut start_buf = [0u8; 4];
            let start = &mut start_buf[..carry];
            if !self.copy_history(0, start) {
                return false;
            }
            let (newest, lead) = (start[carry - 1], &start[..carry - 1]);
            if (newest == DELIMITER) != (carry == 1) || lead.iter().any(|&b| b != DELIMITER) {
                continue;
            }

            let mut candidate_buf = [0u8; MAX_HEADER_BLOCK_LEN];
            let candidate = &mut candidate_buf[..hbl];
            if !self.copy_history(carry, candidate) {
                return false;
            }
            let Some((count, last)) = self.parse_header(candidate) else {
                continue;
            };
            if count == 1 && last < carry {
                continue;
            }

            debug!("missed preamble, header found behind frame start: {} blocks", count);
            self.stats.retroactive_syncs = self.stats.retroactive_syncs.wrapping_add(1);
            self.start_payload(count, last);
            for &b in start.iter() {
                self.receive_payload(b, handler);
            }
            return true;
        }
        false
    }

    /// Decodes a header block in place and returns `(block_count, last_block_len)`.
    fn parse_header(&self, block: &mut [u8]) -> Option<(usize, usize)> {
        match self.config.code.decode(block, &[]) {
            Ok(0) => {}
            Ok(fixed) => trace!("header block corrected, {} bytes", fixed),
            Err(_) => return None,
        }
        let (last, count) = (block[0], block[1]);
        if block[2] != last ^ count {
            return None;
        }
        let (last, count) = (usize::from(last), usize::from(count));
        if !(1..=self.config.data_per_block()).contains(&last)
            || !(1..=MAX_BLOCK_COUNT).contains(&count)
        {
            return None;
        }
        Some((count, last))
    }

    fn start_payload(&mut self, count: usize, last: usize) {
        self.stats.headers_accepted = self.stats.headers_accepted.wrapping_add(1);
        self.expected = (count - 1) * self.config.block_size + last + self.config.parity;
        self.blocks.clear();
        self.history.clear();
        self.plain.reset();
        self.state = FecState::ReceivingPayloadBlocks;
    }

    fn receive_header<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        if self.header.push(byte).is_err() {
            self.overflow(handler);
            return;
        }
        if self.header.len() < self.config.header_block_len() {
            return;
        }

        let mut block = self.header.clone();
        if let Some((count, last)) = self.parse_header(&mut block) {
            debug!("header accepted: {} blocks, {} bytes in the last", count, last);
            self.start_payload(count, last);
            return;
        }

        self.stats.headers_rejected = self.stats.headers_rejected.wrapping_add(1);
        warn!("header block rejected, replaying {} bytes", self.header.len());
        self.state = FecState::WaitSync;
        let replay = core::mem::take(&mut self.header);
        for &b in &replay {
            self.feed_byte(b, handler);
        }
    }

    fn receive_payload<F>(&mut self, byte: u8, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        if self.blocks.push(byte).is_err() {
            self.overflow(handler);
            return;
        }
        if self.blocks.len() == self.expected {
            self.deliver(handler);
        }
    }

    /// Corrects every block and runs the data through the plain decoder.
    fn deliver<F>(&mut self, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        let p = self.config.parity;
        self.plain.reset();
        for (index, block) in self.blocks.chunks_mut(self.config.block_size).enumerate() {
            match self.config.code.decode(block, &[]) {
                Ok(0) => {}
                Ok(fixed) => {
                    trace!("block {} corrected, {} bytes", index, fixed);
                    self.stats.blocks_corrected = self.stats.blocks_corrected.wrapping_add(1);
                }
                Err(_) => {
                    warn!("block {} uncorrectable", index);
                    self.stats.blocks_uncorrectable =
                        self.stats.blocks_uncorrectable.wrapping_add(1);
                }
            }
            for &b in &block[..block.len() - p] {
                if let Some(event) = self.plain.feed_byte(b) {
                    if let FrameEvent::FrameReady(payload) = event {
                        debug!("fec message delivered, {} bytes", payload.len());
                        self.stats.messages = self.stats.messages.wrapping_add(1);
                    }
                    handler(event);
                }
            }
        }
        self.blocks.clear();
        self.correlation = !PREAMBLE[0];
        self.state = FecState::WaitSync;
    }

    fn overflow<F>(&mut self, handler: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        warn!("fec message exceeds the {} byte block buffer", N);
        self.stats.overflows = self.stats.overflows.wrapping_add(1);
        self.reset();
        handler(FrameEvent::Overflow);
    }
}
