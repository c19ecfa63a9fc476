use super::ByteDecoder;
use crate::smp::FrameEvent;
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that polls a byte source and feeds a decoder.
///
/// This is a simple receive loop for use in environments where interrupts are
/// unavailable or undesired. Every empty poll sleeps `poll_us` on the delay provider;
/// after `idle_polls` empty polls in a row the decoder is told the line went idle, which
/// drops a frame cut short by the sender.
///
/// # Arguments
/// - `decoder`: A [`FrameDecoder`](crate::smp::FrameDecoder) or
///   [`FecDecoder`](crate::fec::FecDecoder)
/// - `read`: Reads one byte, typically `|| serial.read()` on an `embedded-hal-nb`
///   serial port
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL
/// - `poll_us`: The delay between two empty polls, in microseconds
/// - `idle_polls`: Empty polls that end a frame in progress, see
///   [`idle_timeout_polls`](super::idle_timeout_polls). `0` disables the timeout.
/// - `on_event`: Receives every decoder event
///
/// # Errors
/// Returns the first error the byte source reports. It never returns otherwise.
///
/// # Example
/// ```rust,ignore
/// use smp_fec::link::{idle_timeout_polls, run_receive_loop};
/// let mut decoder: FrameDecoder<128> = FrameDecoder::new();
/// let polls = idle_timeout_polls(115_200, 10, 20, 4);
/// run_receive_loop(&mut decoder, || serial.read(), &mut delay, 20, polls, |event| {
///     // ...
/// });
/// ```
pub fn run_receive_loop<D, R, T, F, E>(
    decoder: &mut D,
    mut read: R,
    delay: &mut T,
    poll_us: u32,
    idle_polls: u32,
    mut on_event: F,
) -> Result<Infallible, E>
where
    D: ByteDecoder,
    R: FnMut() -> nb::Result<u8, E>,
    T: DelayNs,
    F: FnMut(FrameEvent<'_>),
{
    let mut quiet: u32 = 0;
    loop {
        match read() {
            Ok(byte) => {
                quiet = 0;
                decoder.feed_byte_with(byte, &mut on_event);
            }
            Err(nb::Error::WouldBlock) => {
                delay.delay_us(poll_us);
                quiet = quiet.saturating_add(1);
                if quiet == idle_polls && decoder.line_idle(&mut on_event) {
                    warn!("line idle for {} polls, dropping partial frame", idle_polls);
                }
            }
            Err(nb::Error::Other(e)) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::max_frame_len;
    use crate::fec::{FecConfig, FecDecoder, encode_fec_frame};
    use crate::smp::{FrameDecoder, encode_frame};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::collections::VecDeque;
    use std::vec::Vec as StdVec;

    #[derive(Debug, PartialEq, Eq)]
    enum Owned {
        Ready(StdVec<u8>),
        Rogue(StdVec<u8>),
        Overflow,
    }

    /// Scripted receiver: `Some(b)` is a byte, `None` an empty poll.
    fn line(script: StdVec<Option<u8>>) -> impl FnMut() -> nb::Result<u8, &'static str> {
        let mut script: VecDeque<_> = script.into();
        move || match script.pop_front() {
            Some(Some(b)) => Ok(b),
            Some(None) => Err(nb::Error::WouldBlock),
            None => Err(nb::Error::Other("end of script")),
        }
    }

    fn bytes(b: &[u8]) -> impl Iterator<Item = Option<u8>> + '_ {
        b.iter().copied().map(Some)
    }

    fn quiet(polls: usize) -> impl Iterator<Item = Option<u8>> {
        std::iter::repeat_n(None, polls)
    }

    fn frame(payload: &[u8]) -> StdVec<u8> {
        let mut buf = vec![0u8; max_frame_len(payload.len())];
        let len = encode_frame(payload, &mut buf).unwrap();
        buf.truncate(len);
        buf
    }

    fn run<D: ByteDecoder>(
        decoder: &mut D,
        script: StdVec<Option<u8>>,
        idle_polls: u32,
    ) -> StdVec<Owned> {
        let mut events = StdVec::new();
        let err = run_receive_loop(
            decoder,
            line(script),
            &mut NoopDelay::new(),
            100,
            idle_polls,
            |e| {
                events.push(match e {
                    FrameEvent::FrameReady(p) => Owned::Ready(p.to_vec()),
                    FrameEvent::RogueFrame(p) => Owned::Rogue(p.to_vec()),
                    FrameEvent::Overflow => Owned::Overflow,
                })
            },
        )
        .unwrap_err();
        assert_eq!(err, "end of script");
        events
    }

    #[test]
    fn test_frames_separated_by_gaps() {
        let script = bytes(&frame(b"one"))
            .chain(quiet(2))
            .chain(bytes(&frame(b"two")))
            .collect();
        let mut decoder: FrameDecoder<32> = FrameDecoder::new();
        assert_eq!(
            run(&mut decoder, script, 4),
            vec![Owned::Ready(b"one".to_vec()), Owned::Ready(b"two".to_vec())]
        );
    }

    #[test]
    fn test_idle_timeout_drops_truncated_frame() {
        let cut = frame(b"interrupted");
        let script: StdVec<_> = bytes(&cut[..6])
            .chain(quiet(4))
            .chain(bytes(&frame(b"next")))
            .collect();

        let mut decoder: FrameDecoder<32> = FrameDecoder::new();
        assert_eq!(
            run(&mut decoder, script.clone(), 4),
            vec![Owned::Ready(b"next".to_vec())]
        );
        assert_eq!(decoder.rx_bad, 0);

        // without the timeout the next delimiter reports the truncated frame
        let mut decoder: FrameDecoder<32> = FrameDecoder::new();
        assert_eq!(
            run(&mut decoder, script, 0),
            vec![
                Owned::Rogue(b"int".to_vec()),
                Owned::Ready(b"next".to_vec())
            ]
        );
    }

    #[test]
    fn test_short_gap_keeps_frame() {
        let whole = frame(b"patience");
        let script = bytes(&whole[..5])
            .chain(quiet(3))
            .chain(bytes(&whole[5..]))
            .collect();
        let mut decoder: FrameDecoder<32> = FrameDecoder::new();
        assert_eq!(
            run(&mut decoder, script, 4),
            vec![Owned::Ready(b"patience".to_vec())]
        );
    }

    #[test]
    fn test_fec_decoder_in_receive_loop() {
        const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog";
        let config = FecConfig::default();
        let mut coded = vec![0u8; config.max_encoded_len(FOX.len())];
        let len = encode_fec_frame(FOX, &config, &mut coded).unwrap();
        coded[12] ^= 0x81;

        let script = bytes(&coded[..len])
            .chain(quiet(4))
            .chain(bytes(&frame(FOX)))
            .chain(quiet(4))
            .collect();
        let mut decoder: FecDecoder<256, 64> = FecDecoder::default();
        assert_eq!(
            run(&mut decoder, script, 4),
            vec![Owned::Ready(FOX.to_vec()), Owned::Ready(FOX.to_vec())]
        );
        assert_eq!(decoder.stats.messages, 1);
        assert_eq!(decoder.stats.blocks_corrected, 1);
    }
}
