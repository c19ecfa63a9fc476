use super::ByteDecoder;
use crate::smp::FrameEvent;
use core::cell::RefCell;
use critical_section::Mutex;

/// Used to initialize a global static decoder for use with `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use smp_fec::link::global_decoder_init;
/// use smp_fec::smp::FrameDecoder;
///
/// static DECODER: Mutex<RefCell<Option<FrameDecoder<64>>>> = global_decoder_init();
/// ```
pub const fn global_decoder_init<D: ByteDecoder>() -> Mutex<RefCell<Option<D>>> {
    Mutex::new(RefCell::new(None))
}

/// Installs `decoder` into the global slot, replacing any previous one.
///
/// # Arguments
/// * The global static decoder
/// * The decoder instance, e.g. `FrameDecoder::new()` or `FecDecoder::default()`
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     global_decoder_setup(&DECODER, FrameDecoder::new());
/// }
/// ```
pub fn global_decoder_setup<D: ByteDecoder>(
    global_decoder: &'static Mutex<RefCell<Option<D>>>,
    decoder: D,
) {
    critical_section::with(|cs| {
        let _ = global_decoder.borrow(cs).replace(Some(decoder));
    });
}

/// Feeds one received byte to the global decoder. Call this from the UART RX interrupt.
///
/// `handler` runs inside the critical section, so it should only copy the payload out
/// (e.g. into a `heapless` queue) and return.
///
/// # Arguments
/// * The global static decoder
/// * The byte read from the data register
/// * The event handler
///
/// # Returns
/// * `false` if no decoder has been installed yet and the byte was dropped
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     let byte = read_data_register();
///     global_decoder_feed(&DECODER, byte, |event| handle(event));
/// }
/// ```
pub fn global_decoder_feed<D, F>(
    global_decoder: &'static Mutex<RefCell<Option<D>>>,
    byte: u8,
    mut handler: F,
) -> bool
where
    D: ByteDecoder,
    F: FnMut(FrameEvent<'_>),
{
    critical_section::with(|cs| {
        if let Some(decoder) = global_decoder.borrow(cs).borrow_mut().as_mut() {
            decoder.feed_byte_with(byte, &mut handler);
            true
        } else {
            false
        }
    })
}

/// Signals an idle line to the global decoder, e.g. from a UART idle-line interrupt.
///
/// # Returns
/// * `true` if a partially received frame was discarded
pub fn global_decoder_idle<D, F>(
    global_decoder: &'static Mutex<RefCell<Option<D>>>,
    mut handler: F,
) -> bool
where
    D: ByteDecoder,
    F: FnMut(FrameEvent<'_>),
{
    critical_section::with(|cs| {
        global_decoder
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .is_some_and(|decoder| decoder.line_idle(&mut handler))
    })
}

/// Runs `f` on the global decoder, e.g. to read its counters from the main loop.
///
/// # Returns
/// * `None` if no decoder has been installed yet
pub fn global_decoder_with<D, R, F>(
    global_decoder: &'static Mutex<RefCell<Option<D>>>,
    f: F,
) -> Option<R>
where
    D: ByteDecoder,
    F: FnOnce(&mut D) -> R,
{
    critical_section::with(|cs| global_decoder.borrow(cs).borrow_mut().as_mut().map(f))
}
