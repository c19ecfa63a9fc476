/// Declares a static global decoder protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton suitable for interrupt-based receivers, where
/// both the main thread and the UART ISR need to safely access the decoder state.
///
/// # Arguments
/// - `$name`: The name of the static
/// - `$decoder`: The concrete decoder type (must implement `ByteDecoder`)
///
/// # Example
/// ```rust
/// use smp_fec::smp::FrameDecoder;
///
/// smp_fec::init_global_decoder!(UART1_RX, FrameDecoder<128>);
/// ```
#[macro_export]
macro_rules! init_global_decoder {
    ( $name:ident, $decoder:ty ) => {
        pub static $name: $crate::critical_section::Mutex<
            ::core::cell::RefCell<::core::option::Option<$decoder>>,
        > = $crate::link::global_decoder_init::<$decoder>();
    };
}

/// Installs a decoder into a static declared with `init_global_decoder!`.
///
/// # Arguments
/// - `$name`: The static declared with `init_global_decoder!`
/// - `$decoder`: The decoder instance
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     setup_global_decoder!(UART1_RX, FrameDecoder::new());
/// }
/// ```
#[macro_export]
macro_rules! setup_global_decoder {
    ( $name:ident, $decoder:expr ) => {
        $crate::link::global_decoder_setup(&$name, $decoder)
    };
}

/// Feeds a received byte to a static declared with `init_global_decoder!`.
///
/// Intended to be the whole body of the RX interrupt handler.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     feed_global_decoder!(UART1_RX, read_data_register(), |event| handle(event));
/// }
/// ```
#[macro_export]
macro_rules! feed_global_decoder {
    ( $name:ident, $byte:expr, $handler:expr ) => {
        $crate::link::global_decoder_feed(&$name, $byte, $handler)
    };
}

#[cfg(test)]
mod tests {
    use crate::smp::{FrameDecoder, FrameEvent, encode_frame};

    crate::init_global_decoder!(TEST_RX, FrameDecoder<16>);

    #[test]
    fn test_macros_drive_global_decoder() {
        crate::setup_global_decoder!(TEST_RX, FrameDecoder::new());

        let mut wire = [0u8; 32];
        let len = encode_frame(b"macro", &mut wire).unwrap();
        let mut got = None;
        for &b in &wire[..len] {
            let installed = crate::feed_global_decoder!(TEST_RX, b, |e| {
                if let FrameEvent::FrameReady(p) = e {
                    got = Some(p.to_vec());
                }
            });
            assert!(installed);
        }
        assert_eq!(got, Some(b"macro".to_vec()));
    }
}
