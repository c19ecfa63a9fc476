//! CRC-16 used in the frame trailer.

use crate::consts::CRC_POLYNOMIAL;

/// Folds one byte into a running CRC-16 (reflected, mask `0xA001`).
pub fn crc16_update(crc: u16, data: u8) -> u16 {
    let mut crc = crc;
    let mut d = data;
    for _ in 0..8 {
        if (crc ^ d as u16) & 1 != 0 {
            crc = (crc >> 1) ^ CRC_POLYNOMIAL;
        } else {
            crc >>= 1;
        }
        d >>= 1;
    }
    crc
}

/// CRC-16 over a whole buffer, starting from an initial value of zero.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &b| crc16_update(crc, b))
}

pub(crate) fn lo8(x: u16) -> u8 {
    (x & 0xff) as u8
}

pub(crate) fn hi8(x: u16) -> u8 {
    (x >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // CRC-16/ARC check value
        assert_eq!(crc16(b"123456789"), 0xbb3d);
    }

    #[test]
    fn test_crc16_empty_is_zero() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_crc16_incremental_matches_bulk() {
        let data = [0x00, 0xff, 0x10, 0x42, 0xff, 0xff];
        let mut crc = 0;
        for &b in &data {
            crc = crc16_update(crc, b);
        }
        assert_eq!(crc, crc16(&data));
    }

    #[test]
    fn test_byte_split() {
        assert_eq!(hi8(0xbb3d), 0xbb);
        assert_eq!(lo8(0xbb3d), 0x3d);
    }
}
