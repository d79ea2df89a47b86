//! Packet trailer codes: CRC-16/XMODEM and the 8-bit additive checksum.

/// CRC-16/XMODEM generator polynomial.
pub const CRC16_POLY: u16 = 0x1021;

/// Shift one byte into a CRC-16 register, MSB first.
///
/// This is the augmented form: the register is not pre-XORed with the input,
/// so a message must be followed by two zero bytes to flush it.
pub fn update_crc16(crc: u16, byte: u8) -> u16 {
    let mut reg = u32::from(crc);
    let mut input = u32::from(byte) | 0x100;

    loop {
        reg <<= 1;
        input <<= 1;
        if input & 0x100 != 0 {
            reg += 1;
        }
        if reg & 0x1_0000 != 0 {
            reg ^= u32::from(CRC16_POLY);
        }
        if input & 0x1_0000 != 0 {
            break;
        }
    }

    (reg & 0xFFFF) as u16
}

/// CRC-16/XMODEM over `data` (initial register 0, two zero flush bytes).
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let crc = data
        .iter()
        .fold(0u16, |crc, &b| update_crc16(crc, b));
    update_crc16(update_crc16(crc, 0), 0)
}

/// 8-bit truncated sum of `data`.
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_xmodem_check_value() {
        // Standard CRC-16/XMODEM check value.
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_crc16_xmodem_empty() {
        assert_eq!(crc16_xmodem(&[]), 0x0000);
    }

    #[test]
    fn test_crc16_zero_block() {
        assert_eq!(crc16_xmodem(&[0u8; 128]), 0x0000);
    }

    #[test]
    fn test_crc16_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        assert_eq!(crc16_xmodem(&data), crc16_xmodem(&data));
    }

    #[test]
    fn test_crc16_single_bit_flip_changes_trailer() {
        let data: Vec<u8> = (0..128u8).map(|i| i.wrapping_mul(37)).collect();
        let reference = crc16_xmodem(&data);

        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(
                    crc16_xmodem(&flipped),
                    reference,
                    "flip of byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn test_checksum8_wraps() {
        assert_eq!(checksum8(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum8(&[0x10; 16]), 0x00);
        assert_eq!(checksum8(&[]), 0x00);
    }
}
