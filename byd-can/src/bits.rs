//! Bit-level signal packing
//!
//! Extracts and inserts raw signal values with the DBC bit numbering:
//! frame bit `n` is bit `n % 8` (LSB = 0) of byte `n / 8`.
//!
//! - Intel (little-endian): the start bit is the signal LSB and the signal
//!   grows towards higher frame bits.
//! - Motorola (big-endian): the start bit is the signal MSB; walking towards
//!   the LSB moves down inside a byte and wraps to bit 7 of the next byte.

use crate::signals::{ByteOrder, SignalDefinition, ValueType};

/// Visit every bit of a signal as `(frame_bit, value_bit)` pairs
pub(crate) fn for_each_bit(signal: &SignalDefinition, mut visit: impl FnMut(usize, usize)) {
    let start = signal.start_bit as usize;
    let length = signal.length as usize;

    match signal.byte_order {
        ByteOrder::LittleEndian => {
            for i in 0..length {
                visit(start + i, i);
            }
        }
        ByteOrder::BigEndian => {
            let mut frame_bit = start;
            for i in 0..length {
                visit(frame_bit, length - 1 - i);
                frame_bit = if frame_bit % 8 == 0 {
                    frame_bit + 15
                } else {
                    frame_bit - 1
                };
            }
        }
    }
}

/// Extract the raw (unsigned bit pattern) value of a signal
///
/// Bits beyond the end of `data` read as zero; callers check the frame
/// length against the layout first.
pub(crate) fn extract(data: &[u8], signal: &SignalDefinition) -> u64 {
    let mut result: u64 = 0;

    for_each_bit(signal, |frame_bit, value_bit| {
        if let Some(byte) = data.get(frame_bit / 8) {
            let bit_value = (*byte >> (frame_bit % 8)) & 0x01;
            result |= u64::from(bit_value) << value_bit;
        }
    });

    result
}

/// Extract a signal and apply sign extension when the signal is signed
pub(crate) fn extract_raw(data: &[u8], signal: &SignalDefinition) -> i64 {
    let value = extract(data, signal);
    match signal.value_type {
        ValueType::Unsigned => value as i64,
        ValueType::Signed => sign_extend(value, signal.length as usize),
    }
}

/// Write a raw value into the signal's bits, leaving other bits untouched
///
/// Only the low `length` bits of `raw` are written, so a value can never
/// spill into a neighbouring signal.
pub(crate) fn insert(data: &mut [u8], signal: &SignalDefinition, raw: i64) {
    let pattern = raw as u64;

    for_each_bit(signal, |frame_bit, value_bit| {
        if let Some(byte) = data.get_mut(frame_bit / 8) {
            let mask = 1u8 << (frame_bit % 8);
            if (pattern >> value_bit) & 0x01 == 1 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    });
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's MSB is 1, fill the upper bits with 1s.
fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length == 0 || bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::tests::signal;

    fn motorola(start_bit: u16, length: u16, value_type: ValueType) -> SignalDefinition {
        let mut sig = signal("M", start_bit, length, value_type);
        sig.byte_order = ByteOrder::BigEndian;
        sig
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        let sig = signal("A", 0, 8, ValueType::Unsigned);
        assert_eq!(extract(&data, &sig), 0xAB);
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        let sig = signal("A", 0, 16, ValueType::Unsigned);
        assert_eq!(extract(&data, &sig), 0xCDAB);
    }

    #[test]
    fn test_extract_counter_nibble() {
        // COUNTER lives in the high nibble of byte 6
        let data = [0, 0, 0, 0, 0, 0, 0xA5, 0];
        let sig = signal("COUNTER", 52, 4, ValueType::Unsigned);
        assert_eq!(extract(&data, &sig), 0xA);
    }

    #[test]
    fn test_extract_big_endian_simple() {
        // MSB at bit 7 of byte 0: a whole byte
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(extract(&data, &motorola(7, 8, ValueType::Unsigned)), 0xAB);
    }

    #[test]
    fn test_extract_big_endian_cross_byte() {
        // MSB at bit 23 (byte 2), continuing into byte 3
        let data = [0x00, 0x00, 0x12, 0x34];
        assert_eq!(extract(&data, &motorola(23, 16, ValueType::Unsigned)), 0x1234);
    }

    #[test]
    fn test_extract_big_endian_partial_byte() {
        // 12 bits: low nibble of byte 0 then all of byte 1
        let data = [0xF3, 0x45];
        assert_eq!(extract(&data, &motorola(3, 12, ValueType::Unsigned)), 0x345);
    }

    #[test]
    fn test_insert_preserves_neighbours() {
        let mut data = [0xFF; 8];
        let sig = signal("COUNTER", 52, 4, ValueType::Unsigned);
        insert(&mut data, &sig, 0x3);
        assert_eq!(data[6], 0x3F);
        assert_eq!(data[7], 0xFF);
    }

    #[test]
    fn test_insert_negative_signed() {
        let mut data = [0u8; 8];
        let sig = signal("LKAS_OUTPUT", 0, 11, ValueType::Signed);
        insert(&mut data, &sig, -1);
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0x07);
        assert_eq!(extract_raw(&data, &sig), -1);
    }

    #[test]
    fn test_insert_big_endian() {
        let mut data = [0u8; 4];
        let sig = motorola(23, 16, ValueType::Signed);
        insert(&mut data, &sig, -2);
        assert_eq!(&data[2..4], &[0xFF, 0xFE]);
        assert_eq!(extract_raw(&data, &sig), -2);
    }

    #[test]
    fn test_sign_extend_positive() {
        assert_eq!(sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn test_sign_extend_negative() {
        assert_eq!(sign_extend(0xFF, 8), -1);
    }

    #[test]
    fn test_sign_extend_negative_16bit() {
        assert_eq!(sign_extend(0x8000, 16), -32768);
    }
}
