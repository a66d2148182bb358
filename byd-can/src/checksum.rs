//! BYD message checksum
//!
//! The ECUs reject any frame whose integrity byte does not match this
//! nibble-sum algorithm bit for bit.

/// Checksum key used by every message on the BYD general powertrain bus
pub const CHECKSUM_KEY: u8 = 0xAF;

/// Compute the integrity byte of a payload
///
/// `data` is the full payload with the checksum field zeroed (a zeroed byte
/// contributes nothing, so passing the payload without the checksum byte
/// yields the same result).
///
/// High and low nibbles are summed separately, the key's nibbles are folded
/// in crosswise, and the carry out of the low-nibble sum adjusts the upper
/// half of the result.
pub fn byd_checksum(key: u8, data: &[u8]) -> u8 {
    let mut high_sum: i32 = data.iter().map(|b| i32::from(b >> 4)).sum();
    let mut low_sum: i32 = data.iter().map(|b| i32::from(b & 0x0F)).sum();

    let remainder = low_sum >> 4;
    low_sum += i32::from(key >> 4);
    high_sum += i32::from(key & 0x0F);

    let high_part = (-high_sum + 9) & 0x0F;
    let low_part = (-low_sum + 9) & 0x0F;

    (((high_part + (-remainder + 5)) << 4 | low_part) & 0xFF) as u8
}
