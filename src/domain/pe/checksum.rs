//! PE image checksum (the `CheckSum` optional header field).

use crate::infra::error::{PesignError, PesignResult};

/// Compute the image checksum with the 4-byte field at `checksum_offset`
/// treated as zero.
///
/// Little-endian 16-bit words are summed with a carry fold after every
/// addition; the file length is added last. A trailing odd byte counts as a
/// word with a zero high byte.
#[must_use]
pub fn calculate_pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let field = checksum_offset..checksum_offset + 4;
    let mut sum: u32 = 0;

    for (i, word) in data.chunks(2).enumerate() {
        if field.contains(&(i * 2)) {
            continue;
        }
        let lo = u32::from(word[0]);
        let hi = word.get(1).map_or(0, |b| u32::from(*b));
        sum += lo | (hi << 8);
        sum = (sum & 0xffff) + (sum >> 16);
    }

    sum = (sum & 0xffff) + (sum >> 16);
    sum.wrapping_add(data.len() as u32)
}

/// Recompute the checksum and store it in place.
pub fn update_pe_checksum(data: &mut [u8], checksum_offset: usize) -> PesignResult<()> {
    let end = checksum_offset
        .checked_add(4)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| PesignError::PeParsing("checksum field lies outside the image".into()))?;
    let checksum = calculate_pe_checksum(data, checksum_offset);
    data[checksum_offset..end].copy_from_slice(&checksum.to_le_bytes());
    Ok(())
}
