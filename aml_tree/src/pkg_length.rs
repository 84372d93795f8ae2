use crate::{stream::AmlStream, AmlError, AmlResult};
use alloc::vec::Vec;
use bit_field::BitField;

/// The largest value that can be encoded in a PkgLength (28 bits).
pub const MAX_PKG_LENGTH: u32 = 0x0fff_ffff;

/// Parses a `PkgLength` and returns the raw value, along with the number of bytes the encoding took up.
pub fn parse_pkg_length(stream: &mut AmlStream) -> AmlResult<(u32, usize)> {
    /*
     * PkgLength := PkgLeadByte |
     * <PkgLeadByte ByteData> |
     * <PkgLeadByte ByteData ByteData> |
     * <PkgLeadByte ByteData ByteData ByteData>
     *
     * The high 2 bits of the lead byte are the number of following bytes. With no following bytes, bits 0-5 hold
     * the length. Otherwise, bits 0-3 are the least significant nibble of the length, and each following byte
     * holds the next 8 bits.
     */
    let lead_byte = stream.next()?;
    let byte_count = lead_byte.get_bits(6..8);

    if byte_count == 0 {
        return Ok((u32::from(lead_byte.get_bits(0..6)), 1));
    }

    let bytes = stream.take(byte_count as usize)?;
    let length = bytes
        .iter()
        .enumerate()
        .fold(u32::from(lead_byte.get_bits(0..4)), |length, (i, &byte)| length | (u32::from(byte) << (4 + i * 8)));

    Ok((length, 1 + byte_count as usize))
}

/// Parse the PkgLength of an object and split off a stream over the rest of the object. The value of an object's
/// PkgLength includes the bytes of the PkgLength itself, so the returned stream is that much shorter. Also returns
/// the raw PkgLength.
pub fn parse_object_pkg_length<'a>(stream: &mut AmlStream<'a>) -> AmlResult<(u32, AmlStream<'a>)> {
    let (raw_length, encoded_size) = parse_pkg_length(stream)?;
    let body_length = (raw_length as usize).checked_sub(encoded_size).ok_or(AmlError::InvalidPkgLength)?;
    Ok((raw_length, stream.sub_stream(body_length)?))
}

/// The number of bytes the shortest encoding of `value` takes up.
pub fn encoded_size(value: u32) -> AmlResult<usize> {
    match value {
        0..=0x3f => Ok(1),
        0x40..=0xfff => Ok(2),
        0x1000..=0xf_ffff => Ok(3),
        0x10_0000..=MAX_PKG_LENGTH => Ok(4),
        _ => Err(AmlError::ValueTooLarge),
    }
}

/// Work out the PkgLength of an object whose body (everything after the PkgLength) is `body_size` bytes long. The
/// PkgLength counts its own bytes, so the result depends on which encoding ends up being used.
pub fn pkg_length_for_body(body_size: usize) -> AmlResult<u32> {
    for width in 1..=4 {
        let total = u32::try_from(body_size + width).map_err(|_| AmlError::ValueTooLarge)?;
        if encoded_size(total)? == width {
            return Ok(total);
        }
    }

    Err(AmlError::ValueTooLarge)
}

/// Append the shortest encoding of `value` to `out`.
pub fn encode_pkg_length(value: u32, out: &mut Vec<u8>) -> AmlResult<()> {
    let size = encoded_size(value)?;

    if size == 1 {
        out.push(value as u8);
        return Ok(());
    }

    let mut lead_byte = 0u8;
    lead_byte.set_bits(6..8, (size - 1) as u8);
    lead_byte.set_bits(0..4, value.get_bits(0..4) as u8);
    out.push(lead_byte);
    for i in 0..(size - 1) {
        out.push((value >> (4 + i * 8)) as u8);
    }

    Ok(())
}
