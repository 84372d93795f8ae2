use crate::{AmlError, AmlResult};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use core::{fmt, str};

/// The header shared by all System Description Tables. A Definition Block (DSDT or SSDT) is this header followed
/// by a `TermList` of AML.
///
/// Unlike the header of a table mapped straight out of memory, this is an owned copy: the root node of a tree
/// holds one, and `length` and `checksum` are kept up-to-date as the tree is changed and serialized.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    pub signature: Signature,
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

impl SdtHeader {
    pub const SIZE: usize = 36;

    pub fn new(
        signature: Signature,
        revision: u8,
        oem_id: [u8; 6],
        oem_table_id: [u8; 8],
        oem_revision: u32,
    ) -> SdtHeader {
        SdtHeader {
            signature,
            length: Self::SIZE as u32,
            revision,
            checksum: 0,
            oem_id,
            oem_table_id,
            oem_revision,
            creator_id: u32::from_le_bytes(*b"RUST"),
            creator_revision: 1,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> AmlResult<SdtHeader> {
        if bytes.len() < Self::SIZE {
            return Err(AmlError::InvalidTableLength { header: 0, buffer: bytes.len() });
        }

        let mut oem_id = [0; 6];
        let mut oem_table_id = [0; 8];
        oem_id.copy_from_slice(&bytes[10..16]);
        oem_table_id.copy_from_slice(&bytes[16..24]);

        Ok(SdtHeader {
            signature: Signature([bytes[0], bytes[1], bytes[2], bytes[3]]),
            length: LittleEndian::read_u32(&bytes[4..8]),
            revision: bytes[8],
            checksum: bytes[9],
            oem_id,
            oem_table_id,
            oem_revision: LittleEndian::read_u32(&bytes[24..28]),
            creator_id: LittleEndian::read_u32(&bytes[28..32]),
            creator_revision: LittleEndian::read_u32(&bytes[32..36]),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.signature.0);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
        bytes[8] = self.revision;
        bytes[9] = self.checksum;
        bytes[10..16].copy_from_slice(&self.oem_id);
        bytes[16..24].copy_from_slice(&self.oem_table_id);
        LittleEndian::write_u32(&mut bytes[24..28], self.oem_revision);
        LittleEndian::write_u32(&mut bytes[28..32], self.creator_id);
        LittleEndian::write_u32(&mut bytes[32..36], self.creator_revision);
        out.extend_from_slice(&bytes);
    }

    pub fn oem_id(&self) -> Option<&str> {
        str::from_utf8(&self.oem_id).ok()
    }

    pub fn oem_table_id(&self) -> Option<&str> {
        str::from_utf8(&self.oem_table_id).ok()
    }

    /// Whether a signature is one that can start a Definition Block.
    pub fn is_definition_block(&self) -> bool {
        self.signature == Signature::DSDT || self.signature == Signature::SSDT
    }
}

impl fmt::Debug for SdtHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdtHeader")
            .field("signature", &self.signature)
            .field("length", &self.length)
            .field("revision", &self.revision)
            .field("checksum", &self.checksum)
            .field("oem_id", &self.oem_id().unwrap_or("<invalid>"))
            .field("oem_table_id", &self.oem_table_id().unwrap_or("<invalid>"))
            .field("oem_revision", &self.oem_revision)
            .finish()
    }
}

/// Validate the checksum of a whole table: all of its bytes must sum to zero.
pub fn validate_table_checksum(table: &[u8]) -> AmlResult<()> {
    if table.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte)) == 0 {
        Ok(())
    } else {
        Err(AmlError::InvalidChecksum)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature(pub [u8; 4]);

impl Signature {
    pub const DSDT: Signature = Signature(*b"DSDT");
    pub const SSDT: Signature = Signature(*b"SSDT");

    pub fn as_str(&self) -> &str {
        str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn header_round_trip() {
        let header = SdtHeader::new(Signature::SSDT, 2, *b"RUSTOS", *b"AMLTREE ", 7);
        let mut bytes = vec![];
        header.write(&mut bytes);
        assert_eq!(bytes.len(), SdtHeader::SIZE);
        assert_eq!(&bytes[0..4], b"SSDT");
        assert_eq!(&bytes[4..8], &[36, 0, 0, 0]);
        assert_eq!(SdtHeader::from_bytes(&bytes), Ok(header));
        assert!(header.is_definition_block());
        assert_eq!(header.oem_table_id(), Some("AMLTREE "));
    }

    #[test]
    fn too_short() {
        assert_eq!(
            SdtHeader::from_bytes(&[0; 20]),
            Err(AmlError::InvalidTableLength { header: 0, buffer: 20 })
        );
    }

    #[test]
    fn checksums() {
        assert_eq!(validate_table_checksum(&[0x10, 0xf0]), Ok(()));
        assert_eq!(validate_table_checksum(&[0x10, 0xf1]), Err(AmlError::InvalidChecksum));
    }
}
