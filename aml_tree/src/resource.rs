//! Encoding and decoding of resource data descriptors (ACPI 6.4, §6.4). A resource template (the value of a
//! `_CRS` object, for example) is a `Buffer` whose bytes are a list of these descriptors, terminated by an EndTag.

use crate::{checksum8, AmlError, AmlResult};
use alloc::vec::Vec;
use bit_field::BitField;
use byteorder::{ByteOrder, LittleEndian};
use log::error;

pub const SMALL_HEADER_SIZE: u32 = 1;
pub const LARGE_HEADER_SIZE: u32 = 3;

const SMALL_ID_MASK: u8 = 0x78;
const SMALL_LENGTH_MASK: u8 = 0x07;

/*
 * Small item names (bits 3-6 of a small descriptor's header):
 *      0x00-0x03: Reserved
 *      0x04: IRQ Format Descriptor
 *      0x05: DMA Format Descriptor
 *      0x06: Start Dependent Functions Descriptor
 *      0x07: End Dependent Functions Descriptor
 *      0x08: IO Port Descriptor
 *      0x09: Fixed Location IO Port Descriptor
 *      0x0A: Fixed DMA Descriptor
 *      0x0B-0x0D: Reserved
 *      0x0E: Vendor Defined Descriptor
 *      0x0F: End Tag Descriptor
 */
pub const SMALL_IRQ: u8 = 0x04;
pub const SMALL_DMA: u8 = 0x05;
pub const SMALL_START_DEPENDENT: u8 = 0x06;
pub const SMALL_END_DEPENDENT: u8 = 0x07;
pub const SMALL_IO: u8 = 0x08;
pub const SMALL_FIXED_IO: u8 = 0x09;
pub const SMALL_FIXED_DMA: u8 = 0x0a;
pub const SMALL_VENDOR: u8 = 0x0e;
pub const SMALL_END_TAG: u8 = 0x0f;

/*
 * Large item names (bits 0-6 of a large descriptor's header):
 *      0x00: Reserved
 *      0x01: 24-bit Memory Range Descriptor
 *      0x02: Generic Register Descriptor
 *      0x03: Reserved
 *      0x04: Vendor-defined Descriptor
 *      0x05: 32-bit Memory Range Descriptor
 *      0x06: 32-bit Fixed Memory Range Descriptor
 *      0x07: DWord Address Space Descriptor
 *      0x08: Word Address Space Descriptor
 *      0x09: Extended Interrupt Descriptor
 *      0x0a: QWord Address Space Descriptor
 *      0x0b: Extended Address Space Descriptor
 *      0x0c: GPIO Connection Descriptor
 *      0x0d: Pin Function Descriptor
 *      0x0e: GenericSerialBus Connection Descriptor
 *      0x0f: Pin Configuration Descriptor
 *      0x10: Pin Group Descriptor
 *      0x11: Pin Group Function Descriptor
 *      0x12: Pin Group Configuration Descriptor
 *      0x13-0x7f: Reserved
 */
pub const LARGE_MEMORY24: u8 = 0x01;
pub const LARGE_GENERIC_REGISTER: u8 = 0x02;
pub const LARGE_VENDOR: u8 = 0x04;
pub const LARGE_MEMORY32: u8 = 0x05;
pub const LARGE_MEMORY32_FIXED: u8 = 0x06;
pub const LARGE_DWORD_ADDRESS_SPACE: u8 = 0x07;
pub const LARGE_WORD_ADDRESS_SPACE: u8 = 0x08;
pub const LARGE_EXTENDED_INTERRUPT: u8 = 0x09;
pub const LARGE_QWORD_ADDRESS_SPACE: u8 = 0x0a;
pub const LARGE_EXTENDED_ADDRESS_SPACE: u8 = 0x0b;
pub const LARGE_PIN_GROUP_CONFIG: u8 = 0x12;

/// The canonical id of a kind of descriptor: the header byte with the length bits of small descriptors masked off.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DescriptorId(pub u8);

impl DescriptorId {
    pub const END_TAG: DescriptorId = DescriptorId::small(SMALL_END_TAG);

    pub const fn small(name: u8) -> DescriptorId {
        DescriptorId((name & 0x0f) << 3)
    }

    pub const fn large(name: u8) -> DescriptorId {
        DescriptorId(0x80 | name)
    }

    pub fn is_large(self) -> bool {
        is_large(self.0)
    }

    /// The item name: bits 3-6 of a small id, or bits 0-6 of a large one.
    pub fn name(self) -> u8 {
        if self.is_large() {
            self.0.get_bits(0..7)
        } else {
            self.0.get_bits(3..7)
        }
    }
}

/// If bit 7 of the header is set, it's a large descriptor. If not, it's a small descriptor.
pub fn is_large(header: u8) -> bool {
    header.get_bit(7)
}

/// Check whether the descriptor starting at `header` is of the kind `id`. For small descriptors the length bits
/// are ignored.
pub fn compare_desc_id(header: &[u8], id: DescriptorId) -> bool {
    match get_desc_id(header) {
        Some(header_id) => header_id == id,
        None => false,
    }
}

pub fn get_desc_id(header: &[u8]) -> Option<DescriptorId> {
    let Some(&first) = header.first() else {
        error!("Tried to get the id of an empty resource data descriptor");
        return None;
    };

    if is_large(first) {
        Some(DescriptorId(first))
    } else {
        Some(DescriptorId(first & SMALL_ID_MASK))
    }
}

/// Get the size of the descriptor starting at `header`, including the header itself. Returns `0` if the header
/// is empty, or is too short to hold the length of a large descriptor.
pub fn get_size(header: &[u8]) -> u32 {
    /*
     * Small descriptors:
     *    | Bits        | Field             |
     *    |-------------|-------------------|
     *    | 0-2         | Length - n bytes  |
     *    | 3-6         | Small item type   |
     *    | 7           | 0 = small item    |
     *
     * Large descriptors: Byte 0 is the header, Byte 1 contains bits 0-7 of the length, and Byte 2 contains bits
     * 8-15 of the length. Subsequent bytes contain the actual data items.
     */
    match header {
        [] => {
            error!("Tried to get the size of an empty resource data descriptor");
            0
        }
        [first, ..] if !is_large(*first) => SMALL_HEADER_SIZE + u32::from(first & SMALL_LENGTH_MASK),
        [_, low, high, ..] => LARGE_HEADER_SIZE + u32::from(LittleEndian::read_u16(&[*low, *high])),
        _ => {
            error!("Large resource data descriptor is too short to hold its length: {:x?}", header);
            0
        }
    }
}

/// Set the checksum byte of an EndTag descriptor. The descriptor must be a small EndTag with room for the
/// checksum.
pub fn set_end_tag_checksum(header: &mut [u8], checksum: u8) -> AmlResult<()> {
    if !compare_desc_id(header, DescriptorId::END_TAG) || header.len() < 2 || get_size(header) < 2 {
        error!("Tried to set the checksum of a descriptor that isn't an EndTag: {:x?}", header);
        return Err(AmlError::IncompatibleArgument);
    }

    header[1] = checksum;
    Ok(())
}

/// Compute the checksum to put in the EndTag of a resource template. `template` is the whole template, ending with
/// the EndTag; the checksum covers every byte up to (and including) the EndTag's header.
pub fn compute_end_tag_checksum(template: &[u8]) -> AmlResult<u8> {
    let end_tag = end_tag_offset(template)?;
    Ok(checksum8(&template[..=end_tag]))
}

/// Returns `true` if the EndTag at the end of `template` has a checksum that is valid: either every byte of the
/// template sums to zero, or the checksum is zero. ACPI says that a checksum field of zero means "the checksum
/// is treated as having succeeded".
pub fn is_valid_end_tag_checksum(template: &[u8]) -> bool {
    match end_tag_offset(template) {
        Ok(end_tag) => template[end_tag + 1] == 0 || checksum8(template) == 0,
        Err(_) => false,
    }
}

/// Compute and set the checksum of the EndTag at the end of `template`.
pub fn update_end_tag_checksum(template: &mut [u8]) -> AmlResult<()> {
    let checksum = compute_end_tag_checksum(template)?;
    let end_tag = end_tag_offset(template)?;
    set_end_tag_checksum(&mut template[end_tag..], checksum)
}

fn end_tag_offset(template: &[u8]) -> AmlResult<usize> {
    let end_tag = template.len().checked_sub(2).ok_or(AmlError::ResourceDescriptorTooShort)?;
    if compare_desc_id(&template[end_tag..], DescriptorId::END_TAG) && get_size(&template[end_tag..]) == 2 {
        Ok(end_tag)
    } else {
        Err(AmlError::IncompatibleArgument)
    }
}

/// Iterates over the descriptors in a resource template, yielding the bytes of each one (header included).
pub struct Descriptors<'a> {
    bytes: &'a [u8],
    failed: bool,
}

pub fn descriptors(bytes: &[u8]) -> Descriptors<'_> {
    Descriptors { bytes, failed: false }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = AmlResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() || self.failed {
            return None;
        }

        let size = get_size(self.bytes) as usize;
        if size == 0 || size > self.bytes.len() {
            self.failed = true;
            return Some(Err(AmlError::ResourceDescriptorTooShort));
        }

        let (descriptor, rest) = self.bytes.split_at(size);
        self.bytes = rest;
        Some(Ok(descriptor))
    }
}

/// Returns `true` if `bytes` is a well-formed resource template: a list of descriptors whose only EndTag is the
/// last one.
pub fn is_resource_template(bytes: &[u8]) -> bool {
    let mut seen_end_tag = false;

    for descriptor in descriptors(bytes) {
        let Ok(descriptor) = descriptor else {
            return false;
        };

        if seen_end_tag {
            return false;
        }
        if compare_desc_id(descriptor, DescriptorId::END_TAG) {
            if descriptor.len() != 2 {
                return false;
            }
            seen_end_tag = true;
        }
    }

    seen_end_tag
}

#[derive(Clone, PartialEq, Debug)]
pub enum Resource {
    Irq(IrqDescriptor),
    ExtendedInterrupt(ExtendedInterruptDescriptor),
    Io(IoDescriptor),
    FixedMemory32 { is_writable: bool, base: u32, length: u32 },
    GenericRegister(GenericRegisterDescriptor),
    EndTag { checksum: u8 },
    /// A descriptor we can recognise, but don't decode.
    Other(DescriptorId),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptTrigger {
    Edge,
    Level,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptPolarity {
    ActiveHigh,
    ActiveLow,
}

#[derive(Clone, PartialEq, Debug)]
pub struct IrqDescriptor {
    /// Bit `n` is set if IRQ `n` can be used.
    pub mask: u16,
    pub trigger: InterruptTrigger,
    pub polarity: InterruptPolarity,
    pub is_shared: bool,
    pub is_wake_capable: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ExtendedInterruptDescriptor {
    pub is_consumer: bool,
    pub trigger: InterruptTrigger,
    pub polarity: InterruptPolarity,
    pub is_shared: bool,
    pub is_wake_capable: bool,
    pub interrupts: Vec<u32>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct IoDescriptor {
    pub is_16_bit_decode: bool,
    pub min: u16,
    pub max: u16,
    pub alignment: u8,
    pub length: u8,
}

#[derive(Clone, PartialEq, Debug)]
pub struct GenericRegisterDescriptor {
    pub address_space: u8,
    pub bit_width: u8,
    pub bit_offset: u8,
    pub access_size: u8,
    pub address: u64,
}

/// Decode a single descriptor.
pub fn decode(descriptor: &[u8]) -> AmlResult<Resource> {
    let size = get_size(descriptor) as usize;
    if size == 0 || descriptor.len() < size {
        return Err(AmlError::ResourceDescriptorTooShort);
    }
    // Anything after the descriptor belongs to the next one
    let descriptor = &descriptor[..size];
    let id = get_desc_id(descriptor).ok_or(AmlError::ResourceDescriptorTooShort)?;

    if id.is_large() {
        match id.name() {
            LARGE_MEMORY32_FIXED => fixed_memory32_descriptor(descriptor),
            LARGE_GENERIC_REGISTER => generic_register_descriptor(descriptor),
            LARGE_EXTENDED_INTERRUPT => extended_interrupt_descriptor(descriptor),
            0x00 | 0x03 | 0x13..=0x7f => Err(AmlError::ReservedResourceType),
            _ => Ok(Resource::Other(id)),
        }
    } else {
        match id.name() {
            SMALL_IRQ => irq_descriptor(descriptor),
            SMALL_IO => io_descriptor(descriptor),
            SMALL_END_TAG if size == 2 => Ok(Resource::EndTag { checksum: descriptor[1] }),
            SMALL_END_TAG => Err(AmlError::ResourceDescriptorTooShort),
            0x00..=0x03 | 0x0b..=0x0d => Err(AmlError::ReservedResourceType),
            _ => Ok(Resource::Other(id)),
        }
    }
}

fn irq_descriptor(bytes: &[u8]) -> AmlResult<Resource> {
    /*
     * --- IRQ Descriptor ---
     * Bytes 1-2 are a mask of the IRQs that can be used. Byte 3 is optional, and contains flags:
     *      Bit 0: 1 if edge-triggered, 0 if level-triggered
     *      Bit 3: 1 = active-low, 0 = active-high
     *      Bit 4: 1 if interrupt is shared with other devices
     *      Bit 5: 1 if this interrupt is capable of waking the system
     * If Byte 3 is not present, the interrupt is edge-triggered, active-high and exclusive.
     */
    if bytes.len() < 3 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let mask = LittleEndian::read_u16(&bytes[1..3]);
    let flags = if get_size(bytes) >= 4 { bytes[3] } else { 0b0000_0001 };

    Ok(Resource::Irq(IrqDescriptor {
        mask,
        trigger: if flags.get_bit(0) { InterruptTrigger::Edge } else { InterruptTrigger::Level },
        polarity: if flags.get_bit(3) { InterruptPolarity::ActiveLow } else { InterruptPolarity::ActiveHigh },
        is_shared: flags.get_bit(4),
        is_wake_capable: flags.get_bit(5),
    }))
}

fn io_descriptor(bytes: &[u8]) -> AmlResult<Resource> {
    if bytes.len() < 8 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::Io(IoDescriptor {
        is_16_bit_decode: bytes[1].get_bit(0),
        min: LittleEndian::read_u16(&bytes[2..4]),
        max: LittleEndian::read_u16(&bytes[4..6]),
        alignment: bytes[6],
        length: bytes[7],
    }))
}

fn fixed_memory32_descriptor(bytes: &[u8]) -> AmlResult<Resource> {
    if bytes.len() < 12 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::FixedMemory32 {
        is_writable: bytes[3].get_bit(0),
        base: LittleEndian::read_u32(&bytes[4..8]),
        length: LittleEndian::read_u32(&bytes[8..12]),
    })
}

fn generic_register_descriptor(bytes: &[u8]) -> AmlResult<Resource> {
    if bytes.len() < 15 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::GenericRegister(GenericRegisterDescriptor {
        address_space: bytes[3],
        bit_width: bytes[4],
        bit_offset: bytes[5],
        access_size: bytes[6],
        address: LittleEndian::read_u64(&bytes[7..15]),
    }))
}

fn extended_interrupt_descriptor(bytes: &[u8]) -> AmlResult<Resource> {
    /*
     * --- Extended Interrupt Descriptor ---
     * Byte 3 contains the Interrupt Vector Flags:
     *      Bit 0: 1 if device consumes the resource, 0 if it produces it
     *      Bit 1: 1 if edge-triggered, 0 if level-triggered
     *      Bit 2: 1 = active-low, 0 = active-high
     *      Bit 3: 1 if interrupt is shared with other devices
     *      Bit 4: 1 if this interrupt is capable of waking the system, 0 if it is not
     * Byte 4 contains the number of interrupt numbers that follow.
     *
     * From Byte 5 onwards, there are `n` interrupt numbers, each of which is encoded as a
     * 4-byte little-endian number.
     */
    if bytes.len() < 5 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let number_of_interrupts = bytes[4] as usize;
    if bytes.len() < 5 + number_of_interrupts * 4 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }
    let interrupts = bytes[5..(5 + number_of_interrupts * 4)].chunks_exact(4).map(LittleEndian::read_u32).collect();

    Ok(Resource::ExtendedInterrupt(ExtendedInterruptDescriptor {
        is_consumer: bytes[3].get_bit(0),
        trigger: if bytes[3].get_bit(1) { InterruptTrigger::Edge } else { InterruptTrigger::Level },
        polarity: if bytes[3].get_bit(2) { InterruptPolarity::ActiveLow } else { InterruptPolarity::ActiveHigh },
        is_shared: bytes[3].get_bit(3),
        is_wake_capable: bytes[3].get_bit(4),
        interrupts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn descriptor_sizes() {
        // Small descriptors are 1 + the length in their header
        for header in 0x00..0x80u8 {
            assert_eq!(get_size(&[header]), 1 + u32::from(header & 0x07));
        }
        // Large descriptors are 3 + the length after their header
        assert_eq!(get_size(&[0x86, 0x09, 0x00]), 12);
        assert_eq!(get_size(&[0x89, 0x34, 0x12]), 3 + 0x1234);
        assert_eq!(get_size(&[0x86, 0x09]), 0);
        assert_eq!(get_size(&[]), 0);
    }

    #[test]
    fn descriptor_ids() {
        assert_eq!(DescriptorId::END_TAG, DescriptorId(0x78));
        assert_eq!(get_desc_id(&[0x79, 0x00]), Some(DescriptorId::END_TAG));
        assert_eq!(get_desc_id(&[0x22, 0x01, 0x00]), Some(DescriptorId::small(SMALL_IRQ)));
        assert_eq!(get_desc_id(&[0x23, 0x01, 0x00, 0x01]), Some(DescriptorId::small(SMALL_IRQ)));
        assert_eq!(get_desc_id(&[0x89, 0x06, 0x00]), Some(DescriptorId::large(LARGE_EXTENDED_INTERRUPT)));
        assert_eq!(get_desc_id(&[]), None);

        assert!(compare_desc_id(&[0x79, 0x00], DescriptorId::END_TAG));
        assert!(!compare_desc_id(&[0x79, 0x00], DescriptorId::small(SMALL_IRQ)));
        // Large descriptors compare the whole byte
        assert!(!compare_desc_id(&[0x89, 0x06, 0x00], DescriptorId::large(LARGE_MEMORY32_FIXED)));
        assert!(!compare_desc_id(&[], DescriptorId::END_TAG));

        assert_eq!(DescriptorId::large(LARGE_EXTENDED_INTERRUPT).name(), LARGE_EXTENDED_INTERRUPT);
        assert_eq!(DescriptorId::END_TAG.name(), SMALL_END_TAG);
    }

    #[test]
    fn zero_end_tag_checksum() {
        let mut end_tag = [0x79, 0x00];
        assert!(compare_desc_id(&end_tag, DescriptorId::END_TAG));
        assert_eq!(set_end_tag_checksum(&mut end_tag, 0), Ok(()));
        assert_eq!(end_tag, [0x79, 0x00]);
        assert!(is_valid_end_tag_checksum(&end_tag));
    }

    #[test]
    fn end_tag_checksums() {
        let mut template = vec![
            0x22, 0x10, 0x00, 0x86, 0x09, 0x00, 0x01, 0x00, 0x00, 0xd0, 0xfe, 0x00, 0x04, 0x00, 0x00, 0x79, 0x00,
        ];
        let checksum = compute_end_tag_checksum(&template).unwrap();
        let end_tag = template.len() - 2;
        set_end_tag_checksum(&mut template[end_tag..], checksum).unwrap();
        assert_eq!(template.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)), 0);
        assert!(is_valid_end_tag_checksum(&template));

        template[end_tag + 1] = checksum.wrapping_add(1);
        assert!(!is_valid_end_tag_checksum(&template));
        update_end_tag_checksum(&mut template).unwrap();
        assert_eq!(template[end_tag + 1], checksum);
    }

    #[test]
    fn checksum_needs_end_tag() {
        let mut irq = [0x22, 0x10, 0x00];
        assert_eq!(set_end_tag_checksum(&mut irq, 0x12), Err(AmlError::IncompatibleArgument));
        assert_eq!(irq, [0x22, 0x10, 0x00]);
        assert_eq!(set_end_tag_checksum(&mut [], 0x12), Err(AmlError::IncompatibleArgument));
        // An EndTag without room for its checksum
        assert_eq!(set_end_tag_checksum(&mut [0x78], 0x12), Err(AmlError::IncompatibleArgument));
    }

    #[test]
    fn templates() {
        assert!(is_resource_template(&[0x79, 0x00]));
        assert!(is_resource_template(&[0x22, 0x10, 0x00, 0x79, 0x00]));
        assert!(!is_resource_template(&[]));
        assert!(!is_resource_template(&[0x22, 0x10, 0x00]));
        assert!(!is_resource_template(&[0x79, 0x00, 0x22, 0x10, 0x00]));
        assert!(!is_resource_template(&[0x22, 0x10, 0x00, 0x79]));
        assert!(!is_resource_template(&[0x86, 0x09, 0x00, 0x01, 0x79, 0x00]));

        let split: Vec<_> = descriptors(&[0x22, 0x10, 0x00, 0x79, 0x00]).collect();
        assert_eq!(split, vec![Ok(&[0x22, 0x10, 0x00][..]), Ok(&[0x79, 0x00][..])]);
    }

    #[test]
    fn decoding() {
        assert_eq!(
            decode(&[0x89, 0x06, 0x00, 0x0b, 0x01, 0x2c, 0x00, 0x00, 0x00]),
            Ok(Resource::ExtendedInterrupt(ExtendedInterruptDescriptor {
                is_consumer: true,
                trigger: InterruptTrigger::Edge,
                polarity: InterruptPolarity::ActiveHigh,
                is_shared: true,
                is_wake_capable: false,
                interrupts: vec![0x2c],
            }))
        );
        assert_eq!(
            decode(&[0x86, 0x09, 0x00, 0x01, 0x00, 0x00, 0xd0, 0xfe, 0x00, 0x04, 0x00, 0x00]),
            Ok(Resource::FixedMemory32 { is_writable: true, base: 0xfed0_0000, length: 0x400 })
        );
        assert_eq!(
            decode(&[0x47, 0x01, 0xf8, 0x03, 0xf8, 0x03, 0x00, 0x08]),
            Ok(Resource::Io(IoDescriptor { is_16_bit_decode: true, min: 0x3f8, max: 0x3f8, alignment: 0, length: 8 }))
        );
        assert_eq!(
            decode(&[0x22, 0x10, 0x00]),
            Ok(Resource::Irq(IrqDescriptor {
                mask: 0x0010,
                trigger: InterruptTrigger::Edge,
                polarity: InterruptPolarity::ActiveHigh,
                is_shared: false,
                is_wake_capable: false,
            }))
        );
        assert_eq!(decode(&[0x79, 0x00]), Ok(Resource::EndTag { checksum: 0 }));
        assert_eq!(decode(&[0x83, 0x00, 0x00]), Err(AmlError::ReservedResourceType));
        assert_eq!(decode(&[0x89, 0x06, 0x00, 0x0b]), Err(AmlError::ResourceDescriptorTooShort));
        assert_eq!(decode(&[0x8a, 0x00, 0x00]), Ok(Resource::Other(DescriptorId::large(LARGE_QWORD_ADDRESS_SPACE))));
    }

    #[test]
    fn decoding_stops_at_the_end_of_the_descriptor() {
        // Followed by an EndTag, which isn't part of the IO descriptor
        assert_eq!(
            decode(&[0x47, 0x01, 0xf8, 0x03, 0xf8, 0x03, 0x00, 0x08, 0x79, 0x00]),
            Ok(Resource::Io(IoDescriptor { is_16_bit_decode: true, min: 0x3f8, max: 0x3f8, alignment: 0, length: 8 }))
        );
        // An IO descriptor that says it's a byte short, so its last field is really the EndTag's
        assert_eq!(
            decode(&[0x46, 0x01, 0xf8, 0x03, 0xf8, 0x03, 0x00, 0x79, 0x00]),
            Err(AmlError::ResourceDescriptorTooShort)
        );
        // Two interrupts, but only enough room for one
        assert_eq!(
            decode(&[0x89, 0x06, 0x00, 0x0b, 0x02, 0x2c, 0x00, 0x00, 0x00, 0x2d, 0x00, 0x00, 0x00]),
            Err(AmlError::ResourceDescriptorTooShort)
        );
    }
}
