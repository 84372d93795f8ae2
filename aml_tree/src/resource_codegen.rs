//! Generating resource data descriptors, and adding them to resource templates.
//!
//! Each `code_gen_rd_*` function encodes a descriptor into a new `ResourceData` node. If `name_op` is given, it must
//! be a `Name(name, ResourceTemplate() { ... })` object: the new descriptor is inserted in front of the template's
//! EndTag, the size of the buffer is updated, and the EndTag's checksum is recomputed. Otherwise the new node is
//! returned detached.

use crate::{
    api,
    node::{AmlTree, DataType, NodeId},
    resource::{
        self,
        DescriptorId,
        ExtendedInterruptDescriptor,
        GenericRegisterDescriptor,
        InterruptPolarity,
        InterruptTrigger,
        IoDescriptor,
        LARGE_EXTENDED_INTERRUPT,
        LARGE_GENERIC_REGISTER,
        LARGE_MEMORY32_FIXED,
        SMALL_IO,
    },
    AmlError,
    AmlResult,
};
use alloc::vec::Vec;
use bit_field::BitField;
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace};

/// The largest access size of a Generic Register descriptor: QWord access.
const MAX_ACCESS_SIZE: u8 = 4;

/// `Interrupt(ResourceConsumer/ResourceProducer, Edge/Level, ActiveHigh/ActiveLow, Shared/Exclusive, ...) { ... }`
pub fn code_gen_rd_interrupt(
    tree: &mut AmlTree,
    descriptor: &ExtendedInterruptDescriptor,
    name_op: Option<NodeId>,
) -> AmlResult<NodeId> {
    let bytes = encode_extended_interrupt(descriptor)?;
    add_descriptor(tree, &bytes, name_op)
}

/// `Memory32Fixed(ReadWrite/ReadOnly, base, length)`
pub fn code_gen_rd_memory32_fixed(
    tree: &mut AmlTree,
    is_writable: bool,
    base: u32,
    length: u32,
    name_op: Option<NodeId>,
) -> AmlResult<NodeId> {
    /*
     * --- Memory32Fixed Descriptor ---
     * Byte 3 is the information byte: bit 0 is set if the range is writable.
     * Bytes 4-7 are the base address, and bytes 8-11 the length of the range.
     */
    let mut bytes = large_descriptor(LARGE_MEMORY32_FIXED, 9)?;
    bytes.push(u8::from(is_writable));
    push_u32(&mut bytes, base);
    push_u32(&mut bytes, length);
    add_descriptor(tree, &bytes, name_op)
}

/// `Register(address_space, bit_width, bit_offset, address, access_size)`
pub fn code_gen_rd_register(
    tree: &mut AmlTree,
    descriptor: &GenericRegisterDescriptor,
    name_op: Option<NodeId>,
) -> AmlResult<NodeId> {
    if descriptor.access_size > MAX_ACCESS_SIZE {
        error!("Access size of Generic Register descriptor must be at most {}: {:?}", MAX_ACCESS_SIZE, descriptor);
        return Err(AmlError::IncompatibleArgument);
    }

    let mut bytes = large_descriptor(LARGE_GENERIC_REGISTER, 12)?;
    bytes.extend_from_slice(&[
        descriptor.address_space,
        descriptor.bit_width,
        descriptor.bit_offset,
        descriptor.access_size,
    ]);
    let mut address = [0; 8];
    LittleEndian::write_u64(&mut address, descriptor.address);
    bytes.extend_from_slice(&address);
    add_descriptor(tree, &bytes, name_op)
}

/// `IO(Decode16/Decode10, min, max, alignment, length)`
pub fn code_gen_rd_io(tree: &mut AmlTree, descriptor: &IoDescriptor, name_op: Option<NodeId>) -> AmlResult<NodeId> {
    if descriptor.min > descriptor.max {
        error!("Minimum base of IO descriptor is above its maximum: {:?}", descriptor);
        return Err(AmlError::IncompatibleArgument);
    }

    let mut bytes = Vec::new();
    bytes.try_reserve_exact(8).map_err(|_| AmlError::OutOfResources)?;
    bytes.push(DescriptorId::small(SMALL_IO).0 | 7);
    bytes.push(u8::from(descriptor.is_16_bit_decode));
    push_u16(&mut bytes, descriptor.min);
    push_u16(&mut bytes, descriptor.max);
    bytes.push(descriptor.alignment);
    bytes.push(descriptor.length);
    add_descriptor(tree, &bytes, name_op)
}

pub fn encode_extended_interrupt(descriptor: &ExtendedInterruptDescriptor) -> AmlResult<Vec<u8>> {
    let count = descriptor.interrupts.len();
    let Ok(count) = u8::try_from(count) else {
        error!("Extended Interrupt descriptor can hold at most 255 interrupts, not {}", count);
        return Err(AmlError::IncompatibleArgument);
    };
    if count == 0 {
        error!("Extended Interrupt descriptor must hold at least one interrupt");
        return Err(AmlError::IncompatibleArgument);
    }

    let mut flags = 0u8;
    flags.set_bit(0, descriptor.is_consumer);
    flags.set_bit(1, descriptor.trigger == InterruptTrigger::Edge);
    flags.set_bit(2, descriptor.polarity == InterruptPolarity::ActiveLow);
    flags.set_bit(3, descriptor.is_shared);
    flags.set_bit(4, descriptor.is_wake_capable);

    let mut bytes = large_descriptor(LARGE_EXTENDED_INTERRUPT, 2 + 4 * u16::from(count))?;
    bytes.push(flags);
    bytes.push(count);
    for &interrupt in &descriptor.interrupts {
        push_u32(&mut bytes, interrupt);
    }
    Ok(bytes)
}

/// Start a large descriptor with a payload of `length` bytes.
fn large_descriptor(name: u8, length: u16) -> AmlResult<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(3 + usize::from(length)).map_err(|_| AmlError::OutOfResources)?;
    bytes.push(DescriptorId::large(name).0);
    push_u16(&mut bytes, length);
    Ok(bytes)
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    let mut buf = [0; 2];
    LittleEndian::write_u16(&mut buf, value);
    bytes.extend_from_slice(&buf);
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    let mut buf = [0; 4];
    LittleEndian::write_u32(&mut buf, value);
    bytes.extend_from_slice(&buf);
}

fn add_descriptor(tree: &mut AmlTree, bytes: &[u8], name_op: Option<NodeId>) -> AmlResult<NodeId> {
    let rd_node = tree.create_data_node(DataType::ResourceData, bytes)?;
    let Some(name_op) = name_op else {
        return Ok(rd_node);
    };

    if let Err(err) = insert_before_end_tag(tree, name_op, rd_node) {
        if !tree.is_attached(rd_node) {
            tree.delete_tree(rd_node)?;
        }
        return Err(err);
    }
    Ok(rd_node)
}

fn insert_before_end_tag(tree: &mut AmlTree, name_op: NodeId, rd_node: NodeId) -> AmlResult<()> {
    let buffer = api::name_op_get_buffer(tree, name_op)?;
    let end_tag = find_end_tag(tree, buffer)?;
    // Fails without touching the tree if the buffer's size can't be updated. Otherwise, this updates it.
    tree.var_list_add_before(end_tag, rd_node)?;

    let mut template = Vec::new();
    for &node in tree.get_variable_arg_list(buffer).unwrap_or(&[]) {
        template.extend_from_slice(tree.data(node)?.buffer());
    }

    let checksum = resource::compute_end_tag_checksum(&template)?;
    resource::set_end_tag_checksum(&mut tree.data_mut(end_tag)?.buffer, checksum)?;
    trace!("Added resource data descriptor {:?} to {:?}; template is now {} bytes", rd_node, name_op, template.len());
    Ok(())
}

/// Find the EndTag of the resource template held in `buffer`. It must be the buffer's last variable argument.
fn find_end_tag(tree: &AmlTree, buffer: NodeId) -> AmlResult<NodeId> {
    let last = tree.get_variable_arg_list(buffer).and_then(|list| list.last().copied());
    match last {
        Some(last) => {
            let data = tree.data(last)?;
            let is_end_tag = resource::compare_desc_id(data.buffer(), DescriptorId::END_TAG);
            if data.data_type == DataType::ResourceData && is_end_tag {
                Ok(last)
            } else {
                error!("Resource template in {:?} doesn't end with an EndTag: {:x?}", buffer, data.buffer());
                Err(AmlError::EndTagNotFound)
            }
        }
        None => Err(AmlError::EndTagNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codegen,
        resource::{is_valid_end_tag_checksum, Resource},
        test_utils::*,
    };
    use alloc::vec;

    fn template_bytes(tree: &AmlTree, name_op: NodeId) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut rd_node = api::name_op_get_first_rd_node(tree, name_op).unwrap();
        while let Some(node) = rd_node {
            bytes.extend_from_slice(tree.data(node).unwrap().buffer());
            rd_node = api::get_next_rd_node(tree, node).unwrap();
        }
        bytes
    }

    fn buffer_size(tree: &AmlTree, name_op: NodeId) -> u64 {
        let buffer = tree.get_fixed_argument(name_op, 1).unwrap().unwrap();
        let size = tree.get_fixed_argument(buffer, 0).unwrap().unwrap();
        api::integer_value(tree, size).unwrap()
    }

    #[test]
    fn build_a_resource_template() {
        let mut tree = AmlTree::new();
        let root = codegen::code_gen_definition_block(&mut tree, *b"SSDT", 2, "RUSTOS", "AMLTREE", 1).unwrap();
        let crs = codegen::code_gen_name_resource_template(&mut tree, "_CRS", Some(root)).unwrap();
        assert_eq!(template_bytes(&tree, crs), &[0x79, 0x00]);

        let interrupt = ExtendedInterruptDescriptor {
            is_consumer: true,
            trigger: InterruptTrigger::Level,
            polarity: InterruptPolarity::ActiveHigh,
            is_shared: false,
            is_wake_capable: false,
            interrupts: vec![0x21, 0x22],
        };
        code_gen_rd_interrupt(&mut tree, &interrupt, Some(crs)).unwrap();
        code_gen_rd_memory32_fixed(&mut tree, true, 0x0900_0000, 0x1000, Some(crs)).unwrap();
        let register = GenericRegisterDescriptor {
            address_space: 0x7f,
            bit_width: 0,
            bit_offset: 0,
            access_size: 3,
            address: 0x1234_5678_9abc,
        };
        code_gen_rd_register(&mut tree, &register, Some(crs)).unwrap();
        let io = IoDescriptor { is_16_bit_decode: true, min: 0x3f8, max: 0x3f8, alignment: 1, length: 8 };
        code_gen_rd_io(&mut tree, &io, Some(crs)).unwrap();

        let template = template_bytes(&tree, crs);
        assert!(resource::is_resource_template(&template));
        assert!(is_valid_end_tag_checksum(&template));
        assert_eq!(buffer_size(&tree, crs), template.len() as u64);
        assert_eq!(template.len(), 13 + 12 + 15 + 8 + 2);

        let decoded: Vec<Resource> =
            resource::descriptors(&template).map(|rd| resource::decode(rd.unwrap()).unwrap()).collect();
        assert_eq!(decoded[0], Resource::ExtendedInterrupt(interrupt));
        assert_eq!(decoded[1], Resource::FixedMemory32 { is_writable: true, base: 0x0900_0000, length: 0x1000 });
        assert_eq!(decoded[2], Resource::GenericRegister(register));
        assert_eq!(decoded[3], Resource::Io(io));
        assert!(matches!(decoded[4], Resource::EndTag { .. }));

        // And it survives being serialized and parsed again
        let bytes = tree.serialize_definition_block(root).unwrap();
        let (reparsed, reparsed_root) = crate::parse_definition_block(&bytes, &Default::default()).unwrap();
        let reparsed_crs = find(&reparsed, reparsed_root, "_CRS");
        assert_eq!(template_bytes(&reparsed, reparsed_crs), template);
    }

    #[test]
    fn add_to_parsed_template() {
        let (mut tree, root) = parse_fixture();
        let crs = find(&tree, root, "\\_SB.COM0._CRS");
        let before = template_bytes(&tree, crs);
        assert_eq!(buffer_size(&tree, crs), before.len() as u64);

        let rd_node = code_gen_rd_memory32_fixed(&mut tree, false, 0xfee0_0000, 0x100, Some(crs)).unwrap();
        let after = template_bytes(&tree, crs);
        assert_eq!(after.len(), before.len() + 12);
        assert_eq!(buffer_size(&tree, crs), after.len() as u64);
        assert!(is_valid_end_tag_checksum(&after));

        // Inserted right in front of the EndTag
        let end_tag = api::get_next_rd_node(&tree, rd_node).unwrap().unwrap();
        assert!(resource::compare_desc_id(tree.data(end_tag).unwrap().buffer(), DescriptorId::END_TAG));
        assert_eq!(api::get_next_rd_node(&tree, end_tag), Ok(None));

        assert!(tree.detached_nodes().is_empty());
        let bytes = tree.serialize_definition_block(root).unwrap();
        assert!(crate::parse_definition_block(&bytes, &Default::default()).is_ok());
    }

    #[test]
    fn detached_descriptors() {
        let mut tree = AmlTree::new();
        let io = IoDescriptor { is_16_bit_decode: false, min: 0x60, max: 0x60, alignment: 0, length: 1 };
        let rd_node = code_gen_rd_io(&mut tree, &io, None).unwrap();
        assert_eq!(tree.data(rd_node).unwrap().buffer(), &[0x47, 0x00, 0x60, 0x00, 0x60, 0x00, 0x00, 0x01]);
        assert_eq!(tree.parent(rd_node), Ok(None));
        tree.delete_tree(rd_node).unwrap();
    }

    #[test]
    fn bad_descriptors_and_templates() {
        let (mut tree, root) = parse_fixture();
        let count = tree.node_count();

        let no_interrupts = ExtendedInterruptDescriptor {
            is_consumer: true,
            trigger: InterruptTrigger::Edge,
            polarity: InterruptPolarity::ActiveLow,
            is_shared: false,
            is_wake_capable: false,
            interrupts: vec![],
        };
        assert_eq!(code_gen_rd_interrupt(&mut tree, &no_interrupts, None), Err(AmlError::IncompatibleArgument));
        let register =
            GenericRegisterDescriptor { address_space: 0, bit_width: 8, bit_offset: 0, access_size: 5, address: 0 };
        assert_eq!(code_gen_rd_register(&mut tree, &register, None), Err(AmlError::IncompatibleArgument));

        // Not a Name holding a buffer
        let hid = find(&tree, root, "\\_SB.COM0._HID");
        assert_eq!(code_gen_rd_memory32_fixed(&mut tree, true, 0, 0x1000, Some(hid)), Err(AmlError::WrongOpcode));
        let device = find(&tree, root, "\\_SB.COM0");
        assert_eq!(code_gen_rd_memory32_fixed(&mut tree, true, 0, 0x1000, Some(device)), Err(AmlError::WrongOpcode));
        assert_eq!(tree.node_count(), count);
    }

    #[test]
    fn template_with_named_size() {
        // Name(SIZE, 2)
        // Name(RBUF, Buffer(SIZE) { 0x79, 0x00 })
        #[rustfmt::skip]
        let table = make_table(&[
            0x08, b'S', b'I', b'Z', b'E', 0x0a, 0x02,
            0x08, b'R', b'B', b'U', b'F', 0x11, 0x07, b'S', b'I', b'Z', b'E', 0x79, 0x00,
        ]);
        let (mut tree, root) = crate::parse_definition_block(&table, &Default::default()).unwrap();
        let name = find(&tree, root, "RBUF");
        let before = tree.serialize_definition_block(root).unwrap();
        let count = tree.node_count();

        // The size can't be kept up-to-date, so the template is left alone
        let io = IoDescriptor { is_16_bit_decode: true, min: 0x2f8, max: 0x2f8, alignment: 1, length: 8 };
        assert_eq!(code_gen_rd_io(&mut tree, &io, Some(name)), Err(AmlError::WrongOpcode));
        assert_eq!(template_bytes(&tree, name), &[0x79, 0x00]);
        assert_eq!(tree.node_count(), count);
        assert!(tree.detached_nodes().is_empty());
        assert_eq!(tree.serialize_definition_block(root).unwrap(), before);
    }

    #[test]
    fn template_without_end_tag() {
        // Name(RBUF, Buffer(2) { 0x01, 0x02 })
        let table = make_table(&[0x08, b'R', b'B', b'U', b'F', 0x11, 0x05, 0x0a, 0x02, 0x01, 0x02]);
        let (mut tree, root) = crate::parse_definition_block(&table, &Default::default()).unwrap();
        let name = find(&tree, root, "RBUF");
        let count = tree.node_count();

        let err = code_gen_rd_memory32_fixed(&mut tree, true, 0, 0x1000, Some(name)).unwrap_err();
        assert_eq!(err, AmlError::EndTagNotFound);
        assert_eq!(err.status(), crate::Status::NotFound);
        assert_eq!(tree.node_count(), count);
    }
}
