//! Building new objects (and whole Definition Blocks) without going through AML bytes.
//!
//! Each `code_gen_*` function creates a complete, correctly-sized object. If `parent` is given, the new object is
//! appended to the parent's variable arguments and the sizes of every ancestor are updated; otherwise the object
//! is returned detached, and belongs to the caller.

use crate::{
    name::AmlName,
    node::{AmlTree, DataType, NodeId},
    opcode::{
        self,
        OpcodeInfo,
        BUFFER_OP,
        BYTE_PREFIX,
        DWORD_PREFIX,
        EXT_DEVICE_OP,
        EXT_OPCODE_PREFIX,
        METHOD_OP,
        NAME_OP,
        ONES_OP,
        ONE_OP,
        PACKAGE_OP,
        QWORD_PREFIX,
        RETURN_OP,
        SCOPE_OP,
        STRING_PREFIX,
        WORD_PREFIX,
        ZERO_OP,
    },
    resource::DescriptorId,
    sdt::{SdtHeader, Signature},
    AmlError,
    AmlResult,
};
use alloc::vec::Vec;
use log::error;

const MAX_METHOD_ARGS: u8 = 7;
const MAX_SYNC_LEVEL: u8 = 15;

/// Create the root node of a new, empty Definition Block. The OEM ids are padded with spaces.
pub fn code_gen_definition_block(
    tree: &mut AmlTree,
    signature: [u8; 4],
    revision: u8,
    oem_id: &str,
    oem_table_id: &str,
    oem_revision: u32,
) -> AmlResult<NodeId> {
    let header =
        SdtHeader::new(Signature(signature), revision, padded_id(oem_id)?, padded_id(oem_table_id)?, oem_revision);
    tree.create_root_node(header)
}

fn padded_id<const N: usize>(id: &str) -> AmlResult<[u8; N]> {
    if id.len() > N || !id.is_ascii() {
        error!("OEM id {:?} is not ASCII, or longer than {} characters", id, N);
        return Err(AmlError::IncompatibleArgument);
    }

    let mut padded = [b' '; N];
    padded[..id.len()].copy_from_slice(id.as_bytes());
    Ok(padded)
}

/// `Scope(name) {}`
pub fn code_gen_scope(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> AmlResult<NodeId> {
    let name = code_gen_name_path(tree, name)?;
    let scope = create_object(tree, SCOPE_OP, 0, &[name])?;
    attach(tree, parent, scope)
}

/// `Device(name) {}`
pub fn code_gen_device(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> AmlResult<NodeId> {
    let name = code_gen_name_path(tree, name)?;
    let device = create_object(tree, EXT_OPCODE_PREFIX, EXT_DEVICE_OP, &[name])?;
    attach(tree, parent, device)
}

/// `Name(name, value)`
pub fn code_gen_name_integer(
    tree: &mut AmlTree,
    name: &str,
    value: u64,
    parent: Option<NodeId>,
) -> AmlResult<NodeId> {
    let value = code_gen_integer(tree, value)?;
    code_gen_name(tree, name, value, parent)
}

/// `Name(name, "string")`
pub fn code_gen_name_string(
    tree: &mut AmlTree,
    name: &str,
    value: &str,
    parent: Option<NodeId>,
) -> AmlResult<NodeId> {
    let value = code_gen_string(tree, value)?;
    code_gen_name(tree, name, value, parent)
}

/// `Name(name, Package() {})`. Elements can then be added with the variable argument list operations, which keep
/// the element count up-to-date.
pub fn code_gen_name_package(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> AmlResult<NodeId> {
    let count = tree.create_data_node(DataType::UInt, &[0])?;
    let package = create_object(tree, PACKAGE_OP, 0, &[count])?;
    code_gen_name(tree, name, package, parent)
}

/// `Name(name, ResourceTemplate() {})`: a buffer holding just an EndTag. Descriptors can then be added with the
/// functions in [`resource_codegen`](crate::resource_codegen).
pub fn code_gen_name_resource_template(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> AmlResult<NodeId> {
    let end_tag = [DescriptorId::END_TAG.0 | 0x01, 0x00];
    let buffer = code_gen_buffer(tree, DataType::ResourceData, &end_tag)?;
    code_gen_name(tree, name, buffer, parent)
}

/// `Method(name, num_args, serialized, sync_level) { Return(value) }`
pub fn code_gen_method_ret_integer(
    tree: &mut AmlTree,
    name: &str,
    value: u64,
    num_args: u8,
    is_serialized: bool,
    sync_level: u8,
    parent: Option<NodeId>,
) -> AmlResult<NodeId> {
    if num_args > MAX_METHOD_ARGS || sync_level > MAX_SYNC_LEVEL {
        error!(
            "Methods take at most {} arguments, and have a sync level of at most {}",
            MAX_METHOD_ARGS, MAX_SYNC_LEVEL
        );
        return Err(AmlError::IncompatibleArgument);
    }

    /*
     * MethodFlags := ByteData
     *     bit 0-2: ArgCount
     *     bit 3:   SerializeFlag
     *     bit 4-7: SyncLevel
     */
    let flags = num_args | (u8::from(is_serialized) << 3) | (sync_level << 4);

    let value = code_gen_integer(tree, value)?;
    let ret = create_object(tree, RETURN_OP, 0, &[value])?;
    let name = match code_gen_name_path(tree, name) {
        Ok(name) => name,
        Err(err) => {
            free(tree, &[ret]);
            return Err(err);
        }
    };
    let flags = match tree.create_data_node(DataType::UInt, &[flags]) {
        Ok(flags) => flags,
        Err(err) => {
            free(tree, &[ret, name]);
            return Err(err);
        }
    };

    let method = match create_object(tree, METHOD_OP, 0, &[name, flags]) {
        Ok(method) => method,
        Err(err) => {
            free(tree, &[ret]);
            return Err(err);
        }
    };
    if let Err(err) = tree.var_list_add_tail(method, ret) {
        free(tree, &[method, ret]);
        return Err(err);
    }
    attach(tree, parent, method)
}

/// An integer, using the smallest encoding that holds it: `Zero`, `One` and `Ones` for those values, and then the
/// narrowest of `BytePrefix`, `WordPrefix`, `DWordPrefix` and `QWordPrefix`.
pub fn code_gen_integer(tree: &mut AmlTree, value: u64) -> AmlResult<NodeId> {
    let (prefix, width) = match value {
        0 => return create_object(tree, ZERO_OP, 0, &[]),
        1 => return create_object(tree, ONE_OP, 0, &[]),
        u64::MAX => return create_object(tree, ONES_OP, 0, &[]),
        0x02..=0xff => (BYTE_PREFIX, 1),
        0x100..=0xffff => (WORD_PREFIX, 2),
        0x1_0000..=0xffff_ffff => (DWORD_PREFIX, 4),
        _ => (QWORD_PREFIX, 8),
    };

    let data = tree.create_data_node(DataType::UInt, &value.to_le_bytes()[..width])?;
    create_object(tree, prefix, 0, &[data])
}

/// A `NameString` data node, e.g. to use as a fixed argument.
pub fn code_gen_name_path(tree: &mut AmlTree, name: &str) -> AmlResult<NodeId> {
    let bytes = AmlName::from_str(name)?.to_aml_bytes()?;
    tree.create_data_node(DataType::NameString, &bytes)
}

/// `"string"`. The string must be ASCII, and must not contain nulls.
pub fn code_gen_string(tree: &mut AmlTree, value: &str) -> AmlResult<NodeId> {
    if !value.bytes().all(|byte| (0x01..=0x7f).contains(&byte)) {
        error!("AML strings can only hold non-null ASCII characters: {:?}", value);
        return Err(AmlError::IncompatibleArgument);
    }

    let mut bytes = Vec::new();
    bytes.try_reserve_exact(value.len() + 1).map_err(|_| AmlError::OutOfResources)?;
    bytes.extend_from_slice(value.as_bytes());
    bytes.push(0x00);

    let data = tree.create_data_node(DataType::String, &bytes)?;
    create_object(tree, STRING_PREFIX, 0, &[data])
}

/// `Buffer(len) { bytes }`, with the bytes held in a single data node of type `data_type`.
pub fn code_gen_buffer(tree: &mut AmlTree, data_type: DataType, bytes: &[u8]) -> AmlResult<NodeId> {
    // Adding the bytes brings the size up to match
    let size = code_gen_integer(tree, 0)?;
    let buffer = create_object(tree, BUFFER_OP, 0, &[size])?;
    let contents = match tree.create_data_node(data_type, bytes) {
        Ok(contents) => contents,
        Err(err) => {
            free(tree, &[buffer]);
            return Err(err);
        }
    };
    if let Err(err) = tree.var_list_add_tail(buffer, contents) {
        free(tree, &[buffer, contents]);
        return Err(err);
    }
    Ok(buffer)
}

fn code_gen_name(tree: &mut AmlTree, name: &str, value: NodeId, parent: Option<NodeId>) -> AmlResult<NodeId> {
    let name = match code_gen_name_path(tree, name) {
        Ok(name) => name,
        Err(err) => {
            free(tree, &[value]);
            return Err(err);
        }
    };
    let object = create_object(tree, NAME_OP, 0, &[name, value])?;
    attach(tree, parent, object)
}

fn term(opcode: u8, sub_opcode: u8) -> AmlResult<&'static OpcodeInfo> {
    opcode::term_opcode(opcode, sub_opcode).ok_or(AmlError::IllegalOpcode(u16::from(opcode)))
}

/// Create an object with the given fixed arguments, and a PkgLength that matches them. If the object can't be
/// created, everything (the arguments included) is freed.
fn create_object(tree: &mut AmlTree, opcode: u8, sub_opcode: u8, fixed_args: &[NodeId]) -> AmlResult<NodeId> {
    let object = match term(opcode, sub_opcode).and_then(|info| tree.create_object_node(info, 0)) {
        Ok(object) => object,
        Err(err) => {
            free(tree, fixed_args);
            return Err(err);
        }
    };

    for (index, &arg) in fixed_args.iter().enumerate() {
        if let Err(err) = tree.set_fixed_argument(object, index, Some(arg)) {
            free(tree, &fixed_args[index..]);
            free(tree, &[object]);
            return Err(err);
        }
    }

    if let Err(err) = tree.propagate_sizes(object) {
        free(tree, &[object]);
        return Err(err);
    }
    Ok(object)
}

fn attach(tree: &mut AmlTree, parent: Option<NodeId>, node: NodeId) -> AmlResult<NodeId> {
    if let Some(parent) = parent {
        if let Err(err) = tree.var_list_add_tail(parent, node) {
            if !tree.is_attached(node) {
                free(tree, &[node]);
            }
            return Err(err);
        }
    }
    Ok(node)
}

/// Free nodes that were created for an object that couldn't be built. Nodes that are already attached to
/// something are left alone.
fn free(tree: &mut AmlTree, nodes: &[NodeId]) {
    for &node in nodes {
        if !tree.is_attached(node) {
            let _ = tree.delete_tree(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::ParseOptions, test_utils::*};

    fn serialize(tree: &AmlTree, node: NodeId) -> Vec<u8> {
        let mut out = Vec::new();
        tree.serialize_node(node, &mut out).unwrap();
        out
    }

    #[test]
    fn integers_use_smallest_encoding() {
        let mut tree = AmlTree::new();
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (2, &[0x0a, 0x02]),
            (0xff, &[0x0a, 0xff]),
            (0x100, &[0x0b, 0x00, 0x01]),
            (0x1_0000, &[0x0c, 0x00, 0x00, 0x01, 0x00]),
            (0xffff_ffff, &[0x0c, 0xff, 0xff, 0xff, 0xff]),
            (0x1_0000_0000, &[0x0e, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]),
            (u64::MAX, &[0xff]),
        ];

        for &(value, expected) in cases {
            let node = code_gen_integer(&mut tree, value).unwrap();
            assert_eq!(serialize(&tree, node), expected, "encoding of {:#x}", value);
            tree.delete_tree(node).unwrap();
        }
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn strings() {
        let mut tree = AmlTree::new();
        let node = code_gen_string(&mut tree, "PNP0501").unwrap();
        assert_eq!(serialize(&tree, node), b"\x0dPNP0501\x00");
        tree.delete_tree(node).unwrap();

        assert_eq!(code_gen_string(&mut tree, "a\0b"), Err(AmlError::IncompatibleArgument));
        assert_eq!(code_gen_string(&mut tree, "caf\u{e9}"), Err(AmlError::IncompatibleArgument));
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn objects() {
        let mut tree = AmlTree::new();

        let method = code_gen_method_ret_integer(&mut tree, "_STA", 0x0f, 0, false, 0, None).unwrap();
        assert_eq!(serialize(&tree, method), b"\x14\x09_STA\x00\xa4\x0a\x0f");
        tree.delete_tree(method).unwrap();

        let method = code_gen_method_ret_integer(&mut tree, "_PRW", 1, 2, true, 3, None).unwrap();
        assert_eq!(serialize(&tree, method), b"\x14\x08_PRW\x3a\xa4\x01");
        tree.delete_tree(method).unwrap();

        let package = code_gen_name_package(&mut tree, "PKG0", None).unwrap();
        assert_eq!(serialize(&tree, package), b"\x08PKG0\x12\x02\x00");
        tree.delete_tree(package).unwrap();

        let template = code_gen_name_resource_template(&mut tree, "RBUF", None).unwrap();
        assert_eq!(serialize(&tree, template), b"\x08RBUF\x11\x05\x0a\x02\x79\x00");
        tree.delete_tree(template).unwrap();

        let hid = code_gen_name_string(&mut tree, "_HID", "ACPI0007", None).unwrap();
        assert_eq!(serialize(&tree, hid), b"\x08_HID\x0dACPI0007\x00");
        tree.delete_tree(hid).unwrap();

        let device = code_gen_device(&mut tree, "\\_SB.CPU0", None).unwrap();
        assert_eq!(serialize(&tree, device), b"\x5b\x82\x0b\x5c\x2e_SB_CPU0");
        tree.delete_tree(device).unwrap();

        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn failed_objects_free_their_arguments() {
        let mut tree = AmlTree::new();
        // An integer can't be the name of a `Name`
        let value = code_gen_integer(&mut tree, 5).unwrap();
        let name = code_gen_name_path(&mut tree, "FOO_").unwrap();
        assert_eq!(create_object(&mut tree, NAME_OP, 0, &[value, name]), Err(AmlError::IncompatibleArgument));
        assert_eq!(tree.node_count(), 0);

        let value = code_gen_integer(&mut tree, 5).unwrap();
        assert_eq!(create_object(&mut tree, 0x02, 0, &[value]), Err(AmlError::IllegalOpcode(0x02)));
        assert_eq!(tree.node_count(), 0);
        assert!(tree.detached_nodes().is_empty());
    }

    #[test]
    fn bad_arguments_leak_nothing() {
        let mut tree = AmlTree::new();
        assert_eq!(
            code_gen_definition_block(&mut tree, *b"SSDT", 2, "TOOLONGID", "AMLTREE", 1),
            Err(AmlError::IncompatibleArgument)
        );
        assert_eq!(
            code_gen_method_ret_integer(&mut tree, "_STA", 0, 8, false, 0, None),
            Err(AmlError::IncompatibleArgument)
        );
        assert_eq!(code_gen_name_integer(&mut tree, "TOOLONG", 5, None), Err(AmlError::InvalidNameSeg));
        assert_eq!(
            code_gen_method_ret_integer(&mut tree, "1BAD", 5, 0, false, 0, None),
            Err(AmlError::InvalidNameSeg)
        );

        // A name can't be added to a data node
        let data = tree.create_data_node(DataType::Raw, &[0x00]).unwrap();
        assert_eq!(code_gen_name_integer(&mut tree, "VAL0", 5, Some(data)), Err(AmlError::WrongNodeKind));
        tree.delete_tree(data).unwrap();

        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn build_a_table() {
        let mut tree = AmlTree::new();
        let root = code_gen_definition_block(&mut tree, *b"SSDT", 2, "RUSTOS", "CPUTABLE", 1).unwrap();
        let scope = code_gen_scope(&mut tree, "\\_SB", Some(root)).unwrap();
        let device = code_gen_device(&mut tree, "CPU0", Some(scope)).unwrap();
        code_gen_name_string(&mut tree, "_HID", "ACPI0007", Some(device)).unwrap();
        code_gen_name_integer(&mut tree, "_UID", 0, Some(device)).unwrap();
        code_gen_method_ret_integer(&mut tree, "_STA", 0x0f, 0, false, 0, Some(device)).unwrap();
        code_gen_name_resource_template(&mut tree, "_CRS", Some(device)).unwrap();
        assert!(tree.detached_nodes().is_empty());

        let bytes = tree.serialize_definition_block(root).unwrap();
        assert_eq!(&bytes[10..16], b"RUSTOS");
        assert_eq!(&bytes[16..24], b"CPUTABLE");

        let (mut reparsed, reparsed_root) = crate::parse_definition_block(&bytes, &ParseOptions::default()).unwrap();
        assert_eq!(reparsed.serialize_definition_block(reparsed_root).unwrap(), bytes);
        let sta = find(&reparsed, reparsed_root, "\\_SB.CPU0._STA");
        assert_eq!(reparsed.object(sta).unwrap().info.name, "Method");
        let crs = find(&reparsed, reparsed_root, "\\_SB.CPU0._CRS");
        let buffer = reparsed.get_fixed_argument(crs, 1).unwrap().unwrap();
        let end_tag = reparsed.get_variable_arg_list(buffer).unwrap()[0];
        assert_eq!(reparsed.data(end_tag).unwrap().data_type, DataType::ResourceData);
    }
}
