use crate::{
    api,
    codegen,
    node::{AmlTree, DataType, NodeId},
    parser::{parse_definition_block, ParseOptions},
    AmlName,
};
use alloc::vec::Vec;

/// An SSDT compiled from:
/// ```text
/// DefinitionBlock ("", "SSDT", 2, "RUSTOS", "AMLTREE ", 1)
/// {
///     External (\_SB.EXT0, MethodObj)    // 1 argument
///     Scope (\_SB)
///     {
///         Device (COM0)
///         {
///             Name (_HID, "PNP0501")
///             Name (_CRS, ResourceTemplate ()
///             {
///                 Memory32Fixed (ReadWrite, 0xFED00000, 0x00000400)
///                 Interrupt (ResourceConsumer, Edge, ActiveHigh, Exclusive) { 0x2C }
///             })
///             Method (_STA, 0) { Return (0x0F) }
///         }
///         Name (PKG0, Package () { One, 0x1234, "AB" })
///         Method (ADD1, 1) { Return (Add (Arg0, One)) }
///         Method (FOO_, 0) { Return (ADD1 (0x05)) }
///         Method (BAR_, 0) { EXT0 (One) }
///         Method (BAZ_, 0) { Return (PKG0) }
///         OperationRegion (OPR0, SystemMemory, 0xFED00000, 0x10)
///         Field (OPR0, DWordAcc, NoLock, Preserve)
///         {
///             REG0, 32,
///             , 32,
///             REG1, 8
///         }
///     }
/// }
/// ```
#[rustfmt::skip]
pub(crate) const FIXTURE_SSDT: &[u8] = &[
    0x53, 0x53, 0x44, 0x54, 0xdc, 0x00, 0x00, 0x00, 0x02, 0xc7, 0x52, 0x55, 0x53, 0x54, 0x4f, 0x53,
    0x41, 0x4d, 0x4c, 0x54, 0x52, 0x45, 0x45, 0x20, 0x01, 0x00, 0x00, 0x00, 0x49, 0x4e, 0x54, 0x4c,
    0x25, 0x09, 0x20, 0x20, 0x15, 0x5c, 0x2e, 0x5f, 0x53, 0x42, 0x5f, 0x45, 0x58, 0x54, 0x30, 0x08,
    0x01, 0x10, 0x4a, 0x0a, 0x5c, 0x5f, 0x53, 0x42, 0x5f, 0x5b, 0x82, 0x3d, 0x43, 0x4f, 0x4d, 0x30,
    0x08, 0x5f, 0x48, 0x49, 0x44, 0x0d, 0x50, 0x4e, 0x50, 0x30, 0x35, 0x30, 0x31, 0x00, 0x08, 0x5f,
    0x43, 0x52, 0x53, 0x11, 0x1a, 0x0a, 0x17, 0x86, 0x09, 0x00, 0x01, 0x00, 0x00, 0xd0, 0xfe, 0x00,
    0x04, 0x00, 0x00, 0x89, 0x06, 0x00, 0x03, 0x01, 0x2c, 0x00, 0x00, 0x00, 0x79, 0x00, 0x14, 0x09,
    0x5f, 0x53, 0x54, 0x41, 0x00, 0xa4, 0x0a, 0x0f, 0x08, 0x50, 0x4b, 0x47, 0x30, 0x12, 0x0a, 0x03,
    0x01, 0x0b, 0x34, 0x12, 0x0d, 0x41, 0x42, 0x00, 0x14, 0x0b, 0x41, 0x44, 0x44, 0x31, 0x01, 0xa4,
    0x72, 0x68, 0x01, 0x00, 0x14, 0x0d, 0x46, 0x4f, 0x4f, 0x5f, 0x00, 0xa4, 0x41, 0x44, 0x44, 0x31,
    0x0a, 0x05, 0x14, 0x0b, 0x42, 0x41, 0x52, 0x5f, 0x00, 0x45, 0x58, 0x54, 0x30, 0x01, 0x14, 0x0b,
    0x42, 0x41, 0x5a, 0x5f, 0x00, 0xa4, 0x50, 0x4b, 0x47, 0x30, 0x5b, 0x80, 0x4f, 0x50, 0x52, 0x30,
    0x00, 0x0c, 0x00, 0x00, 0xd0, 0xfe, 0x0a, 0x10, 0x5b, 0x81, 0x12, 0x4f, 0x50, 0x52, 0x30, 0x03,
    0x52, 0x45, 0x47, 0x30, 0x20, 0x00, 0x20, 0x52, 0x45, 0x47, 0x31, 0x08,
];

pub(crate) fn parse_fixture() -> (AmlTree, NodeId) {
    parse_definition_block(FIXTURE_SSDT, &ParseOptions::default()).unwrap()
}

/// Wrap the AML in `body` in a valid SSDT header.
pub(crate) fn make_table(body: &[u8]) -> Vec<u8> {
    let length = (36 + body.len()) as u32;
    let mut table = Vec::new();
    table.extend_from_slice(b"SSDT");
    table.extend_from_slice(&length.to_le_bytes());
    table.extend_from_slice(&[2, 0]);
    table.extend_from_slice(b"RUSTOSAMLTREE ");
    table.extend_from_slice(&1u32.to_le_bytes());
    table.extend_from_slice(b"INTL");
    table.extend_from_slice(&0x20200925u32.to_le_bytes());
    table.extend_from_slice(body);
    table[9] = crate::checksum8(&table);
    table
}

pub(crate) fn find(tree: &AmlTree, root: NodeId, path: &str) -> NodeId {
    match api::find_node(tree, root, path) {
        Ok(node) => node,
        Err(err) => panic!("Couldn't find {}: {:?}", path, err),
    }
}

pub(crate) fn name_string_node(tree: &mut AmlTree, name: &str) -> NodeId {
    let bytes = AmlName::from_str(name).unwrap().to_aml_bytes().unwrap();
    tree.create_data_node(DataType::NameString, &bytes).unwrap()
}

pub(crate) fn integer_node(tree: &mut AmlTree, value: u64) -> NodeId {
    codegen::code_gen_integer(tree, value).unwrap()
}

pub(crate) fn device_node(tree: &mut AmlTree, name: &str) -> NodeId {
    codegen::code_gen_device(tree, name, None).unwrap()
}

macro_rules! check_parse_err {
    ($body: expr, $error: pat) => {
        match crate::parser::parse_definition_block(&crate::test_utils::make_table($body), &Default::default()) {
            Ok((tree, root)) => panic!("Expected Err, got tree:\n{}", tree.display(root)),
            Err($error) => (),
            Err(err) => panic!("Got wrong error: {:?}", err),
        }
    };
}

pub(crate) use check_parse_err;
