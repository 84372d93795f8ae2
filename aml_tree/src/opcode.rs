//! The AML byte encoding. Every object in the tree points at one of the static [`OpcodeInfo`]s in this module,
//! which describes how the object is laid out in the byte stream: whether it has a PkgLength, the format of each
//! of its fixed arguments, and what (if anything) its variable arguments are.

use bit_field::BitField;
use core::fmt;

pub const NULL_NAME: u8 = 0x00;
pub const DUAL_NAME_PREFIX: u8 = 0x2E;
pub const MULTI_NAME_PREFIX: u8 = 0x2F;
pub const ROOT_CHAR: u8 = b'\\';
pub const PREFIX_CHAR: u8 = b'^';

pub const EXT_OPCODE_PREFIX: u8 = 0x5b;

pub const ZERO_OP: u8 = 0x00;
pub const ONE_OP: u8 = 0x01;
pub const ALIAS_OP: u8 = 0x06;
pub const NAME_OP: u8 = 0x08;
pub const BYTE_PREFIX: u8 = 0x0a;
pub const WORD_PREFIX: u8 = 0x0b;
pub const DWORD_PREFIX: u8 = 0x0c;
pub const STRING_PREFIX: u8 = 0x0d;
pub const QWORD_PREFIX: u8 = 0x0e;
pub const SCOPE_OP: u8 = 0x10;
pub const BUFFER_OP: u8 = 0x11;
pub const PACKAGE_OP: u8 = 0x12;
pub const VAR_PACKAGE_OP: u8 = 0x13;
pub const METHOD_OP: u8 = 0x14;
pub const EXTERNAL_OP: u8 = 0x15;
pub const RETURN_OP: u8 = 0xa4;
pub const ONES_OP: u8 = 0xff;

pub const EXT_MUTEX_OP: u8 = 0x01;
pub const EXT_OP_REGION_OP: u8 = 0x80;
pub const EXT_FIELD_OP: u8 = 0x81;
pub const EXT_DEVICE_OP: u8 = 0x82;
pub const EXT_PROCESSOR_OP: u8 = 0x83;
pub const EXT_POWER_RES_OP: u8 = 0x84;
pub const EXT_THERMAL_ZONE_OP: u8 = 0x85;
pub const EXT_INDEX_FIELD_OP: u8 = 0x86;
pub const EXT_BANK_FIELD_OP: u8 = 0x87;

/*
 * Field list elements. These share their encodings with `ZeroOp` etc., and so are looked up in their own table.
 */
pub const RESERVED_FIELD: u8 = 0x00;
pub const ACCESS_FIELD: u8 = 0x01;
pub const CONNECT_FIELD: u8 = 0x02;
pub const EXTENDED_ACCESS_FIELD: u8 = 0x03;

/*
 * Pseudo-opcodes. These are never emitted into the stream: they only exist so every object in the tree has an
 * `OpcodeInfo`.
 */
pub const NAMED_FIELD_PSEUDO_OP: u8 = 0x04;
pub const NAME_STRING_PSEUDO_OP: u8 = 0xd0;
pub const METHOD_INVOCATION_PSEUDO_OP: u8 = 0xd1;

/// The object type byte used by `External` to declare a method.
pub const EXTERNAL_METHOD_OBJECT_TYPE: u8 = 0x08;

/// The largest number of fixed arguments any opcode has (`Match` and `LoadTable`).
pub const MAX_FIXED_ARGS: usize = 6;

/// The format of a fixed argument in the byte stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgFormat {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    NameString,
    /// A null-terminated ASCII string.
    String,
    /// Another object (a `TermArg`, `SuperName`, `Target` or `DataRefObject`, depending on the opcode).
    Object,
    /// The PkgLength of a field element, which (unlike the PkgLength of an object) counts bits and does not
    /// include its own encoding.
    FieldPkgLen,
}

impl ArgFormat {
    /// The encoded width of the integer formats.
    pub fn integer_width(self) -> Option<usize> {
        match self {
            ArgFormat::UInt8 => Some(1),
            ArgFormat::UInt16 => Some(2),
            ArgFormat::UInt32 => Some(4),
            ArgFormat::UInt64 => Some(8),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OpAttributes(pub u16);

impl OpAttributes {
    pub const NONE: OpAttributes = OpAttributes(0);

    /// The fixed arguments are preceded by a PkgLength
    pub const HAS_PKG_LENGTH: u16 = 1 << 0;
    /// The variable arguments are a `TermList`
    pub const HAS_TERM_LIST: u16 = 1 << 1;
    /// The variable arguments are a `ByteList`
    pub const HAS_BYTE_LIST: u16 = 1 << 2;
    /// The variable arguments are a `FieldList`
    pub const HAS_FIELD_LIST: u16 = 1 << 3;
    /// The variable arguments are a `PackageElementList`
    pub const HAS_PACKAGE_ELEMENTS: u16 = 1 << 4;
    /// The object adds a name (its first `NameString` fixed argument) to the namespace
    pub const IN_NAMESPACE: u16 = 1 << 5;
    /// Names used in the object's term list are relative to the object's name
    pub const OPENS_SCOPE: u16 = 1 << 6;
    /// No opcode is emitted into the stream for this object
    pub const PSEUDO: u16 = 1 << 7;
    /// The object is an element of a `FieldList`
    pub const FIELD_ELEMENT: u16 = 1 << 8;
    /// The object is a method invocation, whose arguments are its variable arguments
    pub const METHOD_INVOCATION: u16 = 1 << 9;

    const fn new(bits: u16) -> OpAttributes {
        OpAttributes(bits)
    }

    pub fn has_pkg_length(self) -> bool {
        self.0.get_bit(0)
    }

    pub fn has_term_list(self) -> bool {
        self.0.get_bit(1)
    }

    pub fn has_byte_list(self) -> bool {
        self.0.get_bit(2)
    }

    pub fn has_field_list(self) -> bool {
        self.0.get_bit(3)
    }

    pub fn has_package_elements(self) -> bool {
        self.0.get_bit(4)
    }

    pub fn in_namespace(self) -> bool {
        self.0.get_bit(5)
    }

    pub fn opens_scope(self) -> bool {
        self.0.get_bit(6)
    }

    pub fn is_pseudo(self) -> bool {
        self.0.get_bit(7)
    }

    pub fn is_field_element(self) -> bool {
        self.0.get_bit(8)
    }

    pub fn is_method_invocation(self) -> bool {
        self.0.get_bit(9)
    }

    /// Whether objects with these attributes can hold variable arguments at all.
    pub fn has_variable_args(self) -> bool {
        self.has_term_list()
            || self.has_byte_list()
            || self.has_field_list()
            || self.has_package_elements()
            || self.is_method_invocation()
    }
}

impl fmt::Debug for OpAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpAttributes({:#06x})", self.0)
    }
}

/// The encoding of a single AML opcode.
#[derive(PartialEq, Eq)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub opcode: u8,
    /// The byte following `EXT_OPCODE_PREFIX` for extended opcodes, and `0` otherwise.
    pub sub_opcode: u8,
    pub fixed_args: &'static [ArgFormat],
    pub attributes: OpAttributes,
}

impl OpcodeInfo {
    pub fn is_extended(&self) -> bool {
        self.opcode == EXT_OPCODE_PREFIX
    }

    pub fn is(&self, opcode: u8, sub_opcode: u8) -> bool {
        self.opcode == opcode && self.sub_opcode == sub_opcode
    }

    /// The number of bytes the opcode itself takes up in the stream.
    pub fn encoded_size(&self) -> usize {
        if self.attributes.is_pseudo() {
            0
        } else if self.is_extended() {
            2
        } else {
            1
        }
    }

    /// The index of the fixed argument that holds the name this object defines, if it defines one.
    pub fn name_arg_index(&self) -> Option<usize> {
        if !self.attributes.in_namespace() {
            return None;
        }

        match self.opcode {
            // `Alias(SourceObject, AliasObject)` defines its second name
            ALIAS_OP => Some(1),
            _ => self.fixed_args.iter().rposition(|&format| format == ArgFormat::NameString),
        }
    }
}

impl fmt::Debug for OpcodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{}(0x5b{:02x})", self.name, self.sub_opcode)
        } else {
            write!(f, "{}({:#04x})", self.name, self.opcode)
        }
    }
}

use ArgFormat::{FieldPkgLen, NameString, Object, String as Str, UInt16, UInt32, UInt64, UInt8};

const PKG: u16 = OpAttributes::HAS_PKG_LENGTH;
const TERMS: u16 = OpAttributes::HAS_TERM_LIST;
const BYTES: u16 = OpAttributes::HAS_BYTE_LIST;
const FIELDS: u16 = OpAttributes::HAS_FIELD_LIST;
const ELEMENTS: u16 = OpAttributes::HAS_PACKAGE_ELEMENTS;
const NS: u16 = OpAttributes::IN_NAMESPACE;
const SCOPE: u16 = OpAttributes::OPENS_SCOPE;
const PSEUDO: u16 = OpAttributes::PSEUDO;
const FIELD_ELEMENT: u16 = OpAttributes::FIELD_ELEMENT;
const INVOCATION: u16 = OpAttributes::METHOD_INVOCATION;

macro_rules! op {
    ($name: literal, $opcode: expr, [$($arg: expr),*], $attrs: expr) => {
        OpcodeInfo { name: $name, opcode: $opcode, sub_opcode: 0, fixed_args: &[$($arg),*], attributes: OpAttributes::new($attrs) }
    };
}

macro_rules! ext_op {
    ($name: literal, $sub_opcode: expr, [$($arg: expr),*], $attrs: expr) => {
        OpcodeInfo {
            name: $name,
            opcode: EXT_OPCODE_PREFIX,
            sub_opcode: $sub_opcode,
            fixed_args: &[$($arg),*],
            attributes: OpAttributes::new($attrs),
        }
    };
}

/// Every term opcode in the AML grammar.
#[rustfmt::skip]
pub static TERM_OPCODES: &[OpcodeInfo] = &[
    op!("Zero", ZERO_OP, [], 0),
    op!("One", ONE_OP, [], 0),
    op!("Alias", ALIAS_OP, [NameString, NameString], NS),
    op!("Name", NAME_OP, [NameString, Object], NS),
    op!("BytePrefix", BYTE_PREFIX, [UInt8], 0),
    op!("WordPrefix", WORD_PREFIX, [UInt16], 0),
    op!("DWordPrefix", DWORD_PREFIX, [UInt32], 0),
    op!("StringPrefix", STRING_PREFIX, [Str], 0),
    op!("QWordPrefix", QWORD_PREFIX, [UInt64], 0),
    op!("Scope", SCOPE_OP, [NameString], PKG | TERMS | NS | SCOPE),
    op!("Buffer", BUFFER_OP, [Object], PKG | BYTES),
    op!("Package", PACKAGE_OP, [UInt8], PKG | ELEMENTS),
    op!("VarPackage", VAR_PACKAGE_OP, [Object], PKG | ELEMENTS),
    op!("Method", METHOD_OP, [NameString, UInt8], PKG | TERMS | NS | SCOPE),
    op!("External", EXTERNAL_OP, [NameString, UInt8, UInt8], NS),
    ext_op!("Mutex", 0x01, [NameString, UInt8], NS),
    ext_op!("Event", 0x02, [NameString], NS),
    ext_op!("CondRefOf", 0x12, [Object, Object], 0),
    ext_op!("CreateField", 0x13, [Object, Object, Object, NameString], NS),
    ext_op!("LoadTable", 0x1f, [Object, Object, Object, Object, Object, Object], 0),
    ext_op!("Load", 0x20, [NameString, Object], 0),
    ext_op!("Stall", 0x21, [Object], 0),
    ext_op!("Sleep", 0x22, [Object], 0),
    ext_op!("Acquire", 0x23, [Object, UInt16], 0),
    ext_op!("Signal", 0x24, [Object], 0),
    ext_op!("Wait", 0x25, [Object, Object], 0),
    ext_op!("Reset", 0x26, [Object], 0),
    ext_op!("Release", 0x27, [Object], 0),
    ext_op!("FromBCD", 0x28, [Object, Object], 0),
    ext_op!("ToBCD", 0x29, [Object, Object], 0),
    ext_op!("Unload", 0x2a, [Object], 0),
    ext_op!("Revision", 0x30, [], 0),
    ext_op!("Debug", 0x31, [], 0),
    ext_op!("Fatal", 0x32, [UInt8, UInt32, Object], 0),
    ext_op!("Timer", 0x33, [], 0),
    ext_op!("OperationRegion", EXT_OP_REGION_OP, [NameString, UInt8, Object, Object], NS),
    ext_op!("Field", EXT_FIELD_OP, [NameString, UInt8], PKG | FIELDS),
    ext_op!("Device", EXT_DEVICE_OP, [NameString], PKG | TERMS | NS | SCOPE),
    ext_op!("Processor", EXT_PROCESSOR_OP, [NameString, UInt8, UInt32, UInt8], PKG | TERMS | NS | SCOPE),
    ext_op!("PowerResource", EXT_POWER_RES_OP, [NameString, UInt8, UInt16], PKG | TERMS | NS | SCOPE),
    ext_op!("ThermalZone", EXT_THERMAL_ZONE_OP, [NameString], PKG | TERMS | NS | SCOPE),
    ext_op!("IndexField", EXT_INDEX_FIELD_OP, [NameString, NameString, UInt8], PKG | FIELDS),
    ext_op!("BankField", EXT_BANK_FIELD_OP, [NameString, NameString, Object, UInt8], PKG | FIELDS),
    ext_op!("DataTableRegion", 0x88, [NameString, Object, Object, Object], NS),
    op!("Local0", 0x60, [], 0),
    op!("Local1", 0x61, [], 0),
    op!("Local2", 0x62, [], 0),
    op!("Local3", 0x63, [], 0),
    op!("Local4", 0x64, [], 0),
    op!("Local5", 0x65, [], 0),
    op!("Local6", 0x66, [], 0),
    op!("Local7", 0x67, [], 0),
    op!("Arg0", 0x68, [], 0),
    op!("Arg1", 0x69, [], 0),
    op!("Arg2", 0x6a, [], 0),
    op!("Arg3", 0x6b, [], 0),
    op!("Arg4", 0x6c, [], 0),
    op!("Arg5", 0x6d, [], 0),
    op!("Arg6", 0x6e, [], 0),
    op!("Store", 0x70, [Object, Object], 0),
    op!("RefOf", 0x71, [Object], 0),
    op!("Add", 0x72, [Object, Object, Object], 0),
    op!("Concatenate", 0x73, [Object, Object, Object], 0),
    op!("Subtract", 0x74, [Object, Object, Object], 0),
    op!("Increment", 0x75, [Object], 0),
    op!("Decrement", 0x76, [Object], 0),
    op!("Multiply", 0x77, [Object, Object, Object], 0),
    op!("Divide", 0x78, [Object, Object, Object, Object], 0),
    op!("ShiftLeft", 0x79, [Object, Object, Object], 0),
    op!("ShiftRight", 0x7a, [Object, Object, Object], 0),
    op!("And", 0x7b, [Object, Object, Object], 0),
    op!("NAnd", 0x7c, [Object, Object, Object], 0),
    op!("Or", 0x7d, [Object, Object, Object], 0),
    op!("NOr", 0x7e, [Object, Object, Object], 0),
    op!("XOr", 0x7f, [Object, Object, Object], 0),
    op!("Not", 0x80, [Object, Object], 0),
    op!("FindSetLeftBit", 0x81, [Object, Object], 0),
    op!("FindSetRightBit", 0x82, [Object, Object], 0),
    op!("DerefOf", 0x83, [Object], 0),
    op!("ConcatenateResTemplate", 0x84, [Object, Object, Object], 0),
    op!("Mod", 0x85, [Object, Object, Object], 0),
    op!("Notify", 0x86, [Object, Object], 0),
    op!("SizeOf", 0x87, [Object], 0),
    op!("Index", 0x88, [Object, Object, Object], 0),
    op!("Match", 0x89, [Object, UInt8, Object, UInt8, Object, Object], 0),
    op!("CreateDWordField", 0x8a, [Object, Object, NameString], NS),
    op!("CreateWordField", 0x8b, [Object, Object, NameString], NS),
    op!("CreateByteField", 0x8c, [Object, Object, NameString], NS),
    op!("CreateBitField", 0x8d, [Object, Object, NameString], NS),
    op!("ObjectType", 0x8e, [Object], 0),
    op!("CreateQWordField", 0x8f, [Object, Object, NameString], NS),
    op!("LAnd", 0x90, [Object, Object], 0),
    op!("LOr", 0x91, [Object, Object], 0),
    // `LNotEqual` etc. are encoded as `LNot` applied to `LEqual` etc., and so are parsed as such
    op!("LNot", 0x92, [Object], 0),
    op!("LEqual", 0x93, [Object, Object], 0),
    op!("LGreater", 0x94, [Object, Object], 0),
    op!("LLess", 0x95, [Object, Object], 0),
    op!("ToBuffer", 0x96, [Object, Object], 0),
    op!("ToDecimalString", 0x97, [Object, Object], 0),
    op!("ToHexString", 0x98, [Object, Object], 0),
    op!("ToInteger", 0x99, [Object, Object], 0),
    op!("ToString", 0x9c, [Object, Object, Object], 0),
    op!("CopyObject", 0x9d, [Object, Object], 0),
    op!("Mid", 0x9e, [Object, Object, Object, Object], 0),
    op!("Continue", 0x9f, [], 0),
    op!("If", 0xa0, [Object], PKG | TERMS),
    op!("Else", 0xa1, [], PKG | TERMS),
    op!("While", 0xa2, [Object], PKG | TERMS),
    op!("Noop", 0xa3, [], 0),
    op!("Return", RETURN_OP, [Object], 0),
    op!("Break", 0xa5, [], 0),
    op!("BreakPoint", 0xcc, [], 0),
    op!("Ones", ONES_OP, [], 0),
];

/// Elements of a `FieldList`.
#[rustfmt::skip]
pub static FIELD_OPCODES: &[OpcodeInfo] = &[
    op!("ReservedField", RESERVED_FIELD, [FieldPkgLen], FIELD_ELEMENT),
    op!("AccessField", ACCESS_FIELD, [UInt8, UInt8], FIELD_ELEMENT),
    // `ConnectField := <0x02 NameString> | <0x02 BufferData>`
    op!("ConnectField", CONNECT_FIELD, [Object], FIELD_ELEMENT),
    op!("ExtendedAccessField", EXTENDED_ACCESS_FIELD, [UInt8, UInt8, UInt8], FIELD_ELEMENT),
];

pub static NAMED_FIELD: OpcodeInfo =
    op!("NamedField", NAMED_FIELD_PSEUDO_OP, [NameString, FieldPkgLen], FIELD_ELEMENT | PSEUDO | NS);

/// A `NameString` that appears where an object is expected, and which is not a method invocation.
pub static NAME_STRING: OpcodeInfo = op!("NameString", NAME_STRING_PSEUDO_OP, [NameString], PSEUDO);

/// `MethodInvocation := NameString TermArgList`. The second fixed argument holds the number of arguments, and is
/// not emitted.
pub static METHOD_INVOCATION: OpcodeInfo =
    op!("MethodInvocation", METHOD_INVOCATION_PSEUDO_OP, [NameString, UInt8], PSEUDO | INVOCATION);

/// Look up a term opcode. `sub_opcode` is only used if `opcode` is `EXT_OPCODE_PREFIX`.
pub fn term_opcode(opcode: u8, sub_opcode: u8) -> Option<&'static OpcodeInfo> {
    let sub_opcode = if opcode == EXT_OPCODE_PREFIX { sub_opcode } else { 0 };
    TERM_OPCODES.iter().find(|info| info.is(opcode, sub_opcode))
}

pub fn field_opcode(opcode: u8) -> Option<&'static OpcodeInfo> {
    FIELD_OPCODES.iter().find(|info| info.opcode == opcode)
}

/// Look up any opcode, including the pseudo-opcodes. This is how callers building trees by hand get hold of an
/// `OpcodeInfo`.
pub fn lookup(opcode: u8, sub_opcode: u8) -> Option<&'static OpcodeInfo> {
    match opcode {
        NAME_STRING_PSEUDO_OP => Some(&NAME_STRING),
        METHOD_INVOCATION_PSEUDO_OP => Some(&METHOD_INVOCATION),
        _ => term_opcode(opcode, sub_opcode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(term_opcode(SCOPE_OP, 0).unwrap().name, "Scope");
        assert_eq!(term_opcode(EXT_OPCODE_PREFIX, EXT_DEVICE_OP).unwrap().name, "Device");
        // The sub-opcode is ignored for normal opcodes
        assert_eq!(term_opcode(NAME_OP, 0x82).unwrap().name, "Name");
        assert!(term_opcode(0x02, 0).is_none());
        assert!(term_opcode(EXT_OPCODE_PREFIX, 0x99).is_none());
        assert_eq!(field_opcode(ACCESS_FIELD).unwrap().name, "AccessField");
        assert_eq!(lookup(METHOD_INVOCATION_PSEUDO_OP, 0).unwrap().name, "MethodInvocation");
    }

    #[test]
    fn table_is_consistent() {
        for info in TERM_OPCODES {
            assert!(info.fixed_args.len() <= MAX_FIXED_ARGS, "{:?} has too many fixed arguments", info);
            if info.attributes.has_variable_args() {
                assert!(info.attributes.has_pkg_length(), "{:?} has variable arguments but no PkgLength", info);
            }
            let duplicates = TERM_OPCODES.iter().filter(|other| other.is(info.opcode, info.sub_opcode)).count();
            assert_eq!(duplicates, 1, "{:?} appears more than once", info);
        }
    }

    #[test]
    fn name_args() {
        assert_eq!(term_opcode(NAME_OP, 0).unwrap().name_arg_index(), Some(0));
        assert_eq!(term_opcode(ALIAS_OP, 0).unwrap().name_arg_index(), Some(1));
        assert_eq!(term_opcode(0x8a, 0).unwrap().name_arg_index(), Some(2));
        assert_eq!(term_opcode(0x72, 0).unwrap().name_arg_index(), None);
        assert_eq!(term_opcode(EXT_OPCODE_PREFIX, EXT_FIELD_OP).unwrap().name_arg_index(), None);
        assert_eq!(OpcodeInfo::encoded_size(&NAME_STRING), 0);
        assert_eq!(term_opcode(EXT_OPCODE_PREFIX, EXT_DEVICE_OP).unwrap().encoded_size(), 2);
    }
}
