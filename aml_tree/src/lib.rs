//! `aml_tree` builds a mutable, in-memory tree from the AML bytecode of an ACPI Definition Block (a DSDT or an
//! SSDT), lets you inspect and patch it, and serializes it back into a table that can be installed. It is aimed
//! at firmware and hypervisors that generate or fix up ACPI tables, rather than at operating systems that need to
//! interpret AML.
//!
//! ### Usage
//! Parse a table with [`parse_definition_block`](crate::parser::parse_definition_block). This gives you an
//! [`AmlTree`](crate::node::AmlTree) (the arena that owns every node) and the [`NodeId`](crate::node::NodeId) of
//! the root node. From there:
//!    - [`api::find_node`](crate::api::find_node) finds objects by their ASL path (e.g. `\_SB.COM0._CRS`)
//!    - the methods in [`tree`](crate::tree) navigate and mutate the tree (fixed arguments, variable argument
//!      lists, argument replacement)
//!    - [`resource`](crate::resource) decodes and patches resource data descriptors
//!    - [`serialize_definition_block`](crate::node::AmlTree::serialize_definition_block) gives you the
//!      bytes back, with the table length and checksum fixed up.
//!
//! New tables can also be built from scratch with the [`codegen`](crate::codegen) module.

/*
 * Contributing notes:
 *    - Nodes never own each other. Every node lives in the `AmlTree` arena, and parent/child relationships are
 *      stored as `NodeId`s. A node that has been detached from the tree belongs to whoever detached it: nothing
 *      frees it implicitly, and `AmlTree::detached_nodes` will report it until `delete_tree` is called on it.
 *    - Functions that mutate the tree come in two flavours. The `*_internal` and `set_fixed_argument` operations
 *      do not touch the PkgLengths of ancestors, and so leave the tree in a state that can't be serialized until
 *      sizes are propagated. The public list operations and `replace_argument` propagate sizes themselves.
 */

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod api;
pub mod codegen;
pub mod dbg;
pub mod iter;
pub mod name;
pub mod node;
pub mod opcode;
pub mod parser;
pub mod pkg_length;
pub mod registry;
pub mod resource;
pub mod resource_codegen;
pub mod sdt;
pub mod serialize;
pub mod stream;
pub mod tree;

#[cfg(test)]
mod test_utils;

pub use crate::{
    name::AmlName,
    node::{AmlTree, DataType, Node, NodeId},
    parser::{parse_definition_block, ParseOptions},
    sdt::SdtHeader,
};

/// Controls how much the parser logs (at `trace` level) while it builds a tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum DebugVerbosity {
    /// Print no debug information
    None,
    /// Print the entry and exit of each object that opens a scope (`Scope`, `Device`, `Method`, ...)
    Scopes,
    /// Print the entry and exit of every object
    AllScopes,
    /// Print every object, along with its fixed arguments
    All,
}

/// The firmware-style status that an [`AmlError`] maps onto. Callers that only care about the broad class of a
/// failure (e.g. to turn it into an EFI status) can match on this instead of on the error itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// An argument had the wrong shape, type, or range. This indicates a bug in the caller (or a malformed
    /// input stream), and should not be retried.
    InvalidParameter,
    /// An allocation failed.
    OutOfResources,
    /// A lookup missed.
    NotFound,
}

#[derive(Clone, PartialEq, Debug)]
pub enum AmlError {
    /*
     * Errors produced while parsing the AML stream.
     */
    UnexpectedEndOfStream,
    UnexpectedByte(u8),
    IllegalOpcode(u16),
    InvalidPkgLength,
    InvalidNameString,
    InvalidTableLength { header: u32, buffer: usize },
    InvalidChecksum,
    /// The stream ended part of the way through a resource data descriptor.
    ResourceDescriptorTooShort,
    ReservedResourceType,
    /// Terms were nested more deeply than `ParseOptions::max_nesting_depth` allows.
    NestingTooDeep,

    /*
     * Errors produced by names and namespace lookups.
     */
    InvalidNameSeg,
    InvalidNormalizedName(AmlName),
    EmptyNamesAreInvalid,
    RootHasNoParent,
    ObjectDoesNotExist(AmlName),

    /*
     * Errors produced by tree operations.
     */
    /// The `NodeId` does not refer to a live node (it was never allocated, or the node has since been freed).
    InvalidNodeId,
    /// The node was not of the kind (`Root`, `Object` or `Data`) the operation needs.
    WrongNodeKind,
    /// The object's opcode is not the one the operation needs.
    WrongOpcode,
    FixedArgIndexOutOfRange { index: usize, count: usize },
    /// A node was passed that fits neither the fixed argument format nor the variable argument list it is being
    /// placed in.
    IncompatibleArgument,
    /// The operation needs a node that is not part of any tree, but the node has a parent.
    NodeAlreadyAttached,
    /// The operation needs a node that is part of a tree, but the node has no parent.
    NodeNotAttached,
    /// The node is not one of its parent's arguments. This indicates the tree has been corrupted.
    NotAChildOfParent,
    /// A fixed argument slot was empty when the object was serialized.
    MissingFixedArgument { index: usize },
    /// The resource template has no EndTag to insert new descriptors in front of.
    EndTagNotFound,
    /// A cached PkgLength does not match the size of the object's contents. This means an `*_internal`
    /// operation was used without a following size fixup.
    PkgLengthMismatch { expected: u32, cached: u32 },
    ValueTooLarge,
    OutOfResources,

    /*
     * Errors produced by the table registry.
     */
    RegistryNotInitialized,
    RegistryAlreadyInitialized,
    TableKeyDoesNotExist(u32),
}

impl AmlError {
    pub fn status(&self) -> Status {
        match self {
            AmlError::OutOfResources => Status::OutOfResources,
            AmlError::ObjectDoesNotExist(_) | AmlError::EndTagNotFound | AmlError::TableKeyDoesNotExist(_) => {
                Status::NotFound
            }
            _ => Status::InvalidParameter,
        }
    }
}

pub type AmlResult<T> = core::result::Result<T, AmlError>;

/// Compute the byte that makes `bytes` (plus that byte) sum to zero. This is the checksum used by ACPI table
/// headers and by the EndTag resource descriptor.
pub fn checksum8(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
    0u8.wrapping_sub(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(AmlError::OutOfResources.status(), Status::OutOfResources);
        assert_eq!(AmlError::EndTagNotFound.status(), Status::NotFound);
        assert_eq!(AmlError::FixedArgIndexOutOfRange { index: 3, count: 3 }.status(), Status::InvalidParameter);
        assert_eq!(AmlError::TableKeyDoesNotExist(4).status(), Status::NotFound);
    }

    #[test]
    fn checksum() {
        assert_eq!(checksum8(&[]), 0);
        assert_eq!(checksum8(&[0x79]), 0x87);
        let bytes = [0x12, 0xf4, 0x33, 0x00, 0x8a];
        let sum = bytes.iter().fold(checksum8(&bytes), |sum, &b| sum.wrapping_add(b));
        assert_eq!(sum, 0);
    }
}
