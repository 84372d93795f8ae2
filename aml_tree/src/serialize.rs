//! Turning a tree back into AML. Sizes are always derived from the content of the tree; the PkgLengths cached in
//! object nodes are only checked against them, so a tree that was changed without its sizes being propagated is
//! refused rather than producing a corrupt table.

use crate::{
    checksum8,
    node::{AmlTree, DataType, Node, NodeId, ObjectNode},
    opcode::EXT_OPCODE_PREFIX,
    pkg_length::{encode_pkg_length, encoded_size, parse_pkg_length, pkg_length_for_body},
    sdt::SdtHeader,
    stream::AmlStream,
    AmlError,
    AmlResult,
};
use alloc::vec::Vec;
use log::{error, trace};

/// Index of the fixed argument of a method invocation that holds its argument count. It isn't emitted.
const INVOCATION_ARG_COUNT: usize = 1;

impl AmlTree {
    /// The number of bytes `node` (and everything below it) takes up when serialized.
    pub fn compute_size(&self, node: NodeId) -> AmlResult<usize> {
        match self.node(node)? {
            Node::Root(_) => Ok(SdtHeader::SIZE + self.compute_body_size(node)?),
            Node::Object(object) => {
                let body_size = self.compute_body_size(node)?;
                let pkg_length_size = if object.info.attributes.has_pkg_length() {
                    encoded_size(pkg_length_for_body(body_size)?)?
                } else {
                    0
                };
                Ok(object.info.encoded_size() + pkg_length_size + body_size)
            }
            Node::Data(data) => Ok(data.buffer().len()),
        }
    }

    /// The size of everything an object (or root) contains after its opcode and PkgLength: its fixed arguments and
    /// its variable arguments.
    pub(crate) fn compute_body_size(&self, node: NodeId) -> AmlResult<usize> {
        let node = self.node(node)?;
        let emitted_fixed: &[Option<NodeId>] = match node {
            Node::Object(object) => emitted_fixed_args(object),
            _ => &[],
        };

        let mut size = 0;
        for &arg in emitted_fixed.iter().flatten() {
            size += self.compute_size(arg)?;
        }
        for &arg in node.var_args().unwrap_or(&[]) {
            size += self.compute_size(arg)?;
        }
        Ok(size)
    }

    /// Append the AML encoding of `node` to `out`.
    pub fn serialize_node(&self, node: NodeId, out: &mut Vec<u8>) -> AmlResult<()> {
        match self.node(node)? {
            Node::Root(root) => {
                root.header.write(out);
                for &arg in &root.var_args {
                    self.serialize_node(arg, out)?;
                }
            }

            Node::Object(object) => {
                let info = object.info;
                if !info.attributes.is_pseudo() {
                    if info.is_extended() {
                        out.push(EXT_OPCODE_PREFIX);
                        out.push(info.sub_opcode);
                    } else {
                        out.push(info.opcode);
                    }
                }

                if info.attributes.has_pkg_length() {
                    let expected = pkg_length_for_body(self.compute_body_size(node)?)?;
                    if expected != object.pkg_len {
                        error!(
                            "Cached PkgLength of {:?} is stale: should be {}, is {}",
                            info, expected, object.pkg_len
                        );
                        return Err(AmlError::PkgLengthMismatch { expected, cached: object.pkg_len });
                    }
                    encode_pkg_length(object.pkg_len, out)?;
                }

                for (index, arg) in emitted_fixed_args(object).iter().enumerate() {
                    match arg {
                        Some(arg) => self.serialize_node(*arg, out)?,
                        None => {
                            error!("Fixed argument {} of {:?} is missing", index, info);
                            return Err(AmlError::MissingFixedArgument { index });
                        }
                    }
                }
                for &arg in &object.var_args {
                    self.serialize_node(arg, out)?;
                }
            }

            Node::Data(data) => {
                if data.data_type == DataType::FieldPkgLen {
                    // Make sure it actually holds one encoded PkgLength
                    let mut stream = AmlStream::new(data.buffer());
                    parse_pkg_length(&mut stream)?;
                    if !stream.is_empty() {
                        return Err(AmlError::InvalidPkgLength);
                    }
                }
                out.extend_from_slice(data.buffer());
            }
        }

        Ok(())
    }

    /// Serialize a whole Definition Block. The length and checksum in the header (both in the returned bytes and in
    /// the root node) are recomputed.
    pub fn serialize_definition_block(&mut self, root: NodeId) -> AmlResult<Vec<u8>> {
        let size = self.compute_size(root)?;
        let length = u32::try_from(size).map_err(|_| AmlError::ValueTooLarge)?;
        {
            let header = &mut self.root_mut(root)?.header;
            header.length = length;
            header.checksum = 0;
        }

        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).map_err(|_| AmlError::OutOfResources)?;
        self.serialize_node(root, &mut bytes)?;
        debug_assert_eq!(bytes.len(), size);

        let checksum = checksum8(&bytes);
        bytes[9] = checksum;
        self.root_mut(root)?.header.checksum = checksum;

        trace!("Serialized {} ({} bytes, checksum {:#04x})", self.root(root)?.header.signature, size, checksum);
        Ok(bytes)
    }
}

fn emitted_fixed_args(object: &ObjectNode) -> &[Option<NodeId>] {
    let fixed_args = object.fixed_args();
    if object.info.attributes.is_method_invocation() {
        &fixed_args[..INVOCATION_ARG_COUNT]
    } else {
        fixed_args
    }
}
