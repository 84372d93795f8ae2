//! The node arena. Every node of every tree built by this crate lives in an [`AmlTree`], and is referred to by a
//! [`NodeId`]. Nodes refer to their children and parents by id, and so there is exactly one owner of each node: the
//! arena.

use crate::{
    name::AmlName,
    opcode::{OpcodeInfo, MAX_FIXED_ARGS},
    sdt::SdtHeader,
    stream::AmlStream,
    AmlError,
    AmlResult,
};
use alloc::vec::Vec;
use bitvec::prelude::*;
use core::fmt;
use log::{error, warn};

/// Refers to a node in an [`AmlTree`]. The `generation` is bumped each time the slot a node lived in is freed, so
/// an id that outlives its node is caught rather than silently referring to whatever node reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Root(RootNode),
    Object(ObjectNode),
    Data(DataNode),
}

/// The root of a Definition Block. Holds the table's header, and the top-level `TermList`.
#[derive(Clone, Debug)]
pub struct RootNode {
    pub header: SdtHeader,
    pub(crate) var_args: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct ObjectNode {
    pub info: &'static OpcodeInfo,
    pub(crate) fixed_args: [Option<NodeId>; MAX_FIXED_ARGS],
    pub(crate) var_args: Vec<NodeId>,
    /// The PkgLength of the object. This is only meaningful for opcodes that have one, and can be stale between an
    /// `*_internal` operation and the following size fixup.
    pub(crate) pkg_len: u32,
}

impl ObjectNode {
    /// The fixed argument slots this object actually has. Always as long as the opcode's fixed argument list.
    pub fn fixed_args(&self) -> &[Option<NodeId>] {
        &self.fixed_args[..self.info.fixed_args.len()]
    }

    pub fn var_args(&self) -> &[NodeId] {
        &self.var_args
    }

    pub fn pkg_len(&self) -> u32 {
        self.pkg_len
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataType {
    /// An encoded AML `NameString`
    NameString,
    /// A null-terminated ASCII string. The buffer includes the null terminator.
    String,
    /// A little-endian integer. The width of the buffer is the width of the integer in the stream.
    UInt,
    /// Raw bytes (e.g. the `ByteList` of a `Buffer` that isn't a resource template)
    Raw,
    /// A single resource data descriptor, including its header
    ResourceData,
    /// The PkgLength of a field element, in its encoded form
    FieldPkgLen,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DataNode {
    pub data_type: DataType,
    pub(crate) buffer: Vec<u8>,
}

impl DataNode {
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Read the value of a `UInt` data node.
    pub fn integer(&self) -> Option<u64> {
        match self.data_type {
            DataType::UInt if self.buffer.len() <= 8 => {
                Some(self.buffer.iter().rev().fold(0u64, |value, &byte| (value << 8) | u64::from(byte)))
            }
            _ => None,
        }
    }

    /// Decode the length, in bits, held by a `FieldPkgLen` data node.
    pub fn field_length(&self) -> Option<u32> {
        match self.data_type {
            DataType::FieldPkgLen => {
                crate::pkg_length::parse_pkg_length(&mut AmlStream::new(&self.buffer)).ok().map(|(length, _)| length)
            }
            _ => None,
        }
    }

    /// Decode the name held by a `NameString` data node.
    pub fn name(&self) -> AmlResult<AmlName> {
        match self.data_type {
            DataType::NameString => crate::name::parse_name_string(&mut AmlStream::new(&self.buffer)),
            _ => Err(AmlError::IncompatibleArgument),
        }
    }
}

impl Node {
    pub fn as_root(&self) -> Option<&RootNode> {
        match self {
            Node::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Node::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match self {
            Node::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Node::Root(_))
    }

    /// The children of this node that aren't fixed arguments, if this kind of node can have any.
    pub fn var_args(&self) -> Option<&[NodeId]> {
        match self {
            Node::Root(root) => Some(root.var_args.as_slice()),
            Node::Object(object) => Some(object.var_args.as_slice()),
            Node::Data(_) => None,
        }
    }

    /// Every child of the node: fixed arguments in slot order, then variable arguments in list order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        let (fixed, var): (&[Option<NodeId>], &[NodeId]) = match self {
            Node::Root(root) => (&[], root.var_args.as_slice()),
            Node::Object(object) => (object.fixed_args(), object.var_args.as_slice()),
            Node::Data(_) => (&[], &[]),
        };
        fixed.iter().flatten().copied().chain(var.iter().copied())
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Entry {
    parent: Option<NodeId>,
    node: Node,
}

/// The arena that owns every node of one or more trees.
pub struct AmlTree {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl AmlTree {
    pub fn new() -> AmlTree {
        AmlTree { slots: Vec::new(), free_list: Vec::new(), live: 0 }
    }

    pub fn create_root_node(&mut self, header: SdtHeader) -> AmlResult<NodeId> {
        self.allocate(Node::Root(RootNode { header, var_args: Vec::new() }))
    }

    pub fn create_object_node(&mut self, info: &'static OpcodeInfo, pkg_len: u32) -> AmlResult<NodeId> {
        let object = ObjectNode { info, fixed_args: [None; MAX_FIXED_ARGS], var_args: Vec::new(), pkg_len };
        self.allocate(Node::Object(object))
    }

    pub fn create_data_node(&mut self, data_type: DataType, data: &[u8]) -> AmlResult<NodeId> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(data.len()).map_err(|_| AmlError::OutOfResources)?;
        buffer.extend_from_slice(data);
        self.allocate(Node::Data(DataNode { data_type, buffer }))
    }

    fn allocate(&mut self, node: Node) -> AmlResult<NodeId> {
        let entry = Entry { parent: None, node };

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            self.live += 1;
            return Ok(NodeId { index, generation: slot.generation });
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| AmlError::OutOfResources)?;
        self.slots.try_reserve(1).map_err(|_| AmlError::OutOfResources)?;
        self.slots.push(Slot { generation: 0, entry: Some(entry) });
        self.live += 1;
        Ok(NodeId { index, generation: 0 })
    }

    fn entry(&self, id: NodeId) -> AmlResult<&Entry> {
        match self.slots.get(id.index as usize) {
            Some(Slot { generation, entry: Some(entry) }) if *generation == id.generation => Ok(entry),
            _ => Err(AmlError::InvalidNodeId),
        }
    }

    fn entry_mut(&mut self, id: NodeId) -> AmlResult<&mut Entry> {
        match self.slots.get_mut(id.index as usize) {
            Some(Slot { generation, entry: Some(entry) }) if *generation == id.generation => Ok(entry),
            _ => Err(AmlError::InvalidNodeId),
        }
    }

    pub fn node(&self, id: NodeId) -> AmlResult<&Node> {
        self.entry(id).map(|entry| &entry.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> AmlResult<&mut Node> {
        self.entry_mut(id).map(|entry| &mut entry.node)
    }

    pub fn object(&self, id: NodeId) -> AmlResult<&ObjectNode> {
        self.node(id)?.as_object().ok_or(AmlError::WrongNodeKind)
    }

    pub(crate) fn object_mut(&mut self, id: NodeId) -> AmlResult<&mut ObjectNode> {
        match self.node_mut(id)? {
            Node::Object(object) => Ok(object),
            _ => Err(AmlError::WrongNodeKind),
        }
    }

    pub fn data(&self, id: NodeId) -> AmlResult<&DataNode> {
        self.node(id)?.as_data().ok_or(AmlError::WrongNodeKind)
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> AmlResult<&mut DataNode> {
        match self.node_mut(id)? {
            Node::Data(data) => Ok(data),
            _ => Err(AmlError::WrongNodeKind),
        }
    }

    pub fn root(&self, id: NodeId) -> AmlResult<&RootNode> {
        self.node(id)?.as_root().ok_or(AmlError::WrongNodeKind)
    }

    pub(crate) fn root_mut(&mut self, id: NodeId) -> AmlResult<&mut RootNode> {
        match self.node_mut(id)? {
            Node::Root(root) => Ok(root),
            _ => Err(AmlError::WrongNodeKind),
        }
    }

    pub fn parent(&self, id: NodeId) -> AmlResult<Option<NodeId>> {
        self.entry(id).map(|entry| entry.parent)
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> AmlResult<()> {
        self.entry_mut(id)?.parent = parent;
        Ok(())
    }

    pub fn is_valid(&self, id: NodeId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        matches!(self.parent(id), Ok(Some(_)))
    }

    /// The number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.live
    }

    /// Free a node and everything below it. The node must not be part of a tree: detach it first. Root nodes never
    /// have a parent, and so can always be deleted.
    pub fn delete_tree(&mut self, id: NodeId) -> AmlResult<()> {
        if self.parent(id)?.is_some() {
            error!("Tried to delete {:?}, which is still attached to {:?}", id, self.parent(id));
            return Err(AmlError::NodeAlreadyAttached);
        }

        let mut to_free = Vec::new();
        to_free.push(id);
        while let Some(id) = to_free.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                to_free.extend(entry.node.children());
                self.live -= 1;
                // A slot whose generation can't be bumped again is never reused
                match slot.generation.checked_add(1) {
                    Some(generation) => {
                        slot.generation = generation;
                        self.free_list.push(id.index);
                    }
                    None => warn!("Retiring node slot {}, as its generation has run out", id.index),
                }
            }
        }

        Ok(())
    }

    /// Iterate over the ids of every live node.
    pub(crate) fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| NodeId { index: index as u32, generation: slot.generation })
        })
    }

    /// Find every node that can be reached from a root node. Nodes that aren't marked belong to a detached subtree.
    pub fn reachable_from_roots(&self) -> BitVec {
        let mut marked = bitvec![0; self.slots.len()];
        let mut to_visit: Vec<NodeId> =
            self.ids().filter(|&id| self.node(id).map(Node::is_root).unwrap_or(false)).collect();

        while let Some(id) = to_visit.pop() {
            if marked.replace(id.index as usize, true) {
                continue;
            }
            if let Ok(node) = self.node(id) {
                to_visit.extend(node.children());
            }
        }

        marked
    }

    /// Object and data nodes that aren't part of any tree, and that haven't been freed. Each returned node is the
    /// top of a detached subtree. A node is "detached but not freed" from when it's created or detached until it's
    /// attached or passed to [`delete_tree`](Self::delete_tree).
    pub fn detached_nodes(&self) -> Vec<NodeId> {
        self.ids()
            .filter(|&id| matches!(self.entry(id), Ok(Entry { parent: None, node }) if !node.is_root()))
            .collect()
    }

    /// The number of live nodes that can't be reached from any root.
    pub fn unreachable_node_count(&self) -> usize {
        let marked = self.reachable_from_roots();
        self.ids().filter(|id| !marked[id.index as usize]).count()
    }
}

impl Default for AmlTree {
    fn default() -> Self {
        AmlTree::new()
    }
}

impl fmt::Debug for AmlTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AmlTree({} nodes)", self.live)
    }
}

impl Drop for AmlTree {
    fn drop(&mut self) {
        if cfg!(debug_assertions) {
            for id in self.detached_nodes() {
                warn!("Node {:?} was detached from its tree but never freed: {:?}", id, self.node(id));
            }
        }
    }
}
