//! Navigating and mutating trees. An object's children are split between its fixed arguments (a slot for each
//! argument of its opcode, e.g. the `NameString` and `DataRefObject` of a `Name`) and its variable arguments (the
//! `TermList` of a `Scope`, the `ByteList` of a `Buffer` and so on).

use crate::{
    api,
    node::{AmlTree, DataType, Node, NodeId},
    opcode::{ArgFormat, BUFFER_OP, PACKAGE_OP},
    pkg_length::pkg_length_for_body,
    AmlError,
    AmlResult,
};
use log::error;

/// Whether `node` can be placed in a fixed argument slot of the given format.
pub(crate) fn fits_fixed_arg(format: ArgFormat, node: &Node) -> bool {
    match (format, node) {
        (ArgFormat::Object, Node::Object(object)) => !object.info.attributes.is_field_element(),
        (ArgFormat::NameString, Node::Data(data)) => data.data_type == DataType::NameString,
        (ArgFormat::String, Node::Data(data)) => data.data_type == DataType::String,
        (ArgFormat::FieldPkgLen, Node::Data(data)) => data.data_type == DataType::FieldPkgLen,
        (ArgFormat::UInt8 | ArgFormat::UInt16 | ArgFormat::UInt32 | ArgFormat::UInt64, Node::Data(data)) => {
            data.data_type == DataType::UInt && Some(data.buffer().len()) == format.integer_width()
        }
        _ => false,
    }
}

/// Whether `child` can be placed in the variable argument list of `parent`.
pub(crate) fn fits_var_args(parent: &Node, child: &Node) -> bool {
    match (parent, child) {
        (Node::Root(_), Node::Object(object)) => !object.info.attributes.is_field_element(),
        (Node::Object(parent), child) => {
            let attributes = parent.info.attributes;
            match child {
                Node::Object(object) if attributes.has_field_list() => object.info.attributes.is_field_element(),
                Node::Object(object) => {
                    let holds_objects = attributes.has_term_list()
                        || attributes.has_package_elements()
                        || attributes.is_method_invocation();
                    holds_objects && !object.info.attributes.is_field_element()
                }
                Node::Data(data) => {
                    attributes.has_byte_list() && matches!(data.data_type, DataType::Raw | DataType::ResourceData)
                }
                Node::Root(_) => false,
            }
        }
        _ => false,
    }
}

impl AmlTree {
    /// Find the root of the tree `node` is part of, by following parent links. For a node that isn't attached to
    /// anything this is the node itself. Returns `None` for an id that doesn't refer to a live node.
    pub fn get_root_node(&self, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        // Parent links can't form a cycle, but bound the walk anyway so a corrupted tree can't hang us
        for _ in 0..=self.node_count() {
            match self.parent(current).ok()? {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }

        error!("Parent links of {:?} form a cycle", node);
        None
    }

    /// If `node` is one of its parent's fixed arguments, returns the index of the slot it occupies.
    pub fn is_fixed_argument(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node).ok()??;
        self.object(parent).ok()?.fixed_args().iter().position(|&arg| arg == Some(node))
    }

    pub fn get_fixed_argument(&self, object: NodeId, index: usize) -> AmlResult<Option<NodeId>> {
        let object = self.object(object)?;
        object
            .fixed_args()
            .get(index)
            .copied()
            .ok_or(AmlError::FixedArgIndexOutOfRange { index, count: object.fixed_args().len() })
    }

    /// Put `new` (which must not be attached to anything) in the fixed argument slot `index` of `object`, or clear
    /// the slot if `new` is `None`. Returns the node that was in the slot, which is now detached and belongs to the
    /// caller: it is not freed.
    ///
    /// This does not propagate size changes up the tree.
    pub fn set_fixed_argument(
        &mut self,
        object: NodeId,
        index: usize,
        new: Option<NodeId>,
    ) -> AmlResult<Option<NodeId>> {
        let info = self.object(object)?.info;
        let count = info.fixed_args.len();
        if index >= count {
            error!("Fixed argument index {} is out of range for {:?} ({} fixed arguments)", index, info, count);
            return Err(AmlError::FixedArgIndexOutOfRange { index, count });
        }

        if let Some(new) = new {
            self.check_can_attach(object, new)?;
            if !fits_fixed_arg(info.fixed_args[index], self.node(new)?) {
                error!("{:?} can't be fixed argument {} of {:?}", self.node(new)?, index, info);
                return Err(AmlError::IncompatibleArgument);
            }
        }

        let old = core::mem::replace(&mut self.object_mut(object)?.fixed_args[index], new);
        if let Some(old) = old {
            self.set_parent(old, None)?;
        }
        if let Some(new) = new {
            self.set_parent(new, Some(object))?;
        }

        Ok(old)
    }

    /// Get the variable argument list of a node, if it has one. Root and object nodes do (although it might not be
    /// allowed to hold anything); data nodes do not.
    pub fn get_variable_arg_list(&self, node: NodeId) -> Option<&[NodeId]> {
        self.node(node).ok()?.var_args()
    }

    /// Append `new` to the variable arguments of `parent`. This does not propagate size changes up the tree: the
    /// caller must do so before the tree is serialized.
    pub(crate) fn var_list_add_tail_internal(&mut self, parent: NodeId, new: NodeId) -> AmlResult<()> {
        self.insert_var_arg(parent, None, new)
    }

    pub fn var_list_add_tail(&mut self, parent: NodeId, new: NodeId) -> AmlResult<()> {
        self.check_buffer_size_can_change(parent)?;
        self.insert_var_arg(parent, None, new)?;
        let size = self.signed_size(new)?;
        self.propagate_information(parent, 1, size)
    }

    pub fn var_list_add_head(&mut self, parent: NodeId, new: NodeId) -> AmlResult<()> {
        self.check_buffer_size_can_change(parent)?;
        self.insert_var_arg(parent, Some(0), new)?;
        let size = self.signed_size(new)?;
        self.propagate_information(parent, 1, size)
    }

    /// Add `new` to the variable argument list that `reference` is part of, in front of `reference`.
    pub fn var_list_add_before(&mut self, reference: NodeId, new: NodeId) -> AmlResult<()> {
        let (parent, index) = self.var_arg_position(reference)?;
        self.check_buffer_size_can_change(parent)?;
        self.insert_var_arg(parent, Some(index), new)?;
        let size = self.signed_size(new)?;
        self.propagate_information(parent, 1, size)
    }

    /// Add `new` to the variable argument list that `reference` is part of, behind `reference`.
    pub fn var_list_add_after(&mut self, reference: NodeId, new: NodeId) -> AmlResult<()> {
        let (parent, index) = self.var_arg_position(reference)?;
        self.check_buffer_size_can_change(parent)?;
        self.insert_var_arg(parent, Some(index + 1), new)?;
        let size = self.signed_size(new)?;
        self.propagate_information(parent, 1, size)
    }

    /// Remove a node from the variable argument list it is part of. The node then belongs to the caller, and must
    /// be freed with [`delete_tree`](AmlTree::delete_tree) (or attached somewhere else). Fixed arguments can't be
    /// detached: replace them instead.
    pub fn detach_node(&mut self, node: NodeId) -> AmlResult<()> {
        let (parent, index) = self.var_arg_position(node)?;
        self.check_buffer_size_can_change(parent)?;
        match self.node_mut(parent)? {
            Node::Root(root) => {
                root.var_args.remove(index);
            }
            Node::Object(object) => {
                object.var_args.remove(index);
            }
            Node::Data(_) => return Err(AmlError::NotAChildOfParent),
        }
        self.set_parent(node, None)?;
        let size = self.signed_size(node)?;
        self.propagate_information(parent, -1, -size)
    }

    /// The next child of `node`'s parent, counting fixed arguments and then variable arguments.
    pub fn get_next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node).ok()??;
        let mut children = self.node(parent).ok()?.children();
        children.by_ref().find(|&child| child == node)?;
        children.next()
    }

    pub fn get_previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node).ok()??;
        let mut previous = None;
        for child in self.node(parent).ok()?.children() {
            if child == node {
                return previous;
            }
            previous = Some(child);
        }
        None
    }

    /// Put `new` in the place of `old`, which must be attached to a tree. `old` is either a fixed argument or in a
    /// variable argument list, and `new` ends up in exactly the same position. `old` is left detached, and belongs to
    /// the caller: it is not freed. Changes in size are propagated up the tree.
    pub fn replace_argument(&mut self, old: NodeId, new: NodeId) -> AmlResult<()> {
        if self.node(old)?.is_root() || self.node(new)?.is_root() {
            error!("Root nodes can't be replaced, or used to replace another node");
            return Err(AmlError::WrongNodeKind);
        }
        let Some(parent) = self.parent(old)? else {
            error!("Can't replace {:?}, as it isn't attached to a tree", old);
            return Err(AmlError::NodeNotAttached);
        };
        self.check_can_attach(parent, new)?;

        // Only a change to a variable argument list changes the size of a `Buffer`'s byte list
        let mut size_delta = 0;
        if let Some(index) = self.is_fixed_argument(old) {
            let format = self.object(parent)?.info.fixed_args[index];
            if !fits_fixed_arg(format, self.node(new)?) {
                return Err(AmlError::IncompatibleArgument);
            }
            self.object_mut(parent)?.fixed_args[index] = Some(new);
        } else {
            let (_, index) = self.var_arg_position(old)?;
            if !fits_var_args(self.node(parent)?, self.node(new)?) {
                return Err(AmlError::IncompatibleArgument);
            }
            self.check_buffer_size_can_change(parent)?;
            size_delta = self.signed_size(new)? - self.signed_size(old)?;
            match self.node_mut(parent)? {
                Node::Root(root) => root.var_args[index] = new,
                Node::Object(object) => object.var_args[index] = new,
                Node::Data(_) => return Err(AmlError::NotAChildOfParent),
            }
        }

        self.set_parent(old, None)?;
        self.set_parent(new, Some(parent))?;
        self.propagate_information(parent, 0, size_delta)
    }

    /// Check that `new` can become a child of `parent`: it must be a live, unattached object or data node, and must
    /// not be `parent` or one of its ancestors.
    fn check_can_attach(&self, parent: NodeId, new: NodeId) -> AmlResult<()> {
        if self.node(new)?.is_root() {
            return Err(AmlError::WrongNodeKind);
        }
        if self.parent(new)?.is_some() {
            error!("{:?} is already attached to {:?}", new, self.parent(new));
            return Err(AmlError::NodeAlreadyAttached);
        }
        if self.get_root_node(parent) == Some(new) {
            error!("Attaching {:?} to {:?} would make it its own ancestor", new, parent);
            return Err(AmlError::IncompatibleArgument);
        }
        Ok(())
    }

    fn insert_var_arg(&mut self, parent: NodeId, index: Option<usize>, new: NodeId) -> AmlResult<()> {
        if self.node(parent)?.var_args().is_none() {
            error!("{:?} is a data node, which can't have variable arguments", parent);
            return Err(AmlError::WrongNodeKind);
        }
        self.check_can_attach(parent, new)?;
        if !fits_var_args(self.node(parent)?, self.node(new)?) {
            error!("{:?} can't be a variable argument of {:?}", self.node(new)?, self.node(parent)?);
            return Err(AmlError::IncompatibleArgument);
        }

        let var_args = match self.node_mut(parent)? {
            Node::Root(root) => &mut root.var_args,
            Node::Object(object) => &mut object.var_args,
            Node::Data(_) => return Err(AmlError::WrongNodeKind),
        };
        var_args.try_reserve(1).map_err(|_| AmlError::OutOfResources)?;
        match index {
            Some(index) => var_args.insert(index, new),
            None => var_args.push(new),
        }

        self.set_parent(new, Some(parent))
    }

    /// Find the parent of `node`, and its index in the parent's variable argument list.
    fn var_arg_position(&self, node: NodeId) -> AmlResult<(NodeId, usize)> {
        let Some(parent) = self.parent(node)? else {
            return Err(AmlError::NodeNotAttached);
        };
        let index = self
            .node(parent)?
            .var_args()
            .and_then(|var_args| var_args.iter().position(|&arg| arg == node))
            .ok_or(AmlError::NotAChildOfParent)?;
        Ok((parent, index))
    }

    /// Update everything above a changed variable argument list: the element count of a `Package` (or argument
    /// count of a method invocation) whose list gained or lost `element_delta` nodes, the `BufferSize` of a
    /// `Buffer` whose byte list grew by `size_delta` bytes, then the sizes of every ancestor.
    pub(crate) fn propagate_information(
        &mut self,
        parent: NodeId,
        element_delta: i32,
        size_delta: i64,
    ) -> AmlResult<()> {
        let info = match self.node(parent)? {
            Node::Object(object) => Some(object.info),
            _ => None,
        };
        if let Some(info) = info {
            if element_delta != 0 {
                let count_index = if info.is(PACKAGE_OP, 0) {
                    Some(0)
                } else if info.attributes.is_method_invocation() {
                    Some(1)
                } else {
                    None
                };
                if let Some(count_index) = count_index {
                    self.adjust_count(parent, count_index, element_delta)?;
                }
            }

            if size_delta != 0 && info.is(BUFFER_OP, 0) {
                // Replacing the size propagates sizes from the buffer up
                return self.adjust_buffer_size(parent, size_delta);
            }
        }

        self.propagate_sizes(parent)
    }

    /// The byte list of a `Buffer` can only be changed if its `BufferSize` is an integer constant that can be kept
    /// in step, and not (for example) a reference to a named object.
    fn check_buffer_size_can_change(&self, parent: NodeId) -> AmlResult<()> {
        match self.node(parent)? {
            Node::Object(object) if object.info.is(BUFFER_OP, 0) => {
                let size = self.get_fixed_argument(parent, 0)?.ok_or(AmlError::MissingFixedArgument { index: 0 })?;
                if let Err(err) = api::integer_value(self, size) {
                    error!("Can't change the contents of {:?}, as its size isn't an integer constant", parent);
                    return Err(err);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Move the `BufferSize` of `buffer` by `delta` bytes. A `BufferSize` larger than the byte list is allowed (the
    /// rest of the buffer is zeroed), and the difference is kept. It never ends up smaller than the byte list.
    fn adjust_buffer_size(&mut self, buffer: NodeId, delta: i64) -> AmlResult<()> {
        let size_node = self.get_fixed_argument(buffer, 0)?.ok_or(AmlError::MissingFixedArgument { index: 0 })?;
        let size = api::integer_value(self, size_node)?;

        let mut byte_list_size = 0;
        for &byte_list in self.node(buffer)?.var_args().unwrap_or(&[]) {
            byte_list_size += self.compute_size(byte_list)?;
        }

        let new_size = (i128::from(size) + i128::from(delta)).max(byte_list_size as i128);
        let new_size = u64::try_from(new_size).map_err(|_| AmlError::ValueTooLarge)?;
        api::update_integer(self, size_node, new_size)?;
        Ok(())
    }

    fn signed_size(&self, node: NodeId) -> AmlResult<i64> {
        i64::try_from(self.compute_size(node)?).map_err(|_| AmlError::ValueTooLarge)
    }

    fn adjust_count(&mut self, object: NodeId, index: usize, delta: i32) -> AmlResult<()> {
        let Some(count_node) = self.get_fixed_argument(object, index)? else {
            return Ok(());
        };
        let count = self.data(count_node)?.integer().ok_or(AmlError::IncompatibleArgument)?;
        let new_count = i64::try_from(count).map_err(|_| AmlError::ValueTooLarge)? + i64::from(delta);
        let new_count = u8::try_from(new_count).map_err(|_| AmlError::ValueTooLarge)?;
        self.data_mut(count_node)?.buffer = alloc::vec![new_count];
        Ok(())
    }

    /// Recompute the PkgLength of `from` and of every object above it, and the length in the header of the root.
    pub(crate) fn propagate_sizes(&mut self, from: NodeId) -> AmlResult<()> {
        let mut current = Some(from);
        while let Some(id) = current {
            match self.node(id)? {
                Node::Root(_) => {
                    let length = u32::try_from(self.compute_size(id)?).map_err(|_| AmlError::ValueTooLarge)?;
                    self.root_mut(id)?.header.length = length;
                }
                Node::Object(object) if object.info.attributes.has_pkg_length() => {
                    let pkg_len = pkg_length_for_body(self.compute_body_size(id)?)?;
                    self.object_mut(id)?.pkg_len = pkg_len;
                }
                Node::Object(_) | Node::Data(_) => (),
            }
            current = self.parent(id)?;
        }
        Ok(())
    }
}
