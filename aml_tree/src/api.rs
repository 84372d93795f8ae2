//! Higher-level operations built on top of the tree primitives: finding objects by their path, reading and
//! patching integers, walking resource templates, and copying subtrees.

use crate::{
    codegen,
    name::AmlName,
    node::{AmlTree, DataType, Node, NodeId},
    opcode::{BUFFER_OP, BYTE_PREFIX, DWORD_PREFIX, NAME_OP, ONES_OP, ONE_OP, QWORD_PREFIX, WORD_PREFIX, ZERO_OP},
    AmlError,
    AmlResult,
};
use alloc::vec::Vec;
use log::{error, trace};

/// Find the object that `path` refers to. Relative paths are resolved against the scope of `reference`: for the
/// root, or an object that opens a scope (e.g. a `Device`), this is the scope it defines; for any other node it is
/// the scope the node is in. Single-segment relative paths follow the ACPI namespace search rules, and so are also
/// looked for in each enclosing scope.
pub fn find_node(tree: &AmlTree, reference: NodeId, path: &str) -> AmlResult<NodeId> {
    let path = AmlName::from_str(path)?;
    let root = tree.get_root_node(reference).ok_or(AmlError::InvalidNodeId)?;

    let mut scope = reference_scope(tree, reference)?;
    loop {
        let target = path.resolve(&scope)?;
        if let Some(node) = search(tree, root, &AmlName::root(), &target)? {
            return Ok(node);
        }

        if !path.search_rules_apply() {
            break;
        }
        match scope.parent() {
            Ok(parent) => scope = parent,
            Err(_) => break,
        }
    }

    trace!("Couldn't find {} (relative to {:?})", path, reference);
    Err(AmlError::ObjectDoesNotExist(path))
}

fn search(tree: &AmlTree, node: NodeId, scope: &AmlName, target: &AmlName) -> AmlResult<Option<NodeId>> {
    let node_ref = tree.node(node)?;
    let mut inner_scope = None;

    if let Node::Object(object) = node_ref {
        if object.info.name_arg_index().is_some() {
            let name = node_name(tree, node)?.resolve(scope)?;
            if name == *target {
                return Ok(Some(node));
            }
            if object.info.attributes.opens_scope() {
                inner_scope = Some(name);
            }
        }
    }

    let scope = inner_scope.as_ref().unwrap_or(scope);
    for &child in node_ref.var_args().unwrap_or(&[]) {
        if let Some(found) = search(tree, child, scope, target)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// The scope relative paths are resolved against, when looking up names from `node`.
fn reference_scope(tree: &AmlTree, node: NodeId) -> AmlResult<AmlName> {
    match tree.node(node)? {
        Node::Root(_) => Ok(AmlName::root()),
        Node::Object(object) if object.info.attributes.opens_scope() => absolute_name(tree, node),
        _ => enclosing_scope(tree, node),
    }
}

/// The absolute name of the scope `node` is in, built from the names of the ancestors that open a scope.
pub fn enclosing_scope(tree: &AmlTree, node: NodeId) -> AmlResult<AmlName> {
    let mut scopes = Vec::new();
    let mut current = tree.parent(node)?;
    while let Some(id) = current {
        if let Node::Object(object) = tree.node(id)? {
            if object.info.attributes.opens_scope() {
                scopes.push(id);
            }
        }
        current = tree.parent(id)?;
    }

    let mut scope = AmlName::root();
    for &id in scopes.iter().rev() {
        scope = node_name(tree, id)?.resolve(&scope)?;
    }
    Ok(scope)
}

/// The absolute name of the object `node` defines.
pub fn absolute_name(tree: &AmlTree, node: NodeId) -> AmlResult<AmlName> {
    node_name(tree, node)?.resolve(&enclosing_scope(tree, node)?)
}

/// The name an object defines, as it is written in the AML (and so possibly relative).
pub fn node_name(tree: &AmlTree, object: NodeId) -> AmlResult<AmlName> {
    let info = tree.object(object)?.info;
    let Some(index) = info.name_arg_index() else {
        error!("{:?} doesn't define a name", info);
        return Err(AmlError::WrongOpcode);
    };

    match tree.get_fixed_argument(object, index)? {
        Some(name) => tree.data(name)?.name(),
        None => Err(AmlError::MissingFixedArgument { index }),
    }
}

/// Get the `Buffer` that holds the resource template of `Name(name, ResourceTemplate() { ... })`.
pub(crate) fn name_op_get_buffer(tree: &AmlTree, name_op: NodeId) -> AmlResult<NodeId> {
    if !tree.object(name_op)?.info.is(NAME_OP, 0) {
        error!("{:?} is not a Name", tree.object(name_op)?.info);
        return Err(AmlError::WrongOpcode);
    }

    let buffer = tree.get_fixed_argument(name_op, 1)?.ok_or(AmlError::MissingFixedArgument { index: 1 })?;
    match tree.node(buffer)? {
        Node::Object(object) if object.info.is(BUFFER_OP, 0) => Ok(buffer),
        _ => Err(AmlError::WrongOpcode),
    }
}

/// Get the first resource data descriptor of the resource template held by the `Name` object `name_op`. Returns
/// `None` if the buffer is empty or wasn't split into descriptors (it wasn't a valid resource template).
pub fn name_op_get_first_rd_node(tree: &AmlTree, name_op: NodeId) -> AmlResult<Option<NodeId>> {
    let buffer = name_op_get_buffer(tree, name_op)?;
    match tree.get_variable_arg_list(buffer).and_then(|list| list.first()) {
        Some(&first) if tree.data(first)?.data_type == DataType::ResourceData => Ok(Some(first)),
        _ => Ok(None),
    }
}

/// Get the resource data descriptor following `rd_node` in its resource template.
pub fn get_next_rd_node(tree: &AmlTree, rd_node: NodeId) -> AmlResult<Option<NodeId>> {
    if tree.data(rd_node)?.data_type != DataType::ResourceData {
        return Err(AmlError::WrongNodeKind);
    }

    match tree.get_next_sibling(rd_node) {
        Some(next) if tree.data(next)?.data_type == DataType::ResourceData => Ok(Some(next)),
        _ => Ok(None),
    }
}

/// Read the value of an integer object (`Zero`, `One`, `Ones`, or one of the integer prefixes).
pub fn integer_value(tree: &AmlTree, node: NodeId) -> AmlResult<u64> {
    let info = tree.object(node)?.info;
    match info.opcode {
        _ if info.is_extended() || info.attributes.is_pseudo() || info.attributes.is_field_element() => {
            Err(AmlError::WrongOpcode)
        }
        ZERO_OP => Ok(0),
        ONE_OP => Ok(1),
        ONES_OP => Ok(u64::MAX),
        BYTE_PREFIX | WORD_PREFIX | DWORD_PREFIX | QWORD_PREFIX => {
            let data = tree.get_fixed_argument(node, 0)?.ok_or(AmlError::MissingFixedArgument { index: 0 })?;
            tree.data(data)?.integer().ok_or(AmlError::IncompatibleArgument)
        }
        _ => Err(AmlError::WrongOpcode),
    }
}

/// Replace the integer object `node` with one holding `value`, using the smallest encoding. `node` is freed, and
/// the id of the new object returned. Sizes are propagated up the tree.
pub fn update_integer(tree: &mut AmlTree, node: NodeId, value: u64) -> AmlResult<NodeId> {
    integer_value(tree, node)?;

    let new = codegen::code_gen_integer(tree, value)?;
    if let Err(err) = tree.replace_argument(node, new) {
        tree.delete_tree(new)?;
        return Err(err);
    }
    tree.delete_tree(node)?;
    Ok(new)
}

/// Make a copy of `node` and everything below it. The copy is detached, and belongs to the caller.
pub fn clone_tree(tree: &mut AmlTree, node: NodeId) -> AmlResult<NodeId> {
    let (copy, fixed_args, var_args) = match tree.node(node)?.clone() {
        Node::Root(root) => (tree.create_root_node(root.header)?, Vec::new(), root.var_args),
        Node::Object(object) => {
            let fixed_args = object.fixed_args().to_vec();
            (tree.create_object_node(object.info, object.pkg_len)?, fixed_args, object.var_args)
        }
        Node::Data(data) => return tree.create_data_node(data.data_type, &data.buffer),
    };

    let result = clone_children(tree, copy, &fixed_args, &var_args);
    match result {
        Ok(()) => Ok(copy),
        Err(err) => {
            tree.delete_tree(copy)?;
            Err(err)
        }
    }
}

fn clone_children(
    tree: &mut AmlTree,
    copy: NodeId,
    fixed_args: &[Option<NodeId>],
    var_args: &[NodeId],
) -> AmlResult<()> {
    for (index, arg) in fixed_args.iter().enumerate() {
        if let Some(arg) = arg {
            let arg_copy = clone_tree(tree, *arg)?;
            if let Err(err) = tree.set_fixed_argument(copy, index, Some(arg_copy)) {
                tree.delete_tree(arg_copy)?;
                return Err(err);
            }
        }
    }

    for &arg in var_args {
        let arg_copy = clone_tree(tree, arg)?;
        if let Err(err) = tree.var_list_add_tail_internal(copy, arg_copy) {
            tree.delete_tree(arg_copy)?;
            return Err(err);
        }
    }
    Ok(())
}

/// Add `node` to the end of `parent`'s variable arguments, propagating sizes.
pub fn attach_node(tree: &mut AmlTree, parent: NodeId, node: NodeId) -> AmlResult<()> {
    tree.var_list_add_tail(parent, node)
}

/// Remove `node` from its parent's variable arguments. The caller is responsible for freeing it.
pub fn detach_node(tree: &mut AmlTree, node: NodeId) -> AmlResult<()> {
    tree.detach_node(node)
}
