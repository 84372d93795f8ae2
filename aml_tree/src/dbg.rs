use crate::{
    node::{AmlTree, DataNode, DataType, Node, NodeId},
    AmlError,
};
use core::{fmt, str};

const INDENT_PER_LEVEL: usize = 2;

impl AmlTree {
    /// Get something that prints the tree below `node`, one node per line, indented by depth.
    pub fn display(&self, node: NodeId) -> TreeDisplay<'_> {
        TreeDisplay { tree: self, node }
    }
}

pub struct TreeDisplay<'t> {
    tree: &'t AmlTree,
    node: NodeId,
}

impl TreeDisplay<'_> {
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * INDENT_PER_LEVEL)?;

        let node = match self.tree.node(id) {
            Ok(node) => node,
            Err(AmlError::InvalidNodeId) => return writeln!(f, "<freed node {:?}>", id),
            Err(err) => return writeln!(f, "<{:?}>", err),
        };

        match node {
            Node::Root(root) => {
                writeln!(f, "DefinitionBlock {} (length {})", root.header.signature, root.header.length)?;
            }
            Node::Object(object) => {
                if object.info.attributes.has_pkg_length() {
                    writeln!(f, "{} (PkgLength {})", object.info.name, object.pkg_len())?;
                } else {
                    writeln!(f, "{}", object.info.name)?;
                }
            }
            Node::Data(data) => {
                fmt_data(f, data)?;
                writeln!(f)?;
            }
        }

        for child in node.children() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

fn fmt_data(f: &mut fmt::Formatter<'_>, data: &DataNode) -> fmt::Result {
    match data.data_type {
        DataType::NameString => match data.name() {
            Ok(name) => write!(f, "NameString {}", name),
            Err(_) => write!(f, "NameString <invalid: {:02x?}>", data.buffer()),
        },
        DataType::String => {
            let bytes = data.buffer().strip_suffix(&[0]).unwrap_or(data.buffer());
            match str::from_utf8(bytes) {
                Ok(string) => write!(f, "String {:?}", string),
                Err(_) => write!(f, "String <invalid: {:02x?}>", data.buffer()),
            }
        }
        DataType::UInt => match data.integer() {
            Some(value) => write!(f, "UInt {:#x}", value),
            None => write!(f, "UInt <invalid: {:02x?}>", data.buffer()),
        },
        DataType::FieldPkgLen => match data.field_length() {
            Some(length) => write!(f, "FieldPkgLen {}", length),
            None => write!(f, "FieldPkgLen <invalid: {:02x?}>", data.buffer()),
        },
        DataType::Raw => write!(f, "Raw {:02x?}", data.buffer()),
        DataType::ResourceData => write!(f, "ResourceData {:02x?}", data.buffer()),
    }
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.node, 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{codegen, test_utils::*, AmlTree};
    use alloc::string::ToString;

    #[test]
    fn display_generated_table() {
        let mut tree = AmlTree::new();
        let root = codegen::code_gen_definition_block(&mut tree, *b"SSDT", 2, "RUSTOS", "AMLTREE", 1).unwrap();
        codegen::code_gen_name_integer(&mut tree, "VAL0", 0x1234, Some(root)).unwrap();
        codegen::code_gen_name_string(&mut tree, "STR0", "hi", Some(root)).unwrap();

        assert_eq!(
            tree.display(root).to_string(),
            "DefinitionBlock SSDT (length 53)\n\
             \x20 Name\n\
             \x20   NameString VAL0\n\
             \x20   WordPrefix\n\
             \x20     UInt 0x1234\n\
             \x20 Name\n\
             \x20   NameString STR0\n\
             \x20   StringPrefix\n\
             \x20     String \"hi\"\n"
        );
    }

    #[test]
    fn display_parsed_table() {
        let (tree, root) = parse_fixture();
        let dump = tree.display(root).to_string();
        assert_eq!(dump.lines().count(), tree.node_count());
        assert!(dump.contains("    Device (PkgLength 61)\n"));
        assert!(dump.contains("NameString \\_SB_.EXT0\n"));
        assert!(dump.contains("FieldPkgLen 32\n"));
        assert!(dump.contains("ResourceData [79, 00]\n"));

        let device = find(&tree, root, "\\_SB.COM0");
        assert!(tree.display(device).to_string().starts_with("Device (PkgLength 61)\n  NameString COM0\n"));
    }
}
