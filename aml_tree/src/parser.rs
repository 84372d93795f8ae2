//! Building a tree from the AML of a Definition Block.
//!
//! The parser is a straightforward recursive descent over the grammar in ACPI 6.4 §20, driven by the opcode
//! table: once an opcode is recognised, its `OpcodeInfo` says what follows it. The only context it needs to keep
//! is the current scope, and the names of the methods it has seen, as a `NameString` in a `TermList` is a method
//! invocation (followed by the method's arguments) if it refers to a method.

use crate::{
    name::{is_lead_name_char, is_name_string_start, parse_name_string},
    node::{AmlTree, DataType, NodeId},
    opcode::{
        self,
        ArgFormat,
        OpcodeInfo,
        EXTERNAL_METHOD_OBJECT_TYPE,
        EXTERNAL_OP,
        EXT_OPCODE_PREFIX,
        METHOD_INVOCATION,
        METHOD_OP,
        NAMED_FIELD,
        NAME_STRING,
    },
    pkg_length::{parse_object_pkg_length, parse_pkg_length, pkg_length_for_body},
    resource,
    sdt::{validate_table_checksum, SdtHeader},
    stream::AmlStream,
    AmlError,
    AmlName,
    AmlResult,
    DebugVerbosity,
};
use alloc::collections::BTreeMap;
use log::{error, trace};

const INDENT_PER_SCOPE: usize = 2;

/// The low three bits of a method's flags are its argument count.
const METHOD_ARG_COUNT_MASK: u8 = 0x07;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub verbosity: DebugVerbosity,
    /// Check that the bytes of the table sum to zero before parsing it.
    pub validate_checksum: bool,
    /// Split the `ByteList` of each `Buffer` that holds a resource template into a node per resource descriptor,
    /// rather than keeping it as a single raw node.
    pub split_resource_templates: bool,
    /// How deeply terms can be nested (e.g. `Return (LNot (LNot (Zero)))` is nested 4 deep) before the table is
    /// rejected. The parser recurses on nested terms, so this bounds how much stack it uses.
    pub max_nesting_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            verbosity: DebugVerbosity::None,
            validate_checksum: true,
            split_resource_templates: true,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// Parse a Definition Block (a DSDT or SSDT, including its header) into a new tree. Returns the arena holding the
/// tree, and the id of its root node.
pub fn parse_definition_block(bytes: &[u8], options: &ParseOptions) -> AmlResult<(AmlTree, NodeId)> {
    let header = SdtHeader::from_bytes(bytes)?;
    let length = header.length as usize;
    if length < SdtHeader::SIZE || length > bytes.len() {
        error!("Table header says the table is {} bytes, but {} bytes were given", header.length, bytes.len());
        return Err(AmlError::InvalidTableLength { header: header.length, buffer: bytes.len() });
    }

    let table = &bytes[..length];
    if options.validate_checksum {
        validate_table_checksum(table)?;
    }
    if !header.is_definition_block() {
        trace!("Parsing table with signature {} as a Definition Block", header.signature);
    }

    let mut parser = Parser::new(options);
    let root = parser.tree.create_root_node(header)?;
    let mut stream = AmlStream::new(&table[SdtHeader::SIZE..]);

    match parser.parse_term_list(root, &mut stream).and_then(|()| parser.normalize_pkg_lengths(root)) {
        Ok(()) => Ok((parser.tree, root)),
        Err(err) => {
            error!("Failed to parse {}: {:?} (near {:?})", header.signature, err, stream);
            parser.discard(root);
            Err(err)
        }
    }
}

struct Parser<'o> {
    tree: AmlTree,
    options: &'o ParseOptions,
    /// The scope names are currently relative to
    scope: AmlName,
    /// Absolute names of the methods defined (or declared with `External`) so far, along with their argument counts
    methods: BTreeMap<AmlName, u8>,
    scope_indent: usize,
    depth: usize,
}

impl<'o> Parser<'o> {
    fn new(options: &'o ParseOptions) -> Parser<'o> {
        Parser {
            tree: AmlTree::new(),
            options,
            scope: AmlName::root(),
            methods: BTreeMap::new(),
            scope_indent: 0,
            depth: 0,
        }
    }

    fn comment(&self, verbosity: DebugVerbosity, message: core::fmt::Arguments) {
        if verbosity <= self.options.verbosity {
            trace!("{:indent$}{}", "", message, indent = self.scope_indent);
        }
    }

    fn scope_verbosity(info: &OpcodeInfo) -> DebugVerbosity {
        if info.attributes.opens_scope() {
            DebugVerbosity::Scopes
        } else {
            DebugVerbosity::AllScopes
        }
    }

    fn parse_term_list(&mut self, parent: NodeId, stream: &mut AmlStream) -> AmlResult<()> {
        /*
         * TermList := Nothing | <TermObj TermList>
         */
        while !stream.is_empty() {
            let term = self.parse_term(stream)?;
            self.tree.var_list_add_tail_internal(parent, term)?;
        }
        Ok(())
    }

    fn parse_term(&mut self, stream: &mut AmlStream) -> AmlResult<NodeId> {
        if self.depth >= self.options.max_nesting_depth {
            error!("Terms are nested more than {} deep", self.options.max_nesting_depth);
            return Err(AmlError::NestingTooDeep);
        }

        self.depth += 1;
        let result = self.parse_nested_term(stream);
        self.depth -= 1;
        result
    }

    fn parse_nested_term(&mut self, stream: &mut AmlStream) -> AmlResult<NodeId> {
        if is_name_string_start(stream.peek()?) {
            return self.parse_name_or_invocation(stream);
        }

        let opcode = stream.next()?;
        let info = if opcode == EXT_OPCODE_PREFIX {
            let sub_opcode = stream.next()?;
            opcode::term_opcode(opcode, sub_opcode)
                .ok_or(AmlError::IllegalOpcode(u16::from_be_bytes([opcode, sub_opcode])))?
        } else {
            opcode::term_opcode(opcode, 0).ok_or(AmlError::IllegalOpcode(u16::from(opcode)))?
        };

        self.parse_object(info, stream)
    }

    fn parse_object(&mut self, info: &'static OpcodeInfo, stream: &mut AmlStream) -> AmlResult<NodeId> {
        let object = self.tree.create_object_node(info, 0)?;

        let verbosity = Self::scope_verbosity(info);
        self.comment(verbosity, format_args!("--> {}", info.name));
        self.scope_indent += INDENT_PER_SCOPE;

        let result = if info.attributes.has_pkg_length() {
            parse_object_pkg_length(stream).and_then(|(pkg_len, mut body)| {
                self.tree.object_mut(object)?.pkg_len = pkg_len;
                self.parse_args(object, info, &mut body)
            })
        } else {
            self.parse_args(object, info, stream)
        };

        self.scope_indent -= INDENT_PER_SCOPE;
        self.comment(verbosity, format_args!("<-- {}", info.name));
        result.map(|()| object)
    }

    fn parse_args(&mut self, object: NodeId, info: &'static OpcodeInfo, stream: &mut AmlStream) -> AmlResult<()> {
        for (index, &format) in info.fixed_args.iter().enumerate() {
            let arg = self.parse_fixed_arg(info, format, stream)?;
            self.tree.set_fixed_argument(object, index, Some(arg))?;
            if DebugVerbosity::All <= self.options.verbosity {
                self.comment(DebugVerbosity::All, format_args!("{:?}", self.tree.node(arg)?));
            }
        }

        self.declare(object, info)?;

        if info.attributes.opens_scope() {
            let name = self.defined_name(object, info)?;
            let new_scope = name.resolve(&self.scope)?;
            self.comment(DebugVerbosity::Scopes, format_args!("Scope: {}", new_scope));
            let old_scope = core::mem::replace(&mut self.scope, new_scope);
            let result = self.parse_var_args(object, info, stream);
            self.scope = old_scope;
            result
        } else {
            self.parse_var_args(object, info, stream)
        }
    }

    fn parse_fixed_arg(&mut self, info: &OpcodeInfo, format: ArgFormat, stream: &mut AmlStream) -> AmlResult<NodeId> {
        match format {
            ArgFormat::UInt8 | ArgFormat::UInt16 | ArgFormat::UInt32 | ArgFormat::UInt64 => {
                let width = format.integer_width().ok_or(AmlError::IncompatibleArgument)?;
                let bytes = stream.take(width)?;
                self.tree.create_data_node(DataType::UInt, bytes)
            }
            ArgFormat::NameString => {
                let start = stream.offset();
                parse_name_string(stream)?;
                self.tree.create_data_node(DataType::NameString, stream.consumed_since(start))
            }
            ArgFormat::String => {
                let bytes = stream.take_null_terminated()?;
                self.tree.create_data_node(DataType::String, bytes)
            }
            ArgFormat::FieldPkgLen => {
                let start = stream.offset();
                parse_pkg_length(stream)?;
                self.tree.create_data_node(DataType::FieldPkgLen, stream.consumed_since(start))
            }
            /*
             * ConnectField := <0x02 NameString> | <0x02 BufferData>. The name is only a reference to a connection
             * resource, and is never a method invocation.
             */
            ArgFormat::Object if info.attributes.is_field_element() && is_name_string_start(stream.peek()?) => {
                self.parse_name_reference(stream)
            }
            ArgFormat::Object => self.parse_term(stream),
        }
    }

    fn parse_var_args(&mut self, object: NodeId, info: &'static OpcodeInfo, stream: &mut AmlStream) -> AmlResult<()> {
        let attributes = info.attributes;
        if attributes.has_term_list() {
            self.parse_term_list(object, stream)
        } else if attributes.has_byte_list() {
            self.parse_byte_list(object, stream)
        } else if attributes.has_field_list() {
            self.parse_field_list(object, stream)
        } else if attributes.has_package_elements() {
            self.parse_package_elements(object, stream)
        } else {
            Ok(())
        }
    }

    fn parse_byte_list(&mut self, buffer: NodeId, stream: &mut AmlStream) -> AmlResult<()> {
        let bytes = stream.take_rest();
        if bytes.is_empty() {
            return Ok(());
        }

        if self.options.split_resource_templates && resource::is_resource_template(bytes) {
            for descriptor in resource::descriptors(bytes) {
                let node = self.tree.create_data_node(DataType::ResourceData, descriptor?)?;
                self.tree.var_list_add_tail_internal(buffer, node)?;
            }
            self.comment(DebugVerbosity::All, format_args!("Resource template ({} bytes)", bytes.len()));
        } else {
            let node = self.tree.create_data_node(DataType::Raw, bytes)?;
            self.tree.var_list_add_tail_internal(buffer, node)?;
        }

        Ok(())
    }

    fn parse_field_list(&mut self, field: NodeId, stream: &mut AmlStream) -> AmlResult<()> {
        /*
         * FieldList := Nothing | <FieldElement FieldList>
         * FieldElement := NamedField | ReservedField | AccessField | ExtendedAccessField | ConnectField
         * NamedField := NameSeg PkgLength
         */
        while !stream.is_empty() {
            let byte = stream.peek()?;
            let info = if is_lead_name_char(byte) {
                &NAMED_FIELD
            } else {
                stream.next()?;
                opcode::field_opcode(byte).ok_or(AmlError::IllegalOpcode(u16::from(byte)))?
            };

            let element = self.parse_object(info, stream)?;
            self.tree.var_list_add_tail_internal(field, element)?;
        }
        Ok(())
    }

    fn parse_package_elements(&mut self, package: NodeId, stream: &mut AmlStream) -> AmlResult<()> {
        /*
         * PackageElementList := Nothing | <PackageElement PackageElementList>
         * PackageElement := DataRefObject | NameString
         */
        while !stream.is_empty() {
            let element = if is_name_string_start(stream.peek()?) {
                self.parse_name_reference(stream)?
            } else {
                self.parse_term(stream)?
            };
            self.tree.var_list_add_tail_internal(package, element)?;
        }
        Ok(())
    }

    /// Parse a `NameString` into a name string pseudo-object.
    fn parse_name_reference(&mut self, stream: &mut AmlStream) -> AmlResult<NodeId> {
        let start = stream.offset();
        let name = parse_name_string(stream)?;
        let name_node = self.tree.create_data_node(DataType::NameString, stream.consumed_since(start))?;
        self.comment(DebugVerbosity::AllScopes, format_args!("Name reference: {}", name));

        let reference = self.tree.create_object_node(&NAME_STRING, 0)?;
        self.tree.set_fixed_argument(reference, 0, Some(name_node))?;
        Ok(reference)
    }

    fn parse_name_or_invocation(&mut self, stream: &mut AmlStream) -> AmlResult<NodeId> {
        /*
         * MethodInvocation := NameString TermArgList
         *
         * The number of arguments is not encoded, and so has to come from the method's definition. Methods that
         * are only defined later in the stream can't be recognised, and their invocations end up as a name
         * followed by a series of terms. This round-trips, but the arguments aren't attached to the invocation.
         */
        let mut lookahead = *stream;
        let name = parse_name_string(&mut lookahead)?;
        let Some(arg_count) = self.find_method(&name) else {
            return self.parse_name_reference(stream);
        };

        let start = stream.offset();
        parse_name_string(stream)?;
        let name_node = self.tree.create_data_node(DataType::NameString, stream.consumed_since(start))?;
        let count_node = self.tree.create_data_node(DataType::UInt, &[arg_count])?;

        let invocation = self.tree.create_object_node(&METHOD_INVOCATION, 0)?;
        self.tree.set_fixed_argument(invocation, 0, Some(name_node))?;
        self.tree.set_fixed_argument(invocation, 1, Some(count_node))?;

        self.comment(DebugVerbosity::AllScopes, format_args!("--> Invocation of {} ({} args)", name, arg_count));
        self.scope_indent += INDENT_PER_SCOPE;
        for _ in 0..arg_count {
            let arg = self.parse_term(stream)?;
            self.tree.var_list_add_tail_internal(invocation, arg)?;
        }
        self.scope_indent -= INDENT_PER_SCOPE;
        self.comment(DebugVerbosity::AllScopes, format_args!("<-- Invocation of {}", name));

        Ok(invocation)
    }

    /// Find the method `name` refers to from the current scope, applying the namespace search rules (ACPI 6.4
    /// §5.3) to single-segment names. Returns the method's argument count.
    fn find_method(&self, name: &AmlName) -> Option<u8> {
        if !name.search_rules_apply() {
            let resolved = name.resolve(&self.scope).ok()?;
            return self.methods.get(&resolved).copied();
        }

        let mut scope = self.scope.clone();
        loop {
            if let Some(&arg_count) = name.resolve(&scope).ok().and_then(|resolved| self.methods.get(&resolved)) {
                return Some(arg_count);
            }
            scope = scope.parent().ok()?;
        }
    }

    /// The name an object adds to the namespace, as it was written (i.e. not resolved against the current scope).
    fn defined_name(&self, object: NodeId, info: &OpcodeInfo) -> AmlResult<AmlName> {
        let index = info.name_arg_index().ok_or(AmlError::IncompatibleArgument)?;
        let name_node = self.tree.get_fixed_argument(object, index)?.ok_or(AmlError::MissingFixedArgument { index })?;
        self.tree.data(name_node)?.name()
    }

    /// Record the methods defined by `Method`, and declared by `External`.
    fn declare(&mut self, object: NodeId, info: &OpcodeInfo) -> AmlResult<()> {
        let arg_count = if info.is(METHOD_OP, 0) {
            let flags = self.integer_arg(object, 1)?;
            flags as u8 & METHOD_ARG_COUNT_MASK
        } else if info.is(EXTERNAL_OP, 0) && self.integer_arg(object, 1)? == u64::from(EXTERNAL_METHOD_OBJECT_TYPE) {
            self.integer_arg(object, 2)? as u8
        } else {
            return Ok(());
        };

        let name = self.defined_name(object, info)?.resolve(&self.scope)?;
        self.comment(DebugVerbosity::Scopes, format_args!("Method {} takes {} arguments", name, arg_count));
        self.methods.insert(name, arg_count);
        Ok(())
    }

    fn integer_arg(&self, object: NodeId, index: usize) -> AmlResult<u64> {
        let node = self.tree.get_fixed_argument(object, index)?.ok_or(AmlError::MissingFixedArgument { index })?;
        self.tree.data(node)?.integer().ok_or(AmlError::IncompatibleArgument)
    }

    /// The PkgLengths read from the stream are kept as they are while parsing, and then replaced with the ones the
    /// serializer will derive. They only differ for streams that used longer encodings than they needed to.
    fn normalize_pkg_lengths(&mut self, root: NodeId) -> AmlResult<()> {
        let objects: alloc::vec::Vec<NodeId> = crate::iter::TreeIter::branch(&self.tree, root)
            .filter(|&id| self.tree.object(id).map(|object| object.info.attributes.has_pkg_length()).unwrap_or(false))
            .collect();

        for id in objects {
            let pkg_len = pkg_length_for_body(self.tree.compute_body_size(id)?)?;
            let object = self.tree.object_mut(id)?;
            if object.pkg_len != pkg_len {
                trace!("Normalizing PkgLength of {:?} from {} to {}", object.info, object.pkg_len, pkg_len);
                object.pkg_len = pkg_len;
            }
        }

        let length = u32::try_from(self.tree.compute_size(root)?).map_err(|_| AmlError::ValueTooLarge)?;
        self.tree.root_mut(root)?.header.length = length;
        Ok(())
    }

    /// Free everything that was built before an error.
    fn discard(mut self, root: NodeId) {
        for node in self.tree.detached_nodes() {
            let _ = self.tree.delete_tree(node);
        }
        let _ = self.tree.delete_tree(root);
    }
}
