//! The calling context tree.
//!
//! On disk, the tree is a set of pointer-chained ranges. Every entry point and every context
//! record points to a contiguous range of variable-size child records, and a range size of 0
//! marks a leaf:
//!
//! ```text
//! EntryPoint { pChildren, szChildren } ──► [ Context | Context ──► [ Context ] | Context ]
//! ```
//!
//! Each context record has a fixed 0x20 byte header followed by `nFlexWords` 8-byte words
//! holding the optional sub-fields announced by its flags, packed by a [`FlexAllocator`].
//!
//! Real trees are far deeper than a native call stack allows, so the tree is rebuilt with an
//! explicit breadth-first worklist. Decoded contexts live in a single arena and refer to each
//! other by [`ContextIndex`].

use std::collections::{BTreeMap, VecDeque};

use hpcdb_common::{read_u32, read_u64};

use crate::error::{FormatError, FormatErrorKind};
use crate::flex::FlexAllocator;
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::table::EntityTable;
use crate::utils::{capacity_hint, read_string, scaled_range, version_enum, version_flags};

use super::{
    BinaryPoint, ContextIndex, FileIndex, Function, FunctionIndex, Module, ModuleIndex,
    SourceFile, SourceLine,
};

const CONTEXT_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pEntryPoints", 0, 0x00, FieldType::U64),
    Field::new("nEntryPoints", 0, 0x08, FieldType::U16),
    Field::new("szEntryPoint", 0, 0x0a, FieldType::U8),
]);

const ENTRY_POINT: VersionedStructure = VersionedStructure::new(&[
    Field::new("szChildren", 0, 0x00, FieldType::U64),
    Field::new("pChildren", 0, 0x08, FieldType::U64),
    Field::new("ctxId", 0, 0x10, FieldType::U32),
    Field::new("entryPoint", 0, 0x14, FieldType::U16),
    Field::new("pPrettyName", 0, 0x18, FieldType::U64),
]);

const CONTEXT: VersionedStructure = VersionedStructure::new(&[
    Field::new("szChildren", 0, 0x00, FieldType::U64),
    Field::new("pChildren", 0, 0x08, FieldType::U64),
    Field::new("ctxId", 0, 0x10, FieldType::U32),
    Field::new("flags", 0, 0x14, FieldType::U8),
    Field::new("relation", 0, 0x15, FieldType::U8),
    Field::new("lexicalType", 0, 0x16, FieldType::U8),
    Field::new("nFlexWords", 0, 0x17, FieldType::U8),
    Field::new("propagation", 0, 0x18, FieldType::U16),
]);

/// The offset of the flex area within a context record.
const FLEX_OFFSET: u64 = 0x20;

version_enum! {
    /// The kind of thread or process start an [`EntryPoint`] represents.
    pub enum EntryPointKind: u16 {
        /// An entry point that could not be classified.
        UnknownEntry = 0, since 0;
        /// The main thread of a process.
        MainThread = 1, since 0;
        /// A thread created by the application.
        ApplicationThread = 2, since 0;
    }
}

version_flags! {
    /// Announces which optional sub-fields a [`Context`] carries.
    pub struct ContextFlags: u8 {
        /// The context has a [`function`](Context::function).
        const HAS_FUNCTION = 0, since 0;
        /// The context has a [`source`](Context::source) line.
        const HAS_SRCLOC = 1, since 0;
        /// The context has a binary [`point`](Context::point).
        const HAS_POINT = 2, since 0;
    }
}

version_enum! {
    /// How a [`Context`] relates to its parent.
    pub enum Relation: u8 {
        /// The context is lexically nested in its parent.
        Lexical = 0, since 0;
        /// The context was called by its parent.
        Call = 1, since 0;
        /// The context was inlined into its parent at a call site.
        InlinedCall = 2, since 0;
    }
}

version_enum! {
    /// The lexical construct a [`Context`] represents.
    pub enum LexicalType: u8 {
        /// A function body.
        Function = 0, since 0;
        /// A loop.
        Loop = 1, since 0;
        /// A single source line.
        Line = 2, since 0;
        /// A single machine instruction.
        Instruction = 3, since 0;
    }
}

/// A thread or process entry, the root of a context subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryPoint {
    /// The context id of the entry point.
    pub ctx_id: u32,
    /// The classification of the entry.
    pub kind: EntryPointKind,
    /// A human-readable name for the entry.
    pub pretty_name: String,
    /// The top-level contexts, in file order.
    pub children: Vec<ContextIndex>,
}

/// A node in the calling context tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Context {
    /// The context id, unique within the database.
    pub ctx_id: u32,
    /// Which of the optional fields are set.
    pub flags: ContextFlags,
    /// How this context relates to its parent.
    pub relation: Relation,
    /// The lexical construct this context represents.
    pub lexical_type: LexicalType,
    /// Bit `i` is set if transitive scopes with propagation index `i` pass through this context.
    pub propagation: u16,
    /// The function, if [`ContextFlags::HAS_FUNCTION`] is set.
    pub function: Option<FunctionIndex>,
    /// The source line, if [`ContextFlags::HAS_SRCLOC`] is set.
    pub source: Option<SourceLine>,
    /// The binary address, if [`ContextFlags::HAS_POINT`] is set.
    pub point: Option<BinaryPoint>,
    /// The parent context, or `None` if the context is a child of an entry point.
    pub parent: Option<ContextIndex>,
    /// The child contexts, in file order.
    pub children: Vec<ContextIndex>,
}

/// A node found by context id, see [`ContextTree::by_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRef<'a> {
    /// Context id 0, the global root above all entry points.
    Root,
    /// An entry point.
    EntryPoint(&'a EntryPoint),
    /// A context.
    Context(&'a Context),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    EntryPoint(usize),
    Context(ContextIndex),
}

/// The calling context tree of a `meta.db` file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContextTree {
    entry_points: Vec<EntryPoint>,
    contexts: Vec<Context>,
    #[cfg_attr(feature = "serde", serde(skip))]
    by_id: BTreeMap<u32, Node>,
}

impl ContextTree {
    /// The entry points, in file order.
    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    /// Returns the context at `index`.
    pub fn get(&self, index: ContextIndex) -> Option<&Context> {
        self.contexts.get(index.index())
    }

    /// Iterates over the children of the context at `index`, in file order.
    pub fn children(&self, index: ContextIndex) -> impl Iterator<Item = &Context> + '_ {
        self.get(index)
            .map(|context| context.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// The total number of contexts, not counting entry points.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if the tree holds no contexts.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Iterates over all contexts in breadth-first order.
    pub fn iter(&self) -> impl Iterator<Item = (ContextIndex, &Context)> + '_ {
        self.contexts
            .iter()
            .enumerate()
            .map(|(index, context)| (ContextIndex::new(index), context))
    }

    /// Looks up an entry point or context by its context id.
    ///
    /// Context id 0 always refers to the global [`Root`](ContextRef::Root).
    pub fn by_id(&self, ctx_id: u32) -> Option<ContextRef<'_>> {
        if ctx_id == 0 {
            return Some(ContextRef::Root);
        }

        Some(match *self.by_id.get(&ctx_id)? {
            Node::EntryPoint(index) => ContextRef::EntryPoint(self.entry_points.get(index)?),
            Node::Context(index) => ContextRef::Context(self.get(index)?),
        })
    }

    /// Returns `true` if `ctx_id` names the root, an entry point or a context.
    pub fn contains_id(&self, ctx_id: u32) -> bool {
        ctx_id == 0 || self.by_id.contains_key(&ctx_id)
    }

    pub(crate) fn parse(
        version: u8,
        buf: &[u8],
        offset: u64,
        tables: &EntityTables<'_>,
    ) -> Result<Self, FormatError> {
        let section = CONTEXT_SECTION.decode(version, buf, offset)?;
        let count = section.u64("nEntryPoints")?;
        let stride = section.u64("szEntryPoint")?;

        let mut builder = TreeBuilder {
            version,
            buf,
            tables,
            tree: ContextTree::default(),
            queue: VecDeque::new(),
        };

        builder.tree.entry_points.reserve(capacity_hint(buf, count, stride));
        for offset in scaled_range(section.u64("pEntryPoints")?, count, stride) {
            builder.entry_point(offset)?;
        }

        let _guard = tracing::trace_span!("ContextTree::build").entered();
        while let Some(range) = builder.queue.pop_front() {
            builder.range(range)?;
        }

        let tree = builder.tree;
        tracing::debug!(
            entry_points = tree.entry_points.len(),
            contexts = tree.contexts.len(),
            "decoded context tree"
        );
        Ok(tree)
    }
}

/// The offset tables a context record resolves its sub-fields through.
pub(crate) struct EntityTables<'a> {
    pub modules: &'a EntityTable<Module>,
    pub files: &'a EntityTable<SourceFile>,
    pub functions: &'a EntityTable<Function>,
}

/// A run of sibling records still to be decoded.
#[derive(Debug)]
struct PendingRange {
    start: u64,
    size: u64,
    owner: Node,
}

struct TreeBuilder<'a> {
    version: u8,
    buf: &'a [u8],
    tables: &'a EntityTables<'a>,
    tree: ContextTree,
    queue: VecDeque<PendingRange>,
}

impl TreeBuilder<'_> {
    fn register(&mut self, ctx_id: u32, node: Node) -> Result<(), FormatError> {
        if ctx_id == 0 {
            return Err(FormatErrorKind::InvariantViolation(
                "context id 0 is reserved for the global root",
            )
            .into());
        }
        if self.tree.by_id.insert(ctx_id, node).is_some() {
            return Err(FormatErrorKind::InvariantViolation("duplicate context id").into());
        }
        Ok(())
    }

    fn schedule(&mut self, start: u64, size: u64, owner: Node) {
        if size > 0 {
            self.queue.push_back(PendingRange { start, size, owner });
        }
    }

    fn entry_point(&mut self, offset: u64) -> Result<(), FormatError> {
        let record = ENTRY_POINT.decode(self.version, self.buf, offset)?;
        let ctx_id = record.u32("ctxId")?;

        let index = self.tree.entry_points.len();
        self.tree.entry_points.push(EntryPoint {
            ctx_id,
            kind: EntryPointKind::decode(self.version, record.u16("entryPoint")?)?,
            pretty_name: read_string(self.buf, record.u64("pPrettyName")?)?,
            children: Vec::new(),
        });
        self.register(ctx_id, Node::EntryPoint(index))?;
        self.schedule(
            record.u64("pChildren")?,
            record.u64("szChildren")?,
            Node::EntryPoint(index),
        );
        Ok(())
    }

    fn range(&mut self, range: PendingRange) -> Result<(), FormatError> {
        let end = range.start.checked_add(range.size).ok_or(
            FormatErrorKind::SectionOutOfBounds {
                offset: range.start,
                size: self.buf.len() as u64,
            },
        )?;

        let mut offset = range.start;
        while offset < end {
            let record_size = self.context(offset, end, range.owner)?;
            offset += record_size;
        }
        Ok(())
    }

    /// Decodes the context record at `offset` and returns its size.
    fn context(&mut self, offset: u64, end: u64, owner: Node) -> Result<u64, FormatError> {
        let available = end - offset;
        let header_size = CONTEXT.size(self.version).max(FLEX_OFFSET);
        if available < header_size {
            return Err(FormatErrorKind::TruncatedStructure {
                offset,
                required: header_size,
                available,
            }
            .into());
        }

        let record = CONTEXT.decode(self.version, self.buf, offset)?;
        let flex_size = 8 * record.u64("nFlexWords")?;
        let record_size = FLEX_OFFSET + flex_size;
        if available < record_size {
            return Err(FormatErrorKind::TruncatedStructure {
                offset,
                required: record_size,
                available,
            }
            .into());
        }

        let flags = ContextFlags::from_bits_versioned(self.version, record.u8("flags")?);
        let mut flex = FlexReader {
            buf: self.buf,
            base: offset + FLEX_OFFSET,
            size: flex_size,
            alloc: FlexAllocator::new(),
        };

        let function = if flags.contains(ContextFlags::HAS_FUNCTION) {
            let function = self.tables.functions.resolve(flex.u64()?)?;
            Some(FunctionIndex::new(function))
        } else {
            None
        };

        let source = if flags.contains(ContextFlags::HAS_SRCLOC) {
            let file = self.tables.files.resolve(flex.u64()?)?;
            Some(SourceLine {
                file: FileIndex::new(file),
                line: flex.u32()?,
            })
        } else {
            None
        };

        let point = if flags.contains(ContextFlags::HAS_POINT) {
            let module = self.tables.modules.resolve(flex.u64()?)?;
            Some(BinaryPoint {
                module: ModuleIndex::new(module),
                offset: flex.u64()?,
            })
        } else {
            None
        };

        let ctx_id = record.u32("ctxId")?;
        let index = ContextIndex::new(self.tree.contexts.len());
        let parent = match owner {
            Node::EntryPoint(entry) => {
                if let Some(entry) = self.tree.entry_points.get_mut(entry) {
                    entry.children.push(index);
                }
                None
            }
            Node::Context(parent) => {
                if let Some(parent) = self.tree.contexts.get_mut(parent.index()) {
                    parent.children.push(index);
                }
                Some(parent)
            }
        };

        self.tree.contexts.push(Context {
            ctx_id,
            flags,
            relation: Relation::decode(self.version, record.u8("relation")?)?,
            lexical_type: LexicalType::decode(self.version, record.u8("lexicalType")?)?,
            propagation: record.u16("propagation")?,
            function,
            source,
            point,
            parent,
            children: Vec::new(),
        });
        self.register(ctx_id, Node::Context(index))?;
        self.schedule(
            record.u64("pChildren")?,
            record.u64("szChildren")?,
            Node::Context(index),
        );

        Ok(record_size)
    }
}

/// Reads flex sub-fields of one record in allocation order.
struct FlexReader<'a> {
    buf: &'a [u8],
    base: u64,
    size: u64,
    alloc: FlexAllocator,
}

impl FlexReader<'_> {
    fn claim(&mut self, size: u64) -> Result<u64, FormatError> {
        let offset = self.alloc.allocate(size as usize)? as u64;
        if offset + size > self.size {
            return Err(FormatErrorKind::InvariantViolation(
                "flex sub-field does not fit into the flex area",
            )
            .into());
        }
        Ok(self.base + offset)
    }

    fn truncated(&self, offset: u64, size: u64) -> FormatError {
        FormatErrorKind::TruncatedStructure {
            offset,
            required: size,
            available: (self.buf.len() as u64).saturating_sub(offset),
        }
        .into()
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        let offset = self.claim(8)?;
        read_u64(self.buf, offset).ok_or_else(|| self.truncated(offset, 8))
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        let offset = self.claim(4)?;
        read_u32(self.buf, offset).ok_or_else(|| self.truncated(offset, 4))
    }
}
