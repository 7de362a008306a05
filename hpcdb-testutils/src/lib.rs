//! Test helpers for `hpcdb`.
//!
//! No database fixtures are checked in. Instead, tests describe the content they need with the
//! `*Spec` types in this crate and render it into a byte image with the matching `build_*`
//! function. The returned layouts expose the offsets of all written records, so tests can patch
//! an image afterwards to produce corrupt input.
#![warn(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::Path;

/// A little-endian byte image addressed by absolute offsets.
///
/// # Example
///
/// ```
/// use hpcdb_testutils::ImageBuilder;
///
/// let mut image = ImageBuilder::new();
/// let at = image.reserve(8);
/// let name = image.cstr("main");
/// image.patch_u64(at, name);
///
/// let bytes = image.finish();
/// assert_eq!(&bytes[..8], &8u64.to_le_bytes());
/// assert_eq!(&bytes[8..], b"main\0");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    buf: Vec<u8>,
}

impl ImageBuilder {
    /// Creates an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset the next write goes to.
    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Pads with zeros up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) -> &mut Self {
        while self.position() % alignment != 0 {
            self.buf.push(0);
        }
        self
    }

    /// Appends raw bytes.
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends a `u8`.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes(&[value])
    }

    /// Appends a `u16`.
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Appends a `u32`.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Appends a `u64`.
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Appends an `f64`.
    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Appends `len` zero bytes and returns their offset.
    pub fn reserve(&mut self, len: usize) -> u64 {
        let offset = self.position();
        self.buf.resize(self.buf.len() + len, 0);
        offset
    }

    /// Appends a NUL-terminated string and returns its offset.
    pub fn cstr(&mut self, s: &str) -> u64 {
        let offset = self.position();
        self.bytes(s.as_bytes()).u8(0);
        offset
    }

    /// Overwrites bytes at `offset`.
    pub fn patch(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Overwrites a `u8` at `offset`.
    pub fn patch_u8(&mut self, offset: u64, value: u8) {
        self.patch(offset, &[value]);
    }

    /// Overwrites a `u16` at `offset`.
    pub fn patch_u16(&mut self, offset: u64, value: u16) {
        self.patch(offset, &value.to_le_bytes());
    }

    /// Overwrites a `u32` at `offset`.
    pub fn patch_u32(&mut self, offset: u64, value: u32) {
        self.patch(offset, &value.to_le_bytes());
    }

    /// Overwrites a `u64` at `offset`.
    pub fn patch_u64(&mut self, offset: u64, value: u64) {
        self.patch(offset, &value.to_le_bytes());
    }

    /// Returns the finished image.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Overwrites a `u8` in a finished image.
pub fn patch_u8(image: &mut [u8], offset: u64, value: u8) {
    image[offset as usize] = value;
}

/// Overwrites a `u16` in a finished image.
pub fn patch_u16(image: &mut [u8], offset: u64, value: u16) {
    let start = offset as usize;
    image[start..start + 2].copy_from_slice(&value.to_le_bytes());
}

/// Overwrites a `u32` in a finished image.
pub fn patch_u32(image: &mut [u8], offset: u64, value: u32) {
    let start = offset as usize;
    image[start..start + 4].copy_from_slice(&value.to_le_bytes());
}

/// Overwrites a `u64` in a finished image.
pub fn patch_u64(image: &mut [u8], offset: u64, value: u64) {
    let start = offset as usize;
    image[start..start + 8].copy_from_slice(&value.to_le_bytes());
}

/// The offset of the section table in every container.
pub const SECTION_TABLE: u64 = 0x10;

/// Writes a container header for `sections` sections and returns the builder.
///
/// The section table is zeroed. Fill it in with [`set_section`].
pub fn container(code: &[u8; 4], minor_version: u8, sections: usize) -> ImageBuilder {
    let mut image = ImageBuilder::new();
    image.bytes(b"HPCTOOLKIT").bytes(code).u8(4).u8(minor_version);
    image.reserve(sections * 16);
    image
}

/// Fills in entry `index` of the section table.
pub fn set_section(image: &mut ImageBuilder, index: usize, offset: u64, size: u64) {
    let entry = SECTION_TABLE + index as u64 * 16;
    image.patch_u64(entry, size);
    image.patch_u64(entry + 8, offset);
}

/// Appends the footer and returns the finished image.
pub fn finish_container(mut image: ImageBuilder, footer: &[u8; 8]) -> Vec<u8> {
    image.align(8).bytes(footer);
    image.finish()
}

/// A load module in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct ModuleSpec {
    /// The path of the module.
    pub path: String,
    /// Raw flag bits.
    pub flags: u32,
}

/// A source file in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct FileSpec {
    /// The path of the file.
    pub path: String,
    /// Raw flag bits.
    pub flags: u32,
}

/// A function in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct FunctionSpec {
    /// The name of the function.
    pub name: String,
    /// Index into [`MetaSpec::modules`] and offset.
    pub point: Option<(usize, u64)>,
    /// Index into [`MetaSpec::files`] and line.
    pub source: Option<(usize, u32)>,
    /// Raw flag bits.
    pub flags: u32,
}

/// A propagation scope in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct ScopeSpec {
    /// The name of the scope.
    pub name: String,
    /// The raw scope type.
    pub ty: u8,
    /// The propagation index.
    pub propagation_index: u8,
}

/// A summary statistic in a [`MetricSpec`].
#[derive(Debug, Clone, Default)]
pub struct SummarySpec {
    /// Index into [`MetaSpec::scopes`].
    pub scope: usize,
    /// The formula.
    pub formula: String,
    /// The raw combine operation.
    pub combine: u8,
    /// The statistic metric id.
    pub stat_metric_id: u16,
}

/// A metric in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct MetricSpec {
    /// The name of the metric.
    pub name: String,
    /// `(scope index, propagated metric id)` pairs.
    pub scope_instances: Vec<(usize, u16)>,
    /// The summary statistics.
    pub summaries: Vec<SummarySpec>,
}

/// An entry point in a [`MetaSpec`].
#[derive(Debug, Clone, Default)]
pub struct EntryPointSpec {
    /// The context id.
    pub ctx_id: u32,
    /// The raw entry point kind.
    pub kind: u16,
    /// The pretty name.
    pub pretty_name: String,
}

/// The node a [`ContextSpec`] hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    /// Index into [`MetaSpec::entry_points`].
    EntryPoint(usize),
    /// Index into [`MetaSpec::contexts`].
    Context(usize),
}

impl Default for Parent {
    fn default() -> Self {
        Parent::EntryPoint(0)
    }
}

/// A context in a [`MetaSpec`].
///
/// Contexts are given as a flat list with parent links, so arbitrarily deep trees can be built
/// without recursion. Siblings are written in list order.
#[derive(Debug, Clone, Default)]
pub struct ContextSpec {
    /// The parent node.
    pub parent: Parent,
    /// The context id.
    pub ctx_id: u32,
    /// Raw flags. Derived from the present fields if `None`.
    pub flags: Option<u8>,
    /// The raw relation.
    pub relation: u8,
    /// The raw lexical type.
    pub lexical_type: u8,
    /// The propagation bitmask.
    pub propagation: u16,
    /// Index into [`MetaSpec::functions`].
    pub function: Option<usize>,
    /// Index into [`MetaSpec::files`] and line.
    pub source: Option<(usize, u32)>,
    /// Index into [`MetaSpec::modules`] and offset.
    pub point: Option<(usize, u64)>,
    /// The number of flex words. Derived from the present fields if `None`.
    pub flex_words: Option<u8>,
}

/// The content of a `meta.db` image.
#[derive(Debug, Clone, Default)]
pub struct MetaSpec {
    /// The minor version written into the header.
    pub minor_version: u8,
    /// The database title.
    pub title: String,
    /// The database description.
    pub description: String,
    /// Identifier kind names.
    pub id_names: Vec<String>,
    /// Load modules.
    pub modules: Vec<ModuleSpec>,
    /// Source files.
    pub files: Vec<FileSpec>,
    /// Functions.
    pub functions: Vec<FunctionSpec>,
    /// Propagation scopes.
    pub scopes: Vec<ScopeSpec>,
    /// Metrics.
    pub metrics: Vec<MetricSpec>,
    /// Entry points.
    pub entry_points: Vec<EntryPointSpec>,
    /// Contexts.
    pub contexts: Vec<ContextSpec>,
}

/// Record offsets of a `meta.db` image built by [`build_meta`].
#[derive(Debug, Clone, Default)]
pub struct MetaLayout {
    /// Offsets of module records.
    pub modules: Vec<u64>,
    /// Offsets of file records.
    pub files: Vec<u64>,
    /// Offsets of function records.
    pub functions: Vec<u64>,
    /// Offsets of scope records.
    pub scopes: Vec<u64>,
    /// Offsets of metric records.
    pub metrics: Vec<u64>,
    /// Offsets of entry point records.
    pub entry_points: Vec<u64>,
    /// Offsets of context records, in [`MetaSpec::contexts`] order.
    pub contexts: Vec<u64>,
    /// Offsets of the section headers, in section table order.
    pub sections: Vec<u64>,
}

/// Section order of the `meta.db` section table.
const META_SECTIONS: usize = 8;
const GENERAL: usize = 0;
const ID_NAMES: usize = 1;
const METRICS: usize = 2;
const CONTEXT: usize = 3;
const STRINGS: usize = 4;
const MODULES: usize = 5;
const FILES: usize = 6;
const FUNCTIONS: usize = 7;

fn offset_of(offsets: &[u64], index: Option<usize>) -> u64 {
    index.map_or(0, |index| offsets[index])
}

/// Renders a `meta.db` image.
pub fn build_meta(spec: &MetaSpec) -> (Vec<u8>, MetaLayout) {
    let mut image = container(b"meta", spec.minor_version, META_SECTIONS);
    let mut layout = MetaLayout {
        sections: vec![0; META_SECTIONS],
        ..Default::default()
    };

    // All strings go first, so records can refer to them right away.
    let strings_start = image.position();
    let title = image.cstr(&spec.title);
    let description = image.cstr(&spec.description);
    let id_names: Vec<_> = spec.id_names.iter().map(|s| image.cstr(s)).collect();
    let module_paths: Vec<_> = spec.modules.iter().map(|m| image.cstr(&m.path)).collect();
    let file_paths: Vec<_> = spec.files.iter().map(|f| image.cstr(&f.path)).collect();
    let function_names: Vec<_> = spec.functions.iter().map(|f| image.cstr(&f.name)).collect();
    let scope_names: Vec<_> = spec.scopes.iter().map(|s| image.cstr(&s.name)).collect();
    let metric_names: Vec<_> = spec.metrics.iter().map(|m| image.cstr(&m.name)).collect();
    let formulas: Vec<Vec<_>> = spec
        .metrics
        .iter()
        .map(|m| m.summaries.iter().map(|s| image.cstr(&s.formula)).collect())
        .collect();
    let pretty_names: Vec<_> = spec
        .entry_points
        .iter()
        .map(|e| image.cstr(&e.pretty_name))
        .collect();
    let strings_size = image.position() - strings_start;
    set_section(&mut image, STRINGS, strings_start, strings_size);
    image.align(8);

    // Modules
    let records = image.position();
    for (module, path) in spec.modules.iter().zip(&module_paths) {
        layout.modules.push(image.position());
        image.u32(module.flags).u32(0).u64(*path);
    }
    write_section(&mut image, &mut layout, MODULES, |image| {
        image.u64(records).u32(spec.modules.len() as u32).u16(16);
    });

    // Files
    let records = image.position();
    for (file, path) in spec.files.iter().zip(&file_paths) {
        layout.files.push(image.position());
        image.u32(file.flags).u32(0).u64(*path);
    }
    write_section(&mut image, &mut layout, FILES, |image| {
        image.u64(records).u32(spec.files.len() as u32).u16(16);
    });

    // Functions
    let records = image.position();
    for (function, name) in spec.functions.iter().zip(&function_names) {
        layout.functions.push(image.position());
        let (module, offset) = function.point.map_or((None, 0), |(m, o)| (Some(m), o));
        let (file, line) = function.source.map_or((None, 0), |(f, l)| (Some(f), l));
        image
            .u64(*name)
            .u64(offset_of(&layout.modules, module))
            .u64(offset)
            .u64(offset_of(&layout.files, file))
            .u32(line)
            .u32(function.flags);
    }
    write_section(&mut image, &mut layout, FUNCTIONS, |image| {
        image.u64(records).u32(spec.functions.len() as u32).u16(0x28);
    });

    // General
    write_section(&mut image, &mut layout, GENERAL, |image| {
        image.u64(title).u64(description);
    });

    // IdNames
    let names = image.position();
    for name in &id_names {
        image.u64(*name);
    }
    write_section(&mut image, &mut layout, ID_NAMES, |image| {
        image.u64(names).u8(spec.id_names.len() as u8);
    });

    // Metrics
    let scopes = image.position();
    for (scope, name) in spec.scopes.iter().zip(&scope_names) {
        layout.scopes.push(image.position());
        image
            .u64(*name)
            .u8(scope.ty)
            .u8(scope.propagation_index)
            .align(8);
    }
    let mut metric_parts = Vec::new();
    for (metric, formulas) in spec.metrics.iter().zip(&formulas) {
        let insts = image.position();
        for (scope, id) in &metric.scope_instances {
            image.u64(layout.scopes[*scope]).u16(*id).align(8);
        }
        let summaries = image.position();
        for (summary, formula) in metric.summaries.iter().zip(formulas) {
            image
                .u64(layout.scopes[summary.scope])
                .u64(*formula)
                .u8(summary.combine)
                .u8(0)
                .u16(summary.stat_metric_id)
                .align(8);
        }
        metric_parts.push((insts, summaries));
    }
    let metrics = image.position();
    for ((metric, name), (insts, summaries)) in
        spec.metrics.iter().zip(&metric_names).zip(&metric_parts)
    {
        layout.metrics.push(image.position());
        image
            .u64(*name)
            .u64(*insts)
            .u64(*summaries)
            .u16(metric.scope_instances.len() as u16)
            .u16(metric.summaries.len() as u16)
            .align(8);
    }
    write_section(&mut image, &mut layout, METRICS, |image| {
        image
            .u64(metrics)
            .u32(spec.metrics.len() as u32)
            .u8(0x20)
            .u8(0x10)
            .u8(0x18)
            .u8(0)
            .u64(scopes)
            .u16(spec.scopes.len() as u16)
            .u8(0x10);
    });

    // Context
    write_context(&mut image, &mut layout, spec, &pretty_names);

    let image = finish_container(image, b"_meta.db");
    (image, layout)
}

fn write_section(
    image: &mut ImageBuilder,
    layout: &mut MetaLayout,
    index: usize,
    write: impl FnOnce(&mut ImageBuilder),
) {
    image.align(8);
    let start = image.position();
    write(image);
    image.align(8);
    layout.sections[index] = start;
    let size = image.position() - start;
    set_section(image, index, start, size);
}

fn write_context(
    image: &mut ImageBuilder,
    layout: &mut MetaLayout,
    spec: &MetaSpec,
    pretty_names: &[u64],
) {
    let entries = image.position();
    for (entry, name) in spec.entry_points.iter().zip(pretty_names) {
        layout.entry_points.push(image.position());
        image
            .u64(0)
            .u64(0)
            .u32(entry.ctx_id)
            .u16(entry.kind)
            .u16(0)
            .u64(*name);
    }

    let mut children: HashMap<Parent, Vec<usize>> = HashMap::new();
    for (index, context) in spec.contexts.iter().enumerate() {
        children.entry(context.parent).or_default().push(index);
    }

    // Breadth-first, so every sibling list is contiguous.
    layout.contexts = vec![0; spec.contexts.len()];
    let mut queue: VecDeque<Parent> = (0..spec.entry_points.len())
        .map(Parent::EntryPoint)
        .collect();
    while let Some(owner) = queue.pop_front() {
        let Some(kids) = children.get(&owner) else {
            continue;
        };

        let start = image.position();
        for &index in kids {
            layout.contexts[index] = image.position();
            write_context_record(image, layout, &spec.contexts[index]);
            queue.push_back(Parent::Context(index));
        }

        let owner_offset = match owner {
            Parent::EntryPoint(index) => layout.entry_points[index],
            Parent::Context(index) => layout.contexts[index],
        };
        let size = image.position() - start;
        image.patch_u64(owner_offset, size);
        image.patch_u64(owner_offset + 8, start);
    }

    write_section(image, layout, CONTEXT, |image| {
        image
            .u64(entries)
            .u16(spec.entry_points.len() as u16)
            .u8(0x20);
    });
}

fn write_context_record(image: &mut ImageBuilder, layout: &MetaLayout, context: &ContextSpec) {
    // Present sub-fields are function, then file and line, then module and offset. For this
    // order first-fit packing puts every sub-field into a word of its own.
    let mut words = Vec::new();
    let mut flags = 0;
    if let Some(function) = context.function {
        flags |= 1;
        words.push(layout.functions[function]);
    }
    if let Some((file, line)) = context.source {
        flags |= 2;
        words.push(layout.files[file]);
        words.push(line.into());
    }
    if let Some((module, offset)) = context.point {
        flags |= 4;
        words.push(layout.modules[module]);
        words.push(offset);
    }

    let flex_words = context.flex_words.unwrap_or(words.len() as u8);
    words.resize(flex_words as usize, 0);

    image
        .u64(0)
        .u64(0)
        .u32(context.ctx_id)
        .u8(context.flags.unwrap_or(flags))
        .u8(context.relation)
        .u8(context.lexical_type)
        .u8(flex_words)
        .u16(context.propagation)
        .align(8);
    for word in words {
        image.u64(word);
    }
}

/// A profile in a `profile.db` image.
#[derive(Debug, Clone, Default)]
pub struct ProfileSpec {
    /// `(kind, flags, logical id, physical id)` per level, `None` for no tuple.
    pub id_tuple: Option<Vec<(u8, u16, u32, u64)>>,
    /// Raw profile flags.
    pub flags: u32,
    /// `(context id, [(metric id, value)])`, in file order.
    pub values: Vec<(u32, Vec<(u16, f64)>)>,
}

/// Renders a `profile.db` image. Returns the image and the offsets of the profile records.
pub fn build_profile(minor_version: u8, profiles: &[ProfileSpec]) -> (Vec<u8>, Vec<u64>) {
    let mut image = container(b"prof", minor_version, 2);

    let tuples_start = image.position();
    let mut tuples = Vec::new();
    for profile in profiles {
        let Some(ids) = &profile.id_tuple else {
            tuples.push(0);
            continue;
        };
        image.align(8);
        tuples.push(image.position());
        image.u16(ids.len() as u16).align(8);
        for &(kind, flags, logical_id, physical_id) in ids {
            image
                .u8(kind)
                .u8(0)
                .u16(flags)
                .u32(logical_id)
                .u64(physical_id);
        }
    }
    image.align(8);
    let size = image.position() - tuples_start;
    set_section(&mut image, 1, tuples_start, size);

    let mut blocks = Vec::new();
    for profile in profiles {
        let values = image.position();
        let mut starts = Vec::new();
        let mut count = 0u64;
        for (ctx_id, metrics) in &profile.values {
            starts.push((*ctx_id, count));
            for &(metric_id, value) in metrics {
                image.u16(metric_id).f64(value);
                count += 1;
            }
        }
        let indices = image.position();
        for (ctx_id, start) in &starts {
            image.u32(*ctx_id).u64(*start);
        }
        blocks.push((count, values, starts.len() as u32, indices));
    }

    image.align(8);
    let records = image.position();
    let mut offsets = Vec::new();
    for (profile, (block, tuple)) in profiles.iter().zip(blocks.iter().zip(&tuples)) {
        let (n_values, p_values, n_ctxs, p_ctx_indices) = *block;
        offsets.push(image.position());
        image
            .u64(n_values)
            .u64(p_values)
            .u32(n_ctxs)
            .u32(0)
            .u64(p_ctx_indices)
            .u64(*tuple)
            .u32(profile.flags)
            .u32(0);
    }

    let section = image.position();
    image.u64(records).u32(profiles.len() as u32).u8(0x30).align(8);
    let size = image.position() - section;
    set_section(&mut image, 0, section, size);

    (finish_container(image, b"_prof.db"), offsets)
}

/// The values of one context in a `cct.db` image: `(metric id, [(profile index, value)])`.
pub type CtxValuesSpec = Vec<(u16, Vec<(u32, f64)>)>;

/// Renders a `cct.db` image. The i-th entry holds the values of context id `i`.
pub fn build_cct(minor_version: u8, contexts: &[CtxValuesSpec]) -> Vec<u8> {
    let mut image = container(b"ctxt", minor_version, 1);

    let mut blocks = Vec::new();
    for metrics in contexts {
        let values = image.position();
        let mut starts = Vec::new();
        let mut count = 0u64;
        for (metric_id, by_profile) in metrics {
            starts.push((*metric_id, count));
            for &(prof_index, value) in by_profile {
                image.u32(prof_index).f64(value);
                count += 1;
            }
        }
        let indices = image.position();
        for (metric_id, start) in &starts {
            image.u16(*metric_id).u64(*start);
        }
        blocks.push((count, values, starts.len() as u16, indices));
    }

    image.align(8);
    let records = image.position();
    for &(n_values, p_values, n_metrics, p_metric_indices) in &blocks {
        image
            .u64(n_values)
            .u64(p_values)
            .u16(n_metrics)
            .reserve(6);
        image.u64(p_metric_indices);
    }

    let section = image.position();
    image.u64(records).u32(contexts.len() as u32).u8(0x20).align(8);
    let size = image.position() - section;
    set_section(&mut image, 0, section, size);

    finish_container(image, b"__ctx.db")
}

/// A trace in a `trace.db` image.
#[derive(Debug, Clone, Default)]
pub struct TraceSpec {
    /// The profile index.
    pub prof_index: u32,
    /// `(timestamp, context id)` samples.
    pub line: Vec<(u64, u32)>,
}

/// Renders a `trace.db` image. Returns the image and the offsets of the trace headers.
pub fn build_trace(
    minor_version: u8,
    timestamps: (u64, u64),
    traces: &[TraceSpec],
) -> (Vec<u8>, Vec<u64>) {
    let mut image = container(b"trce", minor_version, 1);

    let mut lines = Vec::new();
    for trace in traces {
        let start = image.position();
        for &(timestamp, ctx_id) in &trace.line {
            image.u64(timestamp).u32(ctx_id);
        }
        lines.push((start, image.position()));
    }

    image.align(8);
    let records = image.position();
    let mut offsets = Vec::new();
    for (trace, (start, end)) in traces.iter().zip(&lines) {
        offsets.push(image.position());
        image.u32(trace.prof_index).u32(0).u64(*start).u64(*end);
    }

    let section = image.position();
    image
        .u64(records)
        .u32(traces.len() as u32)
        .u8(0x18)
        .reserve(3);
    image.u64(timestamps.0).u64(timestamps.1);
    let size = image.position() - section;
    set_section(&mut image, 0, section, size);

    (finish_container(image, b"trace.db"), offsets)
}

/// Writes database files into `dir`. A `None` trace skips `trace.db`.
pub fn write_database(
    dir: &Path,
    meta: &[u8],
    profile: &[u8],
    cct: &[u8],
    trace: Option<&[u8]>,
) -> Result<(), io::Error> {
    fs::write(dir.join("meta.db"), meta)?;
    fs::write(dir.join("profile.db"), profile)?;
    fs::write(dir.join("cct.db"), cct)?;
    if let Some(trace) = trace {
        fs::write(dir.join("trace.db"), trace)?;
    }
    Ok(())
}

/// A small but complete program description.
///
/// ```text
/// main thread (#1)
///   #2 main
///     #3 main.c:12
///     #4 solve
///       #5 loop at solver.c:40
///         #6 instruction 0x2010
///       #7 memcpy (inlined)
/// ```
///
/// Metric `cycles` has propagated ids 0 (point) and 1 (execution) and summary ids 0 to 2,
/// metric `instructions` has propagated id 2 and summary id 3.
pub fn sample_meta() -> MetaSpec {
    let context = |parent, ctx_id| ContextSpec {
        parent,
        ctx_id,
        ..Default::default()
    };
    let summary = |scope, combine, stat_metric_id| SummarySpec {
        scope,
        formula: "$$".into(),
        combine,
        stat_metric_id,
    };

    MetaSpec {
        minor_version: 0,
        title: "app".into(),
        description: "measurement of ./app".into(),
        id_names: ["SUMMARY", "NODE", "RANK", "THREAD"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        modules: vec![
            ModuleSpec {
                path: "/usr/bin/app".into(),
                flags: 0,
            },
            ModuleSpec {
                path: "/lib/libc.so.6".into(),
                flags: 0,
            },
        ],
        files: vec![
            FileSpec {
                path: "src/main.c".into(),
                flags: 0,
            },
            FileSpec {
                path: "src/solver.c".into(),
                flags: 1,
            },
        ],
        functions: vec![
            FunctionSpec {
                name: "main".into(),
                point: Some((0, 0x1040)),
                source: Some((0, 10)),
                flags: 0,
            },
            FunctionSpec {
                name: "solve".into(),
                point: Some((0, 0x2000)),
                source: Some((1, 38)),
                flags: 0,
            },
            FunctionSpec {
                name: "memcpy".into(),
                point: Some((1, 0x9a0)),
                source: None,
                flags: 0,
            },
        ],
        scopes: vec![
            ScopeSpec {
                name: "point".into(),
                ty: 1,
                propagation_index: 0,
            },
            ScopeSpec {
                name: "execution".into(),
                ty: 2,
                propagation_index: 0,
            },
            ScopeSpec {
                name: "function".into(),
                ty: 3,
                propagation_index: 0,
            },
        ],
        metrics: vec![
            MetricSpec {
                name: "cycles".into(),
                scope_instances: vec![(0, 0), (1, 1)],
                summaries: vec![summary(0, 0, 0), summary(1, 0, 1), summary(1, 2, 2)],
            },
            MetricSpec {
                name: "instructions".into(),
                scope_instances: vec![(1, 2)],
                summaries: vec![summary(1, 0, 3)],
            },
        ],
        entry_points: vec![EntryPointSpec {
            ctx_id: 1,
            kind: 1,
            pretty_name: "main thread".into(),
        }],
        contexts: vec![
            ContextSpec {
                relation: 1,
                propagation: 1,
                function: Some(0),
                ..context(Parent::EntryPoint(0), 2)
            },
            ContextSpec {
                lexical_type: 2,
                source: Some((0, 12)),
                ..context(Parent::Context(0), 3)
            },
            ContextSpec {
                relation: 1,
                function: Some(1),
                point: Some((0, 0x1058)),
                ..context(Parent::Context(0), 4)
            },
            ContextSpec {
                lexical_type: 1,
                source: Some((1, 40)),
                ..context(Parent::Context(2), 5)
            },
            ContextSpec {
                lexical_type: 3,
                function: Some(1),
                source: Some((1, 44)),
                point: Some((0, 0x2010)),
                ..context(Parent::Context(3), 6)
            },
            ContextSpec {
                relation: 2,
                function: Some(2),
                point: Some((1, 0x9a0)),
                ..context(Parent::Context(2), 7)
            },
        ],
    }
}

/// The profiles matching [`sample_meta`]: the summary profile and two threads of one node.
pub fn sample_profiles() -> Vec<ProfileSpec> {
    let thread = |rank: u32, hwthread: u64| -> Vec<(u8, u16, u32, u64)> {
        vec![(1, 0, 0, 0), (2, 0, rank, 0), (3, 1, 0, hwthread)]
    };

    vec![
        ProfileSpec {
            id_tuple: None,
            flags: 1,
            values: vec![
                (1, vec![(1, 100.0), (2, 60.0), (3, 400.0)]),
                (2, vec![(1, 100.0), (3, 400.0)]),
                (6, vec![(0, 100.0)]),
            ],
        },
        ProfileSpec {
            id_tuple: Some(thread(0, 12)),
            flags: 0,
            values: vec![(2, vec![(1, 60.0), (2, 250.0)]), (6, vec![(0, 60.0)])],
        },
        ProfileSpec {
            id_tuple: Some(thread(1, 13)),
            flags: 0,
            values: vec![(2, vec![(1, 40.0), (2, 150.0)]), (6, vec![(0, 40.0)])],
        },
    ]
}

/// The per-context values matching [`sample_profiles`], indexed by context id.
pub fn sample_cct() -> Vec<CtxValuesSpec> {
    let mut contexts = vec![Vec::new(); 8];
    contexts[2] = vec![
        (1, vec![(1, 60.0), (2, 40.0)]),
        (2, vec![(1, 250.0), (2, 150.0)]),
    ];
    contexts[6] = vec![(0, vec![(1, 60.0), (2, 40.0)])];
    contexts
}

/// The timestamp range of [`sample_traces`].
pub const SAMPLE_TIMESTAMPS: (u64, u64) = (1000, 1600);

/// Traces of both thread profiles of [`sample_profiles`].
pub fn sample_traces() -> Vec<TraceSpec> {
    vec![
        TraceSpec {
            prof_index: 1,
            line: vec![(1000, 2), (1200, 4), (1400, 6)],
        },
        TraceSpec {
            prof_index: 2,
            line: vec![(1100, 2), (1600, 7)],
        },
    ]
}

/// Writes the complete sample database into `dir`.
pub fn write_sample_database(dir: &Path, with_trace: bool) -> Result<(), io::Error> {
    let (meta, _) = build_meta(&sample_meta());
    let (profile, _) = build_profile(0, &sample_profiles());
    let cct = build_cct(0, &sample_cct());
    let (trace, _) = build_trace(0, SAMPLE_TIMESTAMPS, &sample_traces());
    let trace = with_trace.then_some(trace.as_slice());
    write_database(dir, &meta, &profile, &cct, trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_layout() {
        let mut image = container(b"test", 1, 2);
        set_section(&mut image, 1, 0x30, 4);
        image.u32(7);
        let bytes = finish_container(image, b"_test.db");

        assert_eq!(&bytes[..14], b"HPCTOOLKITtest");
        assert_eq!(bytes[14], 4);
        assert_eq!(bytes[15], 1);
        assert_eq!(&bytes[0x20..0x28], &4u64.to_le_bytes());
        assert_eq!(&bytes[0x28..0x30], &0x30u64.to_le_bytes());
        assert_eq!(bytes.len(), 0x38 + 8);
        assert!(bytes.ends_with(b"_test.db"));
    }

    #[test]
    fn test_context_siblings_contiguous() {
        let spec = MetaSpec {
            entry_points: vec![EntryPointSpec {
                ctx_id: 1,
                ..Default::default()
            }],
            contexts: vec![
                ContextSpec {
                    ctx_id: 2,
                    ..Default::default()
                },
                ContextSpec {
                    parent: Parent::Context(0),
                    ctx_id: 3,
                    ..Default::default()
                },
                ContextSpec {
                    ctx_id: 4,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let (_, layout) = build_meta(&spec);
        assert_eq!(layout.contexts[2], layout.contexts[0] + 0x20);
        assert_eq!(layout.contexts[1], layout.contexts[2] + 0x20);
    }
}
