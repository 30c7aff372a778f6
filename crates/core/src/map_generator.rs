//! Source map generation.
//!
//! The map is built from the stringifier's chunk callback: every node gets a mapping where
//! its text starts and, for nodes closed by `}` or `;`, one on that last character. Nodes
//! whose input carried a previous map are resolved through it, so the final map points at
//! the upstream sources.
//!
//! Notes/limitations:
//!
//! - Line/column are UTF-16 code unit based (JS sourcemap convention).
//! - A mapping the previous map cannot resolve keeps pointing at the intermediate file.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use sourcemap::{SourceMap, SourceMapBuilder};

use crate::{
    Error,
    input::{Input, Position, Source},
    node::{NodeId, NodeKind, Root},
    options::{Annotation, MapOptions, MapSetting, ProcessOptions},
    previous_map::{PreviousMap, dirname, is_url, normalize},
    stringify::Phase,
    uri,
    utf16::utf16_len,
};

const NO_SOURCE: &str = "<no source>";

/// One output position and where it came from. Everything is 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    dst_line: u32,
    dst_col: u32,
    src_line: u32,
    src_col: u32,
    source: String,
    name: Option<String>,
}

/// Stringifies a root and builds its source map according to [`ProcessOptions::map`].
pub struct MapGenerator<'a> {
    root: &'a mut Root,
    opts: &'a ProcessOptions,
    map_opts: MapOptions,
    previous: Vec<Arc<Input>>,
}

impl<'a> MapGenerator<'a> {
    pub fn new(root: &'a mut Root, opts: &'a ProcessOptions) -> Self {
        let map_opts = opts.map.options().cloned().unwrap_or_default();
        let previous = inputs(root)
            .into_iter()
            .filter(|input| input.map().is_some())
            .collect();
        Self {
            root,
            opts,
            map_opts,
            previous,
        }
    }

    /// Produce the CSS and, unless it was inlined or not requested, the map.
    ///
    /// Earlier `sourceMappingURL` annotations at the root level are removed first.
    pub fn generate(mut self) -> Result<(String, Option<SourceMap>), Error> {
        self.clear_annotation()?;
        if !self.is_map() {
            return Ok((self.root.to_string(), None));
        }

        let (mut css, mut mappings) = self.generate_string();
        sort_and_dedup_mappings(&mut mappings);
        let map = self.build(mappings)?;

        if self.is_annotation() {
            let content = if self.is_inline() {
                map.to_data_url()?
            } else {
                match &self.map_opts.annotation {
                    Some(Annotation::Path(path)) => path.clone(),
                    _ => format!("{}.map", self.output_file()),
                }
            };
            let eol = if css.contains("\r\n") { "\r\n" } else { "\n" };
            css.push_str(eol);
            css.push_str("/*# sourceMappingURL=");
            css.push_str(&content);
            css.push_str(" */");
        }

        tracing::debug!(
            file = %self.output_file(),
            inline = self.is_inline(),
            previous = self.previous.len(),
            tokens = map.get_token_count(),
            "generated source map"
        );

        if self.is_inline() {
            Ok((css, None))
        } else {
            Ok((css, Some(map)))
        }
    }

    fn clear_annotation(&mut self) -> Result<(), Error> {
        if self.map_opts.annotation == Some(Annotation::Enabled(false)) {
            return Ok(());
        }
        let root = self.root.id();
        for &child in self.root.children(root).to_vec().iter().rev() {
            let stale = self.root.get(child).and_then(|n| n.text()).is_some_and(|text| {
                text.starts_with("# sourceMappingURL=")
            });
            if stale {
                self.root.remove_child(root, child)?;
            }
        }
        Ok(())
    }

    fn is_map(&self) -> bool {
        match self.opts.map {
            MapSetting::Auto => !self.previous.is_empty(),
            MapSetting::Disabled => false,
            MapSetting::Enabled(_) => true,
        }
    }

    fn is_inline(&self) -> bool {
        if let Some(inline) = self.map_opts.inline {
            return inline;
        }
        match &self.map_opts.annotation {
            None | Some(Annotation::Enabled(true)) => {}
            Some(_) => return false,
        }
        if self.previous.is_empty() {
            return true;
        }
        self.previous_maps().any(PreviousMap::inline)
    }

    fn is_annotation(&self) -> bool {
        if self.is_inline() {
            return true;
        }
        match &self.map_opts.annotation {
            Some(Annotation::Enabled(enabled)) => *enabled,
            Some(Annotation::Path(_)) => true,
            None if self.previous.is_empty() => true,
            None => self.previous_maps().any(|m| m.annotation().is_some()),
        }
    }

    fn is_sources_content(&self) -> bool {
        if let Some(content) = self.map_opts.sources_content {
            return content;
        }
        if self.previous.is_empty() {
            return true;
        }
        self.previous_maps().any(PreviousMap::with_content)
    }

    fn previous_maps(&self) -> impl Iterator<Item = &PreviousMap> {
        self.previous.iter().filter_map(|input| input.map())
    }

    fn output_file(&self) -> String {
        match (&self.opts.to, &self.opts.from) {
            (Some(to), _) => self.path(to),
            (None, Some(from)) => self.path(from),
            (None, None) => "to.css".to_string(),
        }
    }

    /// `file` relative to the output directory, unless absolute paths were requested.
    fn path(&self, file: &str) -> String {
        if self.map_opts.absolute || file.starts_with('<') || is_url(file) {
            return file.to_string();
        }
        let mut from = match &self.opts.to {
            Some(to) => dirname(to),
            None => PathBuf::from("."),
        };
        if let Some(Annotation::Path(annotation)) = &self.map_opts.annotation {
            from = dirname(&from.join(annotation).display().to_string());
        }
        relative(&from, Path::new(file))
    }

    fn source_path(&self, input: &Input) -> String {
        if let Some(from) = &self.map_opts.from {
            return to_url(from);
        }
        if self.map_opts.absolute {
            return format!("file://{}", to_url(input.from()));
        }
        to_url(&self.path(input.from()))
    }

    /// URL that sources of `prev` are relative to.
    fn previous_root(&self, prev: &PreviousMap) -> Option<String> {
        let root = match (prev.root(), prev.file()) {
            (Some(root), _) => root.display().to_string(),
            (None, Some(file)) => dirname(file).display().to_string(),
            (None, None) => return None,
        };
        Some(to_url(&self.path(&root)))
    }

    /// The origin of a node position, resolved through its input's previous map.
    fn origin(&self, source: &Source, position: Position) -> (String, u32, u32, Option<String>) {
        let line = position.line.saturating_sub(1);
        let column = position.column.saturating_sub(1);
        if let Some(prev) = source.input.map() {
            if let Some(original) = prev.original_position(line, column) {
                let source = match self.previous_root(prev) {
                    Some(root) => join(&root, &original.source),
                    None => original.source,
                };
                return (source, original.line, original.column, original.name);
            }
        }
        (self.source_path(&source.input), line, column, None)
    }

    fn generate_string(&self) -> (String, Vec<Mapping>) {
        let root: &Root = &*self.root;
        let mut css = String::new();
        let mut mappings = Vec::new();
        let mut line = 1u32;
        let mut column = 1u32;

        let mut push = |line: u32, column: u32, origin: Option<(String, u32, u32, Option<String>)>| {
            let (source, src_line, src_col, name) =
                origin.unwrap_or_else(|| (NO_SOURCE.to_string(), 0, 0, None));
            mappings.push(Mapping {
                dst_line: line - 1,
                dst_col: column,
                src_line,
                src_col,
                source,
                name,
            });
        };

        root.stringify_with(root.id(), |chunk: &str, node: Option<(NodeId, Phase)>| {
            css.push_str(chunk);
            let id = node.map(|(id, _)| id);
            let source = id.and_then(|id| root.get(id)?.source.as_ref());

            if node.is_some_and(|(_, phase)| phase != Phase::End) {
                let origin = source.and_then(|s| Some(self.origin(s, s.start?)));
                push(line, column - 1, origin);
            }

            match chunk.rfind('\n') {
                Some(last) => {
                    line += chunk.matches('\n').count() as u32;
                    column = utf16_len(&chunk[last + 1..]) as u32 + 1;
                }
                None => column += utf16_len(chunk) as u32,
            }

            if !node.is_some_and(|(_, phase)| phase != Phase::Start) {
                return;
            }
            let Some(node) = id.and_then(|id| root.get(id)) else {
                return;
            };
            // The last declaration of a block without a trailing `;` has no end to map.
            let childless = node.kind() == NodeKind::Decl
                || (node.kind() == NodeKind::AtRule && !node.is_container());
            if let Some(parent) = node.parent().and_then(|p| root.get(p)) {
                let is_last = parent.children().last().copied() == id;
                if childless && is_last && parent.raws.semicolon != Some(true) {
                    return;
                }
            }
            match source.and_then(|s| Some((s, s.end?))) {
                Some((source, end)) => {
                    push(line, column.saturating_sub(2), Some(self.origin(source, end)))
                }
                None => push(line, column - 1, None),
            }
        });

        (css, mappings)
    }

    fn build(&self, mappings: Vec<Mapping>) -> Result<SourceMap, Error> {
        let output_file = self.output_file();
        let mut builder = SourceMapBuilder::new(Some(&output_file));

        for m in &mappings {
            // Force point mappings; spans are controlled by adjacent entries.
            builder.add(
                m.dst_line,
                m.dst_col,
                m.src_line,
                m.src_col,
                Some(&m.source),
                m.name.as_deref(),
                false,
            );
        }

        let mut contents: HashMap<String, String> = HashMap::new();
        if self.map_opts.sources_content != Some(false) {
            for prev in self.previous_maps() {
                let root = self.previous_root(prev);
                let consumer = prev.consumer();
                for i in 0..consumer.get_source_count() {
                    let (Some(name), Some(content)) =
                        (consumer.get_source(i), consumer.get_source_contents(i))
                    else {
                        continue;
                    };
                    let name = match &root {
                        Some(root) => join(root, name),
                        None => name.to_string(),
                    };
                    contents.insert(name, content.to_string());
                }
            }
        }
        if self.is_sources_content() {
            for input in inputs(self.root) {
                contents
                    .entry(self.source_path(&input))
                    .or_insert_with(|| input.css().to_string());
            }
        }

        let mut seen = Vec::new();
        for m in &mappings {
            if seen.contains(&m.source) {
                continue;
            }
            seen.push(m.source.clone());
            let id = builder.add_source(&m.source);
            if let Some(content) = contents.get(&m.source) {
                builder.set_source_contents(id, Some(content));
            }
        }

        Ok(builder.into_sourcemap())
    }
}

/// Distinct inputs referenced by the tree, in document order.
fn inputs(root: &Root) -> Vec<Arc<Input>> {
    let mut inputs: Vec<Arc<Input>> = Vec::new();
    let mut stack = vec![root.id()];
    while let Some(id) = stack.pop() {
        let Some(node) = root.get(id) else {
            continue;
        };
        if let Some(source) = &node.source {
            if !inputs.iter().any(|i| Arc::ptr_eq(i, &source.input)) {
                inputs.push(source.input.clone());
            }
        }
        stack.extend(node.children().iter().rev().copied());
    }
    inputs
}

/// Order mappings by generated position, keeping the first of any duplicates.
fn sort_and_dedup_mappings(mappings: &mut Vec<Mapping>) {
    mappings.sort_by_key(|m| (m.dst_line, m.dst_col));
    mappings.dedup_by_key(|m| (m.dst_line, m.dst_col));
}

fn relative(from: &Path, to: &Path) -> String {
    let absolute = |p: &Path| {
        let p = if p.as_os_str().is_empty() { Path::new(".") } else { p };
        normalize(&std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf()))
    };
    let to = absolute(to);
    pathdiff::diff_paths(&to, absolute(from))
        .unwrap_or(to)
        .display()
        .to_string()
}

fn to_url(path: &str) -> String {
    let path = path.replace('\\', "/");
    uri::encode(&path)
}

/// Join a source path onto a map root the way source map consumers do.
fn join(root: &str, path: &str) -> String {
    if root.is_empty() || is_url(path) || path.starts_with('/') {
        return path.to_string();
    }
    let joined = normalize(&Path::new(root).join(path));
    joined.display().to_string().replace('\\', "/")
}
