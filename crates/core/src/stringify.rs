//! Turning a tree back into text.
//!
//! Nodes print with their captured raws. A raw that was never captured (a node built by a
//! plugin, say) is inferred from the first node in the same tree that has one, and falls back
//! to a fixed default when the tree has no example.

use std::collections::HashMap;

use crate::node::{Node, NodeData, NodeId, NodeKind, RawValue, Root};

/// Which part of a node a builder chunk prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The whole node (declarations, comments, at-rules without a block).
    Whole,
    /// The opening of a block, up to and including `{`.
    Start,
    /// The closing `}` of a block, or a rule's trailing semicolons.
    End,
}

/// Receives every chunk of output in order, tagged with the node it belongs to when the
/// chunk carries node text rather than formatting.
pub trait Builder {
    fn push(&mut self, chunk: &str, node: Option<(NodeId, Phase)>);
}

impl<F: FnMut(&str, Option<(NodeId, Phase)>)> Builder for F {
    fn push(&mut self, chunk: &str, node: Option<(NodeId, Phase)>) {
        self(chunk, node)
    }
}

/// A raw slot a node may have captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Before,
    After,
    Between,
    Left,
    Right,
}

/// What to infer a missing raw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Detect {
    Before,
    After,
    BeforeDecl,
    BeforeRule,
    BeforeComment,
    BeforeClose,
    BeforeOpen,
    Colon,
    EmptyBody,
    Indent,
    CommentLeft,
    CommentRight,
}

impl Detect {
    fn default_raw(self) -> &'static str {
        match self {
            Detect::Before
            | Detect::After
            | Detect::BeforeRule
            | Detect::BeforeDecl
            | Detect::BeforeComment
            | Detect::BeforeClose => "\n",
            Detect::BeforeOpen => " ",
            Detect::Colon => ": ",
            Detect::CommentLeft | Detect::CommentRight => " ",
            Detect::EmptyBody => "",
            Detect::Indent => "    ",
        }
    }
}

fn slot(raws: &crate::Raws, slot: Slot) -> Option<&str> {
    match slot {
        Slot::Before => raws.before.as_deref(),
        Slot::After => raws.after.as_deref(),
        Slot::Between => raws.between.as_deref(),
        Slot::Left => raws.left.as_deref(),
        Slot::Right => raws.right.as_deref(),
    }
}

/// Drop whatever follows the last line break.
fn cut_last_line(value: &str) -> &str {
    match value.rfind('\n') {
        Some(i) => &value[..=i],
        None => value,
    }
}

fn strip_non_space(value: &str) -> String {
    value.chars().filter(|c| c.is_whitespace()).collect()
}

struct Stringifier<'r, B> {
    root: &'r Root,
    builder: B,
    cache: HashMap<Detect, String>,
    semicolon: Option<bool>,
}

impl<'r, B: Builder> Stringifier<'r, B> {
    fn new(root: &'r Root, builder: B) -> Self {
        Self {
            root,
            builder,
            cache: HashMap::new(),
            semicolon: None,
        }
    }

    fn node(&self, id: NodeId) -> &'r Node {
        &self.root.arena[id]
    }

    fn stringify(&mut self, id: NodeId, semicolon: bool) {
        let node = self.node(id);
        match &node.data {
            NodeData::Root => self.root_node(id),
            NodeData::Rule { selector } => self.rule(id, selector),
            NodeData::AtRule { name, params } => self.at_rule(id, name, params, semicolon),
            NodeData::Decl {
                prop,
                value,
                important,
            } => self.decl(id, prop, value, *important, semicolon),
            NodeData::Comment { text } => self.comment(id, text),
        }
    }

    fn root_node(&mut self, id: NodeId) {
        self.body(id);
        if let Some(after) = self.node(id).raws.after.as_deref().filter(|a| !a.is_empty()) {
            self.builder.push(after, None);
        }
    }

    fn rule(&mut self, id: NodeId, selector: &str) {
        let node = self.node(id);
        let selector = raw_value(selector, node.raws.selector.as_ref());
        self.block(id, selector.to_string());
        if let Some(own) = node.raws.own_semicolon.as_deref().filter(|s| !s.is_empty()) {
            self.builder.push(own, Some((id, Phase::End)));
        }
    }

    fn at_rule(&mut self, id: NodeId, name: &str, params: &str, semicolon: bool) {
        let node = self.node(id);
        let params = if params.is_empty() {
            ""
        } else {
            raw_value(params, node.raws.params.as_ref())
        };

        let mut start = format!("@{name}");
        match node.raws.after_name.as_deref() {
            Some(after_name) => start.push_str(after_name),
            None if !params.is_empty() => start.push(' '),
            None => {}
        }
        start.push_str(params);

        if node.is_container() {
            self.block(id, start);
        } else {
            start.push_str(node.raws.between.as_deref().unwrap_or_default());
            if semicolon {
                start.push(';');
            }
            self.builder.push(&start, Some((id, Phase::Whole)));
        }
    }

    fn decl(&mut self, id: NodeId, prop: &str, value: &str, important: bool, semicolon: bool) {
        let between = self.raw(id, Some(Slot::Between), Detect::Colon);
        let node = self.node(id);
        let mut out = format!(
            "{prop}{between}{}",
            raw_value(value, node.raws.value.as_ref())
        );
        if important {
            out.push_str(node.raws.important.as_deref().unwrap_or(" !important"));
        }
        if semicolon {
            out.push(';');
        }
        self.builder.push(&out, Some((id, Phase::Whole)));
    }

    fn comment(&mut self, id: NodeId, text: &str) {
        let left = self.raw(id, Some(Slot::Left), Detect::CommentLeft);
        let right = self.raw(id, Some(Slot::Right), Detect::CommentRight);
        let out = format!("/*{left}{text}{right}*/");
        self.builder.push(&out, Some((id, Phase::Whole)));
    }

    fn block(&mut self, id: NodeId, start: String) {
        let between = self.raw(id, Some(Slot::Between), Detect::BeforeOpen);
        self.builder
            .push(&format!("{start}{between}{{"), Some((id, Phase::Start)));

        let after = if self.node(id).children().is_empty() {
            self.raw(id, Some(Slot::After), Detect::EmptyBody)
        } else {
            self.body(id);
            self.raw(id, Some(Slot::After), Detect::After)
        };
        if !after.is_empty() {
            self.builder.push(&after, None);
        }
        self.builder.push("}", Some((id, Phase::End)));
    }

    fn body(&mut self, id: NodeId) {
        let children = self.node(id).children();
        let mut last = children.len().saturating_sub(1);
        while last > 0 && self.node(children[last]).kind() == NodeKind::Comment {
            last -= 1;
        }
        let semicolon = self.raw_semicolon(id);

        for (i, &child) in children.iter().enumerate() {
            let before = self.raw(child, Some(Slot::Before), Detect::Before);
            if !before.is_empty() {
                self.builder.push(&before, None);
            }
            self.stringify(child, last != i || semicolon);
        }
    }

    /// The captured raw in `own`, or one inferred through `detect`.
    fn raw(&mut self, id: NodeId, own: Option<Slot>, detect: Detect) -> String {
        let node = self.node(id);
        if let Some(value) = own.and_then(|own| slot(&node.raws, own)) {
            return value.to_string();
        }

        let parent = node.parent.map(|p| self.node(p));
        if detect == Detect::Before {
            let first_in_root = parent.is_some_and(|p| {
                p.kind() == NodeKind::Root && p.children().first() == Some(&id)
            });
            if parent.is_none() || first_in_root {
                return String::new();
            }
        }
        if parent.is_none() {
            return detect.default_raw().to_string();
        }

        if let Some(cached) = self.cache.get(&detect) {
            return cached.clone();
        }
        if matches!(detect, Detect::Before | Detect::After) {
            return self.before_after(id, detect);
        }

        let top = self.root.root_of(id);
        let value = match detect {
            Detect::BeforeDecl => Some(self.raw_before_decl(top, id)),
            Detect::BeforeRule => self.raw_before_rule(top),
            Detect::BeforeComment => Some(self.raw_before_comment(top, id)),
            Detect::BeforeClose => self.raw_before_close(top),
            Detect::BeforeOpen => self.find(top, |_, n| {
                (n.kind() != NodeKind::Decl)
                    .then_some(n.raws.between.as_deref())
                    .flatten()
                    .map(str::to_string)
            }),
            Detect::Colon => self.find(top, |_, n| {
                let between = n.raws.between.as_deref().filter(|_| n.kind() == NodeKind::Decl)?;
                Some(between.chars().filter(|&c| c == ':' || c.is_whitespace()).collect())
            }),
            Detect::EmptyBody => self.find(top, |_, n| {
                n.nodes
                    .as_ref()
                    .filter(|c| c.is_empty())
                    .and_then(|_| n.raws.after.clone())
            }),
            Detect::Indent => self.raw_indent(top),
            Detect::CommentLeft | Detect::CommentRight => {
                let own = own.unwrap_or(Slot::Left);
                self.find(top, |_, n| slot(&n.raws, own).map(str::to_string))
            }
            Detect::Before | Detect::After => None,
        };

        let value = value.unwrap_or_else(|| detect.default_raw().to_string());
        self.cache.insert(detect, value.clone());
        value
    }

    fn raw_semicolon(&mut self, id: NodeId) -> bool {
        let node = self.node(id);
        if let Some(value) = node.raws.semicolon {
            return value;
        }
        if node.parent.is_none() {
            return false;
        }
        if let Some(value) = self.semicolon {
            return value;
        }
        let top = self.root.root_of(id);
        let root = self.root;
        let value = self
            .find(top, |_, n| {
                let last = *n.children().last()?;
                (root.arena[last].kind() == NodeKind::Decl)
                    .then_some(n.raws.semicolon)
                    .flatten()
            })
            .unwrap_or(false);
        self.semicolon = Some(value);
        value
    }

    fn before_after(&mut self, id: NodeId, detect: Detect) -> String {
        let mut value = match self.node(id).kind() {
            NodeKind::Decl => self.raw(id, None, Detect::BeforeDecl),
            NodeKind::Comment => self.raw(id, None, Detect::BeforeComment),
            _ if detect == Detect::Before => self.raw(id, None, Detect::BeforeRule),
            _ => self.raw(id, None, Detect::BeforeClose),
        };

        let mut depth = 0;
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            let parent = self.node(parent);
            if parent.kind() == NodeKind::Root {
                break;
            }
            depth += 1;
            current = parent.parent;
        }

        if value.contains('\n') {
            let indent = self.raw(id, None, Detect::Indent);
            value.push_str(&indent.repeat(depth));
        }
        value
    }

    fn raw_before_decl(&mut self, top: NodeId, id: NodeId) -> String {
        let found = self.find(top, |_, n| {
            (n.kind() == NodeKind::Decl)
                .then_some(n.raws.before.as_deref())
                .flatten()
                .map(|b| cut_last_line(b).to_string())
        });
        match found {
            Some(value) => strip_non_space(&value),
            None => self.raw(id, None, Detect::BeforeRule),
        }
    }

    fn raw_before_comment(&mut self, top: NodeId, id: NodeId) -> String {
        let found = self.find(top, |_, n| {
            (n.kind() == NodeKind::Comment)
                .then_some(n.raws.before.as_deref())
                .flatten()
                .map(|b| cut_last_line(b).to_string())
        });
        match found {
            Some(value) => strip_non_space(&value),
            None => self.raw(id, None, Detect::BeforeDecl),
        }
    }

    fn raw_before_rule(&self, top: NodeId) -> Option<String> {
        let first = self.root.first(top);
        self.find(top, |id, n| {
            if !n.is_container() || (n.parent == Some(top) && first == Some(id)) {
                return None;
            }
            n.raws.before.as_deref().map(|b| cut_last_line(b).to_string())
        })
        .map(|value| strip_non_space(&value))
    }

    fn raw_before_close(&self, top: NodeId) -> Option<String> {
        self.find(top, |_, n| {
            if n.children().is_empty() {
                return None;
            }
            n.raws.after.as_deref().map(|a| cut_last_line(a).to_string())
        })
        .map(|value| strip_non_space(&value))
    }

    fn raw_indent(&self, top: NodeId) -> Option<String> {
        if let Some(indent) = self.node(top).raws.indent.as_deref().filter(|i| !i.is_empty()) {
            return Some(indent.to_string());
        }
        self.find(top, |_, n| {
            let parent = n.parent?;
            if parent == top || self.node(parent).parent != Some(top) {
                return None;
            }
            let before = n.raws.before.as_deref()?;
            let last_line = before.rsplit('\n').next().unwrap_or_default();
            Some(strip_non_space(last_line))
        })
    }

    /// First `Some` produced by `f` over the descendants of `top`, in document order.
    fn find<T>(&self, top: NodeId, mut f: impl FnMut(NodeId, &'r Node) -> Option<T>) -> Option<T> {
        let mut stack: Vec<NodeId> = self.node(top).children().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if let Some(found) = f(id, node) {
                return Some(found);
            }
            stack.extend(node.children().iter().rev().copied());
        }
        None
    }
}

/// The original text of a cleaned field, while the field still holds the cleaned value.
fn raw_value<'a>(value: &'a str, raw: Option<&'a RawValue>) -> &'a str {
    match raw {
        Some(raw) if raw.value == value => &raw.raw,
        _ => value,
    }
}

/// Infer the raw `own` of `id` the way the stringifier would when it is missing.
pub(crate) fn infer_raw(root: &Root, id: NodeId, own: Slot, detect: Detect) -> String {
    Stringifier::new(root, |_: &str, _: Option<(NodeId, Phase)>| {}).raw(id, Some(own), detect)
}

impl Root {
    /// Stringify the subtree `id`.
    pub fn to_string_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.stringify_with(id, |chunk: &str, _: Option<(NodeId, Phase)>| out.push_str(chunk));
        out
    }

    /// Stringify the subtree `id`, handing each chunk to `builder`.
    pub fn stringify_with(&self, id: NodeId, builder: impl Builder) {
        if !self.contains(id) {
            return;
        }
        Stringifier::new(self, builder).stringify(id, false);
    }
}
