//! The syntax tree.
//!
//! A [`Root`] is an arena: it owns every node, including detached ones, in a
//! [`slotmap::SlotMap`]. Containers list their children as [`NodeId`]s and every node keeps a
//! non-owning `parent` id, so moving or removing a node only rewrites ids.
//!
//! Invariants:
//!
//! - A child's `parent` is the container whose child list holds it, and it appears in at most
//!   one child list.
//! - Each structural or field mutation marks the node and its ancestors dirty; the pipeline's
//!   fixed-point visitor re-walks dirty nodes only.
//! - Raws are formatting captured by the parser. Value-like raws store the cleaned value next
//!   to the original text and are only reused while the node's field still equals it.

use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::{
    Error,
    input::Source,
    list,
    stringify::{self, Detect, Slot},
    syntax_error::CssSyntaxError,
};

new_key_type! {
    /// Handle to a node stored in a [`Root`].
    pub struct NodeId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "root")]
    Root,
    #[serde(rename = "rule")]
    Rule,
    #[serde(rename = "atrule")]
    AtRule,
    #[serde(rename = "decl")]
    Decl,
    #[serde(rename = "comment")]
    Comment,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Rule => "rule",
            NodeKind::AtRule => "atrule",
            NodeKind::Decl => "decl",
            NodeKind::Comment => "comment",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific node fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Root,
    Rule { selector: String },
    AtRule { name: String, params: String },
    Decl {
        prop: String,
        value: String,
        important: bool,
    },
    Comment { text: String },
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Root => NodeKind::Root,
            NodeData::Rule { .. } => NodeKind::Rule,
            NodeData::AtRule { .. } => NodeKind::AtRule,
            NodeData::Decl { .. } => NodeKind::Decl,
            NodeData::Comment { .. } => NodeKind::Comment,
        }
    }
}

/// A cleaned field value next to the source text it was cleaned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValue {
    pub value: String,
    pub raw: String,
}

/// Original formatting around and inside a node.
///
/// `None` means "not captured"; the stringifier then infers the slot from other nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Raws {
    /// Whitespace and junk before the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Whitespace after the last child of a container (before `}` or end of input).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Text between the property and value, or between the selector/params and `{`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub between: Option<String>,
    /// Whether the last child of a container is followed by `;`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semicolon: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_name: Option<String>,
    /// Comment padding after `/*`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    /// Comment padding before `*/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    /// The `!important` text when it differs from ` !important`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub important: Option<String>,
    /// Free semicolons after a rule's closing brace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_semicolon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RawValue>,
}

/// One node of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) data: NodeData,
    pub raws: Raws,
    pub source: Option<Source>,
    pub(crate) parent: Option<NodeId>,
    /// `Some` for containers; at-rules without a block have `None`.
    pub(crate) nodes: Option<Vec<NodeId>>,
    /// Active iteration cursors: `(iteration id, index of the current child)`.
    pub(crate) cursors: Vec<(u32, isize)>,
    pub(crate) last_each: u32,
    pub(crate) clean: bool,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        let nodes = matches!(data, NodeData::Root | NodeData::Rule { .. }).then(Vec::new);
        Self {
            data,
            raws: Raws::default(),
            source: None,
            parent: None,
            nodes,
            cursors: Vec::new(),
            last_each: 0,
            clean: false,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids; empty for non-containers.
    pub fn children(&self) -> &[NodeId] {
        self.nodes.as_deref().unwrap_or(&[])
    }

    /// Whether the node owns a child list (an at-rule may or may not).
    pub fn is_container(&self) -> bool {
        self.nodes.is_some()
    }

    pub fn selector(&self) -> Option<&str> {
        match &self.data {
            NodeData::Rule { selector } => Some(selector),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.data {
            NodeData::AtRule { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<&str> {
        match &self.data {
            NodeData::AtRule { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn prop(&self) -> Option<&str> {
        match &self.data {
            NodeData::Decl { prop, .. } => Some(prop),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.data {
            NodeData::Decl { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn important(&self) -> bool {
        matches!(
            self.data,
            NodeData::Decl {
                important: true,
                ..
            }
        )
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Comment { text } => Some(text),
            _ => None,
        }
    }

    /// Whether the node was visited and not changed since.
    pub fn is_clean(&self) -> bool {
        self.clean
    }
}

/// A stylesheet tree and the arena that owns its nodes.
#[derive(Debug, Clone)]
pub struct Root {
    pub(crate) arena: SlotMap<NodeId, Node>,
    pub(crate) root: NodeId,
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    /// An empty tree.
    pub fn new() -> Self {
        let mut arena = SlotMap::with_key();
        let root = arena.insert(Node::new(NodeData::Root));
        Self { arena, root }
    }

    /// Id of the root node.
    pub fn id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.arena.get(id).ok_or(Error::UnknownNode)
    }

    /// Mutable access to a node's raws and source. The node is marked dirty.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Error> {
        if !self.arena.contains_key(id) {
            return Err(Error::UnknownNode);
        }
        self.mark_dirty(id);
        self.arena.get_mut(id).ok_or(Error::UnknownNode)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains_key(id)
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        self.arena.insert(Node::new(data))
    }

    /// A detached declaration.
    pub fn decl(&mut self, prop: impl Into<String>, value: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Decl {
            prop: prop.into(),
            value: value.into(),
            important: false,
        })
    }

    /// A detached rule with no children.
    pub fn rule(&mut self, selector: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Rule {
            selector: selector.into(),
        })
    }

    /// A detached at-rule without a block. Appending to it creates one.
    pub fn at_rule(&mut self, name: impl Into<String>, params: impl Into<String>) -> NodeId {
        self.alloc(NodeData::AtRule {
            name: name.into(),
            params: params.into(),
        })
    }

    /// A detached comment.
    pub fn comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Comment { text: text.into() })
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.arena.get(id).map(Node::kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.arena.get(id).map(Node::children).unwrap_or(&[])
    }

    /// Position of `child` in `parent`'s child list.
    pub fn index_in(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Position of `id` in its parent's child list.
    pub fn index(&self, id: NodeId) -> Option<usize> {
        self.index_in(self.parent(id)?, id)
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in(parent, id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in(parent, id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn first(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// The top-most ancestor of `id` (itself when detached).
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Depth below the top-most ancestor.
    #[cfg(test)]
    pub(crate) fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Mark `id` and its ancestors as needing another visit.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if !node.clean {
            return;
        }
        node.clean = false;
        let mut next = node.parent;
        while let Some(parent) = next {
            match self.arena.get_mut(parent) {
                Some(p) => {
                    p.clean = false;
                    next = p.parent;
                }
                None => break,
            }
        }
    }

    /// Mark `id` and all of its descendants dirty.
    pub(crate) fn mark_tree_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.arena.get_mut(current) {
                node.clean = false;
                stack.extend(node.children().iter().copied());
            }
        }
    }

    pub(crate) fn set_clean(&mut self, id: NodeId, clean: bool) {
        if let Some(node) = self.arena.get_mut(id) {
            node.clean = clean;
        }
    }

    pub fn is_clean(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some_and(|n| n.clean)
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData, Error> {
        Ok(&mut self.arena.get_mut(id).ok_or(Error::UnknownNode)?.data)
    }

    /// Run `update` on the node's data; marks the node dirty when it reports a change.
    fn update(
        &mut self,
        id: NodeId,
        expected: NodeKind,
        update: impl FnOnce(&mut NodeData) -> bool,
    ) -> Result<(), Error> {
        let data = self.data_mut(id)?;
        if data.kind() != expected {
            return Err(Error::WrongKind {
                expected,
                found: data.kind(),
            });
        }
        if update(data) {
            self.mark_dirty(id);
        }
        Ok(())
    }

    pub fn set_prop(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::Decl, |data| match data {
            NodeData::Decl { prop, .. } if *prop != new => {
                *prop = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_value(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::Decl, |data| match data {
            NodeData::Decl { value, .. } if *value != new => {
                *value = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_important(&mut self, id: NodeId, new: bool) -> Result<(), Error> {
        self.update(id, NodeKind::Decl, |data| match data {
            NodeData::Decl { important, .. } if *important != new => {
                *important = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_selector(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::Rule, |data| match data {
            NodeData::Rule { selector } if *selector != new => {
                *selector = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_name(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::AtRule, |data| match data {
            NodeData::AtRule { name, .. } if *name != new => {
                *name = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_params(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::AtRule, |data| match data {
            NodeData::AtRule { params, .. } if *params != new => {
                *params = new;
                true
            }
            _ => false,
        })
    }

    pub fn set_text(&mut self, id: NodeId, new: impl Into<String>) -> Result<(), Error> {
        let new = new.into();
        self.update(id, NodeKind::Comment, |data| match data {
            NodeData::Comment { text } if *text != new => {
                *text = new;
                true
            }
            _ => false,
        })
    }

    /// The rule's selector split on top-level commas.
    pub fn selectors(&self, id: NodeId) -> Vec<String> {
        self.get(id)
            .and_then(Node::selector)
            .map(list::comma)
            .unwrap_or_default()
    }

    /// Replace the rule's selector with `values`, joined by the separator already used in the
    /// selector, or by `,` and the tree's usual spacing.
    pub fn set_selectors<I, S>(&mut self, id: NodeId, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current = self.node(id)?.selector().ok_or(Error::WrongKind {
            expected: NodeKind::Rule,
            found: self.node(id)?.kind(),
        })?;
        let sep = match current.find(',') {
            Some(comma) => {
                let spaces = current[comma + 1..]
                    .bytes()
                    .take_while(u8::is_ascii_whitespace)
                    .count();
                current[comma..comma + 1 + spaces].to_string()
            }
            None => format!(
                ",{}",
                stringify::infer_raw(self, id, Slot::Between, Detect::BeforeOpen)
            ),
        };
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&sep);
        self.set_selector(id, joined)
    }

    /// Deep-copy a subtree into a detached node.
    ///
    /// The copy keeps `source` but drops the top node's `before` and `between` raws so it
    /// takes its formatting from wherever it is inserted.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let copy = self.copy_subtree(id)?;
        if let Some(node) = self.arena.get_mut(copy) {
            node.raws.before = None;
            node.raws.between = None;
        }
        Ok(copy)
    }

    /// Insert a copy of `id` right before it.
    pub fn clone_before(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let copy = self.clone_node(id)?;
        self.insert_before(id, copy)?;
        Ok(copy)
    }

    /// Insert a copy of `id` right after it.
    pub fn clone_after(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let copy = self.clone_node(id)?;
        self.insert_after(id, copy)?;
        Ok(copy)
    }

    pub(crate) fn copy_subtree(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let node = self.node(id)?;
        let mut copy = Node::new(node.data.clone());
        copy.raws = node.raws.clone();
        copy.source = node.source.clone();
        let children: Option<Vec<NodeId>> = node.nodes.clone();
        copy.nodes = children.as_ref().map(|_| Vec::new());

        let copy_id = self.arena.insert(copy);
        for child in children.unwrap_or_default() {
            let child_copy = self.copy_subtree(child)?;
            if let Some(node) = self.arena.get_mut(child_copy) {
                node.parent = Some(copy_id);
            }
            if let Some(list) = self.arena.get_mut(copy_id).and_then(|n| n.nodes.as_mut()) {
                list.push(child_copy);
            }
        }
        Ok(copy_id)
    }

    /// Drop captured formatting from a subtree so it is stringified with inferred raws.
    pub fn clean_raws(&mut self, id: NodeId, keep_between: bool) -> Result<(), Error> {
        let node = self.arena.get_mut(id).ok_or(Error::UnknownNode)?;
        node.raws.before = None;
        node.raws.after = None;
        if !keep_between {
            node.raws.between = None;
        }
        let children = node.children().to_vec();
        self.mark_dirty(id);
        for child in children {
            self.clean_raws(child, keep_between)?;
        }
        Ok(())
    }

    /// A syntax error located at the node's source, or unpositioned when it has none.
    pub fn error(&self, id: NodeId, reason: impl Into<String>) -> CssSyntaxError {
        let reason = reason.into();
        let Some(source) = self.get(id).and_then(|n| n.source.as_ref()) else {
            return CssSyntaxError::new(reason);
        };
        match source.start {
            Some(start) => source.input.error(
                reason,
                (start.line, start.column),
                source.end.map(|end| (end.line, end.column + 1)),
            ),
            None => CssSyntaxError::new(reason),
        }
    }

    /// Copy the subtree `id` of `other` into this arena as a detached node.
    pub(crate) fn import(&mut self, other: &Root, id: NodeId, keep_source: bool) -> Option<NodeId> {
        let node = other.get(id)?;
        let mut copy = Node::new(node.data.clone());
        copy.raws = node.raws.clone();
        if keep_source {
            copy.source = node.source.clone();
        }
        copy.nodes = node.nodes.as_ref().map(|_| Vec::new());
        let copy_id = self.arena.insert(copy);
        for &child in node.children() {
            let Some(child_copy) = self.import(other, child, keep_source) else {
                continue;
            };
            if let Some(n) = self.arena.get_mut(child_copy) {
                n.parent = Some(copy_id);
            }
            if let Some(list) = self.arena.get_mut(copy_id).and_then(|n| n.nodes.as_mut()) {
                list.push(child_copy);
            }
        }
        Some(copy_id)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_of(self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn navigation_follows_child_lists() {
        let root = parse("a{x:1;y:2;z:3}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        let [x, y, z] = root.children(rule) else {
            panic!("expected three declarations");
        };
        assert_eq!(root.parent(*y), Some(rule));
        assert_eq!(root.index(*y), Some(1));
        assert_eq!(root.next(*x), Some(*y));
        assert_eq!(root.prev(*y), Some(*x));
        assert_eq!(root.prev(*x), None);
        assert_eq!(root.last(rule), Some(*z));
        assert_eq!(root.root_of(*z), root.id());
        assert_eq!(root.depth(*z), 2);
    }

    #[test]
    fn setters_mark_ancestors_dirty() {
        let mut root = parse("a{color:red}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        let decl = root.first(rule).unwrap();
        for id in [root.id(), rule, decl] {
            root.set_clean(id, true);
        }

        root.set_value(decl, "red").unwrap();
        assert!(root.is_clean(root.id()), "unchanged value keeps the tree clean");

        root.set_value(decl, "blue").unwrap();
        assert!(!root.is_clean(decl));
        assert!(!root.is_clean(rule));
        assert!(!root.is_clean(root.id()));
    }

    #[test]
    fn setter_rejects_wrong_kind() {
        let mut root = parse("a{}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        let err = root.set_value(rule, "x").unwrap_err();
        assert!(matches!(
            err,
            Error::WrongKind {
                expected: NodeKind::Decl,
                found: NodeKind::Rule
            }
        ));
    }

    #[test]
    fn selectors_split_and_rejoin() {
        let mut root = parse("a,\n  b{}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        assert_eq!(root.selectors(rule), vec!["a", "b"]);

        root.set_selectors(rule, ["x", "y", "z"]).unwrap();
        assert_eq!(root.get(rule).unwrap().selector(), Some("x,\n  y,\n  z"));

        let mut root = parse("a {}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        root.set_selectors(rule, ["a", "b"]).unwrap();
        assert_eq!(root.get(rule).unwrap().selector(), Some("a, b"));
    }

    #[test]
    fn clone_drops_positional_raws_and_keeps_source() {
        let mut root = parse("a{}\nb { color : red }", &Default::default()).unwrap();
        let rule = root.last(root.id()).unwrap();
        let copy = root.clone_node(rule).unwrap();

        let node = root.get(copy).unwrap();
        assert_eq!(node.parent(), None);
        assert_eq!(node.raws.before, None);
        assert_eq!(node.raws.between, None);
        assert!(node.source.is_some());

        let decl = root.first(copy).unwrap();
        assert_eq!(root.get(decl).unwrap().raws.between.as_deref(), Some(" : "));
        assert_ne!(decl, root.first(rule).unwrap());
    }

    #[test]
    fn clone_after_inserts_sibling() {
        let mut root = parse("a{}", &Default::default()).unwrap();
        let rule = root.first(root.id()).unwrap();
        let copy = root.clone_after(rule).unwrap();
        assert_eq!(root.children(root.id()), &[rule, copy]);
        assert_eq!(root.to_string(), "a{}\na{}");
    }

    #[test]
    fn clean_raws_resets_formatting() {
        let mut root = parse("a{  color :  red  }", &Default::default()).unwrap();
        root.clean_raws(root.id(), false).unwrap();
        assert_eq!(root.to_string(), "a {\n    color: red\n}");
    }

    #[test]
    fn error_points_at_node_source() {
        let root = parse("a{}\nb{\n  c: d }", &Default::default()).unwrap();
        let rule = root.last(root.id()).unwrap();
        let decl = root.first(rule).unwrap();
        let err = root.error(decl, "Bad thing");
        assert_eq!((err.line, err.column), (Some(3), Some(3)));
        assert!(err.to_string().ends_with(":3:3: Bad thing"));

        let mut root = Root::new();
        let detached = root.decl("a", "b");
        assert_eq!(root.error(detached, "x").line, None);
    }
}
