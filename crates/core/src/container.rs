//! Child list manipulation and traversal.
//!
//! Every insertion goes through one normalization step that turns a [`NodeInput`] (an existing
//! node, a [`NodeBag`], CSS text or a whole other tree) into detached nodes of this arena.
//!
//! Iteration is cursor based: [`Root::each`] registers a cursor on the container and the
//! insert/remove operations shift every registered cursor, so callbacks can restructure the
//! list they are iterating without skipping or repeating children.

use std::ops::ControlFlow;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    node::{Node, NodeData, NodeId, NodeKind, Raws, Root},
    options::ParseOptions,
};

/// Anything that can be inserted into a container.
#[derive(Debug, Clone)]
pub enum NodeInput {
    /// A node of the same tree. Attached nodes are copied; use [`Root::move_to`] to move.
    Node(NodeId),
    Nodes(Vec<NodeId>),
    Bag(NodeBag),
    Bags(Vec<NodeBag>),
    /// Stylesheet text; its top-level nodes are inserted without source positions.
    Css(String),
    /// Another tree; its top-level nodes are copied in with their sources.
    Root(Root),
}

impl From<NodeId> for NodeInput {
    fn from(id: NodeId) -> Self {
        NodeInput::Node(id)
    }
}

impl From<Vec<NodeId>> for NodeInput {
    fn from(ids: Vec<NodeId>) -> Self {
        NodeInput::Nodes(ids)
    }
}

impl From<NodeBag> for NodeInput {
    fn from(bag: NodeBag) -> Self {
        NodeInput::Bag(bag)
    }
}

impl From<Vec<NodeBag>> for NodeInput {
    fn from(bags: Vec<NodeBag>) -> Self {
        NodeInput::Bags(bags)
    }
}

impl From<&str> for NodeInput {
    fn from(css: &str) -> Self {
        NodeInput::Css(css.to_string())
    }
}

impl From<String> for NodeInput {
    fn from(css: String) -> Self {
        NodeInput::Css(css)
    }
}

impl From<Root> for NodeInput {
    fn from(root: Root) -> Self {
        NodeInput::Root(root)
    }
}

/// Loose node description, discriminated by which fields are set.
///
/// | fields set            | node        |
/// |-----------------------|-------------|
/// | `prop` (+ `value`)    | declaration |
/// | `selector`/`selectors`| rule        |
/// | `name`                | at-rule     |
/// | `text`                | comment     |
///
/// The first matching row wins. A `prop` without `value` is
/// [`Error::DeclarationWithoutValue`]; nothing matching is [`Error::UnknownNodeType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeBag {
    pub prop: Option<String>,
    pub value: Option<String>,
    pub important: Option<bool>,
    pub selector: Option<String>,
    pub selectors: Option<Vec<String>>,
    pub name: Option<String>,
    pub params: Option<String>,
    pub text: Option<String>,
    pub raws: Option<Raws>,
    /// Children of a rule or at-rule. For at-rules, `Some` creates a block.
    pub nodes: Option<Vec<NodeBag>>,
}

impl NodeBag {
    pub fn decl(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prop: Some(prop.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn rule(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn at_rule(name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            params: Some(params.into()),
            ..Self::default()
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn important(mut self, important: bool) -> Self {
        self.important = Some(important);
        self
    }

    pub fn raws(mut self, raws: Raws) -> Self {
        self.raws = Some(raws);
        self
    }

    pub fn nodes(mut self, nodes: Vec<NodeBag>) -> Self {
        self.nodes = Some(nodes);
        self
    }
}

/// A name filter for typed walks.
#[derive(Debug, Clone)]
pub enum Filter {
    Exact(String),
    Pattern(Regex),
}

impl Filter {
    pub fn matches(&self, s: &str) -> bool {
        match self {
            Filter::Exact(exact) => exact == s,
            Filter::Pattern(re) => re.is_match(s),
        }
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        Filter::Exact(s.to_string())
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Self {
        Filter::Exact(s)
    }
}

impl From<Regex> for Filter {
    fn from(re: Regex) -> Self {
        Filter::Pattern(re)
    }
}

impl Root {
    /// Create detached nodes from `input` without inserting them.
    pub fn create(&mut self, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        self.materialize(input.into(), None)
    }

    pub fn append(&mut self, parent: NodeId, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        self.open_block(parent)?;
        let sample = self.last(parent);
        let ids = self.normalize(parent, input.into(), sample, false)?;
        if let Some(list) = self.child_list(parent) {
            list.extend(ids.iter().copied());
        }
        self.mark_dirty(parent);
        Ok(ids)
    }

    pub fn prepend(&mut self, parent: NodeId, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        self.open_block(parent)?;
        let sample = self.first(parent);
        let ids = self.normalize(parent, input.into(), sample, true)?;
        let count = ids.len();
        if let Some(list) = self.child_list(parent) {
            list.splice(0..0, ids.iter().copied());
        }
        if let Some(node) = self.arena.get_mut(parent) {
            for (_, index) in &mut node.cursors {
                *index += count as isize;
            }
        }
        self.mark_dirty(parent);
        Ok(ids)
    }

    pub fn insert_before(&mut self, exist: NodeId, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        let parent = self.parent(exist).ok_or(Error::NotAChild)?;
        let index = self.index_in(parent, exist).ok_or(Error::NotAChild)?;
        let ids = self.normalize(parent, input.into(), Some(exist), index == 0)?;
        let index = self.index_in(parent, exist).ok_or(Error::NotAChild)?;
        let count = ids.len();
        if let Some(list) = self.child_list(parent) {
            list.splice(index..index, ids.iter().copied());
        }
        if let Some(node) = self.arena.get_mut(parent) {
            for (_, cursor) in &mut node.cursors {
                if index as isize <= *cursor {
                    *cursor += count as isize;
                }
            }
        }
        self.mark_dirty(parent);
        Ok(ids)
    }

    pub fn insert_after(&mut self, exist: NodeId, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        let parent = self.parent(exist).ok_or(Error::NotAChild)?;
        self.index_in(parent, exist).ok_or(Error::NotAChild)?;
        let ids = self.normalize(parent, input.into(), Some(exist), false)?;
        let index = self.index_in(parent, exist).ok_or(Error::NotAChild)?;
        let count = ids.len();
        if let Some(list) = self.child_list(parent) {
            list.splice(index + 1..index + 1, ids.iter().copied());
        }
        if let Some(node) = self.arena.get_mut(parent) {
            for (_, cursor) in &mut node.cursors {
                if (index as isize) < *cursor {
                    *cursor += count as isize;
                }
            }
        }
        self.mark_dirty(parent);
        Ok(ids)
    }

    /// Detach `id` from its parent. The node stays in the arena and can be re-inserted.
    pub fn remove(&mut self, id: NodeId) -> Result<(), Error> {
        let node = self.node(id)?;
        match node.parent {
            Some(parent) => self.remove_child(parent, id),
            None => Ok(()),
        }
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let index = self.index_in(parent, child).ok_or(Error::NotAChild)?;

        if self.kind(parent) == Some(NodeKind::Root) && index == 0 {
            if let Some(&second) = self.children(parent).get(1) {
                let before = self.arena.get(child).and_then(|n| n.raws.before.clone());
                if let Some(node) = self.arena.get_mut(second) {
                    node.raws.before = before;
                }
            }
        }

        if let Some(node) = self.arena.get_mut(child) {
            node.parent = None;
        }
        if let Some(node) = self.arena.get_mut(parent) {
            if let Some(list) = node.nodes.as_mut() {
                list.remove(index);
            }
            for (_, cursor) in &mut node.cursors {
                if *cursor >= index as isize {
                    *cursor -= 1;
                }
            }
        }
        self.mark_dirty(parent);
        Ok(())
    }

    pub fn remove_all(&mut self, parent: NodeId) -> Result<(), Error> {
        let children = self.node(parent)?.children().to_vec();
        for child in children {
            if let Some(node) = self.arena.get_mut(child) {
                node.parent = None;
            }
        }
        if let Some(list) = self.child_list(parent) {
            list.clear();
        }
        self.mark_dirty(parent);
        Ok(())
    }

    /// Replace `id` with `input`, returning the inserted nodes. A detached `id` is left as is.
    pub fn replace_with(&mut self, id: NodeId, input: impl Into<NodeInput>) -> Result<Vec<NodeId>, Error> {
        if self.node(id)?.parent.is_none() {
            return Ok(Vec::new());
        }
        let ids = self.insert_before(id, input)?;
        self.remove(id)?;
        Ok(ids)
    }

    /// Move `id` to the end of `parent`, detaching it from its current container.
    pub fn move_to(&mut self, id: NodeId, parent: NodeId) -> Result<(), Error> {
        self.remove(id)?;
        self.append(parent, id)?;
        Ok(())
    }

    /// Move `id` right before `target`.
    pub fn move_before(&mut self, id: NodeId, target: NodeId) -> Result<(), Error> {
        self.remove(id)?;
        self.insert_before(target, id)?;
        Ok(())
    }

    /// Move `id` right after `target`.
    pub fn move_after(&mut self, id: NodeId, target: NodeId) -> Result<(), Error> {
        self.remove(id)?;
        self.insert_after(target, id)?;
        Ok(())
    }

    /// Call `f` for every direct child of `parent`, tolerating mutation of the child list.
    ///
    /// `f` receives the child and its current index. Breaking stops the iteration and is
    /// returned to the caller.
    pub fn each<B, F>(&mut self, parent: NodeId, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId, usize) -> ControlFlow<B>,
    {
        let Some(iterator) = self.open_cursor(parent) else {
            return ControlFlow::Continue(());
        };
        let result = loop {
            let Some((index, child)) = self.cursor_child(parent, iterator) else {
                break ControlFlow::Continue(());
            };
            if let ControlFlow::Break(b) = f(self, child, index) {
                break ControlFlow::Break(b);
            }
            self.advance_cursor(parent, iterator);
        };
        self.close_cursor(parent, iterator);
        result
    }

    /// Depth-first pre-order walk of the descendants of `id`.
    pub fn walk<B, F>(&mut self, id: NodeId, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_inner(id, &mut f)
    }

    fn walk_inner<B, F>(&mut self, id: NodeId, f: &mut F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.each(id, |root, child, _| {
            f(root, child)?;
            root.walk_inner(child, &mut *f)
        })
    }

    /// Walk declarations.
    pub fn walk_decls<B, F>(&mut self, id: NodeId, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::Decl, None, f)
    }

    /// Walk declarations whose property matches `filter`.
    pub fn walk_decls_matching<B, F>(&mut self, id: NodeId, filter: impl Into<Filter>, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::Decl, Some(filter.into()), f)
    }

    pub fn walk_rules<B, F>(&mut self, id: NodeId, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::Rule, None, f)
    }

    /// Walk rules whose selector matches `filter`.
    pub fn walk_rules_matching<B, F>(&mut self, id: NodeId, filter: impl Into<Filter>, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::Rule, Some(filter.into()), f)
    }

    pub fn walk_at_rules<B, F>(&mut self, id: NodeId, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::AtRule, None, f)
    }

    /// Walk at-rules whose name matches `filter`.
    pub fn walk_at_rules_matching<B, F>(&mut self, id: NodeId, filter: impl Into<Filter>, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::AtRule, Some(filter.into()), f)
    }

    pub fn walk_comments<B, F>(&mut self, id: NodeId, f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk_filtered(id, NodeKind::Comment, None, f)
    }

    fn walk_filtered<B, F>(&mut self, id: NodeId, kind: NodeKind, filter: Option<Filter>, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(&mut Root, NodeId) -> ControlFlow<B>,
    {
        self.walk(id, |root, child| {
            let Some(node) = root.get(child) else {
                return ControlFlow::Continue(());
            };
            if node.kind() != kind {
                return ControlFlow::Continue(());
            }
            let name = match kind {
                NodeKind::Decl => node.prop(),
                NodeKind::Rule => node.selector(),
                NodeKind::AtRule => node.name(),
                _ => None,
            };
            match (&filter, name) {
                (Some(filter), Some(name)) if !filter.matches(name) => ControlFlow::Continue(()),
                _ => f(root, child),
            }
        })
    }

    pub(crate) fn open_cursor(&mut self, parent: NodeId) -> Option<u32> {
        let node = self.arena.get_mut(parent)?;
        node.nodes.as_ref()?;
        node.last_each += 1;
        let iterator = node.last_each;
        node.cursors.push((iterator, 0));
        Some(iterator)
    }

    /// The child under the cursor, with its index.
    pub(crate) fn cursor_child(&self, parent: NodeId, iterator: u32) -> Option<(usize, NodeId)> {
        let node = self.arena.get(parent)?;
        let &(_, index) = node.cursors.iter().find(|(id, _)| *id == iterator)?;
        let index = usize::try_from(index).ok()?;
        node.children().get(index).map(|&child| (index, child))
    }

    pub(crate) fn advance_cursor(&mut self, parent: NodeId, iterator: u32) {
        if let Some(node) = self.arena.get_mut(parent) {
            if let Some((_, index)) = node.cursors.iter_mut().find(|(id, _)| *id == iterator) {
                *index += 1;
            }
        }
    }

    pub(crate) fn close_cursor(&mut self, parent: NodeId, iterator: u32) {
        if let Some(node) = self.arena.get_mut(parent) {
            node.cursors.retain(|(id, _)| *id != iterator);
        }
    }

    fn child_list(&mut self, parent: NodeId) -> Option<&mut Vec<NodeId>> {
        self.arena.get_mut(parent)?.nodes.as_mut()
    }

    /// Make sure `parent` has a child list; at-rules get an empty block on first insertion.
    fn open_block(&mut self, parent: NodeId) -> Result<(), Error> {
        let node = self.arena.get_mut(parent).ok_or(Error::UnknownNode)?;
        match node.data {
            NodeData::Decl { .. } | NodeData::Comment { .. } => Err(Error::NotAContainer(node.kind())),
            NodeData::AtRule { .. } if node.nodes.is_none() => {
                node.nodes = Some(Vec::new());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Turn `input` into detached nodes, attach them to `parent` and fix up `before` raws.
    fn normalize(
        &mut self,
        parent: NodeId,
        input: NodeInput,
        sample: Option<NodeId>,
        prepend: bool,
    ) -> Result<Vec<NodeId>, Error> {
        let ids = self.materialize(input, Some(parent))?;
        let parent_is_root = self.kind(parent) == Some(NodeKind::Root);

        let sample_before = sample
            .and_then(|s| self.get(s))
            .and_then(|n| n.raws.before.clone());

        for &id in &ids {
            self.mark_tree_dirty(id);
            let Some(node) = self.arena.get_mut(id) else {
                continue;
            };
            if !parent_is_root && node.raws.before.is_none() {
                if let Some(before) = &sample_before {
                    node.raws.before = Some(before.chars().filter(|c| c.is_whitespace()).collect());
                }
            }
            node.parent = Some(parent);
        }

        if parent_is_root {
            if let Some(sample) = sample {
                if prepend {
                    let second_before = self
                        .children(parent)
                        .get(1)
                        .and_then(|&s| self.get(s))
                        .and_then(|n| n.raws.before.clone());
                    if let Some(node) = self.arena.get_mut(sample) {
                        node.raws.before = second_before;
                    }
                } else if self.first(parent) != Some(sample) {
                    for &id in &ids {
                        if let Some(node) = self.arena.get_mut(id) {
                            node.raws.before = sample_before.clone();
                        }
                    }
                }
            }
        }

        Ok(ids)
    }

    /// Produce detached nodes for `input`. Attached nodes, and nodes that would end up inside
    /// themselves, are copied.
    fn materialize(&mut self, input: NodeInput, parent: Option<NodeId>) -> Result<Vec<NodeId>, Error> {
        match input {
            NodeInput::Node(id) => Ok(vec![self.adopt(id, parent)?]),
            NodeInput::Nodes(ids) => ids.into_iter().map(|id| self.adopt(id, parent)).collect(),
            NodeInput::Bag(bag) => Ok(vec![self.build(bag)?]),
            NodeInput::Bags(bags) => bags.into_iter().map(|bag| self.build(bag)).collect(),
            NodeInput::Css(css) => {
                let other = crate::parse(&css, &ParseOptions::default())?;
                Ok(other
                    .children(other.id())
                    .iter()
                    .filter_map(|&child| self.import(&other, child, false))
                    .collect())
            }
            NodeInput::Root(other) => Ok(other
                .children(other.id())
                .iter()
                .filter_map(|&child| self.import(&other, child, true))
                .collect()),
        }
    }

    fn adopt(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<NodeId, Error> {
        let node = self.node(id)?;
        if node.kind() == NodeKind::Root {
            return Err(Error::NotAChild);
        }
        let inside_itself = parent.is_some_and(|p| self.is_ancestor(id, p));
        if node.parent.is_some() || inside_itself {
            self.copy_subtree(id)
        } else {
            Ok(id)
        }
    }

    fn build(&mut self, bag: NodeBag) -> Result<NodeId, Error> {
        let NodeBag {
            prop,
            value,
            important,
            selector,
            selectors,
            name,
            params,
            text,
            raws,
            nodes,
        } = bag;

        let (data, block) = if let Some(prop) = prop {
            let value = value.ok_or(Error::DeclarationWithoutValue)?;
            let data = NodeData::Decl {
                prop,
                value,
                important: important.unwrap_or(false),
            };
            (data, false)
        } else if let Some(selector) = selector.or_else(|| selectors.map(|s| s.join(", "))) {
            (NodeData::Rule { selector }, true)
        } else if let Some(name) = name {
            let block = nodes.is_some();
            let data = NodeData::AtRule {
                name,
                params: params.unwrap_or_default(),
            };
            (data, block)
        } else if let Some(text) = text {
            (NodeData::Comment { text }, false)
        } else {
            return Err(Error::UnknownNodeType);
        };

        let mut node = Node::new(data);
        if block {
            node.nodes = Some(Vec::new());
        }
        node.raws = raws.unwrap_or_default();
        let id = self.arena.insert(node);

        if block {
            for child in nodes.unwrap_or_default() {
                self.append(id, child)?;
            }
        }
        Ok(id)
    }
}
