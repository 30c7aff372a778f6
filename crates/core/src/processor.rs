//! Plugins and the processor that runs them.
//!
//! A [`Plugin`] is a named bundle of callbacks. `once` callbacks see the whole tree one time,
//! in plugin order. Visitor callbacks (`rule`, `declaration_named`, ...) are called for
//! every matching node, again whenever that node changes, until the tree settles.
//!
//! ```
//! use restyle::{Plugin, ProcessOptions, Processor};
//!
//! let uppercase = Plugin::new("uppercase-colors").declaration_named("color", |ctx| {
//!     let value = ctx.root.node(ctx.node)?.value().unwrap_or_default().to_uppercase();
//!     ctx.root.set_value(ctx.node, value)
//! });
//! let mut result = Processor::new([uppercase]).process("a{color:red}", ProcessOptions::default());
//! assert_eq!(result.css().unwrap(), "a{color:RED}");
//! ```

use std::{fmt, sync::Arc};

use futures::future::LocalBoxFuture;

use crate::{
    Error, LazyResult, NodeId, NodeKind, ProcessOptions, ProcessResult, Root,
    result::{Message, Warning},
};

type SyncFn = dyn Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync;
type AsyncFn = dyn for<'a> Fn(Context<'a>) -> LocalBoxFuture<'a, Result<(), Error>> + Send + Sync;

/// A plugin callback.
#[derive(Clone)]
pub(crate) enum Callback {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// The node event a visitor listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EventKey {
    pub(crate) kind: NodeKind,
    pub(crate) exit: bool,
    /// Lowercased declaration property or at-rule name.
    pub(crate) filter: Option<String>,
}

#[derive(Clone)]
pub(crate) enum Hook {
    Visit(EventKey),
    OnceExit,
}

/// What a callback gets to work with.
pub struct Context<'a> {
    pub root: &'a mut Root,
    /// The node being visited; the root node for `once` callbacks.
    pub node: NodeId,
    pub(crate) plugin: &'a str,
    pub(crate) opts: &'a ProcessOptions,
    pub(crate) messages: &'a mut Vec<Message>,
}

impl Context<'_> {
    /// Name of the running plugin.
    pub fn plugin(&self) -> &str {
        self.plugin
    }

    pub fn opts(&self) -> &ProcessOptions {
        self.opts
    }

    pub fn messages(&self) -> &[Message] {
        self.messages
    }

    /// Record a warning not tied to any node.
    pub fn warn(&mut self, text: impl Into<String>) {
        self.push_warning(Warning::new(text).plugin(self.plugin));
    }

    /// Record a warning positioned at `node`.
    pub fn warn_at(&mut self, node: NodeId, text: impl Into<String>) {
        let warning = Warning::at(self.root, node, text).plugin(self.plugin);
        self.push_warning(warning);
    }

    fn push_warning(&mut self, warning: Warning) {
        tracing::warn!(plugin = self.plugin, "{warning}");
        self.messages.push(Message::Warning(warning));
    }

    /// Record a free-form message such as a dependency notice.
    pub fn message(&mut self, kind: impl Into<String>, data: serde_json::Value) {
        self.messages.push(Message::Custom {
            kind: kind.into(),
            plugin: Some(self.plugin.to_string()),
            data,
        });
    }
}

/// A named transformation unit.
#[derive(Clone)]
pub struct Plugin {
    pub(crate) name: String,
    pub(crate) once: Vec<Callback>,
    pub(crate) hooks: Vec<(Hook, Callback)>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("once", &self.once.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Generates a sync and an `_async` builder method for one visitor event.
macro_rules! visitor {
    ($(#[$doc:meta])* $name:ident, $name_async:ident, $kind:expr, $exit:expr) => {
        $(#[$doc])*
        pub fn $name<F>(self, f: F) -> Self
        where
            F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
        {
            self.visit($kind, $exit, None, Callback::Sync(Arc::new(f)))
        }

        $(#[$doc])*
        pub fn $name_async<F>(self, f: F) -> Self
        where
            F: for<'a> Fn(Context<'a>) -> LocalBoxFuture<'a, Result<(), Error>>
                + Send
                + Sync
                + 'static,
        {
            self.visit($kind, $exit, None, Callback::Async(Arc::new(f)))
        }
    };
    ($(#[$doc:meta])* $name:ident, $name_async:ident, $kind:expr, $exit:expr, named) => {
        $(#[$doc])*
        pub fn $name<F>(self, filter: &str, f: F) -> Self
        where
            F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
        {
            self.visit($kind, $exit, Some(filter), Callback::Sync(Arc::new(f)))
        }

        $(#[$doc])*
        pub fn $name_async<F>(self, filter: &str, f: F) -> Self
        where
            F: for<'a> Fn(Context<'a>) -> LocalBoxFuture<'a, Result<(), Error>>
                + Send
                + Sync
                + 'static,
        {
            self.visit($kind, $exit, Some(filter), Callback::Async(Arc::new(f)))
        }
    };
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            once: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn visit(mut self, kind: NodeKind, exit: bool, filter: Option<&str>, callback: Callback) -> Self {
        let key = EventKey {
            kind,
            exit,
            filter: filter.map(str::to_lowercase),
        };
        self.hooks.push((Hook::Visit(key), callback));
        self
    }

    /// Run `f` once on the whole tree before any visitor.
    pub fn once<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.once.push(Callback::Sync(Arc::new(f)));
        self
    }

    /// Run `f` once on the whole tree before any visitor.
    pub fn once_async<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Context<'a>) -> LocalBoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
    {
        self.once.push(Callback::Async(Arc::new(f)));
        self
    }

    /// Run `f` once on the whole tree after the visitors settled.
    pub fn once_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.push((Hook::OnceExit, Callback::Sync(Arc::new(f))));
        self
    }

    /// Run `f` once on the whole tree after the visitors settled.
    pub fn once_exit_async<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Context<'a>) -> LocalBoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
    {
        self.hooks.push((Hook::OnceExit, Callback::Async(Arc::new(f))));
        self
    }

    visitor!(
        /// Visit the root before its children.
        root, root_async, NodeKind::Root, false
    );
    visitor!(
        /// Visit the root after its children.
        root_exit, root_exit_async, NodeKind::Root, true
    );
    visitor!(rule, rule_async, NodeKind::Rule, false);
    visitor!(rule_exit, rule_exit_async, NodeKind::Rule, true);
    visitor!(at_rule, at_rule_async, NodeKind::AtRule, false);
    visitor!(
        /// Visit at-rules with the given name, compared case-insensitively.
        at_rule_named, at_rule_named_async, NodeKind::AtRule, false, named
    );
    visitor!(at_rule_exit, at_rule_exit_async, NodeKind::AtRule, true);
    visitor!(at_rule_exit_named, at_rule_exit_named_async, NodeKind::AtRule, true, named);
    visitor!(declaration, declaration_async, NodeKind::Decl, false);
    visitor!(
        /// Visit declarations of the given property, compared case-insensitively.
        declaration_named, declaration_named_async, NodeKind::Decl, false, named
    );
    visitor!(declaration_exit, declaration_exit_async, NodeKind::Decl, true);
    visitor!(
        declaration_exit_named, declaration_exit_named_async, NodeKind::Decl, true, named
    );
    visitor!(comment, comment_async, NodeKind::Comment, false);
    visitor!(comment_exit, comment_exit_async, NodeKind::Comment, true);
}

/// What [`Processor::process`] accepts.
#[derive(Debug)]
pub enum ProcessInput {
    Css(String),
    /// An existing tree; every node is visited again.
    Root(Root),
    /// The result of an earlier run. Its map becomes the previous map of this run.
    Result(ProcessResult),
}

impl From<&str> for ProcessInput {
    fn from(css: &str) -> Self {
        ProcessInput::Css(css.to_string())
    }
}

impl From<String> for ProcessInput {
    fn from(css: String) -> Self {
        ProcessInput::Css(css)
    }
}

impl From<Root> for ProcessInput {
    fn from(root: Root) -> Self {
        ProcessInput::Root(root)
    }
}

impl From<ProcessResult> for ProcessInput {
    fn from(result: ProcessResult) -> Self {
        ProcessInput::Result(result)
    }
}

/// An ordered list of plugins.
///
/// Cheap to clone and safe to share: each [`Processor::process`] call gets its own tree.
#[derive(Debug, Clone, Default)]
pub struct Processor {
    plugins: Arc<[Plugin]>,
}

impl Processor {
    pub fn new(plugins: impl IntoIterator<Item = Plugin>) -> Self {
        Self {
            plugins: plugins.into_iter().collect(),
        }
    }

    /// Append a plugin.
    pub fn plugin(self, plugin: Plugin) -> Self {
        let mut plugins = self.plugins.to_vec();
        plugins.push(plugin);
        Self {
            plugins: plugins.into(),
        }
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Version of this crate.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Prepare a run. Nothing is parsed or transformed until the result is read or awaited.
    pub fn process(&self, css: impl Into<ProcessInput>, opts: ProcessOptions) -> LazyResult {
        LazyResult::new(self.plugins.clone(), css.into(), opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_hooks_in_order() {
        let plugin = Plugin::new("p")
            .once(|_| Ok(()))
            .declaration_named("Color", |_| Ok(()))
            .rule_exit(|_| Ok(()))
            .once_exit(|_| Ok(()));
        assert_eq!(plugin.name(), "p");
        assert_eq!(plugin.once.len(), 1);
        assert_eq!(plugin.hooks.len(), 3);
        match &plugin.hooks[0].0 {
            Hook::Visit(key) => {
                assert_eq!(key.kind, NodeKind::Decl);
                assert_eq!(key.filter.as_deref(), Some("color"));
                assert!(!key.exit);
            }
            Hook::OnceExit => panic!("expected a visitor"),
        }
        assert!(matches!(plugin.hooks[2].0, Hook::OnceExit));
    }

    #[test]
    fn processor_appends_plugins() {
        let processor = Processor::new([Plugin::new("a")]).plugin(Plugin::new("b"));
        let names: Vec<_> = processor.plugins().iter().map(Plugin::name).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(!Processor::version().is_empty());
    }
}
