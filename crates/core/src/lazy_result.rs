//! Deferred processing runs.
//!
//! [`LazyResult`] holds the input and the plugins until a result is needed. Reading `css`,
//! `root` or `messages` runs the plugins synchronously; awaiting the handle runs them
//! asynchronously. Either way the work happens at most once and later reads reuse it.
//!
//! Plugins run in three phases:
//!
//! 1. every `once` callback, in plugin order;
//! 2. the visitors, walking the tree again and again until no node is dirty;
//! 3. every `once_exit` callback.

use std::{collections::HashMap, future::IntoFuture, mem, sync::Arc};

use futures::{FutureExt, future::LocalBoxFuture};
use sourcemap::SourceMap;
use tracing::{debug, trace};

use crate::{
    Error, MapOptions, MapSetting, NodeId, NodeKind, PrevMap, ProcessOptions, ProcessResult, Root,
    map_generator::MapGenerator,
    processor::{Callback, Context, EventKey, Hook, Plugin, ProcessInput},
    result::{Message, Warning},
};

/// A processing run that has not necessarily happened yet.
#[derive(Debug)]
pub struct LazyResult {
    plugins: Arc<[Plugin]>,
    state: State,
}

#[derive(Debug)]
enum State {
    Pending {
        input: ProcessInput,
        opts: ProcessOptions,
    },
    /// Plugins ran; the tree has not been printed yet.
    Processed(ProcessResult),
    Stringified(ProcessResult),
    Failed(Error),
    /// Transient, while moving between states.
    Taken,
}

impl LazyResult {
    pub(crate) fn new(plugins: Arc<[Plugin]>, input: ProcessInput, opts: ProcessOptions) -> Self {
        Self {
            plugins,
            state: State::Pending { input, opts },
        }
    }

    /// Run the plugins synchronously.
    ///
    /// Fails with [`Error::AsyncInSync`] when a plugin registered an async callback.
    pub fn sync(&mut self) -> Result<&ProcessResult, Error> {
        self.process_sync();
        match &self.state {
            State::Processed(result) | State::Stringified(result) => Ok(result),
            State::Failed(err) => Err(err.clone()),
            State::Pending { .. } | State::Taken => Err(unfinished()),
        }
    }

    pub fn root(&mut self) -> Result<&Root, Error> {
        Ok(&self.sync()?.root)
    }

    pub fn messages(&mut self) -> Result<&[Message], Error> {
        Ok(&self.sync()?.messages)
    }

    pub fn warnings(&mut self) -> Result<Vec<&Warning>, Error> {
        Ok(self.sync()?.warnings())
    }

    pub fn css(&mut self) -> Result<&str, Error> {
        Ok(&self.stringified()?.css)
    }

    pub fn map(&mut self) -> Result<Option<&SourceMap>, Error> {
        Ok(self.stringified()?.map.as_ref())
    }

    /// Run synchronously and take the finished result.
    pub fn into_result(mut self) -> Result<ProcessResult, Error> {
        self.stringify();
        match self.state {
            State::Stringified(result) => Ok(result),
            State::Failed(err) => Err(err),
            State::Pending { .. } | State::Processed(_) | State::Taken => Err(unfinished()),
        }
    }

    /// Run the plugins, awaiting async callbacks, and print the tree.
    pub async fn run_async(mut self) -> Result<ProcessResult, Error> {
        match mem::replace(&mut self.state, State::Taken) {
            State::Pending { input, opts } => {
                let result = prepare(input, opts)?;
                let mut run = Run::new(&self.plugins, result, false);
                run.run().await?;
                let mut result = run.result;
                print(&mut result)?;
                Ok(result)
            }
            State::Processed(mut result) => {
                print(&mut result)?;
                Ok(result)
            }
            State::Stringified(result) => Ok(result),
            State::Failed(err) => Err(err),
            State::Taken => Err(unfinished()),
        }
    }

    fn stringified(&mut self) -> Result<&ProcessResult, Error> {
        self.stringify();
        match &self.state {
            State::Stringified(result) => Ok(result),
            State::Failed(err) => Err(err.clone()),
            State::Pending { .. } | State::Processed(_) | State::Taken => Err(unfinished()),
        }
    }

    fn process_sync(&mut self) {
        self.state = match mem::replace(&mut self.state, State::Taken) {
            State::Pending { input, opts } => match prepare(input, opts) {
                Ok(result) => {
                    let mut run = Run::new(&self.plugins, result, true);
                    let outcome = run.run().now_or_never();
                    match outcome {
                        Some(Ok(())) => State::Processed(run.result),
                        Some(Err(err)) => State::Failed(err),
                        // An async callback slipped past the callback check.
                        None => State::Failed(Error::AsyncInSync {
                            plugin: run.result.last_plugin.unwrap_or_default(),
                        }),
                    }
                }
                Err(err) => State::Failed(err),
            },
            other => other,
        };
    }

    fn stringify(&mut self) {
        self.process_sync();
        self.state = match mem::replace(&mut self.state, State::Taken) {
            State::Processed(mut result) => match print(&mut result) {
                Ok(()) => State::Stringified(result),
                Err(err) => State::Failed(err),
            },
            other => other,
        };
    }
}

impl IntoFuture for LazyResult {
    type Output = Result<ProcessResult, Error>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.run_async().boxed_local()
    }
}

fn unfinished() -> Error {
    Error::other("processing did not finish")
}

/// Build the tree a run starts from.
fn prepare(input: ProcessInput, mut opts: ProcessOptions) -> Result<ProcessResult, Error> {
    let root = match input {
        ProcessInput::Css(css) => crate::parse(&css, &opts.parse_options())?,
        ProcessInput::Root(mut root) => {
            let id = root.id();
            root.mark_tree_dirty(id);
            root
        }
        ProcessInput::Result(previous) => {
            carry_map(&previous, &mut opts)?;
            let mut root = previous.root;
            let id = root.id();
            root.mark_tree_dirty(id);
            root
        }
    };
    Ok(ProcessResult::new(root, opts))
}

/// A previous run's map becomes the external previous map of this run.
fn carry_map(previous: &ProcessResult, opts: &mut ProcessOptions) -> Result<(), Error> {
    let Some(json) = previous.map_json()? else {
        return Ok(());
    };
    match &mut opts.map {
        MapSetting::Disabled => {}
        MapSetting::Auto => {
            opts.map = MapSetting::Enabled(MapOptions {
                inline: Some(false),
                prev: Some(PrevMap::Json(json)),
                ..MapOptions::default()
            });
        }
        MapSetting::Enabled(map) => {
            map.inline.get_or_insert(false);
            map.prev = Some(PrevMap::Json(json));
        }
    }
    Ok(())
}

fn print(result: &mut ProcessResult) -> Result<(), Error> {
    let (css, map) = MapGenerator::new(&mut result.root, &result.opts).generate()?;
    result.css = css;
    result.map = map;
    Ok(())
}

type Listener = (usize, Callback);

#[derive(Debug, Clone)]
enum Step {
    Event(EventKey),
    Children,
}

/// One node on the walk stack.
struct Visit {
    node: NodeId,
    steps: Vec<Step>,
    step: usize,
    visitors: Vec<Listener>,
    visitor: usize,
    iterator: Option<u32>,
}

impl Visit {
    fn new(root: &Root, node: NodeId) -> Self {
        Self {
            node,
            steps: steps(root, node),
            step: 0,
            visitors: Vec::new(),
            visitor: 0,
            iterator: None,
        }
    }
}

/// The events fired for a node, in order.
fn steps(root: &Root, id: NodeId) -> Vec<Step> {
    let Some(node) = root.get(id) else {
        return Vec::new();
    };
    let kind = node.kind();
    let event = |exit, filter: Option<&str>| {
        Step::Event(EventKey {
            kind,
            exit,
            filter: filter.map(str::to_lowercase),
        })
    };
    if kind == NodeKind::Root {
        return vec![event(false, None), Step::Children, event(true, None)];
    }

    let filter = match kind {
        NodeKind::Decl => node.prop(),
        NodeKind::AtRule => node.name(),
        _ => None,
    };
    let mut steps = vec![event(false, None)];
    steps.extend(filter.map(|f| event(false, Some(f))));
    if node.is_container() {
        steps.push(Step::Children);
    }
    steps.push(event(true, None));
    steps.extend(filter.map(|f| event(true, Some(f))));
    steps
}

/// One pass of the plugins over a tree.
struct Run<'p> {
    plugins: &'p [Plugin],
    result: ProcessResult,
    listeners: HashMap<EventKey, Vec<Listener>>,
    once_exit: Vec<Listener>,
    sync: bool,
}

impl<'p> Run<'p> {
    fn new(plugins: &'p [Plugin], result: ProcessResult, sync: bool) -> Self {
        let mut listeners: HashMap<EventKey, Vec<Listener>> = HashMap::new();
        let mut once_exit = Vec::new();
        for (index, plugin) in plugins.iter().enumerate() {
            for (hook, callback) in &plugin.hooks {
                match hook {
                    Hook::Visit(key) => listeners
                        .entry(key.clone())
                        .or_default()
                        .push((index, callback.clone())),
                    Hook::OnceExit => once_exit.push((index, callback.clone())),
                }
            }
        }
        Self {
            plugins,
            result,
            listeners,
            once_exit,
            sync,
        }
    }

    async fn run(&mut self) -> Result<(), Error> {
        let root_id = self.result.root.id();
        let plugins = self.plugins;
        debug!(plugins = plugins.len(), sync = self.sync, "processing stylesheet");

        for (index, plugin) in plugins.iter().enumerate() {
            for callback in &plugin.once {
                debug!(plugin = %plugin.name, "running once callback");
                self.call(index, callback.clone(), root_id).await?;
            }
        }

        if self.listeners.is_empty() && self.once_exit.is_empty() {
            return Ok(());
        }
        let mut pass = 0u32;
        while !self.result.root.is_clean(root_id) {
            pass += 1;
            trace!(pass, "visiting dirty nodes");
            self.result.root.set_clean(root_id, true);
            self.walk(root_id).await?;
        }
        for (index, callback) in self.once_exit.clone() {
            debug!(plugin = %plugins[index].name, "running once-exit callback");
            self.call(index, callback, root_id).await?;
        }
        Ok(())
    }

    /// Visit every dirty node under `start`, parents before children, firing its events.
    ///
    /// Children are iterated with a cursor so callbacks may insert or remove siblings. A node
    /// detached by a callback gets no further events.
    async fn walk(&mut self, start: NodeId) -> Result<(), Error> {
        let mut stack = vec![Visit::new(&self.result.root, start)];
        'visit: while let Some(top) = stack.len().checked_sub(1) {
            let node = stack[top].node;
            let root = &mut self.result.root;

            if root.kind(node) != Some(NodeKind::Root) && root.parent(node).is_none() {
                if let Some(iterator) = stack[top].iterator {
                    root.close_cursor(node, iterator);
                }
                stack.pop();
                continue;
            }

            let visit = &mut stack[top];
            if let Some((plugin, callback)) = visit.visitors.get(visit.visitor).cloned() {
                visit.visitor += 1;
                self.call(plugin, callback, node).await?;
                continue;
            }

            if let Some(iterator) = visit.iterator {
                while let Some((_, child)) = root.cursor_child(node, iterator) {
                    root.advance_cursor(node, iterator);
                    if !root.is_clean(child) {
                        root.set_clean(child, true);
                        let next = Visit::new(root, child);
                        stack.push(next);
                        continue 'visit;
                    }
                }
                root.close_cursor(node, iterator);
                stack[top].iterator = None;
            }

            let visit = &mut stack[top];
            while let Some(step) = visit.steps.get(visit.step).cloned() {
                visit.step += 1;
                match step {
                    Step::Children => {
                        if !root.children(node).is_empty() {
                            root.set_clean(node, true);
                            visit.iterator = root.open_cursor(node);
                        }
                        continue 'visit;
                    }
                    Step::Event(key) => {
                        if let Some(listeners) = self.listeners.get(&key) {
                            visit.visitors = listeners.clone();
                            visit.visitor = 0;
                            continue 'visit;
                        }
                    }
                }
            }
            stack.pop();
        }
        Ok(())
    }

    async fn call(&mut self, plugin: usize, callback: Callback, node: NodeId) -> Result<(), Error> {
        let plugins = self.plugins;
        let name = plugins[plugin].name.as_str();
        self.result.last_plugin = Some(name.to_string());
        let outcome = match callback {
            Callback::Async(_) if self.sync => Err(Error::AsyncInSync {
                plugin: name.to_string(),
            }),
            Callback::Sync(f) => f(&mut self.context(name, node)),
            Callback::Async(f) => f(self.context(name, node)).await,
        };
        outcome.map_err(|err| self.decorate(err, node))
    }

    fn context<'a>(&'a mut self, plugin: &'a str, node: NodeId) -> Context<'a> {
        Context {
            root: &mut self.result.root,
            node,
            plugin,
            opts: &self.result.opts,
            messages: &mut self.result.messages,
        }
    }

    /// Attach the failing plugin and node to an error raised by a callback.
    fn decorate(&self, err: Error, node: NodeId) -> Error {
        let plugin = self.result.last_plugin.clone().unwrap_or_default();
        let err = match err {
            Error::Syntax(mut syntax) => {
                syntax.plugin.get_or_insert(plugin);
                Error::Syntax(syntax)
            }
            err @ (Error::Plugin { .. } | Error::AsyncInSync { .. }) => err,
            source => {
                let found = self.result.root.get(node);
                let position = found
                    .and_then(|n| n.source.as_ref())
                    .and_then(|s| s.start.as_ref())
                    .map(|p| (p.line, p.column));
                Error::Plugin {
                    plugin,
                    node: found.map(|n| n.kind()),
                    position,
                    source: Arc::new(source),
                }
            }
        };
        debug!(error = %err, "plugin failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ops::ControlFlow,
        sync::{Arc, Mutex},
    };

    use futures::executor::block_on;

    use super::*;
    use crate::{NodeBag, Processor};

    fn process(plugins: Vec<Plugin>, css: &str) -> LazyResult {
        Processor::new(plugins).process(css, ProcessOptions::default())
    }

    fn recolor(name: &str, from: &'static str, to: &'static str) -> Plugin {
        Plugin::new(name).once(move |ctx| {
            let mut failed = None;
            let _ = ctx.root.walk_decls(ctx.node, |root, decl| {
                if root.get(decl).and_then(|n| n.value()) == Some(from) {
                    if let Err(err) = root.set_value(decl, to) {
                        failed = Some(err);
                        return ControlFlow::Break(());
                    }
                }
                ControlFlow::Continue(())
            });
            failed.map_or(Ok(()), Err)
        })
    }

    #[test]
    fn once_callbacks_run_in_plugin_order() {
        let css = "a{color:red}";
        let mut forward = process(
            vec![recolor("one", "red", "green"), recolor("two", "green", "blue")],
            css,
        );
        assert_eq!(forward.css().unwrap(), "a{color:blue}");

        let mut backward = process(
            vec![recolor("two", "green", "blue"), recolor("one", "red", "green")],
            css,
        );
        assert_eq!(backward.css().unwrap(), "a{color:green}");
    }

    #[test]
    fn visitors_rerun_until_the_tree_settles() {
        let swap = |name: &str, from: &'static str, to: &'static str| {
            Plugin::new(name).declaration(move |ctx| {
                if ctx.root.node(ctx.node)?.value() == Some(from) {
                    ctx.root.set_value(ctx.node, to)?;
                }
                Ok(())
            })
        };
        // The second step is registered first, so it only fires on a later pass.
        let mut result = process(
            vec![swap("second", "green", "blue"), swap("first", "red", "green")],
            "a{color:red}",
        );
        assert_eq!(result.css().unwrap(), "a{color:blue}");
    }

    #[test]
    fn events_fire_enter_children_exit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let log = log.clone();
            move |ctx: &mut Context<'_>| -> Result<(), Error> {
                let node = ctx.root.node(ctx.node)?;
                let what = node.selector().or(node.prop()).unwrap_or("root").to_string();
                log.lock().unwrap().push(format!("{label} {what}"));
                Ok(())
            }
        };
        let plugin = Plugin::new("log")
            .root(record("root"))
            .rule(record("rule"))
            .declaration(record("decl"))
            .declaration_named("COLOR", record("color"))
            .declaration_exit(record("decl-exit"))
            .rule_exit(record("rule-exit"))
            .root_exit(record("root-exit"));
        let mut result = process(vec![plugin], "a{color:red;top:0}");
        result.sync().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "root root",
                "rule a",
                "decl color",
                "color color",
                "decl-exit color",
                "decl top",
                "decl-exit top",
                "rule-exit a",
                "root-exit root",
            ]
        );
    }

    #[test]
    fn at_rule_filter_ignores_case() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let plugin = Plugin::new("media").at_rule_named("media", move |ctx| {
            let params = ctx.root.node(ctx.node)?.params().unwrap_or_default().to_string();
            sink.lock().unwrap().push(params);
            Ok(())
        });
        let mut result = process(vec![plugin], "@MEDIA print{}@supports (x:y){}");
        result.sync().unwrap();
        assert_eq!(*seen.lock().unwrap(), ["print"]);
    }

    #[test]
    fn inserted_nodes_are_visited() {
        let plugin = Plugin::new("prefix").declaration_named("transition", |ctx| {
            let prev = ctx.root.prev(ctx.node);
            let prefixed = prev.and_then(|p| ctx.root.get(p)).and_then(|n| n.prop());
            if prefixed != Some("-webkit-transition") {
                let value = ctx.root.node(ctx.node)?.value().unwrap_or_default().to_string();
                ctx.root
                    .insert_before(ctx.node, NodeBag::decl("-webkit-transition", value))?;
            }
            Ok(())
        });
        let mut result = process(vec![plugin], "a{transition:none}");
        assert_eq!(
            result.css().unwrap(),
            "a{-webkit-transition:none;transition:none}"
        );
    }

    #[test]
    fn inserted_nodes_are_visited_once_by_every_plugin() {
        let visits = Arc::new(Mutex::new(Vec::new()));
        let log = visits.clone();
        let insert = Plugin::new("ins").declaration(move |ctx| {
            let prop = ctx.root.node(ctx.node)?.prop().unwrap_or_default().to_string();
            log.lock().unwrap().push(format!("ins:{prop}"));
            if prop == "a" && ctx.root.next(ctx.node).is_none() {
                ctx.root.insert_after(ctx.node, NodeBag::decl("b", "2"))?;
            }
            Ok(())
        });
        let log = visits.clone();
        let observe = Plugin::new("obs").declaration(move |ctx| {
            let prop = ctx.root.node(ctx.node)?.prop().unwrap_or_default().to_string();
            log.lock().unwrap().push(format!("obs:{prop}"));
            Ok(())
        });

        let mut result = process(vec![insert, observe], "x{a:1}");
        assert_eq!(result.css().unwrap(), "x{a:1;b:2}");

        let visits = visits.lock().unwrap();
        for entry in ["ins:a", "obs:a", "ins:b", "obs:b"] {
            let count = visits.iter().filter(|v| *v == entry).count();
            assert_eq!(count, 1, "{entry} in {visits:?}");
        }
        assert_eq!(visits.len(), 4);
    }

    #[test]
    fn removed_nodes_get_no_exit_event() {
        let exits = Arc::new(Mutex::new(0));
        let counter = exits.clone();
        let plugin = Plugin::new("drop")
            .declaration_named("x", |ctx| ctx.root.remove(ctx.node))
            .declaration_exit(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            });
        let mut result = process(vec![plugin], "a{x:1;y:2}");
        assert_eq!(result.css().unwrap(), "a{y:2}");
        assert_eq!(*exits.lock().unwrap(), 1);
    }

    #[test]
    fn async_callback_in_sync_mode_fails() {
        let plugin = Plugin::new("later").once_async(|_ctx| Box::pin(async { Ok::<(), Error>(()) }));
        let mut result = process(vec![plugin], "a{}");
        match result.css() {
            Err(Error::AsyncInSync { plugin }) => assert_eq!(plugin, "later"),
            other => panic!("unexpected {other:?}"),
        }
        // The failure sticks.
        assert!(matches!(result.root(), Err(Error::AsyncInSync { .. })));
    }

    #[test]
    fn awaiting_runs_async_callbacks() {
        let plugin = Plugin::new("later").declaration_async(|mut ctx| {
            Box::pin(async move {
                let node = ctx.node;
                ctx.root.set_value(node, "blue")
            })
        });
        let result = block_on(process(vec![plugin], "a{color:red}").into_future()).unwrap();
        assert_eq!(result.css, "a{color:blue}");
        assert_eq!(result.last_plugin.as_deref(), Some("later"));
    }

    #[test]
    fn callback_errors_name_plugin_and_node() {
        let plugin = Plugin::new("strict").declaration(|_| Err(Error::other("boom")));
        let err = process(vec![plugin], "a{\n  color: red\n}").into_result().unwrap_err();
        match &err {
            Error::Plugin {
                plugin,
                node,
                position,
                ..
            } => {
                assert_eq!(plugin, "strict");
                assert_eq!(*node, Some(NodeKind::Decl));
                assert_eq!(*position, Some((2, 3)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.to_string(), "strict: boom");
    }

    #[test]
    fn syntax_errors_from_plugins_get_the_plugin_name() {
        let plugin =
            Plugin::new("lint").declaration(|ctx| Err(ctx.root.error(ctx.node, "Bad value").into()));
        let err = process(vec![plugin], "a{b:c}").into_result().unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.plugin.as_deref(), Some("lint"));
        assert_eq!((syntax.line, syntax.column), (Some(1), Some(3)));
    }

    #[test]
    fn parse_errors_surface_unwrapped() {
        let mut result = process(Vec::new(), "a{");
        let err = result.css().unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
        assert_eq!(err.as_syntax().unwrap().plugin, None);
    }

    #[test]
    fn warnings_and_messages_are_collected() {
        let plugin = Plugin::new("lint").declaration(|ctx| {
            let node = ctx.node;
            ctx.warn_at(node, "Avoid red");
            ctx.message("dependency", serde_json::json!({ "file": "b.css" }));
            Ok(())
        });
        let mut result = process(vec![plugin], "a{color:red}");
        let warnings = result.warnings().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to_string(), "lint: <css input>:1:3: Avoid red");
        let messages = result.messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].kind(), "dependency");
    }

    #[test]
    fn processing_an_existing_root_visits_it_again() {
        let first = process(Vec::new(), "a{color:red}").into_result().unwrap();
        let plugin = Plugin::new("upper").declaration(|ctx| {
            let value = ctx.root.node(ctx.node)?.value().unwrap_or_default().to_uppercase();
            ctx.root.set_value(ctx.node, value)
        });
        let processor = Processor::new([plugin]);
        let mut again = processor.process(first.root.clone(), ProcessOptions::default());
        assert_eq!(again.css().unwrap(), "a{color:RED}");
        let mut chained = processor.process(first, ProcessOptions::default());
        assert_eq!(chained.css().unwrap(), "a{color:RED}");
    }

    #[test]
    fn previous_result_map_is_carried_forward() {
        let opts = ProcessOptions::default()
            .from("a.css")
            .to("b.css")
            .map(MapOptions {
                inline: Some(false),
                ..MapOptions::default()
            });
        let first = Processor::new(Vec::new())
            .process("a{color:red}", opts)
            .into_result()
            .unwrap();
        assert!(first.map.is_some());

        let mut opts = ProcessOptions::default().from("b.css").to("c.css");
        carry_map(&first, &mut opts).unwrap();
        match &opts.map {
            MapSetting::Enabled(map) => {
                assert_eq!(map.inline, Some(false));
                assert!(matches!(map.prev, Some(PrevMap::Json(_))));
            }
            other => panic!("unexpected {other:?}"),
        }

        let result = Processor::new(Vec::new())
            .process(first, opts)
            .into_result()
            .unwrap();
        assert!(result.map.is_some());
        assert!(result.css.ends_with("/*# sourceMappingURL=c.css.map */"));
    }
}
