//! The outcome of a processing run.

use std::fmt;

use sourcemap::SourceMap;

use crate::{Error, NodeId, ProcessOptions, Root};

/// A non-fatal diagnostic recorded by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub text: String,
    pub plugin: Option<String>,
    /// The node the warning is about.
    pub node: Option<NodeId>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

impl Warning {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            plugin: None,
            node: None,
            file: None,
            line: None,
            column: None,
            end_line: None,
            end_column: None,
        }
    }

    /// A warning positioned at `node`'s source range, resolved through previous maps.
    pub fn at(root: &Root, node: NodeId, text: impl Into<String>) -> Self {
        let text = text.into();
        let located = root.error(node, text.clone());
        Self {
            node: Some(node),
            file: located.file,
            line: located.line,
            column: located.column,
            end_line: located.end_line,
            end_column: located.end_column,
            ..Self::new(text)
        }
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plugin) = &self.plugin {
            write!(f, "{plugin}: ")?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            let file = self.file.as_deref().unwrap_or("<css input>");
            write!(f, "{file}:{line}:{column}: ")?;
        }
        f.write_str(&self.text)
    }
}

/// Something a plugin reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Warning(Warning),
    /// Free-form message, e.g. `kind: "dependency"` with the file in `data`.
    Custom {
        kind: String,
        plugin: Option<String>,
        data: serde_json::Value,
    },
}

impl Message {
    pub fn kind(&self) -> &str {
        match self {
            Message::Warning(_) => "warning",
            Message::Custom { kind, .. } => kind,
        }
    }

    pub fn plugin(&self) -> Option<&str> {
        match self {
            Message::Warning(w) => w.plugin.as_deref(),
            Message::Custom { plugin, .. } => plugin.as_deref(),
        }
    }
}

/// A finished run: the transformed tree, its text and map, and the plugin messages.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub root: Root,
    pub opts: ProcessOptions,
    pub messages: Vec<Message>,
    pub css: String,
    /// The external source map; `None` when maps are off or the map was inlined into `css`.
    pub map: Option<SourceMap>,
    pub(crate) last_plugin: Option<String>,
}

impl ProcessResult {
    pub(crate) fn new(root: Root, opts: ProcessOptions) -> Self {
        Self {
            root,
            opts,
            messages: Vec::new(),
            css: String::new(),
            map: None,
            last_plugin: None,
        }
    }

    pub fn warnings(&self) -> Vec<&Warning> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Warning(w) => Some(w),
                Message::Custom { .. } => None,
            })
            .collect()
    }

    /// The map serialized as JSON.
    pub fn map_json(&self) -> Result<Option<String>, Error> {
        let Some(map) = &self.map else {
            return Ok(None);
        };
        let mut buf: Vec<u8> = Vec::new();
        map.to_writer(&mut buf)?;
        String::from_utf8(buf).map(Some).map_err(Error::other)
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css)
    }
}
