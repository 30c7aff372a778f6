//! CSS source-to-source transformation library.
//!
//! This crate parses stylesheets into a tree that keeps every byte of formatting, lets a
//! pipeline of plugins rewrite that tree, and prints it back together with a source map that
//! chains through any maps the input already carried.
//!
//! Entry points:
//!
//! - [`parse`] turns CSS text into a [`Root`].
//! - [`Processor`] runs [`Plugin`]s over a stylesheet and returns a [`LazyResult`].
//! - [`Root::to_string_of`] and [`Root::to_json`] serialize a tree back out.
//!
//! Internals:
//!
//! - [`tokenize`] splits CSS into tokens; [`parse`](mod@parse) builds the tree from them.
//! - [`node`] and [`container`] hold the arena tree and its mutation API.
//! - [`stringify`] prints a tree, inferring missing formatting from the rest of the tree.
//! - [`map_generator`] and [`previous_map`] produce and chain source maps.
//! - [`utf16`] provides UTF-16 column indexing support for sourcemaps.

pub mod container;
pub mod input;
pub mod lazy_result;
pub mod list;
pub mod map_generator;
pub mod node;
pub mod options;
pub mod parse;
pub mod previous_map;
pub mod processor;
pub mod result;
pub mod serialize;
pub mod stringify;
pub mod syntax_error;
pub mod tokenize;
mod uri;
pub mod utf16;

use std::sync::Arc;

pub use container::{Filter, NodeBag, NodeInput};
pub use input::{Input, Origin, Position, Source};
pub use lazy_result::LazyResult;
pub use node::{Node, NodeData, NodeId, NodeKind, RawValue, Raws, Root};
pub use options::{Annotation, MapOptions, MapSetting, ParseOptions, PrevMap, ProcessOptions};
pub use previous_map::PreviousMap;
pub use processor::{Context, Plugin, ProcessInput, Processor};
pub use result::{Message, ProcessResult, Warning};
pub use stringify::{Builder, Phase};
pub use syntax_error::{CssSyntaxError, ErrorInput};

/// Errors that can occur while parsing, transforming or mapping a stylesheet.
///
/// Cloneable so a [`LazyResult`] can hand the same failure to every accessor.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("{0}")]
    Syntax(CssSyntaxError),

    #[error("unknown node type in node creation")]
    UnknownNodeType,

    #[error("value field is missed in node creation")]
    DeclarationWithoutValue,

    #[error("{0} nodes cannot have children")]
    NotAContainer(NodeKind),

    #[error("node is not a child of the given container")]
    NotAChild,

    #[error("node does not exist in this tree")]
    UnknownNode,

    #[error("expected a {expected} node, found {found}")]
    WrongKind { expected: NodeKind, found: NodeKind },

    /// A plugin callback failed while visiting `node`.
    #[error("{plugin}: {source}")]
    Plugin {
        plugin: String,
        node: Option<NodeKind>,
        /// 1-based line and column of the node being visited.
        position: Option<(u32, u32)>,
        source: Arc<Error>,
    },

    #[error("use process(css).await instead of sync() with async plugin {plugin}")]
    AsyncInSync { plugin: String },

    #[error("unsupported source map encoding {0}")]
    UnsupportedMapEncoding(String),

    #[error("unsupported previous source map format: {0}")]
    UnsupportedPreviousMap(String),

    #[error("unable to load previous source map: {0}")]
    PreviousMapNotFound(String),

    #[error("invalid sourcemap: {0}")]
    SourceMap(Arc<sourcemap::Error>),

    #[error("invalid JSON: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("{0}")]
    Io(Arc<std::io::Error>),

    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap any error, typically one raised by a plugin.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Other(Arc::from(err.into()))
    }

    /// The syntax error behind this error, looking through plugin decoration.
    pub fn as_syntax(&self) -> Option<&CssSyntaxError> {
        match self {
            Error::Syntax(err) => Some(err),
            Error::Plugin { source, .. } => source.as_syntax(),
            _ => None,
        }
    }
}

impl From<CssSyntaxError> for Error {
    fn from(err: CssSyntaxError) -> Self {
        Error::Syntax(err)
    }
}

impl From<sourcemap::Error> for Error {
    fn from(err: sourcemap::Error) -> Self {
        Error::SourceMap(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// Parse `css` into a tree.
///
/// The tree prints back byte-for-byte: `parse(css)?.to_string() == css`.
pub fn parse(css: &str, opts: &ParseOptions) -> Result<Root, Error> {
    let input = Arc::new(Input::new(css, opts)?);
    let root = parse::parse_input(&input)?;
    tracing::trace!(input = %input.from(), nodes = root.children(root.id()).len(), "parsed stylesheet");
    Ok(root)
}
