//! Parsed stylesheet text and node source locations.

use std::{
    fmt,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    options::{MapOptions, MapSetting, ParseOptions, PrevMap},
    previous_map::{PreviousMap, is_url},
    syntax_error::{CssSyntaxError, ErrorInput},
    utf16::LineIndex,
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// One stylesheet text handed to the parser.
///
/// Every node created by the parser keeps an `Arc` to its input, so errors raised long after
/// parsing can still show the offending source.
pub struct Input {
    css: String,
    has_bom: bool,
    file: Option<String>,
    id: Option<String>,
    map: Option<PreviousMap>,
    lines: LineIndex,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("from", &self.from())
            .field("len", &self.css.len())
            .field("has_bom", &self.has_bom)
            .field("map", &self.map.is_some())
            .finish()
    }
}

impl Input {
    /// Wrap `css`, stripping a leading byte order mark and loading any previous map.
    pub fn new(css: impl Into<String>, opts: &ParseOptions) -> Result<Self, Error> {
        let mut css = css.into();
        let has_bom = css.starts_with('\u{feff}');
        if has_bom {
            css.drain(..'\u{feff}'.len_utf8());
        }

        let file = opts.from.as_deref().map(resolve_file);
        let map = PreviousMap::load(&css, opts)?;
        let id = file.is_none().then(next_id);

        Ok(Self::assemble(css, has_bom, file, id, map))
    }

    fn assemble(
        css: String,
        has_bom: bool,
        file: Option<String>,
        id: Option<String>,
        map: Option<PreviousMap>,
    ) -> Self {
        let lines = LineIndex::new(&css);
        Self {
            css,
            has_bom,
            file,
            id,
            map,
            lines,
        }
    }

    /// The stylesheet text, without a byte order mark.
    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    /// Absolute path of the input, when a `from` option was given.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Synthetic `<input css N>` name used when there is no file.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The file path, or the synthetic id.
    pub fn from(&self) -> &str {
        self.file
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<css input>")
    }

    pub fn map(&self) -> Option<&PreviousMap> {
        self.map.as_ref()
    }

    /// 1-based line and UTF-16 column of a byte offset.
    pub fn from_offset(&self, offset: usize) -> (u32, u32) {
        self.lines.position(&self.css, offset)
    }

    pub(crate) fn position(&self, offset: usize) -> Position {
        let (line, column) = self.from_offset(offset);
        Position {
            offset,
            line,
            column,
        }
    }

    /// Build an error at a 1-based position, pointing at the original source when a previous
    /// map can resolve it.
    pub fn error(
        &self,
        reason: impl Into<String>,
        start: (u32, u32),
        end: Option<(u32, u32)>,
    ) -> CssSyntaxError {
        let (line, column) = start;
        let mut err = CssSyntaxError::new(reason);

        match self.origin(line, column, end) {
            Some(origin) => {
                err.file = origin.file;
                err.line = Some(origin.line);
                err.column = Some(origin.column);
                err.end_line = origin.end.map(|(l, _)| l);
                err.end_column = origin.end.map(|(_, c)| c);
                err.css = origin.css;
            }
            None => {
                err.file = self.file.clone();
                err.line = Some(line);
                err.column = Some(column);
                err.end_line = end.map(|(l, _)| l);
                err.end_column = end.map(|(_, c)| c);
                err.css = Some(self.css.clone());
            }
        }

        err.input = Some(ErrorInput {
            file: self.file.clone(),
            line,
            column,
            end_line: end.map(|(l, _)| l),
            end_column: end.map(|(_, c)| c),
        });
        err
    }

    /// Build an error covering the byte range `start..end`.
    pub(crate) fn error_at(
        &self,
        reason: impl Into<String>,
        start: usize,
        end: Option<usize>,
    ) -> CssSyntaxError {
        let start = self.from_offset(start);
        let end = end.map(|e| self.from_offset(e));
        self.error(reason, start, end)
    }

    /// Resolve a 1-based position through the previous map.
    pub fn origin(&self, line: u32, column: u32, end: Option<(u32, u32)>) -> Option<Origin> {
        let map = self.map.as_ref()?;
        let from = map.original_position(line.checked_sub(1)?, column.saturating_sub(1))?;
        let to = end.and_then(|(l, c)| {
            map.original_position(l.checked_sub(1)?, c.saturating_sub(1))
        });

        let file = map.resolve_source(&from.source);
        Some(Origin {
            file: (!is_url(&file)).then(|| file.clone()),
            url: file,
            line: from.line + 1,
            column: from.column + 1,
            end: to.map(|to| (to.line + 1, to.column + 1)),
            css: map.source_content(&from.source).map(str::to_string),
        })
    }

    pub(crate) fn to_json(&self) -> InputJson {
        InputJson {
            css: self.css.clone(),
            has_bom: self.has_bom,
            file: self.file.clone(),
            id: self.id.clone(),
            map: self.map.as_ref().map(|m| m.text().to_string()),
        }
    }

    pub(crate) fn from_json(json: InputJson) -> Result<Self, Error> {
        let map = match json.map {
            Some(text) => PreviousMap::load(
                "",
                &ParseOptions {
                    from: json.file.clone(),
                    map: MapSetting::Enabled(MapOptions {
                        prev: Some(PrevMap::Json(text)),
                        ..MapOptions::default()
                    }),
                },
            )?,
            None => None,
        };
        Ok(Self::assemble(json.css, json.has_bom, json.file, json.id, map))
    }
}

/// A position resolved into an upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub url: String,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
    pub end: Option<(u32, u32)>,
    pub css: Option<String>,
}

/// Serialized form of an [`Input`]. The previous map is kept as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputJson {
    pub css: String,
    #[serde(rename = "hasBOM", default)]
    pub has_bom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
}

/// A point in an input. `line` and `column` are 1-based, `column` counts UTF-16 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Where a node came from.
#[derive(Debug, Clone)]
pub struct Source {
    pub input: Arc<Input>,
    pub start: Option<Position>,
    /// Inclusive end: the position of the node's last character.
    pub end: Option<Position>,
}

fn next_id() -> String {
    format!("<input css {}>", NEXT_ID.fetch_add(1, Ordering::Relaxed) + 1)
}

fn resolve_file(from: &str) -> String {
    if from.starts_with('<') || is_url(from) {
        return from.to_string();
    }
    std::path::absolute(Path::new(from))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| from.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_remembers_it() {
        let input = Input::new("\u{feff}a{}", &ParseOptions::default()).unwrap();
        assert!(input.has_bom());
        assert_eq!(input.css(), "a{}");
    }

    #[test]
    fn anonymous_inputs_get_distinct_ids() {
        let a = Input::new("a{}", &ParseOptions::default()).unwrap();
        let b = Input::new("a{}", &ParseOptions::default()).unwrap();
        assert!(a.file().is_none());
        assert!(a.id().unwrap().starts_with("<input css "));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.from(), a.id().unwrap());
    }

    #[test]
    fn file_is_made_absolute() {
        let opts = ParseOptions {
            from: Some("styles/a.css".into()),
            ..ParseOptions::default()
        };
        let input = Input::new("a{}", &opts).unwrap();
        assert!(Path::new(input.file().unwrap()).is_absolute());
        assert!(input.file().unwrap().ends_with("a.css"));
        assert!(input.id().is_none());
    }

    #[test]
    fn error_without_map_points_into_input() {
        let opts = ParseOptions {
            from: Some("/tmp/a.css".into()),
            ..ParseOptions::default()
        };
        let input = Input::new("a {\n  b: c\n}", &opts).unwrap();
        let err = input.error_at("Broken", 6, None);
        assert_eq!(err.file.as_deref(), Some("/tmp/a.css"));
        assert_eq!((err.line, err.column), (Some(2), Some(3)));
        assert_eq!(err.input.as_ref().unwrap().line, 2);
        assert!(err.css.unwrap().starts_with("a {"));
    }

    #[test]
    fn error_resolves_through_previous_map() {
        let mut builder = sourcemap::SourceMapBuilder::new(None);
        let src = builder.add_source("/src/a.scss");
        builder.set_source_contents(src, Some("$x: 1;\n.a { b: $x }"));
        builder.add(1, 0, 1, 0, Some("/src/a.scss"), None, false);
        let mut buf = Vec::new();
        builder.into_sourcemap().to_writer(&mut buf).unwrap();

        let opts = ParseOptions {
            from: Some("/out/a.css".into()),
            map: crate::MapSetting::Enabled(crate::MapOptions {
                prev: Some(crate::PrevMap::Json(String::from_utf8(buf).unwrap())),
                ..crate::MapOptions::default()
            }),
        };
        let input = Input::new("x{}\n.a { b: 1 }", &opts).unwrap();
        let err = input.error("Bad", (2, 1), None);
        assert_eq!(err.file.as_deref(), Some("/src/a.scss"));
        assert_eq!((err.line, err.column), (Some(2), Some(1)));
        assert_eq!(err.css.as_deref(), Some("$x: 1;\n.a { b: $x }"));
        assert_eq!(err.input.unwrap().file.as_deref(), Some("/out/a.css"));
    }
}
