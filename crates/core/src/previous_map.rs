//! Source maps produced by upstream tools.
//!
//! A stylesheet that went through a preprocessor usually ends with a
//! `/*# sourceMappingURL=... */` annotation. [`PreviousMap::load`] finds that annotation (or
//! takes a map passed explicitly through [`MapOptions::prev`](crate::MapOptions)), decodes
//! it and keeps a parsed [`sourcemap::SourceMap`] so positions in this input can be resolved
//! back to the upstream sources.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use sourcemap::{DecodedMap, SourceMap};

use crate::{
    Error,
    options::{MapSetting, ParseOptions, PrevMap},
    uri,
};

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\s*# sourceMappingURL=").expect("valid regex"));
static URI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:application/json(?:;charset=utf-?8)?,").expect("valid regex")
});
static BASE64_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:application/json(?:;charset=utf-?8)?;base64,").expect("valid regex")
});
static ENCODING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data:application/json;([^,]+),").expect("valid regex"));

/// A decoded upstream source map attached to an [`Input`](crate::Input).
#[derive(Debug, Clone)]
pub struct PreviousMap {
    text: String,
    annotation: Option<String>,
    inline: bool,
    map_file: Option<String>,
    root: Option<PathBuf>,
    consumer: SourceMap,
}

impl PreviousMap {
    /// Find and decode the previous map for `css`.
    ///
    /// Returns `Ok(None)` when maps are disabled or nothing was found. A map file named by an
    /// annotation but missing on disk is silently ignored, as upstream tools often strip
    /// maps; an explicitly requested file that cannot be read is an error.
    pub fn load(css: &str, opts: &ParseOptions) -> Result<Option<Self>, Error> {
        if opts.map == MapSetting::Disabled {
            return Ok(None);
        }

        let annotation = find_annotation(css);
        let inline = annotation
            .as_deref()
            .is_some_and(|a| a.starts_with("data:"));

        let mut map_file: Option<String> = None;
        let mut root: Option<PathBuf> = None;

        let prev = opts.map.options().and_then(|m| m.prev.as_ref());
        let text = match prev {
            Some(PrevMap::Disabled) => None,
            Some(PrevMap::Json(text)) => Some(text.clone()),
            Some(PrevMap::File(path)) => {
                root = path.parent().map(Path::to_path_buf);
                let text = std::fs::read_to_string(path)
                    .map_err(|_| Error::PreviousMapNotFound(path.display().to_string()))?;
                map_file = Some(path.display().to_string());
                Some(text.trim().to_string())
            }
            None if inline => annotation.as_deref().map(decode_inline).transpose()?,
            None => match annotation.as_deref() {
                Some(url) => {
                    let path = match opts.from.as_deref() {
                        Some(from) => dirname(from).join(url),
                        None => PathBuf::from(url),
                    };
                    root = path.parent().map(Path::to_path_buf);
                    match std::fs::read_to_string(&path) {
                        Ok(text) => {
                            map_file = Some(path.display().to_string());
                            Some(text.trim().to_string())
                        }
                        Err(_) => None,
                    }
                }
                None => None,
            },
        };

        let Some(text) = text else {
            return Ok(None);
        };

        if map_file.is_none() {
            map_file = opts.from.clone();
        }
        if let Some(file) = &map_file {
            root = Some(dirname(file));
        }

        let consumer = parse_map(&text)?;
        tracing::debug!(
            inline,
            map_file = map_file.as_deref().unwrap_or("<none>"),
            sources = consumer.get_source_count(),
            "loaded previous source map"
        );

        Ok(Some(Self {
            text,
            annotation,
            inline,
            map_file,
            root,
            consumer,
        }))
    }

    /// The map JSON text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The URL found in the input's annotation comment, if any.
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    /// Whether the map was embedded as a data URL.
    pub fn inline(&self) -> bool {
        self.inline
    }

    /// Path of the map file, or of the input when the map was inline.
    pub fn file(&self) -> Option<&str> {
        self.map_file.as_deref()
    }

    /// Directory map sources are relative to.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn consumer(&self) -> &SourceMap {
        &self.consumer
    }

    /// Whether the map embeds the contents of at least one source.
    pub fn with_content(&self) -> bool {
        (0..self.consumer.get_source_count())
            .any(|i| self.consumer.get_source_contents(i).is_some())
    }

    /// Resolve a map source path against the map's root directory.
    pub fn resolve_source(&self, source: &str) -> String {
        if is_url(source) || source.starts_with('<') || Path::new(source).is_absolute() {
            return source.to_string();
        }
        let base = self
            .consumer
            .get_source_root()
            .map(PathBuf::from)
            .or_else(|| self.root.clone())
            .unwrap_or_default();
        normalize(&base.join(source)).display().to_string()
    }

    /// Look up the original position of a 0-based generated position.
    ///
    /// Only tokens on the same generated line match, so a line with no mapping does not
    /// borrow one from a line above it.
    pub fn original_position(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let token = self.consumer.lookup_token(line, column)?;
        if token.get_dst_line() != line {
            return None;
        }
        let source = token.get_source()?;
        Some(OriginalPosition {
            source: source.to_string(),
            line: token.get_src_line(),
            column: token.get_src_col(),
            name: token.get_name().map(str::to_string),
        })
    }

    /// Embedded contents of `source`, as named in the map.
    pub fn source_content(&self, source: &str) -> Option<&str> {
        (0..self.consumer.get_source_count())
            .find(|&i| self.consumer.get_source(i) == Some(source))
            .and_then(|i| self.consumer.get_source_contents(i))
    }
}

/// A position in an upstream source. Lines and columns are 0-based, as in the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// Return the URL of the last `sourceMappingURL` annotation in `css`.
fn find_annotation(css: &str) -> Option<String> {
    let start = ANNOTATION.find_iter(css).last()?;
    let end = css[start.end()..].find("*/")? + start.end();
    Some(css[start.end()..end].trim().to_string())
}

/// Decode an inline `data:` annotation into map JSON text.
fn decode_inline(url: &str) -> Result<String, Error> {
    if let Some(m) = BASE64_PREFIX.find(url) {
        let payload = &url[m.end()..];
        let decoded = sourcemap::decode_data_url(&format!("data:application/json;base64,{payload}"))?;
        let map = flatten(decoded)?;
        let mut buf = Vec::new();
        map.to_writer(&mut buf)?;
        return String::from_utf8(buf).map_err(Error::other);
    }
    if let Some(m) = URI_PREFIX.find(url) {
        let payload = &url[m.end()..];
        return uri::decode(payload);
    }
    let encoding = ENCODING
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| url.chars().take(40).collect());
    Err(Error::UnsupportedMapEncoding(encoding))
}

/// Parse map JSON text, rejecting values that are not source maps at all.
fn parse_map(text: &str) -> Result<SourceMap, Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let looks_like_map = value.get("mappings").is_some_and(|m| m.is_string())
        || value.get("sections").is_some_and(|s| s.is_array());
    if !looks_like_map {
        return Err(Error::UnsupportedPreviousMap(
            text.chars().take(40).collect(),
        ));
    }
    flatten(sourcemap::decode_slice(text.as_bytes())?)
}

fn flatten(decoded: DecodedMap) -> Result<SourceMap, Error> {
    match decoded {
        DecodedMap::Regular(map) => Ok(map),
        DecodedMap::Index(index) => Ok(index.flatten()?),
        #[allow(unreachable_patterns)]
        _ => Err(Error::UnsupportedPreviousMap("hermes source map".into())),
    }
}

pub(crate) fn is_url(path: &str) -> bool {
    let Some((scheme, _)) = path.split_once("://") else {
        return false;
    };
    !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn dirname(path: &str) -> PathBuf {
    Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Lexically remove `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MapOptions;

    fn map_json(source: &str) -> String {
        let mut builder = sourcemap::SourceMapBuilder::new(None);
        builder.add_source(source);
        builder.add(0, 0, 4, 2, Some(source), None, false);
        let mut buf = Vec::new();
        builder.into_sourcemap().to_writer(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn finds_last_annotation() {
        let css = "a{}\n/*# sourceMappingURL=one.map */\n/*# sourceMappingURL=two.map */";
        assert_eq!(find_annotation(css).as_deref(), Some("two.map"));
        assert_eq!(find_annotation("a{}"), None);
    }

    #[test]
    fn decodes_base64_annotation() {
        let sm = SourceMap::from_slice(map_json("a.scss").as_bytes()).unwrap();
        let url = sm.to_data_url().unwrap();
        let css = format!("a{{}}\n/*# sourceMappingURL={url} */");

        let opts = ParseOptions {
            from: Some("b.css".into()),
            ..ParseOptions::default()
        };
        let prev = PreviousMap::load(&css, &opts).unwrap().expect("inline map");
        assert!(prev.inline());
        assert_eq!(prev.file(), Some("b.css"));
        let pos = prev.original_position(0, 0).unwrap();
        assert_eq!(pos.source, "a.scss");
        assert_eq!((pos.line, pos.column), (4, 2));
    }

    #[test]
    fn decodes_uri_annotation() {
        let json = map_json("a.less");
        let encoded = crate::uri::encode(&json);
        let css = format!("a{{}}/*# sourceMappingURL=data:application/json,{encoded} */");
        let prev = PreviousMap::load(&css, &ParseOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(prev.consumer().get_source(0), Some("a.less"));
    }

    #[test]
    fn rejects_unknown_encoding() {
        let css = "a{}/*# sourceMappingURL=data:application/json;utf16,AAAA */";
        let err = PreviousMap::load(css, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMapEncoding(ref e) if e == "utf16"));
    }

    #[test]
    fn explicit_prev_overrides_annotation() {
        let opts = ParseOptions {
            from: None,
            map: MapSetting::Enabled(MapOptions {
                prev: Some(PrevMap::Json(map_json("x.sass"))),
                ..MapOptions::default()
            }),
        };
        let prev = PreviousMap::load("a{}", &opts).unwrap().unwrap();
        assert!(!prev.inline());
        assert_eq!(prev.consumer().get_source(0), Some("x.sass"));
    }

    #[test]
    fn rejects_json_that_is_not_a_map() {
        let opts = ParseOptions {
            from: None,
            map: MapSetting::Enabled(MapOptions {
                prev: Some(PrevMap::Json(r#"{"hello":1}"#.into())),
                ..MapOptions::default()
            }),
        };
        let err = PreviousMap::load("a{}", &opts).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPreviousMap(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let opts = ParseOptions {
            from: None,
            map: MapSetting::Enabled(MapOptions {
                prev: Some(PrevMap::File("/definitely/missing.map".into())),
                ..MapOptions::default()
            }),
        };
        let err = PreviousMap::load("a{}", &opts).unwrap_err();
        assert!(matches!(err, Error::PreviousMapNotFound(_)));
    }

    #[test]
    fn disabled_setting_skips_annotation() {
        let opts = ParseOptions {
            from: None,
            map: MapSetting::Disabled,
        };
        let css = "a{}/*# sourceMappingURL=data:application/json;utf16,AAAA */";
        assert!(PreviousMap::load(css, &opts).unwrap().is_none());
    }

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn detects_urls() {
        assert!(is_url("https://example.com/a.css"));
        assert!(!is_url("a.css"));
        assert!(!is_url("/abs/a.css"));
    }
}
