//! Parse and process configuration.
//!
//! All option structs are plain data with `Default`, and deserialize from the camelCase
//! shapes JavaScript build tools already pass around, so the wasm bindings can forward them
//! untouched.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for [`crate::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseOptions {
    /// Path of the stylesheet. Used in error messages and source maps.
    pub from: Option<String>,
    /// Source map handling. Only the previous-map part matters while parsing.
    pub map: MapSetting,
}

/// Options for [`crate::Processor::process`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    /// Path of the input stylesheet.
    pub from: Option<String>,
    /// Path the output will be written to. Map sources are made relative to it.
    pub to: Option<String>,
    pub map: MapSetting,
}

impl ProcessOptions {
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn map(mut self, map: MapOptions) -> Self {
        self.map = MapSetting::Enabled(map);
        self
    }

    pub fn no_map(mut self) -> Self {
        self.map = MapSetting::Disabled;
        self
    }

    /// The subset used to parse the input.
    pub(crate) fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            from: self.from.clone(),
            map: self.map.clone(),
        }
    }
}

/// Whether a source map is produced.
///
/// `Auto` emits a map only when the input already carried one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MapSettingRepr", into = "MapSettingRepr")]
pub enum MapSetting {
    #[default]
    Auto,
    Disabled,
    Enabled(MapOptions),
}

impl MapSetting {
    pub fn options(&self) -> Option<&MapOptions> {
        match self {
            MapSetting::Enabled(opts) => Some(opts),
            _ => None,
        }
    }
}

/// Wire shape of [`MapSetting`]: `null`, `false`, `true` or an options object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum MapSettingRepr {
    Flag(bool),
    Options(MapOptions),
    Unset(()),
}

impl From<MapSettingRepr> for MapSetting {
    fn from(repr: MapSettingRepr) -> Self {
        match repr {
            MapSettingRepr::Unset(()) => MapSetting::Auto,
            MapSettingRepr::Flag(false) => MapSetting::Disabled,
            MapSettingRepr::Flag(true) => MapSetting::Enabled(MapOptions::default()),
            MapSettingRepr::Options(opts) => MapSetting::Enabled(opts),
        }
    }
}

impl From<MapSetting> for MapSettingRepr {
    fn from(setting: MapSetting) -> Self {
        match setting {
            MapSetting::Auto => MapSettingRepr::Unset(()),
            MapSetting::Disabled => MapSettingRepr::Flag(false),
            MapSetting::Enabled(opts) => MapSettingRepr::Options(opts),
        }
    }
}

/// Source map generation options.
///
/// Every `None` is decided from the previous maps of the inputs, and falls back to a
/// default when there are none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapOptions {
    /// Embed the map into the CSS as a base64 data URL.
    pub inline: Option<bool>,
    /// Previous map of the input, overriding the annotation comment.
    pub prev: Option<PrevMap>,
    /// Include original contents in `sourcesContent`.
    pub sources_content: Option<bool>,
    /// Write a `sourceMappingURL` annotation.
    pub annotation: Option<Annotation>,
    /// Override the source path recorded for every mapping.
    pub from: Option<String>,
    /// Keep absolute paths instead of relativizing them to `to`.
    pub absolute: bool,
}

/// The `sourceMappingURL` annotation setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Annotation {
    Enabled(bool),
    /// Explicit URL written into the annotation.
    Path(String),
}

/// An explicitly supplied previous map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrevMap {
    /// Ignore any annotation found in the input.
    Disabled,
    /// Map JSON text.
    Json(String),
    /// Path to a map file on disk.
    File(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_setting_accepts_js_shapes() {
        let opts: ProcessOptions = serde_json::from_str(r#"{"from":"a.css"}"#).unwrap();
        assert_eq!(opts.map, MapSetting::Auto);

        let opts: ProcessOptions = serde_json::from_str(r#"{"map":false}"#).unwrap();
        assert_eq!(opts.map, MapSetting::Disabled);

        let opts: ProcessOptions = serde_json::from_str(r#"{"map":true}"#).unwrap();
        assert_eq!(opts.map, MapSetting::Enabled(MapOptions::default()));

        let opts: ProcessOptions =
            serde_json::from_str(r#"{"to":"out.css","map":{"inline":false,"annotation":"x.map"}}"#)
                .unwrap();
        let map = opts.map.options().unwrap();
        assert_eq!(map.inline, Some(false));
        assert_eq!(map.annotation, Some(Annotation::Path("x.map".into())));
    }

    #[test]
    fn builder_methods_fill_fields() {
        let opts = ProcessOptions::default().from("a.css").to("b.css").no_map();
        assert_eq!(opts.from.as_deref(), Some("a.css"));
        assert_eq!(opts.to.as_deref(), Some("b.css"));
        assert_eq!(opts.map, MapSetting::Disabled);
    }
}
