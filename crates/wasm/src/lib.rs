//! wasm-bindgen exports.
//!
//! This module exposes parsing and processing to JavaScript via `wasm-bindgen`.
//! The underlying logic lives in the `restyle` crate.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use restyle::{MapSetting, ProcessOptions, ProcessResult, Processor};

/// Options for [`process`] and [`process_async`].
#[derive(Debug, Clone, Default, serde::Deserialize, tsify::Tsify)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Path of the input file.
    #[tsify(optional)]
    pub from: Option<String>,
    /// Path of the output file.
    #[tsify(optional)]
    pub to: Option<String>,
    /// `false`, `true` or a map options object.
    #[serde(default)]
    #[tsify(type = "boolean | Record<string, unknown>")]
    #[tsify(optional)]
    pub map: MapSetting,
}

impl From<ProcessConfig> for ProcessOptions {
    fn from(val: ProcessConfig) -> Self {
        ProcessOptions {
            from: val.from,
            to: val.to,
            map: val.map,
        }
    }
}

/// Output of a processing run.
#[derive(Debug, Clone, serde::Serialize, tsify::Tsify)]
#[tsify(into_wasm_abi)]
pub struct ProcessOutput {
    /// The printed stylesheet.
    pub css: String,
    /// The external sourcemap JSON, if one was produced.
    pub map: Option<String>,
}

impl TryFrom<ProcessResult> for ProcessOutput {
    type Error = restyle::Error;

    fn try_from(res: ProcessResult) -> Result<Self, Self::Error> {
        let map = res.map_json()?;
        Ok(ProcessOutput { css: res.css, map })
    }
}

fn js_error(e: restyle::Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Parse a stylesheet and return its tree as plain JSON.
#[wasm_bindgen]
pub fn parse(css: String, from: Option<String>) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = restyle::ParseOptions {
        from,
        ..Default::default()
    };
    let root = restyle::parse(&css, &opts).map_err(js_error)?;
    let json = root.to_json().map_err(js_error)?;
    json.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

/// Reprint a stylesheet, producing or chaining its sourcemap.
#[wasm_bindgen]
pub fn process(css: String, config: ProcessConfig) -> Result<ProcessOutput, JsValue> {
    console_error_panic_hook::set_once();

    let res = Processor::default()
        .process(css, config.into())
        .into_result()
        .map_err(js_error)?;
    ProcessOutput::try_from(res).map_err(js_error)
}

/// Like [`process`], resolving a `Promise`.
#[wasm_bindgen]
pub fn process_async(css: String, config: ProcessConfig) -> js_sys::Promise {
    console_error_panic_hook::set_once();

    let run = Processor::default().process(css, config.into());
    wasm_bindgen_futures::future_to_promise(async move {
        let res = run.await.map_err(js_error)?;
        let output = ProcessOutput::try_from(res).map_err(js_error)?;
        output
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(JsValue::from)
    })
}
