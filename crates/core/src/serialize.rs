//! JSON form of a tree.
//!
//! Every node becomes an object with its `type`, `raws`, kind fields and `nodes`. Sources
//! point into a top-level `inputs` table so inputs shared by many nodes are written once and
//! stay shared after [`Root::from_json`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Input, NodeData, NodeId, NodeKind, Position, Raws, Root, Source, input::InputJson,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson {
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    raws: Raws,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    important: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nodes: Option<Vec<NodeJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<SourceJson>,
    /// Only set on the top node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    inputs: Vec<InputJson>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceJson {
    input_id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<Position>,
}

impl Root {
    /// Serialize the whole tree.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        let mut inputs: Vec<Arc<Input>> = Vec::new();
        let mut json = self.node_json(self.root, &mut inputs);
        json.inputs = inputs.iter().map(|input| input.to_json()).collect();
        Ok(serde_json::to_value(json)?)
    }

    /// Rebuild a tree from [`Root::to_json`] output.
    pub fn from_json(value: serde_json::Value) -> Result<Root, Error> {
        let json: NodeJson = serde_json::from_value(value)?;
        if json.kind != NodeKind::Root {
            return Err(Error::WrongKind {
                expected: NodeKind::Root,
                found: json.kind,
            });
        }
        let inputs = json
            .inputs
            .iter()
            .cloned()
            .map(|input| Input::from_json(input).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut root = Root::new();
        let id = root.root;
        let node = &mut root.arena[id];
        node.raws = json.raws;
        node.source = source(json.source, &inputs)?;
        for child in json.nodes.unwrap_or_default() {
            root.build_json(id, child, &inputs)?;
        }
        Ok(root)
    }

    fn node_json(&self, id: NodeId, inputs: &mut Vec<Arc<Input>>) -> NodeJson {
        let node = &self.arena[id];
        let mut json = NodeJson {
            kind: node.kind(),
            raws: node.raws.clone(),
            selector: None,
            name: None,
            params: None,
            prop: None,
            value: None,
            important: false,
            text: None,
            nodes: None,
            source: None,
            inputs: Vec::new(),
        };
        match &node.data {
            NodeData::Root => {}
            NodeData::Rule { selector } => json.selector = Some(selector.clone()),
            NodeData::AtRule { name, params } => {
                json.name = Some(name.clone());
                json.params = Some(params.clone());
            }
            NodeData::Decl {
                prop,
                value,
                important,
            } => {
                json.prop = Some(prop.clone());
                json.value = Some(value.clone());
                json.important = *important;
            }
            NodeData::Comment { text } => json.text = Some(text.clone()),
        }
        json.source = node.source.as_ref().map(|source| {
            let input_id = match inputs.iter().position(|i| Arc::ptr_eq(i, &source.input)) {
                Some(index) => index,
                None => {
                    inputs.push(source.input.clone());
                    inputs.len() - 1
                }
            };
            SourceJson {
                input_id,
                start: source.start,
                end: source.end,
            }
        });
        json.nodes = node.nodes.as_ref().map(|children| {
            children
                .iter()
                .map(|&child| self.node_json(child, inputs))
                .collect()
        });
        json
    }

    fn build_json(&mut self, parent: NodeId, json: NodeJson, inputs: &[Arc<Input>]) -> Result<(), Error> {
        let data = match json.kind {
            NodeKind::Root => return Err(Error::UnknownNodeType),
            NodeKind::Rule => NodeData::Rule {
                selector: json.selector.unwrap_or_default(),
            },
            NodeKind::AtRule => NodeData::AtRule {
                name: json.name.unwrap_or_default(),
                params: json.params.unwrap_or_default(),
            },
            NodeKind::Decl => NodeData::Decl {
                prop: json.prop.unwrap_or_default(),
                value: json.value.ok_or(Error::DeclarationWithoutValue)?,
                important: json.important,
            },
            NodeKind::Comment => NodeData::Comment {
                text: json.text.unwrap_or_default(),
            },
        };
        let id = self.alloc(data);
        let node = &mut self.arena[id];
        node.raws = json.raws;
        node.source = source(json.source, inputs)?;
        node.parent = Some(parent);
        if json.nodes.is_some() {
            node.nodes.get_or_insert_with(Vec::new);
        }
        self.arena[parent]
            .nodes
            .get_or_insert_with(Vec::new)
            .push(id);
        for child in json.nodes.unwrap_or_default() {
            self.build_json(id, child, inputs)?;
        }
        Ok(())
    }
}

fn source(json: Option<SourceJson>, inputs: &[Arc<Input>]) -> Result<Option<Source>, Error> {
    let Some(json) = json else {
        return Ok(None);
    };
    let input = inputs.get(json.input_id).ok_or_else(|| {
        Error::other(format!("source refers to missing input {}", json.input_id))
    })?;
    Ok(Some(Source {
        input: input.clone(),
        start: json.start,
        end: json.end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParseOptions, parse};

    fn opts() -> ParseOptions {
        ParseOptions {
            from: Some("/src/app.css".into()),
            ..ParseOptions::default()
        }
    }

    #[test]
    fn json_form_has_types_raws_and_inputs() {
        let root = parse("a { color: red !important }", &opts()).unwrap();
        let json = root.to_json().unwrap();

        assert_eq!(json["type"], "root");
        assert_eq!(json["inputs"].as_array().unwrap().len(), 1);
        assert_eq!(json["inputs"][0]["css"], "a { color: red !important }");
        assert_eq!(json["inputs"][0]["file"], "/src/app.css");

        let rule = &json["nodes"][0];
        assert_eq!(rule["type"], "rule");
        assert_eq!(rule["selector"], "a");
        assert_eq!(rule["raws"]["between"], " ");
        assert_eq!(rule["source"]["inputId"], 0);
        assert_eq!(rule["source"]["start"]["line"], 1);

        let decl = &rule["nodes"][0];
        assert_eq!(decl["prop"], "color");
        assert_eq!(decl["value"], "red");
        assert_eq!(decl["important"], true);
        assert!(decl.get("nodes").is_none());
    }

    #[test]
    fn from_json_rebuilds_a_printable_tree() {
        let css = "@media print {\n  a { color: red; }\n}\n/* note */\n@import 'x.css';";
        let root = parse(css, &opts()).unwrap();
        let restored = Root::from_json(root.to_json().unwrap()).unwrap();
        assert_eq!(restored.to_string(), css);

        let media = restored.first(restored.id()).unwrap();
        let rule = restored.first(media).unwrap();
        let import = restored.last(restored.id()).unwrap();
        assert!(restored.node(import).unwrap().children().is_empty());
        assert!(!restored.node(import).unwrap().is_container());

        let media_input = &restored.node(media).unwrap().source.as_ref().unwrap().input;
        let rule_input = &restored.node(rule).unwrap().source.as_ref().unwrap().input;
        assert!(Arc::ptr_eq(media_input, rule_input));
        assert_eq!(media_input.file(), Some("/src/app.css"));
    }

    #[test]
    fn built_nodes_have_no_source() {
        let mut root = Root::new();
        let rule = root.rule("a");
        let id = root.id();
        root.append(id, rule).unwrap();
        let json = root.to_json().unwrap();
        assert!(json.get("inputs").is_none());
        assert!(json["nodes"][0].get("source").is_none());
        assert_eq!(Root::from_json(json).unwrap().to_string(), "a {}");
    }

    #[test]
    fn from_json_rejects_bad_trees() {
        let decl = serde_json::json!({ "type": "decl", "prop": "a", "value": "b" });
        assert!(matches!(
            Root::from_json(decl),
            Err(Error::WrongKind { .. })
        ));

        let missing_value = serde_json::json!({
            "type": "root",
            "nodes": [{ "type": "decl", "prop": "a" }]
        });
        assert!(matches!(
            Root::from_json(missing_value),
            Err(Error::DeclarationWithoutValue)
        ));

        let dangling = serde_json::json!({
            "type": "root",
            "nodes": [{ "type": "comment", "text": "x", "source": { "inputId": 3 } }]
        });
        assert!(Root::from_json(dangling).is_err());
    }
}
