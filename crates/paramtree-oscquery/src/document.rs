//! OSCQuery namespace documents
//!
//! A node is described by a JSON object keyed by OSCQuery attribute names.
//! Parameters add `TYPE`, `VALUE`, `ACCESS` and, when bounded, `RANGE` and
//! `CLIPMODE`. Children are nested under `CONTENTS` by name.

use std::str::FromStr;

use paramtree_core::{Domain, Node, Parameter, Value};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::OscQueryError;

/// Attributes a client may query individually with `?ATTR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    FullPath,
    Contents,
    Type,
    Value,
    Range,
    Access,
    ClipMode,
    Description,
}

impl Attribute {
    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::FullPath => "FULL_PATH",
            Attribute::Contents => "CONTENTS",
            Attribute::Type => "TYPE",
            Attribute::Value => "VALUE",
            Attribute::Range => "RANGE",
            Attribute::Access => "ACCESS",
            Attribute::ClipMode => "CLIPMODE",
            Attribute::Description => "DESCRIPTION",
        }
    }
}

impl FromStr for Attribute {
    type Err = OscQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL_PATH" => Ok(Attribute::FullPath),
            "CONTENTS" => Ok(Attribute::Contents),
            "TYPE" => Ok(Attribute::Type),
            "VALUE" => Ok(Attribute::Value),
            "RANGE" => Ok(Attribute::Range),
            "ACCESS" => Ok(Attribute::Access),
            "CLIPMODE" => Ok(Attribute::ClipMode),
            "DESCRIPTION" => Ok(Attribute::Description),
            other => Err(OscQueryError::UnknownAttribute(other.to_string())),
        }
    }
}

/// Full description of `node` and its subtree
pub fn node_document(node: &Node) -> JsonValue {
    let mut doc = Map::new();
    doc.insert("FULL_PATH".into(), JsonValue::String(node.address()));

    if let Some(param) = node.parameter() {
        describe_parameter(&param, &mut doc);
    }

    if let Some(contents) = contents(node) {
        doc.insert("CONTENTS".into(), contents);
    }

    JsonValue::Object(doc)
}

/// One attribute of `node`, or `None` if the node does not carry it
pub fn attribute(node: &Node, attr: Attribute) -> Option<JsonValue> {
    let param = node.parameter();
    match attr {
        Attribute::FullPath => Some(JsonValue::String(node.address())),
        Attribute::Contents => contents(node),
        Attribute::Type => param.map(|p| JsonValue::String(type_tags(&p.value()))),
        Attribute::Value => param.map(|p| value_to_json(&p.value())),
        Attribute::Access => param.map(|p| json!(p.access().as_number())),
        Attribute::Range => param.and_then(|p| range(&p)),
        Attribute::ClipMode => param
            .filter(|p| p.have_domain())
            .map(|p| JsonValue::String(p.bounding().as_str().to_string())),
        Attribute::Description => param
            .and_then(|p| p.description().map(str::to_string))
            .map(JsonValue::String),
    }
}

fn describe_parameter(param: &Parameter, doc: &mut Map<String, JsonValue>) {
    let value = param.value();
    doc.insert("TYPE".into(), JsonValue::String(type_tags(&value)));
    doc.insert("VALUE".into(), value_to_json(&value));
    doc.insert("ACCESS".into(), json!(param.access().as_number()));
    if let Some(range) = range(param) {
        doc.insert("RANGE".into(), range);
        doc.insert(
            "CLIPMODE".into(),
            JsonValue::String(param.bounding().as_str().to_string()),
        );
    }
    if let Some(description) = param.description() {
        doc.insert("DESCRIPTION".into(), JsonValue::String(description.to_string()));
    }
}

fn contents(node: &Node) -> Option<JsonValue> {
    if !node.has_children() {
        return None;
    }
    let children = node
        .children()
        .map(|child| (child.name().to_string(), node_document(&child)))
        .collect::<Map<_, _>>();
    Some(JsonValue::Object(children))
}

/// One RANGE entry per vector component, a single one otherwise
fn range(param: &Parameter) -> Option<JsonValue> {
    let domain = param.domain()?;
    let entry = match &domain {
        Domain::Bounds { min, max } => {
            let mut entry = Map::new();
            if let Some(min) = min {
                entry.insert("MIN".into(), json!(min));
            }
            if let Some(max) = max {
                entry.insert("MAX".into(), json!(max));
            }
            JsonValue::Object(entry)
        }
        Domain::Values(values) => {
            json!({ "VALS": values.iter().map(scalar_to_json).collect::<Vec<_>>() })
        }
    };
    let count = param.value_type().arity().unwrap_or(1);
    Some(JsonValue::Array(vec![entry; count]))
}

/// OSC type tag string for a value. Nested lists are bracketed.
pub fn type_tags(value: &Value) -> String {
    let mut tags = String::new();
    match value {
        Value::List(items) => items.iter().for_each(|item| push_tags(item, &mut tags)),
        other => push_tags(other, &mut tags),
    }
    tags
}

fn push_tags(value: &Value, tags: &mut String) {
    match value {
        Value::Bool(_) => tags.push('T'),
        Value::Int(_) => tags.push('i'),
        Value::Float(_) => tags.push('f'),
        Value::Char(_) => tags.push('c'),
        Value::String(_) => tags.push('s'),
        Value::Vec2f(_) => tags.push_str("ff"),
        Value::Vec3f(_) => tags.push_str("fff"),
        Value::Vec4f(_) => tags.push_str("ffff"),
        Value::List(items) => {
            tags.push('[');
            items.iter().for_each(|item| push_tags(item, tags));
            tags.push(']');
        }
    }
}

/// The `VALUE` array: one entry per type tag
pub fn value_to_json(value: &Value) -> JsonValue {
    let items = match value {
        Value::Vec2f(c) => c.iter().map(|x| json!(x)).collect(),
        Value::Vec3f(c) => c.iter().map(|x| json!(x)).collect(),
        Value::Vec4f(c) => c.iter().map(|x| json!(x)).collect(),
        Value::List(items) => items.iter().map(scalar_to_json).collect(),
        scalar => vec![scalar_to_json(scalar)],
    };
    JsonValue::Array(items)
}

fn scalar_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Char(c) => JsonValue::String(char::from(*c).to_string()),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => value_to_json(value),
        Value::List(items) => JsonValue::Array(items.iter().map(scalar_to_json).collect()),
    }
}

/// Interpret a JSON payload as a write.
///
/// A one-element array unwraps to its element, longer arrays become lists.
/// Objects and nulls have no value equivalent.
pub fn json_to_value(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Array(items) if items.len() == 1 => json_to_value(&items[0]),
        other => json_scalar(other),
    }
}

fn json_scalar(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null | JsonValue::Object(_) => None,
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(json_scalar)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
    }
}

/// Server description returned for `?HOST_INFO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub name: String,
    pub osc_ip: String,
    pub osc_port: u16,
    pub ws_port: u16,
}

impl HostInfo {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "NAME": self.name,
            "OSC_IP": self.osc_ip,
            "OSC_PORT": self.osc_port,
            "OSC_TRANSPORT": "UDP",
            "WS_PORT": self.ws_port,
            "EXTENSIONS": {
                "ACCESS": true,
                "VALUE": true,
                "RANGE": true,
                "DESCRIPTION": true,
                "CLIPMODE": true,
                "TYPE": true,
                "LISTEN": true,
                "PATH_ADDED": true,
                "PATH_REMOVED": true,
                "HTML": false,
                "TAGS": false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramtree_core::{AccessMode, BoundingMode, Device, ParameterSpec, ValueType};

    fn sample() -> Device {
        let device = Device::new("sample");
        device
            .add_param(
                ParameterSpec::new("int", ValueType::Int)
                    .default_value(66)
                    .domain(Domain::range(-100, 100).unwrap()),
            )
            .unwrap();
        device
            .add_param(
                ParameterSpec::new("list/vec3f", ValueType::Vec3f)
                    .default_value([-270.0, 180.0, 45.0])
                    .domain(Domain::range(0.0, 360.0).unwrap())
                    .bounding(BoundingMode::Wrap),
            )
            .unwrap();
        device
            .add_param(
                ParameterSpec::new("string", ValueType::String)
                    .default_value("once")
                    .domain(Domain::enumeration(["once", "loop"]))
                    .description("playback mode"),
            )
            .unwrap();
        device
            .add_param(
                ParameterSpec::new("special/char", ValueType::Char)
                    .default_value('a')
                    .access(AccessMode::Get),
            )
            .unwrap();
        device
    }

    #[test]
    fn test_root_document() {
        let device = sample();
        let doc = node_document(device.root_node());

        assert_eq!(doc["FULL_PATH"], "/");
        assert!(doc.get("TYPE").is_none());
        let contents = doc["CONTENTS"].as_object().unwrap();
        let names: Vec<_> = contents.keys().map(String::as_str).collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"int"));
        assert!(names.contains(&"list"));

        let int = &contents["int"];
        assert_eq!(int["FULL_PATH"], "/int");
        assert_eq!(int["TYPE"], "i");
        assert_eq!(int["VALUE"], json!([66]));
        assert_eq!(int["ACCESS"], 3);
        assert_eq!(int["RANGE"], json!([{ "MIN": -100.0, "MAX": 100.0 }]));
        assert_eq!(int["CLIPMODE"], "both");
        assert!(int.get("CONTENTS").is_none());
    }

    #[test]
    fn test_contents_keep_insertion_order() {
        let device = Device::new("ordered");
        for name in ["zeta", "alpha", "mid"] {
            device
                .add_param(ParameterSpec::new(name, ValueType::Int))
                .unwrap();
        }
        let doc = node_document(device.root_node());

        let keys: Vec<String> = doc["CONTENTS"].as_object().unwrap().keys().cloned().collect();
        let children: Vec<String> = device
            .root_node()
            .children()
            .map(|child| child.name().to_string())
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(keys, children);
    }

    #[test]
    fn test_vector_document() {
        let device = sample();
        let node = device.find_node("/list/vec3f").unwrap();
        let doc = node_document(&node);

        assert_eq!(doc["TYPE"], "fff");
        assert_eq!(doc["VALUE"], json!([-270.0, 180.0, 45.0]));
        assert_eq!(doc["RANGE"].as_array().unwrap().len(), 3);
        assert_eq!(doc["CLIPMODE"], "wrap");
    }

    #[test]
    fn test_enumeration_and_metadata() {
        let device = sample();
        let string = device.find_node("/string").unwrap();
        assert_eq!(
            attribute(&string, Attribute::Range),
            Some(json!([{ "VALS": ["once", "loop"] }]))
        );
        assert_eq!(
            attribute(&string, Attribute::Description),
            Some(json!("playback mode"))
        );

        let char_node = device.find_node("/special/char").unwrap();
        assert_eq!(attribute(&char_node, Attribute::Type), Some(json!("c")));
        assert_eq!(attribute(&char_node, Attribute::Value), Some(json!(["a"])));
        assert_eq!(attribute(&char_node, Attribute::Access), Some(json!(1)));
        assert_eq!(attribute(&char_node, Attribute::Range), None);
        assert_eq!(attribute(&char_node, Attribute::ClipMode), None);
    }

    #[test]
    fn test_container_attributes() {
        let device = sample();
        let list = device.find_node("/list").unwrap();
        assert_eq!(attribute(&list, Attribute::Value), None);
        assert_eq!(attribute(&list, Attribute::FullPath), Some(json!("/list")));
        let contents = attribute(&list, Attribute::Contents).unwrap();
        assert!(contents.get("vec3f").is_some());
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!("VALUE".parse::<Attribute>().unwrap(), Attribute::Value);
        assert_eq!(
            Attribute::ClipMode.as_str().parse::<Attribute>().unwrap(),
            Attribute::ClipMode
        );
        assert!(matches!(
            "value".parse::<Attribute>(),
            Err(OscQueryError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_type_tags() {
        let list = Value::List(vec![
            Value::Int(1),
            Value::String("a".into()),
            Value::List(vec![Value::Float(1.0), Value::Bool(false)]),
        ]);
        assert_eq!(type_tags(&list), "is[fT]");
        assert_eq!(type_tags(&Value::Vec2f([0.0, 1.0])), "ff");
    }

    #[test]
    fn test_json_to_value() {
        assert_eq!(json_to_value(&json!(5)), Some(Value::Int(5)));
        assert_eq!(json_to_value(&json!([5])), Some(Value::Int(5)));
        assert_eq!(json_to_value(&json!(0.25)), Some(Value::Float(0.25)));
        assert_eq!(json_to_value(&json!(5_000_000_000i64)), Some(Value::Float(5e9)));
        assert_eq!(
            json_to_value(&json!([1, "x"])),
            Some(Value::List(vec![Value::Int(1), Value::String("x".into())]))
        );
        assert_eq!(json_to_value(&json!(null)), None);
        assert_eq!(json_to_value(&json!({ "a": 1 })), None);
    }

    #[test]
    fn test_host_info() {
        let info = HostInfo {
            name: "sample".into(),
            osc_ip: "127.0.0.1".into(),
            osc_port: 3456,
            ws_port: 5678,
        };
        let json = info.to_json();
        assert_eq!(json["OSC_PORT"], 3456);
        assert_eq!(json["WS_PORT"], 5678);
        assert_eq!(json["OSC_TRANSPORT"], "UDP");
        assert_eq!(json["EXTENSIONS"]["LISTEN"], true);
    }
}
