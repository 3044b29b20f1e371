//! Response variants of a mock: static, dynamic and proxy.

use super::delay::Delay;
use crate::history::MockType;
use crate::matcher::MultiMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A concrete HTTP response to write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    /// `0` means unset and is written as 200.
    #[serde(default)]
    pub status: u16,
    #[serde(
        default,
        deserialize_with = "deserialize_body",
        skip_serializing_if = "String::is_empty"
    )]
    pub body: String,
    #[serde(
        default,
        deserialize_with = "deserialize_headers",
        skip_serializing_if = "MultiMap::is_empty"
    )]
    pub headers: MultiMap,
    #[serde(default, skip_serializing_if = "Delay::is_zero")]
    pub delay: Delay,
}

impl MockResponse {
    pub fn effective_status(&self) -> u16 {
        if self.status == 0 {
            200
        } else {
            self.status
        }
    }
}

/// Body text; structured bodies are stored as compact JSON.
pub(crate) fn deserialize_body<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Header values may be a single scalar or a list of scalars.
pub(crate) fn deserialize_headers<'de, D: Deserializer<'de>>(d: D) -> Result<MultiMap, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Values {
        Many(Vec<Value>),
        One(Value),
    }

    fn text(value: Value) -> String {
        match value {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    let raw = Option::<std::collections::BTreeMap<String, Values>>::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let values = match v {
                Values::Many(vs) => vs.into_iter().map(text).collect(),
                Values::One(v) => vec![text(v)],
            };
            (k, values)
        })
        .collect())
}

/// Dynamic response engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Handlebars output decoded as YAML.
    #[serde(rename = "template", alias = "template_yaml")]
    TemplateYaml,
    /// Handlebars output decoded as JSON.
    TemplateJson,
    Lua,
    Rhai,
}

impl Engine {
    pub const ALL: [Engine; 4] = [
        Engine::TemplateYaml,
        Engine::TemplateJson,
        Engine::Lua,
        Engine::Rhai,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Engine::TemplateYaml => "template",
            Engine::TemplateJson => "template_json",
            Engine::Lua => "lua",
            Engine::Rhai => "rhai",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template" | "template_yaml" => Ok(Engine::TemplateYaml),
            "template_json" => Ok(Engine::TemplateJson),
            "lua" => Ok(Engine::Lua),
            "rhai" => Ok(Engine::Rhai),
            other => Err(other.to_string()),
        }
    }
}

/// Script-backed response, as declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicResponseDefinition {
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub script: String,
}

/// Script-backed response with a resolved engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicResponse {
    pub engine: Engine,
    pub script: String,
}

/// Upstream forwarding settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockProxy {
    pub host: String,
    #[serde(default, skip_serializing_if = "Delay::is_zero")]
    pub delay: Delay,
    #[serde(default)]
    pub follow_redirect: bool,
    #[serde(default)]
    pub skip_verify_tls: bool,
    #[serde(default)]
    pub keep_host: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_headers",
        skip_serializing_if = "MultiMap::is_empty"
    )]
    pub headers: MultiMap,
}

/// Exactly one way of producing a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResponseKind {
    #[serde(rename = "response")]
    Static(MockResponse),
    #[serde(rename = "dynamic_response")]
    Dynamic(DynamicResponse),
    #[serde(rename = "proxy")]
    Proxy(MockProxy),
}

impl ResponseKind {
    pub fn mock_type(&self) -> MockType {
        match self {
            ResponseKind::Static(_) => MockType::Static,
            ResponseKind::Dynamic(_) => MockType::Dynamic,
            ResponseKind::Proxy(_) => MockType::Proxy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_response_from_yaml() {
        let yaml = r#"
status: 201
body: {"id": 1}
headers:
  Content-Type: application/json
  X-Multi: [a, b]
delay: 5ms
"#;
        let r: MockResponse = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(r.status, 201);
        assert_eq!(r.body, r#"{"id":1}"#);
        assert_eq!(r.headers["Content-Type"], vec!["application/json"]);
        assert_eq!(r.headers["X-Multi"], vec!["a", "b"]);
        assert_eq!(r.delay, Delay::fixed(Duration::from_millis(5)));
    }

    #[test]
    fn test_status_defaults_to_200() {
        let r: MockResponse = serde_yaml::from_str("body: ok").unwrap();
        assert_eq!(r.status, 0);
        assert_eq!(r.effective_status(), 200);
    }

    #[test]
    fn test_engine_names() {
        assert_eq!("template".parse::<Engine>(), Ok(Engine::TemplateYaml));
        assert_eq!("template_yaml".parse::<Engine>(), Ok(Engine::TemplateYaml));
        assert_eq!("rhai".parse::<Engine>(), Ok(Engine::Rhai));
        assert_eq!("python".parse::<Engine>(), Err("python".to_string()));
        for engine in Engine::ALL {
            assert_eq!(engine.as_str().parse::<Engine>(), Ok(engine));
        }
    }

    #[test]
    fn test_response_kind_serializes_under_its_key() {
        let kind = ResponseKind::Proxy(MockProxy {
            host: "http://upstream".into(),
            ..MockProxy::default()
        });
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["proxy"]["host"], "http://upstream");
    }
}
