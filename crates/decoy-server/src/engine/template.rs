//! Handlebars-rendered responses.
//!
//! The template sees the request under `Request` (`{{Request.path}}`,
//! `{{Request.query_params.name.[0]}}`, `{{Request.body.user.id}}`) and must
//! render to a response document in YAML or JSON.

use super::{response_from_value, EngineError, ResponseEngine};
use crate::history::Request;
use crate::mock::MockResponse;
use handlebars::{handlebars_helper, Handlebars};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

// `{{json Request.body}}`: compact JSON of any value.
handlebars_helper!(json: |value: Json| serde_json::to_string(value).unwrap_or_default());

// `{{first Request.headers.[X-Id]}}`: first value of a multi-valued field.
handlebars_helper!(first: |value: Json| match value {
    Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
    other => other.clone(),
});

// `{{random 1 6}}`: integer in the inclusive range.
handlebars_helper!(random: |min: i64, max: i64| if min < max {
    rand::thread_rng().gen_range(min..=max)
} else {
    min
});

/// Document format a template renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    format: TemplateFormat,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    #[serde(rename = "Request")]
    request: &'a Request,
}

impl TemplateEngine {
    pub fn new(format: TemplateFormat) -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json));
        handlebars.register_helper("first", Box::new(first));
        handlebars.register_helper("random", Box::new(random));

        // Output is YAML/JSON, never HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars, format }
    }

    /// Render the template against a request, without decoding.
    pub fn render(&self, request: &Request, template: &str) -> Result<String, EngineError> {
        self.handlebars
            .render_template(template, &TemplateContext { request })
            .map_err(|e| EngineError::Template(e.to_string()))
    }
}

impl ResponseEngine for TemplateEngine {
    fn execute(&self, request: &Request, script: &str) -> Result<MockResponse, EngineError> {
        let rendered = self.render(request, script)?;
        let document: Value = match self.format {
            TemplateFormat::Yaml => serde_yaml::from_str(&rendered)
                .map_err(|e| EngineError::Decode(e.to_string()))?,
            TemplateFormat::Json => serde_json::from_str(&rendered)
                .map_err(|e| EngineError::Decode(e.to_string()))?,
        };
        response_from_value(document)
    }
}
