use super::{response_from_value, EngineError, ResponseEngine};
use crate::history::Request;
use crate::mock::MockResponse;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

/// Rhai script engine for dynamic responses
///
/// The request is in scope as `request`; the script evaluates to a map shaped
/// like a response:
///
/// ```rhai
/// #{
///     status: 200,
///     headers: #{ "Content-Type": "application/json" },
///     body: #{ path: request.path, name: request.query_params.name[0] }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RhaiEngine {
    max_operations: u64,
}

impl RhaiEngine {
    pub fn new(max_operations: u64) -> Self {
        Self { max_operations }
    }

    pub fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.set_max_expr_depths(64, 32);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine
    }
}

impl ResponseEngine for RhaiEngine {
    fn execute(&self, request: &Request, script: &str) -> Result<MockResponse, EngineError> {
        let engine = self.create_engine();
        let mut scope = Scope::new();

        let request = rhai::serde::to_dynamic(request)
            .map_err(|e| EngineError::Script(format!("unable to expose request: {e}")))?;
        scope.push("request", request);

        let result: Dynamic = engine
            .eval_with_scope(&mut scope, script)
            .map_err(|e| EngineError::Script(e.to_string()))?;

        if !result.is_map() {
            return Err(EngineError::Decode(format!(
                "Rhai script must return a map, got {}",
                result.type_name()
            )));
        }
        let document: Value = rhai::serde::from_dynamic(&result)
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        response_from_value(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Request {
        let mut request = Request {
            path: "/orders".into(),
            method: "POST".into(),
            body: json!({"items": [1, 2, 3]}),
            ..Request::default()
        };
        request
            .query_params
            .insert("name".into(), vec!["Bob".into()]);
        request
    }

    #[test]
    fn test_map_response() {
        let script = r#"
let total = 0;
for item in request.body.items { total += item; }
#{
    status: 201,
    headers: #{ "Content-Type": "application/json", "X-Many": ["a", "b"] },
    body: #{ path: request.path, name: request.query_params.name[0], total: total }
}
"#;
        let response = RhaiEngine::new(100_000).execute(&request(), script).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.headers["X-Many"], vec!["a", "b"]);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body, json!({"path": "/orders", "name": "Bob", "total": 6}));
    }

    #[test]
    fn test_floats_and_unit_values() {
        let script = r#"#{ status: 202.0, body: #{ ratio: 0.5, tags: ["a", "b"], missing: () } }"#;
        let response = RhaiEngine::new(100_000).execute(&request(), script).unwrap();
        assert_eq!(response.status, 202);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body, json!({"ratio": 0.5, "tags": ["a", "b"], "missing": null}));
    }

    #[test]
    fn test_operation_budget() {
        let err = RhaiEngine::new(1_000)
            .execute(&request(), "let x = 0; loop { x += 1; }")
            .unwrap_err();
        assert!(matches!(err, EngineError::Script(_)));
    }

    #[test]
    fn test_imports_are_disabled() {
        let err = RhaiEngine::new(100_000)
            .execute(&request(), r#"import "fs" as fs; #{}"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::Script(_)));
    }

    #[test]
    fn test_non_map_result() {
        assert!(matches!(
            RhaiEngine::new(100_000).execute(&request(), "42"),
            Err(EngineError::Decode(_))
        ));
    }
}
