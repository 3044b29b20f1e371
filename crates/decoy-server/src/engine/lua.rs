use super::{response_from_value, EngineError, ResponseEngine};
use crate::history::Request;
use crate::mock::MockResponse;
use mlua::prelude::*;
use mlua::{HookTriggers, LuaOptions, StdLib};
use serde_json::Value;
use std::cell::Cell;

/// Globals removed from the interpreter before user code runs.
const BLOCKED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "collectgarbage"];

/// Instructions between two checks of the budget.
const BUDGET_CHECK_INTERVAL: u32 = 1_000;

/// Lua script engine for dynamic responses
///
/// # Script Interface
///
/// The request is exposed as the global `request` table (`request.path`,
/// `request.method`, `request.headers["Content-Type"][1]`,
/// `request.query_params.name[1]`, `request.body`). The script returns a table
/// shaped like a response:
///
/// ```lua
/// local name = request.query_params.name[1]
/// return {
///   status = 200,
///   headers = { ["Content-Type"] = "application/json" },
///   body = { message = "Hello " .. name },
/// }
/// ```
///
/// A table `body` is sent as JSON. Only the `string`, `table` and `math`
/// libraries are loaded, and the interpreter runs under a memory cap and an
/// instruction budget.
#[derive(Debug, Clone)]
pub struct LuaEngine {
    memory_limit: usize,
    max_instructions: u64,
}

impl LuaEngine {
    /// A zero `memory_limit` or `max_instructions` leaves that limit off.
    pub fn new(memory_limit: usize, max_instructions: u64) -> Self {
        Self {
            memory_limit,
            max_instructions,
        }
    }

    fn sandbox(&self) -> LuaResult<Lua> {
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::TABLE | StdLib::MATH,
            LuaOptions::default(),
        )?;
        if self.memory_limit > 0 {
            lua.set_memory_limit(self.memory_limit)?;
        }
        if self.max_instructions > 0 {
            // Counted in whole intervals, so the budget is rounded up to one.
            let checks_left =
                Cell::new(self.max_instructions.div_ceil(u64::from(BUDGET_CHECK_INTERVAL)));
            let budget = self.max_instructions;
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(BUDGET_CHECK_INTERVAL),
                move |_, _| {
                    let left = checks_left.get().saturating_sub(1);
                    checks_left.set(left);
                    if left == 0 {
                        return Err(LuaError::runtime(format!(
                            "instruction budget of {budget} exceeded"
                        )));
                    }
                    Ok(LuaVmState::Continue)
                },
            );
        }
        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals.set(*name, LuaNil)?;
        }
        Ok(lua)
    }

    fn run(&self, request: &Request, script: &str) -> LuaResult<Option<Value>> {
        let lua = self.sandbox()?;
        let options = LuaSerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false);
        let request_value = lua.to_value_with(request, options)?;
        lua.globals().set("request", request_value)?;

        let result: LuaValue = lua.load(script).set_name("response").eval()?;
        match result {
            LuaValue::Table(_) => Ok(Some(lua.from_value(result)?)),
            _ => Ok(None),
        }
    }
}

impl ResponseEngine for LuaEngine {
    fn execute(&self, request: &Request, script: &str) -> Result<MockResponse, EngineError> {
        match self.run(request, script) {
            Ok(Some(value)) => response_from_value(value),
            Ok(None) => Err(EngineError::Decode(
                "Lua script must return a table".to_string(),
            )),
            Err(e) => Err(EngineError::Script(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> LuaEngine {
        LuaEngine::new(8 * 1024 * 1024, 1_000_000)
    }

    fn request() -> Request {
        let mut request = Request {
            path: "/hello".into(),
            method: "GET".into(),
            body: json!({"count": 3}),
            ..Request::default()
        };
        request
            .query_params
            .insert("name".into(), vec!["Bob".into()]);
        request
    }

    #[test]
    fn test_table_response() {
        let script = r#"
local name = request.query_params.name[1]
return {
  status = 200,
  headers = { ["Content-Type"] = "application/json", ["X-Path"] = request.path },
  body = { message = "Hello " .. name, count = request.body.count * 2 },
}
"#;
        let response = engine().execute(&request(), script).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.headers["X-Path"], vec!["/hello"]);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body, json!({"message": "Hello Bob", "count": 6}));
    }

    #[test]
    fn test_string_body_and_delay() {
        let script = r#"return { body = "plain", delay = "5ms" }"#;
        let response = engine().execute(&request(), script).unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(response.body, "plain");
        assert_eq!(response.delay.min.as_millis(), 5);
    }

    #[test]
    fn test_sandbox() {
        for script in [
            r#"return dofile("/etc/passwd")"#,
            r#"return load("return 1")()"#,
            r#"return require("os")"#,
            r#"return os.execute("true")"#,
            r#"return io.open("/etc/passwd")"#,
        ] {
            assert!(
                matches!(engine().execute(&request(), script), Err(EngineError::Script(_))),
                "script should fail: {script}"
            );
        }
    }

    #[test]
    fn test_memory_limit() {
        let script = r#"
local t = {}
for i = 1, 10000000 do t[i] = string.rep("x", 64) .. i end
return { body = "unreachable" }
"#;
        let err = LuaEngine::new(1024 * 1024, 0)
            .execute(&request(), script)
            .unwrap_err();
        assert!(matches!(err, EngineError::Script(_)));
    }

    #[test]
    fn test_instruction_budget() {
        let err = engine()
            .execute(&request(), "while true do end")
            .unwrap_err();
        match err {
            EngineError::Script(message) => assert!(message.contains("instruction budget")),
            other => panic!("unexpected error: {other:?}"),
        }

        // Bounded work under the budget still runs.
        let script = r#"
local n = 0
for i = 1, 1000 do n = n + i end
return { body = tostring(n) }
"#;
        let response = engine().execute(&request(), script).unwrap();
        assert_eq!(response.body, "500500");
    }

    #[test]
    fn test_non_table_result() {
        assert!(matches!(
            engine().execute(&request(), "return 42"),
            Err(EngineError::Decode(_))
        ));
        assert!(matches!(
            engine().execute(&request(), "this is not lua"),
            Err(EngineError::Script(_))
        ));
    }
}
