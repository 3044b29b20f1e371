//! Dynamic response engines.
//!
//! Each engine turns `(request, script)` into a [`MockResponse`]. Engines keep no
//! per-request state: scripting engines build a fresh interpreter for every call,
//! and calls run on the blocking pool so a slow script never stalls the reactor.

mod convert;
#[cfg(feature = "lua")]
pub mod lua;
pub mod rhai;
pub mod template;

pub use convert::response_from_value;
#[cfg(feature = "lua")]
pub use lua::LuaEngine;
pub use rhai::RhaiEngine;
pub use template::{TemplateEngine, TemplateFormat};

use crate::config::ScriptingConfig;
use crate::history::Request;
use crate::mock::{Engine, MockResponse};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("unable to decode response: {0}")]
    Decode(String),

    #[error("engine {0} is not available in this build")]
    Unavailable(Engine),

    #[error("engine task aborted: {0}")]
    Aborted(String),
}

/// A strategy producing a response from a request and a user script.
pub trait ResponseEngine: Send + Sync {
    fn execute(&self, request: &Request, script: &str) -> Result<MockResponse, EngineError>;
}

/// Engine id to implementation table.
#[derive(Clone)]
pub struct Engines {
    engines: HashMap<Engine, Arc<dyn ResponseEngine>>,
}

impl Engines {
    /// Every engine compiled into this build.
    pub fn new(config: &ScriptingConfig) -> Self {
        let mut engines: HashMap<Engine, Arc<dyn ResponseEngine>> = HashMap::new();
        engines.insert(
            Engine::TemplateYaml,
            Arc::new(TemplateEngine::new(TemplateFormat::Yaml)),
        );
        engines.insert(
            Engine::TemplateJson,
            Arc::new(TemplateEngine::new(TemplateFormat::Json)),
        );
        engines.insert(
            Engine::Rhai,
            Arc::new(RhaiEngine::new(config.rhai_max_operations)),
        );
        #[cfg(feature = "lua")]
        engines.insert(
            Engine::Lua,
            Arc::new(LuaEngine::new(
                config.lua_memory_limit,
                config.lua_max_instructions,
            )),
        );
        Self { engines }
    }

    /// An empty table, for callers registering their own engines.
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    pub fn register(&mut self, engine: Engine, implementation: Arc<dyn ResponseEngine>) {
        self.engines.insert(engine, implementation);
    }

    pub fn get(&self, engine: Engine) -> Result<Arc<dyn ResponseEngine>, EngineError> {
        self.engines
            .get(&engine)
            .cloned()
            .ok_or(EngineError::Unavailable(engine))
    }

    /// Run an engine on the blocking pool.
    pub async fn execute(
        &self,
        engine: Engine,
        request: Arc<Request>,
        script: String,
    ) -> Result<MockResponse, EngineError> {
        let implementation = self.get(engine)?;
        debug!(%engine, "Executing dynamic response");
        tokio::task::spawn_blocking(move || implementation.execute(&request, &script))
            .await
            .map_err(|e| EngineError::Aborted(e.to_string()))?
    }
}

impl Default for Engines {
    fn default() -> Self {
        Self::new(&ScriptingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ResponseEngine for Fixed {
        fn execute(&self, request: &Request, _script: &str) -> Result<MockResponse, EngineError> {
            Ok(MockResponse {
                status: 202,
                body: request.path.clone(),
                ..MockResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn test_execute_runs_registered_engine() {
        let mut engines = Engines::empty();
        engines.register(Engine::Rhai, Arc::new(Fixed));
        let request = Arc::new(Request {
            path: "/ping".into(),
            ..Request::default()
        });

        let response = engines
            .execute(Engine::Rhai, request.clone(), String::new())
            .await
            .unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.body, "/ping");

        let err = engines
            .execute(Engine::Lua, request, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(Engine::Lua)));
    }

    #[test]
    fn test_default_table_has_builtin_engines() {
        let engines = Engines::default();
        assert!(engines.get(Engine::TemplateYaml).is_ok());
        assert!(engines.get(Engine::TemplateJson).is_ok());
        assert!(engines.get(Engine::Rhai).is_ok());
        #[cfg(feature = "lua")]
        assert!(engines.get(Engine::Lua).is_ok());
    }
}
