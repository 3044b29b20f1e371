//! Decoy: a programmable HTTP mock server.
//!
//! Clients register declarative mocks (a request matcher plus a response policy) into
//! a session. The HTTP listener answers every inbound request with the newest mock
//! that matches and still has calls left. A mock can answer with a static response,
//! a response computed by a template or sandboxed script, or a proxied upstream call.
//!
//! The crate is organised leaves first:
//! - [`matcher`]: named assertions, string/JSON/multi-map/body matchers
//! - [`mock`]: mock definitions and registration-time validation
//! - [`history`]: normalized inbound requests and recorded history entries
//! - [`store`]: the session/mock/history repository and session verification
//! - [`engine`]: dynamic response engines (Handlebars, Lua, Rhai)
//! - [`redirect`]: the proxy redirector
//! - [`server`]: the dispatch pipeline and HTTP listener

pub mod config;
pub mod engine;
pub mod history;
pub mod loader;
pub mod matcher;
pub mod mock;
pub mod redirect;
pub mod server;
pub mod store;

pub use config::Config;
pub use mock::{Mock, MockDefinition, MockResponse};
pub use server::{MockServer, ServerHandle};
pub use store::{InMemoryStore, MockStore};
