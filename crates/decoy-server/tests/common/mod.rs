//! Shared helpers for the integration tests.

#![allow(dead_code)]

use decoy_server::config::ListenConfig;
use decoy_server::matcher::AssertionRegistry;
use decoy_server::{Config, Mock, MockDefinition, MockServer, ServerHandle};

/// Config listening on an ephemeral loopback port.
pub fn test_config() -> Config {
    Config {
        listen: ListenConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        ..Config::default()
    }
}

/// Start a mock server on an ephemeral port.
pub async fn start_server() -> ServerHandle {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> ServerHandle {
    MockServer::bind(&config)
        .await
        .expect("Failed to bind mock server")
        .spawn()
}

/// Register a YAML mock definition into the server's current session.
pub fn add_mock(server: &ServerHandle, yaml: &str) -> Mock {
    let definition: MockDefinition = serde_yaml::from_str(yaml).expect("Invalid mock YAML");
    let mock = definition
        .validate(&AssertionRegistry::standard())
        .expect("Mock failed validation");
    let store = server.store();
    let session = store.last_session_id();
    store.add_mock(&session, mock).expect("Failed to add mock")
}
