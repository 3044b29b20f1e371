//! Loading mock definitions from YAML or JSON files.

use crate::matcher::AssertionRegistry;
use crate::mock::{Mock, MockDefinition};
use crate::store::MockStore;
use anyhow::Context;
use std::path::Path;
use tracing::info;

/// Parse a file holding one mock definition or a list of them.
///
/// JSON files are read by the YAML parser as well.
pub fn load_mocks<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<MockDefinition>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mocks file {}", path.display()))?;
    parse_mocks(&contents).with_context(|| format!("Failed to parse mocks file {}", path.display()))
}

pub fn parse_mocks(contents: &str) -> anyhow::Result<Vec<MockDefinition>> {
    let document: serde_yaml::Value = serde_yaml::from_str(contents)?;
    match document {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_yaml::from_value(item).with_context(|| format!("Invalid mock #{}", i + 1))
            })
            .collect(),
        single => Ok(vec![serde_yaml::from_value(single).context("Invalid mock")?]),
    }
}

/// Validate every definition, then register them in order into a session.
///
/// Nothing is registered when any definition is invalid.
pub fn register_mocks(
    store: &dyn MockStore,
    session_id: &str,
    definitions: Vec<MockDefinition>,
    registry: &AssertionRegistry,
) -> anyhow::Result<Vec<Mock>> {
    let mocks = definitions
        .into_iter()
        .enumerate()
        .map(|(i, definition)| {
            definition
                .validate(registry)
                .with_context(|| format!("Invalid mock #{}", i + 1))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let registered = mocks
        .into_iter()
        .map(|mock| store.add_mock(session_id, mock))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Registered {} mocks", registered.len());
    Ok(registered)
}
