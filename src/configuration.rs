//! Crate configuration, deserialized from the host's configuration file.

use schemars::JsonSchema;
use serde::Deserialize;

/// Cross-field dependency configuration.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Upper bound on the length of a transitive dependency chain considered
    /// by the validator before it gives up with an error.
    pub max_dependency_depth: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_dependency_depth: 32,
        }
    }
}
