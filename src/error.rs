//! Error taxonomy.
//!
//! Static trouble is split the way it is discovered: [`AnalysisError`]s are
//! collected during the analyzer pass (malformed markers), while
//! [`ValidationError`]s come out of the dependency validator as one batch.
//! Any non-empty batch means execution must not start. [`TaskFailure`] is the
//! runtime side: a tracked field that failed or resolved to nothing, confined
//! to its own task subtree.

use displaydoc::Display;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::query::FieldPath;

/// Malformed markers discovered during the analyzer pass.
#[derive(Error, Display, Debug, Clone, PartialEq, Serialize)]
pub enum AnalysisError {
    /// @{directive} on field '{path}': missing required argument '{argument}'
    MissingArgument {
        directive: String,
        path: FieldPath,
        argument: String,
    },

    /// @{directive} on field '{path}': argument '{argument}' is malformed
    MalformedArgument {
        directive: String,
        path: FieldPath,
        argument: String,
    },

    /// @{directive} on field '{path}': expression must not be empty
    EmptyExpression { directive: String, path: FieldPath },

    /// duplicate source name '{name}': declared at '{path}' and '{previous}'
    DuplicateSource {
        name: String,
        path: FieldPath,
        previous: FieldPath,
    },

    /// @partition on field '{path}': chunk size must be a positive integer
    InvalidPartitionSize { path: FieldPath },

    /// @transform on field '{path}': unknown operation '{operation}'
    UnknownTransformOperation { path: FieldPath, operation: String },
}

/// A dependency chain of field paths, worst offender last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyChain(pub Vec<FieldPath>);

impl std::fmt::Display for DependencyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(" -> "))
    }
}

/// Rejections reported by the dependency validator, batched per query.
#[derive(Error, Display, Debug, Clone, PartialEq, Serialize)]
pub enum ValidationError {
    /// field '{consumer}' depends on unknown source '{name}'
    UnknownSource { consumer: FieldPath, name: String },

    /// field '{consumer}' declares dependency '{name}' but its @{directive} expression never reads it
    UnreadDependency {
        consumer: FieldPath,
        name: String,
        directive: String,
    },

    /// dependency '{name}' on field '{consumer}' collides with an argument of the same name
    ArgumentCollision { consumer: FieldPath, name: String },

    /// field '{path}': source '{name}' and @{directive} cannot be used on the same field
    SelfDependency {
        path: FieldPath,
        name: String,
        directive: String,
    },

    /// circular dependency: {chain}
    CircularDependency { chain: DependencyChain },

    /// dependency chain {chain} links a field to its own ancestor
    AncestorDependency { chain: DependencyChain },

    /// dependency chain {chain} links two fields under the same list iteration
    SharedListScope { chain: DependencyChain },

    /// dependency chain starting at '{consumer}' exceeds the depth limit of {limit}
    DepthExceeded { consumer: FieldPath, limit: usize },

    /// source '{name}' declared at '{path}' is never used
    UnusedSource { name: String, path: FieldPath },

    /// @{directive} on field '{path}': invalid expression: {message}
    InvalidExpression {
        directive: String,
        path: FieldPath,
        message: String,
    },

    /// @{directive} is only valid on list fields: '{path}' is not list-typed
    NotAListField { directive: String, path: FieldPath },

    /// @{directive} on field '{path}': argument '{argument}' must be a list
    NotAListArgument {
        directive: String,
        path: FieldPath,
        argument: String,
    },

    /// {0}
    Analysis(#[from] AnalysisError),
}

/// Failure of one tracked field at runtime, confined to its task subtree.
#[derive(Error, Display, Debug, Clone, Serialize)]
pub enum TaskFailure {
    /// field '{path}' failed to resolve: {reason}
    Resolution { path: FieldPath, reason: String },

    /// field '{path}' resolved to no value
    Absent { path: FieldPath },

    /// field '{path}' depends on failed ancestor '{ancestor}'
    Upstream {
        path: FieldPath,
        ancestor: FieldPath,
    },

    /// unknown source '{name}'
    UnknownSource { name: String },

    /// conversion expression of source '{name}' failed: {message}
    Conversion { name: String, message: String },
}

/// Runtime decorator trouble, surfaced as the owning field's own error.
#[derive(Error, Display, Debug, Clone, Serialize)]
pub enum DecoratorError {
    /// @{directive} on field '{path}': expected a list value
    ExpectedList { directive: String, path: FieldPath },

    /// @{directive} on field '{path}': argument '{argument}' must be a list
    ExpectedListArgument {
        directive: String,
        path: FieldPath,
        argument: String,
    },

    /// @{directive} on field '{path}': missing required argument '{argument}'
    MissingArgument {
        directive: String,
        path: FieldPath,
        argument: String,
    },

    /// @partition on field '{path}': a partitioned call returned no value
    PartitionedCallAbsent { path: FieldPath },
}

/// Expression evaluator trouble, surfaced as the owning field's own error.
#[derive(Error, Display, Debug, Clone, Serialize)]
pub enum ExpressionError {
    /// expression failed to compile: {message}
    Compile { message: String },

    /// expression failed to evaluate: {message}
    Evaluation { message: String },

    /// expression '{expression}' did not evaluate to a boolean
    NotABoolean { expression: String },
}
