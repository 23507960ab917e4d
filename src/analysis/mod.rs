//! Static analysis: one pass over the parsed query ([`analyze_query`]) and
//! the dependency validator gate ([`validate_query`]).

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;

use crate::configuration::Configuration;
use crate::error::AnalysisError;
use crate::error::ValidationError;
use crate::expression::ExpressionEvaluator;
use crate::query::Directive;
use crate::query::FieldNode;
use crate::query::FieldPath;
use crate::task::TaskArena;

mod analyzer;
mod validation;

pub use analyzer::analyze_query;
pub use validation::validate;

/// A named, query-scoped handle exposing a field's resolved value to other
/// fields' expressions.
#[derive(Debug, Clone)]
pub struct SourceDeclaration {
    pub name: String,
    pub path: FieldPath,
    /// The declaring field sits under a list-typed ancestor: the source value
    /// is the ordered accumulation across all iterations.
    pub aggregated: bool,
    /// Optional conversion applied to the raw value on read, with the raw
    /// value bound as `value`.
    pub expression: Option<String>,
}

/// A directed reference from one consuming directive to declared sources.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub consumer: FieldPath,
    pub directive: String,
    pub expression: Option<String>,
    pub sources: Vec<String>,
}

/// Per-field record kept for every field carrying a directive this crate
/// reacts to; input to the validator's shape checks and to the pipeline.
#[derive(Debug, Clone)]
pub struct FieldSummary {
    pub path: FieldPath,
    pub is_list: bool,
    pub arguments: Map<ByteString, Value>,
    pub directives: Vec<Directive>,
    /// Nearest list-typed strict ancestor, or the root: the aggregation
    /// boundary this field completes under.
    pub top_task: FieldPath,
}

/// Output of the analyzer pass. Immutable once built; both the validator and
/// the per-execution coordinator consume it.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalysis {
    pub sources: IndexMap<String, SourceDeclaration>,
    pub fields: IndexMap<FieldPath, FieldSummary>,
    pub edges: Vec<DependencyEdge>,
    pub tasks: TaskArena,
    pub top_tasks: HashMap<FieldPath, FieldPath>,
    pub errors: Vec<AnalysisError>,
}

impl QueryAnalysis {
    /// Union of source names the field at `path` depends on, across all of
    /// its consuming directives.
    pub(crate) fn dependencies_of(&self, path: &FieldPath) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for edge in self.edges.iter().filter(|edge| &edge.consumer == path) {
            for name in &edge.sources {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub(crate) fn top_task(&self, path: &FieldPath) -> FieldPath {
        self.top_tasks.get(path).cloned().unwrap_or_default()
    }
}

/// The static gate: analyze, then validate. An empty result authorizes
/// execution; any error means the query must not run.
pub fn validate_query(
    selection: &[FieldNode],
    configuration: &Configuration,
    evaluator: &dyn ExpressionEvaluator,
) -> Vec<ValidationError> {
    let analysis = analyze_query(selection);
    let mut errors: Vec<ValidationError> = analysis
        .errors
        .iter()
        .cloned()
        .map(ValidationError::from)
        .collect();
    errors.extend(validate(&analysis, configuration, evaluator));
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "query rejected by validation");
    }
    errors
}
