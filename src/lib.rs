//! Cross-field computed values for hierarchical query execution.
//!
//! A client's query is a tree of named fields; this crate lets one field's
//! behavior or value depend on the resolved value of another field declared
//! anywhere else in the same query, including under different list ancestors.
//! It supplies three things to a host execution engine:
//!
//! * a static pass ([`analyze_query`]) discovering source declarations and
//!   dependency edges and building the task tree,
//! * a validator gate ([`validate_query`]) proving the dependency graph is
//!   realizable (acyclic, no dependence on an ancestor, no dependence
//!   between fields under the same list iteration) before execution starts,
//! * a per-execution [`Execution`] wiring the host's field-completion events
//!   into the task tree (so dependents read source values exactly once they
//!   are fully known, with list-aware aggregation) and wrapping field
//!   resolvers with the directive-driven decorator pipeline.
//!
//! The host engine keeps everything else: fetching, list iteration, null
//! propagation, timeouts. State is scoped to one execution and discarded
//! with it.

pub mod analysis;
pub mod configuration;
pub mod decorators;
pub mod error;
pub mod execution;
pub mod expression;
pub mod query;
pub mod resolver;
pub mod task;

pub use crate::analysis::QueryAnalysis;
pub use crate::analysis::analyze_query;
pub use crate::analysis::validate_query;
pub use crate::configuration::Configuration;
pub use crate::error::AnalysisError;
pub use crate::error::TaskFailure;
pub use crate::error::ValidationError;
pub use crate::execution::Execution;
pub use crate::execution::FailurePolicy;
pub use crate::expression::ExpressionEvaluator;
pub use crate::expression::RhaiEvaluator;
pub use crate::query::Directive;
pub use crate::query::FieldNode;
pub use crate::query::FieldPath;
pub use crate::resolver::BoxResolver;
pub use crate::resolver::ResolveRequest;
pub use crate::resolver::resolver_fn;
pub use crate::task::CompletionCoordinator;
