//! Per-execution wiring: one [`Execution`] bundles the completion
//! coordinator and the decorator pipeline for one validated query.

use std::sync::Arc;

use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use tower::BoxError;

use crate::analysis::QueryAnalysis;
use crate::decorators::DecoratorPipeline;
use crate::error::TaskFailure;
use crate::expression::Environment;
use crate::expression::ExpressionEvaluator;
use crate::query::FieldPath;
use crate::resolver::BoxResolver;
use crate::task::CompletionCoordinator;

/// What a decorator does when one of its dependency sources failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Bind the source as `null` and keep going.
    TreatAsAbsent,
    /// Surface the failure as the decorated field's own error.
    Propagate,
}

/// Shared state every decorator closes over: the analysis, the coordinator
/// and the expression evaluator. Scoped to one execution and discarded with
/// it.
pub struct ExecutionContext {
    pub analysis: Arc<QueryAnalysis>,
    pub coordinator: Arc<CompletionCoordinator>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
}

impl ExecutionContext {
    /// Await every named source and bind it into `env`. Failed sources bind
    /// as `null` under [`FailurePolicy::TreatAsAbsent`] and abort the call
    /// under [`FailurePolicy::Propagate`]. Sources are awaited concurrently.
    pub async fn bind_sources(
        &self,
        env: &mut Environment,
        deps: &[String],
        policy: FailurePolicy,
    ) -> Result<(), TaskFailure> {
        let values = futures::future::join_all(
            deps.iter()
                .map(|name| self.coordinator.await_source(name)),
        )
        .await;
        for (name, outcome) in deps.iter().zip(values) {
            match outcome {
                Ok(value) => {
                    env.insert(ByteString::from(name.as_str()), value);
                }
                Err(failure) => match policy {
                    FailurePolicy::TreatAsAbsent => {
                        tracing::debug!(source = name.as_str(), %failure, "failed source bound as absent");
                        env.insert(ByteString::from(name.as_str()), Value::Null);
                    }
                    FailurePolicy::Propagate => return Err(failure),
                },
            }
        }
        Ok(())
    }
}

/// One query execution. Created after validation passes; exposes the
/// host-engine capability surface: resolver substitution before execution and
/// the per-field completion event sink during it.
pub struct Execution {
    context: Arc<ExecutionContext>,
    pipeline: DecoratorPipeline,
}

impl Execution {
    pub fn new(analysis: Arc<QueryAnalysis>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let coordinator = Arc::new(CompletionCoordinator::new(
            Arc::clone(&analysis),
            Arc::clone(&evaluator),
        ));
        Self {
            context: Arc::new(ExecutionContext {
                analysis,
                coordinator,
                evaluator,
            }),
            pipeline: DecoratorPipeline::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<CompletionCoordinator> {
        &self.context.coordinator
    }

    /// Host-engine hook, invoked once per field occurrence before execution.
    /// Fields without markers keep their base resolver.
    pub fn wrap_resolver(
        &self,
        path: &FieldPath,
        base: BoxResolver,
    ) -> Result<BoxResolver, BoxError> {
        match self.context.analysis.fields.get(path) {
            Some(summary) => self.pipeline.wrap(summary, base, &self.context),
            None => Ok(base),
        }
    }

    /// Host-engine completion event, fired exactly once per runtime field
    /// occurrence.
    pub fn field_completed(&self, path: &FieldPath, outcome: Result<Option<Value>, BoxError>) {
        self.context.coordinator.field_completed(path, outcome);
    }
}
