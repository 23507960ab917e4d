//! Filter: retains list elements whose per-element predicate evaluates true.

use std::sync::Arc;

use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::deps;
use super::element_env;
use super::expect_list;
use super::required_string;
use crate::analysis::FieldSummary;
use crate::execution::ExecutionContext;
use crate::execution::FailurePolicy;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

pub(crate) struct FilterDecorator;

impl Decorator for FilterDecorator {
    fn name(&self) -> &'static str {
        directives::FILTER
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let predicate = required_string(directive, arguments::PREDICATE, field)?;
        let sources = deps(directive);
        let name = directive.name.clone();
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let predicate = predicate.clone();
            let sources = sources.clone();
            let name = name.clone();
            async move {
                let Some(base) = inner.oneshot(req.clone()).await? else {
                    return Ok(None);
                };
                let items = expect_list(base, &name, &req.path)?;
                let mut shared = req.arguments.clone();
                context
                    .bind_sources(&mut shared, &sources, FailurePolicy::TreatAsAbsent)
                    .await?;
                let mut retained = Vec::with_capacity(items.len());
                for element in items {
                    let env = element_env(&shared, &element);
                    if context.evaluator.evaluate_bool(&predicate, &env)? {
                        retained.push(element);
                    }
                }
                Ok(Some(Value::Array(retained)))
            }
        }))
    }
}
