//! Distinct: de-duplicates a list result by identity or by a projection
//! expression, keeping first-seen order.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::element_env;
use super::expect_list;
use crate::analysis::FieldSummary;
use crate::execution::ExecutionContext;
use crate::expression::Environment;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

pub(crate) struct DistinctDecorator;

impl Decorator for DistinctDecorator {
    fn name(&self) -> &'static str {
        directives::DISTINCT
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        _field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let projection = directive
            .string_argument(arguments::BY)
            .map(str::to_owned);
        let name = directive.name.clone();
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let projection = projection.clone();
            let name = name.clone();
            async move {
                let Some(base) = inner.oneshot(req.clone()).await? else {
                    return Ok(None);
                };
                let items = expect_list(base, &name, &req.path)?;
                let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
                let mut unique = Vec::with_capacity(items.len());
                for element in items {
                    let identity = match &projection {
                        None => element.clone(),
                        Some(expression) => {
                            let env = element_env(&Environment::new(), &element);
                            context.evaluator.evaluate(expression, &env)?
                        }
                    };
                    if seen.insert(serde_json::to_string(&identity).unwrap_or_default()) {
                        unique.push(element);
                    }
                }
                Ok(Some(Value::Array(unique)))
            }
        }))
    }
}
