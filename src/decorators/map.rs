//! Map: produces a new value from an expression over the already-resolved
//! sibling fields of the result node and any dependency sources. The base
//! fetch still runs first (transform-after-fetch); its value is bound as
//! `value`.

use std::sync::Arc;

use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::deps;
use super::required_string;
use crate::analysis::FieldSummary;
use crate::execution::ExecutionContext;
use crate::execution::FailurePolicy;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

pub(crate) struct MapDecorator;

impl Decorator for MapDecorator {
    fn name(&self) -> &'static str {
        directives::MAP
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let expression = required_string(directive, arguments::EXPRESSION, field)?;
        let sources = deps(directive);
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let expression = expression.clone();
            let sources = sources.clone();
            async move {
                let Some(base) = inner.oneshot(req.clone()).await? else {
                    return Ok(None);
                };
                let mut env = req.arguments.clone();
                if let Value::Object(siblings) = &req.parent {
                    for (key, value) in siblings {
                        env.insert(key.clone(), value.clone());
                    }
                }
                env.insert(ByteString::from("value"), base);
                context
                    .bind_sources(&mut env, &sources, FailurePolicy::TreatAsAbsent)
                    .await?;
                let value = context.evaluator.evaluate(&expression, &env)?;
                Ok(Some(value))
            }
        }))
    }
}
