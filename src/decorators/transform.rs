//! Argument transform: rewrites one declared argument before delegating to
//! the base resolver. MAP replaces the value with the expression result,
//! LIST_MAP applies the expression per element (bound as `it`), FILTER keeps
//! elements satisfying the predicate.

use std::sync::Arc;

use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::deps;
use super::required_string;
use crate::analysis::FieldSummary;
use crate::error::DecoratorError;
use crate::execution::ExecutionContext;
use crate::execution::FailurePolicy;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

#[derive(Clone, Copy)]
enum Operation {
    Map,
    ListMap,
    Filter,
}

pub(crate) struct TransformDecorator;

impl Decorator for TransformDecorator {
    fn name(&self) -> &'static str {
        directives::TRANSFORM
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let argument = required_string(directive, arguments::ARGUMENT, field)?;
        let expression = required_string(directive, arguments::EXPRESSION, field)?;
        let operation = match directive.string_argument(arguments::OPERATION) {
            Some("MAP") => Operation::Map,
            Some("LIST_MAP") => Operation::ListMap,
            Some("FILTER") => Operation::Filter,
            _ => {
                return Err(DecoratorError::MissingArgument {
                    directive: directive.name.clone(),
                    path: field.path.clone(),
                    argument: arguments::OPERATION.to_owned(),
                }
                .into());
            }
        };
        let sources = deps(directive);
        let name = directive.name.clone();
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let argument = argument.clone();
            let expression = expression.clone();
            let sources = sources.clone();
            let name = name.clone();
            async move {
                let mut env = req.arguments.clone();
                context
                    .bind_sources(&mut env, &sources, FailurePolicy::Propagate)
                    .await?;
                let current = req
                    .arguments
                    .get(argument.as_str())
                    .cloned()
                    .unwrap_or(Value::Null);
                let rewritten = match operation {
                    Operation::Map => context.evaluator.evaluate(&expression, &env)?,
                    Operation::ListMap => {
                        let items = as_list(current, &name, &req.path, &argument)?;
                        let mut mapped = Vec::with_capacity(items.len());
                        for element in items {
                            let mut env = env.clone();
                            env.insert(ByteString::from("it"), element);
                            mapped.push(context.evaluator.evaluate(&expression, &env)?);
                        }
                        Value::Array(mapped)
                    }
                    Operation::Filter => {
                        let items = as_list(current, &name, &req.path, &argument)?;
                        let mut retained = Vec::with_capacity(items.len());
                        for element in items {
                            let mut env = env.clone();
                            env.insert(ByteString::from("it"), element.clone());
                            if context.evaluator.evaluate_bool(&expression, &env)? {
                                retained.push(element);
                            }
                        }
                        Value::Array(retained)
                    }
                };
                let mut rewritten_req = req;
                rewritten_req
                    .arguments
                    .insert(ByteString::from(argument.as_str()), rewritten);
                inner.oneshot(rewritten_req).await
            }
        }))
    }
}

fn as_list(
    value: Value,
    directive: &str,
    path: &crate::query::FieldPath,
    argument: &str,
) -> Result<Vec<Value>, BoxError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(DecoratorError::ExpectedListArgument {
            directive: directive.to_owned(),
            path: path.clone(),
            argument: argument.to_owned(),
        }
        .into()),
    }
}
