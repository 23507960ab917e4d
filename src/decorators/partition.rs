//! Partition: when a list-valued argument exceeds the configured chunk size,
//! the underlying call is split into sequential chunk-sized calls whose list
//! results are concatenated in order. An empty or absent list argument makes
//! exactly one unmodified call.

use std::sync::Arc;

use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::required_string;
use crate::analysis::FieldSummary;
use crate::error::DecoratorError;
use crate::execution::ExecutionContext;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

pub(crate) struct PartitionDecorator;

impl Decorator for PartitionDecorator {
    fn name(&self) -> &'static str {
        directives::PARTITION
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        _context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let argument = required_string(directive, arguments::ARGUMENT, field)?;
        let size = directive
            .u64_argument(arguments::SIZE)
            .filter(|size| *size > 0)
            .ok_or_else(|| DecoratorError::MissingArgument {
                directive: directive.name.clone(),
                path: field.path.clone(),
                argument: arguments::SIZE.to_owned(),
            })? as usize;
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let argument = argument.clone();
            async move {
                let items = req
                    .arguments
                    .get(argument.as_str())
                    .and_then(Value::as_array)
                    .cloned();
                let items = match items {
                    Some(items) if items.len() > size => items,
                    _ => return inner.oneshot(req).await,
                };
                let mut combined = Vec::with_capacity(items.len());
                for chunk in items.chunks(size) {
                    let mut chunk_req = req.clone();
                    chunk_req
                        .arguments
                        .insert(ByteString::from(argument.as_str()), Value::Array(chunk.to_vec()));
                    match inner.clone().oneshot(chunk_req).await? {
                        Some(Value::Array(part)) => combined.extend(part),
                        Some(_) => {
                            return Err(DecoratorError::ExpectedList {
                                directive: directives::PARTITION.to_owned(),
                                path: req.path.clone(),
                            }
                            .into());
                        }
                        None => {
                            return Err(DecoratorError::PartitionedCallAbsent {
                                path: req.path.clone(),
                            }
                            .into());
                        }
                    }
                }
                Ok(Some(Value::Array(combined)))
            }
        }))
    }
}
