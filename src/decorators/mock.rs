//! Mock: replaces resolution with a constant from the directive's literal
//! argument. The underlying resolver is never called.

use std::sync::Arc;

use tower::BoxError;

use super::Decorator;
use crate::analysis::FieldSummary;
use crate::error::DecoratorError;
use crate::execution::ExecutionContext;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

pub(crate) struct MockDecorator;

impl Decorator for MockDecorator {
    fn name(&self) -> &'static str {
        directives::MOCK
    }

    fn decorate(
        &self,
        _inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        _context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let value = directive
            .argument(arguments::VALUE)
            .cloned()
            .ok_or_else(|| DecoratorError::MissingArgument {
                directive: directive.name.clone(),
                path: field.path.clone(),
                argument: arguments::VALUE.to_owned(),
            })?;
        Ok(resolver_fn(move |_req| {
            let value = value.clone();
            async move { Ok(Some(value)) }
        }))
    }
}
