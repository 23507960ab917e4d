//! The decorator pipeline: a strategy list with memoized dispatch.
//!
//! Each decorator wraps a field's base resolver service; the pipeline applies
//! them outermost-to-innermost in directive declaration order, except that
//! skip/include is always hoisted outermost so nothing runs on suppression.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use tower::BoxError;

use crate::analysis::FieldSummary;
use crate::error::DecoratorError;
use crate::execution::ExecutionContext;
use crate::expression::Environment;
use crate::query::Directive;
use crate::query::directives;
use crate::resolver::BoxResolver;

mod distinct;
mod filter;
mod map;
mod mock;
mod partition;
mod skip_include;
mod sort;
mod transform;

pub(crate) trait Decorator: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, directive: &str) -> bool {
        directive == self.name()
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError>;
}

/// Ordered decorator registry with a per-execution name-to-decorator cache.
pub struct DecoratorPipeline {
    registry: Vec<Arc<dyn Decorator>>,
    dispatch: Mutex<HashMap<String, Option<usize>>>,
}

impl Default for DecoratorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoratorPipeline {
    pub fn new() -> Self {
        Self {
            registry: vec![
                Arc::new(skip_include::SkipIncludeDecorator::skip()),
                Arc::new(skip_include::SkipIncludeDecorator::include()),
                Arc::new(mock::MockDecorator),
                Arc::new(map::MapDecorator),
                Arc::new(filter::FilterDecorator),
                Arc::new(sort::SortByDecorator),
                Arc::new(distinct::DistinctDecorator),
                Arc::new(transform::TransformDecorator),
                Arc::new(partition::PartitionDecorator),
            ],
            dispatch: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn Decorator>> {
        let mut dispatch = self.dispatch.lock();
        let index = *dispatch
            .entry(name.to_owned())
            .or_insert_with(|| self.registry.iter().position(|d| d.supports(name)));
        index.map(|index| Arc::clone(&self.registry[index]))
    }

    /// Wrap one field's base resolver with every decorator its directives
    /// name. Unknown directives and the source marker pass through.
    pub(crate) fn wrap(
        &self,
        field: &FieldSummary,
        base: BoxResolver,
        context: &Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let (gates, rest): (Vec<&Directive>, Vec<&Directive>) =
            field.directives.iter().partition(|d| {
                d.name == directives::SKIP_BY || d.name == directives::INCLUDE_BY
            });
        let mut service = base;
        // innermost first
        for directive in gates.iter().chain(rest.iter()).rev() {
            if let Some(decorator) = self.lookup(&directive.name) {
                tracing::trace!(field = %field.path, directive = directive.name.as_str(), "decorating resolver");
                service = decorator.decorate(service, directive, field, Arc::clone(context))?;
            }
        }
        Ok(service)
    }
}

/// The consume-source marker on a directive; validated before execution.
fn deps(directive: &Directive) -> Vec<String> {
    directive
        .string_list_argument(directives::DEPS)
        .unwrap_or_default()
}

fn required_string(
    directive: &Directive,
    argument: &str,
    field: &FieldSummary,
) -> Result<String, BoxError> {
    directive
        .string_argument(argument)
        .map(str::to_owned)
        .ok_or_else(|| {
            DecoratorError::MissingArgument {
                directive: directive.name.clone(),
                path: field.path.clone(),
                argument: argument.to_owned(),
            }
            .into()
        })
}

/// Environment for a per-element expression: the shared environment plus the
/// element's own fields, with the element itself bound as `it`.
fn element_env(shared: &Environment, element: &Value) -> Environment {
    let mut env = shared.clone();
    if let Value::Object(fields) = element {
        for (key, value) in fields {
            env.insert(key.clone(), value.clone());
        }
    }
    env.insert(ByteString::from("it"), element.clone());
    env
}

fn expect_list(
    value: Value,
    directive: &str,
    path: &crate::query::FieldPath,
) -> Result<Vec<Value>, BoxError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(DecoratorError::ExpectedList {
            directive: directive.to_owned(),
            path: path.clone(),
        }
        .into()),
    }
}
