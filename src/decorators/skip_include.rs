//! Skip / include gates. Always outermost: suppression happens before any
//! other decorator or the base resolver can run a side effect.

use std::sync::Arc;

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

#[derive(Clone, Copy)]
enum Mode {
    Skip,
    Include,
}

pub(crate) struct SkipIncludeDecorator {
    mode: Mode,
}

impl SkipIncludeDecorator {
    pub(crate) fn skip() -> Self {
        Self { mode: Mode::Skip }
    }

    pub(crate) fn include() -> Self {
        Self { mode: Mode::Include }
    }
}

impl Decorator for SkipIncludeDecorator {
    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Skip => directives::SKIP_BY,
            Mode::Include => directives::INCLUDE_BY,
        }
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
        let skip = matches!(self.mode, Mode::Skip);
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let predicate = predicate.clone();
            let sources = sources.clone();
            async move {
                let mut env = req.arguments.clone();
                context
                    .bind_sources(&mut env, &sources, FailurePolicy::Propagate)
                    .await?;
                let condition = context.evaluator.evaluate_bool(&predicate, &env)?;
                let suppress = if skip { condition } else { !condition };
                if suppress {
                    tracing::debug!(path = %req.path, "field suppressed");
                    Ok(None)
                } else {
                    inner.oneshot(req).await
                }
            }
        }))
    }
}
