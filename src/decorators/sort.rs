//! Sort-by: reorders a list result by a named key (ascending unless
//! reversed) or by a projection expression. The only place this crate ever
//! reorders anything; list aggregation elsewhere preserves completion order.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json_bytes::Value;
use tower::BoxError;
use tower::ServiceExt;

use super::Decorator;
use super::element_env;
use super::expect_list;
use crate::analysis::FieldSummary;
use crate::error::DecoratorError;
use crate::execution::ExecutionContext;
use crate::expression::Environment;
use crate::query::Directive;
use crate::query::arguments;
use crate::query::directives;
use crate::resolver::BoxResolver;
use crate::resolver::resolver_fn;

#[derive(Clone)]
enum SortKey {
    Field(String),
    Expression(String),
}

pub(crate) struct SortByDecorator;

impl Decorator for SortByDecorator {
    fn name(&self) -> &'static str {
        directives::SORT_BY
    }

    fn decorate(
        &self,
        inner: BoxResolver,
        directive: &Directive,
        field: &FieldSummary,
        context: Arc<ExecutionContext>,
    ) -> Result<BoxResolver, BoxError> {
        let key = match (
            directive.string_argument(arguments::KEY),
            directive.string_argument(arguments::EXPRESSION),
        ) {
            (Some(key), _) => SortKey::Field(key.to_owned()),
            (None, Some(expression)) => SortKey::Expression(expression.to_owned()),
            (None, None) => {
                return Err(DecoratorError::MissingArgument {
                    directive: directive.name.clone(),
                    path: field.path.clone(),
                    argument: arguments::KEY.to_owned(),
                }
                .into());
            }
        };
        let reversed = directive.bool_argument(arguments::REVERSED).unwrap_or(false);
        let name = directive.name.clone();
        Ok(resolver_fn(move |req| {
            let inner = inner.clone();
            let context = Arc::clone(&context);
            let key = key.clone();
            let name = name.clone();
            async move {
                let Some(base) = inner.oneshot(req.clone()).await? else {
                    return Ok(None);
                };
                let items = expect_list(base, &name, &req.path)?;
                let mut keyed = Vec::with_capacity(items.len());
                for element in items {
                    let sort_key = match &key {
                        SortKey::Field(field_name) => element
                            .as_object()
                            .and_then(|fields| fields.get(field_name.as_str()))
                            .cloned()
                            .unwrap_or(Value::Null),
                        SortKey::Expression(expression) => {
                            let env = element_env(&Environment::new(), &element);
                            context.evaluator.evaluate(expression, &env)?
                        }
                    };
                    keyed.push((sort_key, element));
                }
                keyed.sort_by(|left, right| compare_values(&left.0, &right.0));
                if reversed {
                    keyed.reverse();
                }
                Ok(Some(Value::Array(
                    keyed.into_iter().map(|(_, element)| element).collect(),
                )))
            }
        }))
    }
}

/// Total order over JSON values: kinds first, then natural order within a
/// kind. Composite values compare by their serialized form.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.as_str().cmp(r.as_str()),
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_))
            if rank(left) == rank(right) =>
        {
            let l = serde_json::to_string(left).unwrap_or_default();
            let r = serde_json::to_string(right).unwrap_or_default();
            l.cmp(&r)
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn it_orders_numbers_before_strings() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!("b")), Ordering::Less);
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
    }
}
