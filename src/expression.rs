//! Expression evaluation boundary.
//!
//! The crate never interprets expressions itself; it goes through
//! [`ExpressionEvaluator`]. The default implementation is Rhai, matching the
//! host's scripting surface, but anything that can evaluate an expression
//! against a flat environment and enumerate its free variables will do.

use rhai::ASTNode;
use rhai::Dynamic;
use rhai::Engine;
use rhai::Expr;
use rhai::Scope;
use rhai::serde::from_dynamic;
use rhai::serde::to_dynamic;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;

use crate::error::ExpressionError;

/// Flat variable environment an expression is evaluated against.
pub type Environment = Map<ByteString, Value>;

pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` with every environment entry in scope.
    fn evaluate(&self, expression: &str, env: &Environment) -> Result<Value, ExpressionError>;

    /// Compile-only check.
    fn is_valid_script(&self, expression: &str) -> bool;

    /// Names of the variables `expression` reads, in first-use order.
    fn free_variables(&self, expression: &str) -> Result<Vec<String>, ExpressionError>;

    /// Evaluate a predicate that must produce a boolean.
    fn evaluate_bool(&self, expression: &str, env: &Environment) -> Result<bool, ExpressionError> {
        match self.evaluate(expression, env)? {
            Value::Bool(value) => Ok(value),
            _ => Err(ExpressionError::NotABoolean {
                expression: expression.to_owned(),
            }),
        }
    }
}

/// Rhai-backed evaluator.
pub struct RhaiEvaluator {
    engine: Engine,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        // Directive expressions are small; anything hitting these limits is
        // hostile or broken.
        engine.set_max_expr_depths(64, 64);
        engine.set_max_operations(100_000);
        Self { engine }
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expression: &str, env: &Environment) -> Result<Value, ExpressionError> {
        let ast = self
            .engine
            .compile(expression)
            .map_err(|err| ExpressionError::Compile {
                message: err.to_string(),
            })?;
        let mut scope = Scope::new();
        for (name, value) in env {
            let dynamic = to_dynamic(value).map_err(|err| ExpressionError::Evaluation {
                message: err.to_string(),
            })?;
            scope.push_dynamic(name.as_str(), dynamic);
        }
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| ExpressionError::Evaluation {
                message: err.to_string(),
            })?;
        from_dynamic(&result).map_err(|err| ExpressionError::Evaluation {
            message: err.to_string(),
        })
    }

    fn is_valid_script(&self, expression: &str) -> bool {
        self.engine.compile(expression).is_ok()
    }

    fn free_variables(&self, expression: &str) -> Result<Vec<String>, ExpressionError> {
        let ast = self
            .engine
            .compile(expression)
            .map_err(|err| ExpressionError::Compile {
                message: err.to_string(),
            })?;
        let mut names: Vec<String> = Vec::new();
        ast.walk(&mut |nodes| {
            if let Some(ASTNode::Expr(Expr::Variable(data, ..))) = nodes.last() {
                let name = data.1.to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            true
        });
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn env(value: Value) -> Environment {
        value
            .as_object()
            .cloned()
            .expect("environment literal must be an object")
    }

    #[test]
    fn it_evaluates_against_the_environment() {
        let evaluator = RhaiEvaluator::new();
        let result = evaluator
            .evaluate("price * quantity", &env(json!({ "price": 3, "quantity": 4 })))
            .unwrap();
        assert_eq!(result, json!(12));
    }

    #[test]
    fn it_evaluates_predicates_to_booleans() {
        let evaluator = RhaiEvaluator::new();
        let environment = env(json!({ "id": 3 }));
        assert!(evaluator.evaluate_bool("id >= 2", &environment).unwrap());
        assert!(matches!(
            evaluator.evaluate_bool("id + 1", &environment),
            Err(ExpressionError::NotABoolean { .. })
        ));
    }

    #[test]
    fn it_extracts_free_variables() {
        let evaluator = RhaiEvaluator::new();
        let names = evaluator.free_variables("a + b * a").unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn it_rejects_broken_scripts() {
        let evaluator = RhaiEvaluator::new();
        assert!(!evaluator.is_valid_script("1 +"));
        assert!(evaluator.is_valid_script("1 + 2"));
    }
}
