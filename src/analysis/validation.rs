//! The dependency validator: proves the analyzed graph is realizable before
//! execution starts. Never fail-fast; every discoverable error for one query
//! comes back in a single batch.

use std::collections::HashSet;

use super::QueryAnalysis;
use crate::configuration::Configuration;
use crate::error::DependencyChain;
use crate::error::ValidationError;
use crate::expression::ExpressionEvaluator;
use crate::query::Directive;
use crate::query::FieldPath;
use crate::query::arguments;
use crate::query::directives;

/// Validate every dependency edge, directive shape and declared source.
pub fn validate(
    analysis: &QueryAnalysis,
    configuration: &Configuration,
    evaluator: &dyn ExpressionEvaluator,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut used: HashSet<&str> = HashSet::new();

    for edge in &analysis.edges {
        let before = errors.len();
        let free_variables = edge
            .expression
            .as_deref()
            .and_then(|expression| evaluator.free_variables(expression).ok());
        for name in &edge.sources {
            if !analysis.sources.contains_key(name) {
                errors.push(ValidationError::UnknownSource {
                    consumer: edge.consumer.clone(),
                    name: name.clone(),
                });
                continue;
            }
            if let Some(free) = &free_variables
                && !free.contains(name)
            {
                errors.push(ValidationError::UnreadDependency {
                    consumer: edge.consumer.clone(),
                    name: name.clone(),
                    directive: edge.directive.clone(),
                });
            }
            if let Some(summary) = analysis.fields.get(&edge.consumer)
                && summary.arguments.get(name.as_str()).is_some()
            {
                errors.push(ValidationError::ArgumentCollision {
                    consumer: edge.consumer.clone(),
                    name: name.clone(),
                });
            }
        }

        let mut chain = vec![edge.consumer.clone()];
        walk_chain(
            analysis,
            configuration,
            &edge.directive,
            &edge.sources,
            &mut chain,
            &mut errors,
        );
        // only edges that validated count as reads
        if errors.len() == before {
            used.extend(edge.sources.iter().map(String::as_str));
        }
    }

    for summary in analysis.fields.values() {
        for directive in &summary.directives {
            check_shape(summary, directive, evaluator, &mut errors);
        }
    }

    for (name, declaration) in &analysis.sources {
        if !used.contains(name.as_str()) {
            errors.push(ValidationError::UnusedSource {
                name: name.clone(),
                path: declaration.path.clone(),
            });
        }
    }

    errors
}

/// Depth-first expansion of the dependency chain rooted at one edge. Every
/// new element is checked pairwise against everything already on the chain;
/// a rejected branch is reported and not expanded further.
fn walk_chain(
    analysis: &QueryAnalysis,
    configuration: &Configuration,
    directive: &str,
    sources: &[String],
    chain: &mut Vec<FieldPath>,
    errors: &mut Vec<ValidationError>,
) {
    for name in sources {
        let Some(declaration) = analysis.sources.get(name) else {
            // reported as UnknownSource on the edge itself
            continue;
        };
        let next = declaration.path.clone();
        if let Some(error) = check_link(analysis, chain, &next, name, directive) {
            tracing::debug!(%error, "dependency chain rejected");
            errors.push(error);
            continue;
        }
        if chain.len() >= configuration.max_dependency_depth {
            errors.push(ValidationError::DepthExceeded {
                consumer: chain[0].clone(),
                limit: configuration.max_dependency_depth,
            });
            continue;
        }
        chain.push(next.clone());
        let transitive = analysis.dependencies_of(&next);
        walk_chain(
            analysis,
            configuration,
            directive,
            &transitive,
            chain,
            errors,
        );
        chain.pop();
    }
}

fn check_link(
    analysis: &QueryAnalysis,
    chain: &[FieldPath],
    next: &FieldPath,
    name: &str,
    directive: &str,
) -> Option<ValidationError> {
    for earlier in chain {
        if earlier == next {
            if chain.len() == 1 {
                return Some(ValidationError::SelfDependency {
                    path: next.clone(),
                    name: name.to_owned(),
                    directive: directive.to_owned(),
                });
            }
            return Some(ValidationError::CircularDependency {
                chain: full_chain(chain, next),
            });
        }
        if earlier.is_related_to(next) {
            return Some(ValidationError::AncestorDependency {
                chain: full_chain(chain, next),
            });
        }
        let earlier_top = analysis.top_task(earlier);
        if !earlier_top.is_root() && earlier_top == analysis.top_task(next) {
            return Some(ValidationError::SharedListScope {
                chain: full_chain(chain, next),
            });
        }
    }
    None
}

fn full_chain(chain: &[FieldPath], next: &FieldPath) -> DependencyChain {
    let mut full = chain.to_vec();
    full.push(next.clone());
    DependencyChain(full)
}

/// Directive shape checks: list-only decorators, list-only argument
/// operations, and compile checks for every expression literal.
fn check_shape(
    summary: &super::FieldSummary,
    directive: &Directive,
    evaluator: &dyn ExpressionEvaluator,
    errors: &mut Vec<ValidationError>,
) {
    match directive.name.as_str() {
        directives::FILTER | directives::SORT_BY | directives::DISTINCT if !summary.is_list => {
            errors.push(ValidationError::NotAListField {
                directive: directive.name.clone(),
                path: summary.path.clone(),
            });
        }
        directives::TRANSFORM => {
            let requires_list = matches!(
                directive.string_argument(arguments::OPERATION),
                Some("LIST_MAP") | Some("FILTER")
            );
            if requires_list {
                check_list_argument(summary, directive, errors);
            }
        }
        directives::PARTITION => check_list_argument(summary, directive, errors),
        _ => {}
    }

    for argument in [
        arguments::EXPRESSION,
        arguments::PREDICATE,
        arguments::BY,
    ] {
        if let Some(expression) = directive.string_argument(argument)
            && !expression.trim().is_empty()
            && !evaluator.is_valid_script(expression)
        {
            errors.push(ValidationError::InvalidExpression {
                directive: directive.name.clone(),
                path: summary.path.clone(),
                message: format!("'{expression}' does not compile"),
            });
        }
    }
}

/// When the targeted argument has a literal value in the query text it must
/// be a list. Arguments fed from variables can only be checked at runtime.
fn check_list_argument(
    summary: &super::FieldSummary,
    directive: &Directive,
    errors: &mut Vec<ValidationError>,
) {
    let Some(argument) = directive.string_argument(arguments::ARGUMENT) else {
        return;
    };
    if let Some(value) = summary.arguments.get(argument)
        && !value.is_array()
    {
        errors.push(ValidationError::NotAListArgument {
            directive: directive.name.clone(),
            path: summary.path.clone(),
            argument: argument.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::analysis::analyze_query;
    use crate::expression::RhaiEvaluator;
    use crate::query::FieldNode;

    fn directive(name: &str, arguments: serde_json_bytes::Value) -> Directive {
        Directive::builder()
            .name(name)
            .arguments(arguments.as_object().cloned().unwrap_or_default())
            .build()
    }

    fn validate_selection(selection: &[FieldNode]) -> Vec<ValidationError> {
        let analysis = analyze_query(selection);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        validate(&analysis, &Configuration::default(), &RhaiEvaluator::new())
    }

    #[test]
    fn it_rejects_circular_dependencies() {
        // a depends on y (declared by b), b depends on x (declared by a)
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![
                    directive("source", json!({ "name": "x" })),
                    directive("map", json!({ "expression": "y", "deps": ["y"] })),
                ])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![
                    directive("source", json!({ "name": "y" })),
                    directive("map", json!({ "expression": "x", "deps": ["x"] })),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::CircularDependency { .. })),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_dependencies_on_ancestors() {
        let selection = vec![
            FieldNode::builder()
                .name("parent")
                .directives(vec![directive("source", json!({ "name": "p" }))])
                .children(vec![
                    FieldNode::builder()
                        .name("child")
                        .directives(vec![directive(
                            "map",
                            json!({ "expression": "p", "deps": ["p"] }),
                        )])
                        .build(),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::AncestorDependency { .. })),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_dependencies_between_same_list_siblings() {
        let selection = vec![
            FieldNode::builder()
                .name("items")
                .is_list(true)
                .children(vec![
                    FieldNode::builder()
                        .name("a")
                        .directives(vec![directive("source", json!({ "name": "x" }))])
                        .build(),
                    FieldNode::builder()
                        .name("b")
                        .directives(vec![directive(
                            "map",
                            json!({ "expression": "x", "deps": ["x"] }),
                        )])
                        .build(),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::SharedListScope { .. })),
            "{errors:?}"
        );
    }

    #[test]
    fn it_allows_dependencies_between_root_level_fields() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![directive(
                    "map",
                    json!({ "expression": "x", "deps": ["x"] }),
                )])
                .build(),
        ];
        assert!(validate_selection(&selection).is_empty());
    }

    #[test]
    fn it_reports_each_unused_source_exactly_once() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert_eq!(
            errors,
            vec![ValidationError::UnusedSource {
                name: "x".to_string(),
                path: FieldPath::from("a"),
            }]
        );
    }

    #[test]
    fn it_reports_sources_read_only_by_rejected_edges_as_unused() {
        // the only consumer of "x" is its own declaring field, so the edge is
        // rejected and the source counts as never read
        let selection = vec![
            FieldNode::builder()
                .name("items")
                .is_list(true)
                .directives(vec![
                    directive("source", json!({ "name": "x" })),
                    directive("filter", json!({ "predicate": "x", "deps": ["x"] })),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::UnusedSource { name, .. } if name == "x")),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_source_and_consumer_on_the_same_field() {
        let selection = vec![
            FieldNode::builder()
                .name("items")
                .is_list(true)
                .directives(vec![
                    directive("source", json!({ "name": "x" })),
                    directive("filter", json!({ "predicate": "x", "deps": ["x"] })),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors.iter().any(|e| matches!(
                e,
                ValidationError::SelfDependency { name, directive, .. }
                    if name == "x" && directive == "filter"
            )),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_unknown_and_unread_dependencies() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![directive(
                    "map",
                    json!({ "expression": "1 + 1", "deps": ["x", "ghost"] }),
                )])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(errors.iter().any(
            |e| matches!(e, ValidationError::UnknownSource { name, .. } if name == "ghost")
        ));
        // "x" is declared as a dependency but the expression never reads it
        assert!(errors.iter().any(
            |e| matches!(e, ValidationError::UnreadDependency { name, .. } if name == "x")
        ));
    }

    #[test]
    fn it_rejects_dependency_names_colliding_with_arguments() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .arguments(json!({ "x": 1 }).as_object().cloned().unwrap())
                .directives(vec![directive(
                    "map",
                    json!({ "expression": "x", "deps": ["x"] }),
                )])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::ArgumentCollision { name, .. } if name == "x")),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_list_decorators_on_non_list_fields() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("sortBy", json!({ "key": "id" }))])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::NotAListField { directive, .. } if directive == "sortBy")),
            "{errors:?}"
        );
    }

    #[test]
    fn it_rejects_list_operations_on_literal_non_list_arguments() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .arguments(json!({ "ids": 4 }).as_object().cloned().unwrap())
                .directives(vec![
                    directive(
                        "transform",
                        json!({ "argument": "ids", "operation": "LIST_MAP", "expression": "it" }),
                    ),
                    directive("partition", json!({ "argument": "ids", "size": 2 })),
                ])
                .build(),
        ];
        let errors = validate_selection(&selection);
        let list_argument_errors = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::NotAListArgument { .. }))
            .count();
        assert_eq!(list_argument_errors, 2, "{errors:?}");
    }

    #[test]
    fn it_reports_invalid_expressions() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .is_list(true)
                .directives(vec![directive("filter", json!({ "predicate": "id >=" }))])
                .build(),
        ];
        let errors = validate_selection(&selection);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidExpression { .. })),
            "{errors:?}"
        );
    }

    #[test]
    fn it_bounds_the_chain_walk_depth() {
        // c depends on b's source, b depends on a's source
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "sa" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![
                    directive("source", json!({ "name": "sb" })),
                    directive("map", json!({ "expression": "sa", "deps": ["sa"] })),
                ])
                .build(),
            FieldNode::builder()
                .name("c")
                .directives(vec![directive(
                    "map",
                    json!({ "expression": "sb", "deps": ["sb"] }),
                )])
                .build(),
        ];
        let analysis = analyze_query(&selection);
        let tight = Configuration {
            max_dependency_depth: 2,
        };
        let errors = validate(&analysis, &tight, &RhaiEvaluator::new());
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::DepthExceeded { limit: 2, .. })),
            "{errors:?}"
        );
    }
}
