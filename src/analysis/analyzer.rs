//! Single depth-first pass over the parsed query, entering phase only.
//!
//! Per field occurrence it derives the [`FieldPath`] and the top task, and
//! for marker-bearing fields it registers source declarations, dependency
//! edges and field summaries. Task-tree materialization reuses the arena's
//! idempotent get-or-create, so declarations sharing a subtree extend one
//! chain.

use super::DependencyEdge;
use super::FieldSummary;
use super::QueryAnalysis;
use super::SourceDeclaration;
use crate::error::AnalysisError;
use crate::query::Directive;
use crate::query::FieldNode;
use crate::query::FieldPath;
use crate::query::arguments;
use crate::query::directives;

struct AncestorFrame {
    path: FieldPath,
    is_list: bool,
}

#[derive(Default)]
struct Analyzer {
    analysis: QueryAnalysis,
}

/// Build the static picture of one parsed query: sources, top tasks,
/// dependency edges, decorated-field summaries, the task arena, and any
/// malformed-marker errors.
pub fn analyze_query(selection: &[FieldNode]) -> QueryAnalysis {
    let mut analyzer = Analyzer::default();
    let mut stack: Vec<AncestorFrame> = Vec::new();
    for field in selection {
        analyzer.enter(field, &mut stack);
    }
    tracing::debug!(
        sources = analyzer.analysis.sources.len(),
        edges = analyzer.analysis.edges.len(),
        tasks = analyzer.analysis.tasks.len(),
        "query analysis complete"
    );
    analyzer.analysis
}

impl Analyzer {
    fn enter(&mut self, field: &FieldNode, stack: &mut Vec<AncestorFrame>) {
        let parent_path = stack
            .last()
            .map(|frame| frame.path.clone())
            .unwrap_or_default();
        let path = parent_path.child(field.response_key());
        let top_task = stack
            .iter()
            .rev()
            .find(|frame| frame.is_list)
            .map(|frame| frame.path.clone())
            .unwrap_or_default();
        self.analysis
            .top_tasks
            .insert(path.clone(), top_task.clone());

        for directive in &field.directives {
            self.inspect(field, directive, &path, &top_task, stack);
        }
        if field
            .directives
            .iter()
            .any(|d| directives::ALL.contains(&d.name.as_str()))
        {
            self.analysis.fields.insert(
                path.clone(),
                FieldSummary {
                    path: path.clone(),
                    is_list: field.is_list,
                    arguments: field.arguments.clone(),
                    directives: field.directives.clone(),
                    top_task,
                },
            );
        }

        stack.push(AncestorFrame {
            path,
            is_list: field.is_list,
        });
        for child in &field.children {
            self.enter(child, stack);
        }
        stack.pop();
    }

    fn inspect(
        &mut self,
        field: &FieldNode,
        directive: &Directive,
        path: &FieldPath,
        top_task: &FieldPath,
        stack: &[AncestorFrame],
    ) {
        match directive.name.as_str() {
            directives::SOURCE => self.declare_source(field, directive, path, top_task, stack),
            directives::SKIP_BY | directives::INCLUDE_BY | directives::FILTER => {
                let predicate = self.required_expression(directive, arguments::PREDICATE, path);
                self.record_edge(directive, path, predicate);
            }
            directives::MAP => {
                let expression = self.required_expression(directive, arguments::EXPRESSION, path);
                self.record_edge(directive, path, expression);
            }
            directives::TRANSFORM => {
                let _ = self.require_string(directive, arguments::ARGUMENT, path);
                match directive.string_argument(arguments::OPERATION) {
                    Some("MAP") | Some("LIST_MAP") | Some("FILTER") => {}
                    Some(operation) => self.error(AnalysisError::UnknownTransformOperation {
                        path: path.clone(),
                        operation: operation.to_owned(),
                    }),
                    None => self.missing(directive, arguments::OPERATION, path),
                }
                let expression = self.required_expression(directive, arguments::EXPRESSION, path);
                self.record_edge(directive, path, expression);
            }
            directives::MOCK => {
                if directive.argument(arguments::VALUE).is_none() {
                    self.missing(directive, arguments::VALUE, path);
                }
            }
            directives::SORT_BY => {
                let has_key = directive.argument(arguments::KEY).is_some();
                let has_expression = directive.argument(arguments::EXPRESSION).is_some();
                if !has_key && !has_expression {
                    self.missing(directive, arguments::KEY, path);
                }
                if has_key {
                    let _ = self.require_string(directive, arguments::KEY, path);
                }
                if has_expression {
                    let _ = self.required_expression(directive, arguments::EXPRESSION, path);
                }
                if let Some(value) = directive.argument(arguments::REVERSED)
                    && value.as_bool().is_none()
                {
                    self.malformed(directive, arguments::REVERSED, path);
                }
            }
            directives::DISTINCT => {
                if directive.argument(arguments::BY).is_some() {
                    let _ = self.required_expression(directive, arguments::BY, path);
                }
            }
            directives::PARTITION => {
                let _ = self.require_string(directive, arguments::ARGUMENT, path);
                match directive.argument(arguments::SIZE) {
                    None => self.missing(directive, arguments::SIZE, path),
                    Some(value) => {
                        if !value.as_u64().is_some_and(|size| size > 0) {
                            self.error(AnalysisError::InvalidPartitionSize { path: path.clone() });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn declare_source(
        &mut self,
        field: &FieldNode,
        directive: &Directive,
        path: &FieldPath,
        top_task: &FieldPath,
        stack: &[AncestorFrame],
    ) {
        let Some(name) = self.require_string(directive, arguments::NAME, path) else {
            return;
        };
        let expression = match directive.argument(arguments::EXPRESSION) {
            None => None,
            Some(_) => self.required_expression(directive, arguments::EXPRESSION, path),
        };
        if let Some(previous) = self.analysis.sources.get(&name) {
            let previous = previous.path.clone();
            self.error(AnalysisError::DuplicateSource {
                name,
                path: path.clone(),
                previous,
            });
            return;
        }
        self.analysis.sources.insert(
            name.clone(),
            SourceDeclaration {
                name,
                path: path.clone(),
                aggregated: !top_task.is_root(),
                expression,
            },
        );
        self.materialize(field, path, stack);
    }

    /// Ensure a task node exists for every ancestor and for the declaring
    /// field itself, root-down, linking parent to child.
    fn materialize(&mut self, field: &FieldNode, path: &FieldPath, stack: &[AncestorFrame]) {
        let mut parent: Option<FieldPath> = None;
        let mut under_list = false;
        for frame in stack {
            self.analysis
                .tasks
                .get_or_create(&frame.path, parent.as_ref(), frame.is_list, under_list);
            under_list |= frame.is_list;
            parent = Some(frame.path.clone());
        }
        self.analysis
            .tasks
            .get_or_create(path, parent.as_ref(), field.is_list, under_list);
    }

    fn record_edge(&mut self, directive: &Directive, path: &FieldPath, expression: Option<String>) {
        let sources = match directive.argument(directives::DEPS) {
            None => return,
            Some(_) => match directive.string_list_argument(directives::DEPS) {
                Some(names) => names,
                None => {
                    self.malformed(directive, directives::DEPS, path);
                    return;
                }
            },
        };
        if sources.is_empty() {
            return;
        }
        self.analysis.edges.push(DependencyEdge {
            consumer: path.clone(),
            directive: directive.name.clone(),
            expression,
            sources,
        });
    }

    fn required_expression(
        &mut self,
        directive: &Directive,
        argument: &str,
        path: &FieldPath,
    ) -> Option<String> {
        match directive.string_argument(argument) {
            Some(expression) if expression.trim().is_empty() => {
                self.error(AnalysisError::EmptyExpression {
                    directive: directive.name.clone(),
                    path: path.clone(),
                });
                None
            }
            Some(expression) => Some(expression.to_owned()),
            None => {
                self.missing(directive, argument, path);
                None
            }
        }
    }

    fn require_string(
        &mut self,
        directive: &Directive,
        argument: &str,
        path: &FieldPath,
    ) -> Option<String> {
        match directive.argument(argument) {
            Some(value) => match value.as_str() {
                Some(text) if !text.is_empty() => Some(text.to_owned()),
                _ => {
                    self.malformed(directive, argument, path);
                    None
                }
            },
            None => {
                self.missing(directive, argument, path);
                None
            }
        }
    }

    fn missing(&mut self, directive: &Directive, argument: &str, path: &FieldPath) {
        self.error(AnalysisError::MissingArgument {
            directive: directive.name.clone(),
            path: path.clone(),
            argument: argument.to_owned(),
        });
    }

    fn malformed(&mut self, directive: &Directive, argument: &str, path: &FieldPath) {
        self.error(AnalysisError::MalformedArgument {
            directive: directive.name.clone(),
            path: path.clone(),
            argument: argument.to_owned(),
        });
    }

    fn error(&mut self, error: AnalysisError) {
        self.analysis.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn directive(name: &str, arguments: serde_json_bytes::Value) -> Directive {
        Directive::builder()
            .name(name)
            .arguments(arguments.as_object().cloned().unwrap_or_default())
            .build()
    }

    /// `parent { a @source(name:"x") b @source(name:"y") }` with a list-typed
    /// parent.
    fn two_sources_under_a_list() -> Vec<FieldNode> {
        vec![
            FieldNode::builder()
                .name("parent")
                .is_list(true)
                .children(vec![
                    FieldNode::builder()
                        .name("a")
                        .directives(vec![directive("source", json!({ "name": "x" }))])
                        .build(),
                    FieldNode::builder()
                        .name("b")
                        .directives(vec![directive("source", json!({ "name": "y" }))])
                        .build(),
                ])
                .build(),
        ]
    }

    #[test]
    fn it_shares_one_task_chain_between_sibling_sources() {
        let analysis = analyze_query(&two_sources_under_a_list());
        assert!(analysis.errors.is_empty());
        assert_eq!(analysis.tasks.len(), 3);
        let parent = analysis.tasks.get(&FieldPath::from("parent")).unwrap();
        assert_eq!(
            parent.children,
            vec![FieldPath::from("parent/a"), FieldPath::from("parent/b")]
        );
        assert!(parent.field_is_list);
        assert!(!parent.list_nested);
        assert!(analysis.tasks.get(&FieldPath::from("parent/a")).unwrap().list_nested);
    }

    #[test]
    fn it_registers_sources_with_aggregation_flags() {
        let analysis = analyze_query(&two_sources_under_a_list());
        let x = &analysis.sources["x"];
        assert_eq!(x.path, FieldPath::from("parent/a"));
        assert!(x.aggregated);
        assert_eq!(analysis.top_task(&x.path), FieldPath::from("parent"));
    }

    #[test]
    fn it_records_dependency_edges_from_deps_arguments() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![directive(
                    "map",
                    json!({ "expression": "x + 1", "deps": ["x"] }),
                )])
                .build(),
        ];
        let analysis = analyze_query(&selection);
        assert!(analysis.errors.is_empty());
        assert_eq!(analysis.edges.len(), 1);
        let edge = &analysis.edges[0];
        assert_eq!(edge.consumer, FieldPath::from("b"));
        assert_eq!(edge.directive, "map");
        assert_eq!(edge.sources, vec!["x".to_string()]);
        assert_eq!(analysis.dependencies_of(&FieldPath::from("b")), vec!["x"]);
    }

    #[test]
    fn it_reports_duplicate_source_names() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
            FieldNode::builder()
                .name("b")
                .directives(vec![directive("source", json!({ "name": "x" }))])
                .build(),
        ];
        let analysis = analyze_query(&selection);
        assert!(matches!(
            analysis.errors.as_slice(),
            [AnalysisError::DuplicateSource { name, .. }] if name == "x"
        ));
    }

    #[test]
    fn it_rejects_malformed_markers() {
        let selection = vec![
            FieldNode::builder()
                .name("a")
                .is_list(true)
                .directives(vec![
                    directive("partition", json!({ "argument": "ids", "size": 0 })),
                    directive("transform", json!({ "argument": "ids", "operation": "FOLD", "expression": "it" })),
                    directive("map", json!({ "expression": "" })),
                ])
                .build(),
        ];
        let analysis = analyze_query(&selection);
        assert!(analysis.errors.iter().any(|e| matches!(e, AnalysisError::InvalidPartitionSize { .. })));
        assert!(analysis.errors.iter().any(
            |e| matches!(e, AnalysisError::UnknownTransformOperation { operation, .. } if operation == "FOLD")
        ));
        assert!(analysis.errors.iter().any(|e| matches!(e, AnalysisError::EmptyExpression { .. })));
    }
}
