//! Parsed-query model shared by the analyzer, the validator and the
//! decorator pipeline.
//!
//! The host execution engine hands the analyzer a tree of [`FieldNode`]s in
//! document order, with type information (`is_list`) already resolved against
//! its schema. Nothing in this crate parses query text.

use std::fmt;

use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;

/// Directive names understood by this crate.
///
/// Other directives on a field are left for the host engine; the analyzer and
/// the pipeline skip them.
pub mod directives {
    pub const SOURCE: &str = "source";
    pub const SKIP_BY: &str = "skipBy";
    pub const INCLUDE_BY: &str = "includeBy";
    pub const MOCK: &str = "mock";
    pub const MAP: &str = "map";
    pub const FILTER: &str = "filter";
    pub const SORT_BY: &str = "sortBy";
    pub const DISTINCT: &str = "distinct";
    pub const TRANSFORM: &str = "transform";
    pub const PARTITION: &str = "partition";

    /// The consume-source marker: a list argument naming the sources a
    /// directive's expression reads.
    pub const DEPS: &str = "deps";

    /// Every directive name this crate reacts to.
    pub const ALL: &[&str] = &[
        SOURCE, SKIP_BY, INCLUDE_BY, MOCK, MAP, FILTER, SORT_BY, DISTINCT, TRANSFORM, PARTITION,
    ];
}

/// Directive argument names.
pub mod arguments {
    pub const NAME: &str = "name";
    pub const EXPRESSION: &str = "expression";
    pub const PREDICATE: &str = "predicate";
    pub const VALUE: &str = "value";
    pub const KEY: &str = "key";
    pub const REVERSED: &str = "reversed";
    pub const BY: &str = "by";
    pub const ARGUMENT: &str = "argument";
    pub const OPERATION: &str = "operation";
    pub const SIZE: &str = "size";
}

/// Alias-aware identifier of one field occurrence: the root-to-node join of
/// response keys. Unique per parse; the query root is the empty path.
///
/// Because every path is a root-to-node join, the ancestor relation is the
/// strict-prefix relation on segments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, response_key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(response_key.into());
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Strict ancestry: the root is an ancestor of everything but itself, a
    /// path is never its own ancestor.
    pub fn is_ancestor_of(&self, other: &FieldPath) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True when either path strictly contains the other.
    pub fn is_related_to(&self, other: &FieldPath) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.join("/"))
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        if path.is_empty() {
            Self::root()
        } else {
            Self(path.split('/').map(str::to_owned).collect())
        }
    }
}

/// One directive occurrence on a field, with its literal arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Map<ByteString, Value>,
}

#[buildstructor::buildstructor]
impl Directive {
    #[builder]
    pub fn new(name: String, arguments: Option<Map<ByteString, Value>>) -> Self {
        Self {
            name,
            arguments: arguments.unwrap_or_default(),
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    pub fn string_argument(&self, name: &str) -> Option<&str> {
        self.argument(name).and_then(Value::as_str)
    }

    pub fn bool_argument(&self, name: &str) -> Option<bool> {
        self.argument(name).and_then(Value::as_bool)
    }

    pub fn u64_argument(&self, name: &str) -> Option<u64> {
        self.argument(name).and_then(Value::as_u64)
    }

    /// `Some` only when the argument is present and is an array of strings.
    pub fn string_list_argument(&self, name: &str) -> Option<Vec<String>> {
        let items = self.argument(name)?.as_array()?;
        items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect()
    }
}

/// One field occurrence in the parsed query, as supplied by the host engine.
#[derive(Clone, Debug, Default)]
pub struct FieldNode {
    pub name: String,
    pub alias: Option<String>,
    /// True when the field's schema type is list-shaped.
    pub is_list: bool,
    /// Literal argument values from the query text, variables already
    /// substituted by the host engine.
    pub arguments: Map<ByteString, Value>,
    pub directives: Vec<Directive>,
    pub children: Vec<FieldNode>,
}

#[buildstructor::buildstructor]
impl FieldNode {
    #[builder]
    pub fn new(
        name: String,
        alias: Option<String>,
        is_list: Option<bool>,
        arguments: Option<Map<ByteString, Value>>,
        directives: Option<Vec<Directive>>,
        children: Option<Vec<FieldNode>>,
    ) -> Self {
        Self {
            name,
            alias,
            is_list: is_list.unwrap_or_default(),
            arguments: arguments.unwrap_or_default(),
            directives: directives.unwrap_or_default(),
            children: children.unwrap_or_default(),
        }
    }

    /// The key under which this field appears in the result: the alias when
    /// present, the field name otherwise.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_joins_and_splits_paths() {
        let path = FieldPath::root().child("parent").child("child");
        assert_eq!(path.to_string(), "parent/child");
        assert_eq!(FieldPath::from("parent/child"), path);
        assert_eq!(FieldPath::from(""), FieldPath::root());
    }

    #[test]
    fn it_computes_strict_ancestry() {
        let root = FieldPath::root();
        let parent = FieldPath::from("parent");
        let child = FieldPath::from("parent/child");
        let sibling = FieldPath::from("sibling");

        assert!(root.is_ancestor_of(&parent));
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&sibling));
        assert!(child.is_related_to(&parent));
        assert!(!sibling.is_related_to(&parent));
    }

    #[test]
    fn it_prefers_the_alias_as_response_key() {
        let field = FieldNode::builder()
            .name("items")
            .alias("renamed".to_string())
            .build();
        assert_eq!(field.response_key(), "renamed");
    }
}
