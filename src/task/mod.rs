//! The static task tree: an arena of [`TaskSpec`] records addressed by
//! [`FieldPath`], built once by the analyzer and immutable afterwards. The
//! runtime state machine lives in [`coordinator`].
//!
//! Only fields that participate in a dependency are materialized: every
//! source-declaring field and its ancestors. Get-or-create is idempotent, so
//! two declarations under a common list ancestor extend one chain instead of
//! duplicating nodes.

use indexmap::IndexMap;

use crate::query::FieldPath;

mod coordinator;

pub use coordinator::CompletionCoordinator;
pub use coordinator::TaskState;

#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub path: FieldPath,
    pub parent: Option<FieldPath>,
    pub children: Vec<FieldPath>,
    /// Completions for this path arrive once per iteration of a list-typed
    /// ancestor and are buffered until that ancestor's own completion.
    pub list_nested: bool,
    /// The field itself is list-typed.
    pub field_is_list: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskArena {
    nodes: IndexMap<FieldPath, TaskSpec>,
}

impl TaskArena {
    /// Idempotent insertion. On first creation the node is linked into its
    /// parent's child list; later calls return the existing node untouched.
    pub(crate) fn get_or_create(
        &mut self,
        path: &FieldPath,
        parent: Option<&FieldPath>,
        field_is_list: bool,
        list_nested: bool,
    ) {
        if self.nodes.contains_key(path) {
            return;
        }
        if let Some(parent) = parent
            && let Some(parent_spec) = self.nodes.get_mut(parent)
        {
            parent_spec.children.push(path.clone());
        }
        self.nodes.insert(
            path.clone(),
            TaskSpec {
                path: path.clone(),
                parent: parent.cloned(),
                children: Vec::new(),
                list_nested,
                field_is_list,
            },
        );
    }

    pub fn get(&self, path: &FieldPath) -> Option<&TaskSpec> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskSpec> {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reuses_nodes_across_declarations() {
        let mut arena = TaskArena::default();
        let parent = FieldPath::from("parent");
        let a = FieldPath::from("parent/a");
        let b = FieldPath::from("parent/b");

        arena.get_or_create(&parent, None, true, false);
        arena.get_or_create(&a, Some(&parent), false, true);
        // second declaration under the same subtree
        arena.get_or_create(&parent, None, true, false);
        arena.get_or_create(&b, Some(&parent), false, true);

        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(&parent).unwrap().children, vec![a.clone(), b]);
        assert!(arena.get(&a).unwrap().list_nested);
        assert!(!arena.get(&parent).unwrap().list_nested);
    }
}
