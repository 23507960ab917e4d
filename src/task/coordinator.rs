//! The per-execution completion state machine.
//!
//! One [`CompletionCoordinator`] is created per query execution from the
//! analyzer's task arena. The host engine feeds it one completion event per
//! runtime field occurrence; decorators read source values back through
//! [`CompletionCoordinator::await_source`], which suspends until the backing
//! node leaves `Pending`.
//!
//! Each node carries its own lock and watch channel, so unrelated branches of
//! the query are never serialized against each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json_bytes::Value;
use tokio::sync::watch;
use tower::BoxError;

use crate::analysis::QueryAnalysis;
use crate::error::TaskFailure;
use crate::expression::Environment;
use crate::expression::ExpressionEvaluator;
use crate::query::FieldPath;

/// Result cell of one node. Mutated exactly once, `Pending` to `Completed`
/// or `Pending` to `Failed`.
#[derive(Debug, Clone)]
pub enum TaskState {
    Pending,
    Completed(Value),
    Failed(Arc<TaskFailure>),
}

impl TaskState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

struct RuntimeTask {
    list_nested: bool,
    children: Vec<FieldPath>,
    cell: Mutex<TaskCell>,
    state: watch::Sender<TaskState>,
}

#[derive(Default)]
struct TaskCell {
    /// Ordered accumulation across list iterations; only filled while
    /// `list_nested` and `Pending`.
    buffer: Vec<Value>,
    /// Errors arriving after the first failure.
    suppressed: Vec<TaskFailure>,
}

pub struct CompletionCoordinator {
    analysis: Arc<QueryAnalysis>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    tasks: HashMap<FieldPath, RuntimeTask>,
}

impl CompletionCoordinator {
    pub fn new(analysis: Arc<QueryAnalysis>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let tasks = analysis
            .tasks
            .iter()
            .map(|spec| {
                let (state, _) = watch::channel(TaskState::Pending);
                (
                    spec.path.clone(),
                    RuntimeTask {
                        list_nested: spec.list_nested,
                        children: spec.children.clone(),
                        cell: Mutex::new(TaskCell::default()),
                        state,
                    },
                )
            })
            .collect();
        Self {
            analysis,
            evaluator,
            tasks,
        }
    }

    /// One host-engine completion event for the field occurrence at `path`.
    /// Untracked paths are ignored. `Ok(None)` (a required value that is
    /// absent) is treated as failure for scheduling purposes.
    pub fn field_completed(&self, path: &FieldPath, outcome: Result<Option<Value>, BoxError>) {
        let Some(task) = self.tasks.get(path) else {
            tracing::trace!(%path, "completion for untracked field ignored");
            return;
        };
        match outcome {
            Err(error) => self.fail(
                path,
                task,
                TaskFailure::Resolution {
                    path: path.clone(),
                    reason: error.to_string(),
                },
            ),
            Ok(None) => self.fail(path, task, TaskFailure::Absent { path: path.clone() }),
            Ok(Some(value)) => {
                let mut cell = task.cell.lock();
                if !task.state.borrow().is_pending() {
                    tracing::debug!(%path, "completion for settled task ignored");
                    return;
                }
                if task.list_nested {
                    // a per-element report under a still-open list
                    tracing::trace!(%path, "buffered list element completion");
                    cell.buffer.push(value);
                    return;
                }
                drop(cell);
                self.complete(path, task, value);
            }
        }
    }

    /// Transition to `Completed`, then cascade: every still-pending
    /// list-nested child is finalized from its buffer, recursively. "My list
    /// is done, so any descendant aggregation waiting only on my completion
    /// is final now."
    fn complete(&self, path: &FieldPath, task: &RuntimeTask, value: Value) {
        {
            let _cell = task.cell.lock();
            // a failure cascade may have settled the node since the caller's
            // own pending check: the transition must happen under the lock
            if !task.state.borrow().is_pending() {
                tracing::debug!(%path, "completion for settled task ignored");
                return;
            }
            tracing::debug!(%path, "task completed");
            task.state.send_replace(TaskState::Completed(value));
        }
        for child_path in &task.children {
            let Some(child) = self.tasks.get(child_path) else {
                continue;
            };
            let buffer = {
                let mut cell = child.cell.lock();
                if !child.state.borrow().is_pending() || !child.list_nested {
                    continue;
                }
                std::mem::take(&mut cell.buffer)
            };
            self.complete(child_path, child, Value::Array(buffer));
        }
    }

    /// Transition to `Failed`, or attach a secondary error if the node
    /// already failed. Failure cascades to still-pending descendants; other
    /// branches of the query are untouched.
    fn fail(&self, path: &FieldPath, task: &RuntimeTask, failure: TaskFailure) {
        {
            let mut cell = task.cell.lock();
            match &*task.state.borrow() {
                TaskState::Pending => {}
                TaskState::Failed(_) => {
                    tracing::debug!(%path, %failure, "suppressed secondary failure");
                    cell.suppressed.push(failure);
                    return;
                }
                TaskState::Completed(_) => {
                    tracing::debug!(%path, %failure, "failure after completion ignored");
                    return;
                }
            }
            tracing::debug!(%path, %failure, "task failed");
            task.state.send_replace(TaskState::Failed(Arc::new(failure)));
        }
        for child_path in &task.children {
            if let Some(child) = self.tasks.get(child_path)
                && child.state.borrow().is_pending()
            {
                self.fail(
                    child_path,
                    child,
                    TaskFailure::Upstream {
                        path: child_path.clone(),
                        ancestor: path.clone(),
                    },
                );
            }
        }
    }

    /// Resolve the value of a declared source once its node settles. A failed
    /// node yields the failure; callers decide whether that maps to "absent"
    /// or propagates. The declaration's conversion expression, if any, is
    /// applied on read with the raw value bound as `value`.
    pub async fn await_source(&self, name: &str) -> Result<Value, TaskFailure> {
        let Some(declaration) = self.analysis.sources.get(name) else {
            return Err(TaskFailure::UnknownSource {
                name: name.to_owned(),
            });
        };
        let Some(task) = self.tasks.get(&declaration.path) else {
            return Err(TaskFailure::UnknownSource {
                name: name.to_owned(),
            });
        };
        tracing::trace!(
            source = name,
            path = %declaration.path,
            aggregated = declaration.aggregated,
            "awaiting source"
        );
        let mut receiver = task.state.subscribe();
        let settled = receiver
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| TaskFailure::Absent {
                path: declaration.path.clone(),
            })?
            .clone();
        let value = match settled {
            TaskState::Completed(value) => value,
            TaskState::Failed(failure) => return Err((*failure).clone()),
            TaskState::Pending => unreachable!("wait_for settled on a pending state"),
        };
        match &declaration.expression {
            None => Ok(value),
            Some(expression) => {
                let mut env = Environment::new();
                env.insert(serde_json_bytes::ByteString::from("value"), value);
                self.evaluator
                    .evaluate(expression, &env)
                    .map_err(|err| TaskFailure::Conversion {
                        name: name.to_owned(),
                        message: err.to_string(),
                    })
            }
        }
    }

    /// Secondary errors attached after a node's first failure.
    pub fn suppressed_failures(&self, path: &FieldPath) -> Vec<TaskFailure> {
        self.tasks
            .get(path)
            .map(|task| task.cell.lock().suppressed.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn state(&self, path: &FieldPath) -> Option<TaskState> {
        self.tasks.get(path).map(|task| task.state.borrow().clone())
    }
}
