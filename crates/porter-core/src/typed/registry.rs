//! TaskRegistry - name -> task lookup shared by every poller.
//!
//! The registry is an immutable snapshot behind an `ArcSwap`. `register`
//! builds a complete new map and swaps it in, so lookups never take a lock
//! and never observe a half-built registry.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::task::{IntoTask, RegisteredTask};

type Snapshot = HashMap<String, Arc<RegisteredTask>>;

/// An ordered batch of tasks to register in one call.
///
/// # Example
/// ```ignore
/// let tasks = Tasks::new()
///     .add("add", |a: i64, b: i64| a + b)
///     .add("greet", |name: String| format!("hello {name}"));
/// registry.register(tasks);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Tasks {
    entries: Vec<RegisteredTask>,
}

impl Tasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<Args>(mut self, name: impl Into<String>, f: impl IntoTask<Args>) -> Self {
        self.entries.push(RegisteredTask::new(name, f));
        self
    }

    pub fn push(&mut self, task: RegisteredTask) {
        self.entries.push(task);
    }

    /// Names in insertion order (duplicates included).
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Tasks {
    type Item = RegisteredTask;
    type IntoIter = std::vec::IntoIter<RegisteredTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<RegisteredTask> for Tasks {
    fn from_iter<I: IntoIterator<Item = RegisteredTask>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

pub struct TaskRegistry {
    snap: ArcSwap<Snapshot>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            snap: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace the whole registry with `tasks`.
    ///
    /// Not additive: names from a previous call that are absent here are gone
    /// afterwards. When a name repeats within `tasks` the last one wins.
    pub fn register<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = RegisteredTask>,
    {
        let mut next: Snapshot = HashMap::new();
        for task in tasks {
            let name = task.name().to_string();
            if next.insert(name.clone(), Arc::new(task)).is_some() {
                tracing::warn!(task = %name, "task registered twice in one call; keeping the last one");
            }
        }
        tracing::debug!(count = next.len(), "task registry replaced");
        self.snap.store(Arc::new(next));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredTask>> {
        self.snap.load().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snap.load().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snap.load().is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
