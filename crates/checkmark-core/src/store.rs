use std::collections::HashSet;
use std::fmt;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::storage::KeyValueStorage;
use crate::task::{Task, TaskId, normalize_title, now_millis};

/// Open and total task counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub open: usize,
    pub total: usize,
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} open / {} total", self.open, self.total)
    }
}

/// Owner of the canonical task list. Every mutation writes the full list back
/// to `storage` under `key` before returning.
///
/// Blank titles and unknown ids are no-ops, not errors. The only error a
/// mutation returns is a failed storage write; the in-memory change is kept
/// in that case.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
}

impl<S: KeyValueStorage> TaskStore<S> {
    /// Reads `key` from `storage`. Missing, unreadable and malformed values
    /// all start an empty list. The normalized list is written back
    /// immediately, unless the read itself failed: an unreadable value is
    /// left in place until the next mutation.
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: S, key: &str) -> anyhow::Result<Self> {
        let (raw, readable) = match storage.get_item(key) {
            Ok(raw) => (raw, true),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading stored tasks; starting empty");
                (None, false)
            }
        };

        let tasks = match raw {
            None => {
                debug!("no stored tasks; starting empty");
                Vec::new()
            }
            Some(raw) => match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(tasks) => normalize_loaded(tasks),
                Err(err) => {
                    warn!(error = %err, "stored tasks are malformed; starting empty");
                    Vec::new()
                }
            },
        };

        info!(count = tasks.len(), "loaded tasks");

        let mut store = Self {
            storage,
            key: key.to_string(),
            tasks,
        };
        if readable {
            store.persist()?;
        } else {
            warn!("skipping write-back of unreadable stored tasks");
        }
        Ok(store)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn counts(&self) -> Counts {
        Counts {
            open: self.tasks.iter().filter(|t| !t.done).count(),
            total: self.tasks.len(),
        }
    }

    /// Exact id match first, then a unique id prefix. Ambiguous or unknown
    /// prefixes resolve to nothing.
    pub fn resolve(&self, query: &str) -> Option<TaskId> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        if let Some(task) = self.tasks.iter().find(|t| t.id.as_str() == query) {
            return Some(task.id.clone());
        }

        let mut matches = self
            .tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with(query));
        let first = matches.next()?;
        if matches.next().is_some() {
            debug!(query, "ambiguous id prefix");
            None
        } else {
            Some(first.id.clone())
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn add(&mut self, title: &str) -> anyhow::Result<Option<Task>> {
        self.add_at(title, now_millis())
    }

    /// Prepends a new open task created at `now_ms`.
    #[tracing::instrument(skip(self, title))]
    pub fn add_at(&mut self, title: &str, now_ms: i64) -> anyhow::Result<Option<Task>> {
        let Some(title) = normalize_title(title) else {
            debug!("blank title; nothing added");
            return Ok(None);
        };

        let mut task = Task::new(title, now_ms);
        while self.get(&task.id).is_some() {
            task.id = TaskId::generate();
        }

        debug!(id = %task.id, "adding task");
        self.tasks.insert(0, task.clone());
        self.persist()?;
        Ok(Some(task))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle(&mut self, id: &TaskId) -> anyhow::Result<Option<Task>> {
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            debug!("unknown id; toggle ignored");
            return Ok(None);
        };
        task.done = !task.done;
        let task = task.clone();

        self.persist()?;
        Ok(Some(task))
    }

    /// A blank `title` keeps the current one.
    #[tracing::instrument(skip(self, title), fields(id = %id))]
    pub fn rename(&mut self, id: &TaskId, title: &str) -> anyhow::Result<Option<Task>> {
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            debug!("unknown id; rename ignored");
            return Ok(None);
        };
        match normalize_title(title) {
            Some(title) => task.title = title,
            None => debug!("blank title; keeping previous"),
        }
        let task = task.clone();

        self.persist()?;
        Ok(Some(task))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: &TaskId) -> anyhow::Result<Option<Task>> {
        let Some(idx) = self.tasks.iter().position(|t| &t.id == id) else {
            debug!("unknown id; remove ignored");
            return Ok(None);
        };
        let task = self.tasks.remove(idx);

        self.persist()?;
        Ok(Some(task))
    }

    /// Overwrites the stored value with the full current list.
    #[tracing::instrument(skip(self), fields(key = %self.key, count = self.tasks.len()))]
    pub fn persist(&mut self) -> anyhow::Result<()> {
        let serialized =
            serde_json::to_string(&self.tasks).context("failed to serialize tasks")?;
        self.storage
            .set_item(&self.key, &serialized)
            .with_context(|| format!("failed to persist tasks under key {}", self.key))
    }
}

fn normalize_loaded(tasks: Vec<Task>) -> Vec<Task> {
    let before = tasks.len();
    let mut seen = HashSet::new();
    let kept: Vec<Task> = tasks
        .into_iter()
        .filter_map(|mut task| {
            task.title = normalize_title(&task.title)?;
            seen.insert(task.id.clone()).then_some(task)
        })
        .collect();

    if kept.len() != before {
        warn!(
            before,
            after = kept.len(),
            "dropped stored tasks with blank titles or duplicate ids"
        );
    }
    kept
}
