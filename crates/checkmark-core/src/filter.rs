use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  ValueEnum,
)]
pub enum FilterMode {
  #[default]
  All,
  Open,
  Done
}

impl FilterMode {
  pub const ALL_MODES: [FilterMode; 3] = [
    FilterMode::All,
    FilterMode::Open,
    FilterMode::Done
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | FilterMode::All => "all",
      | FilterMode::Open => "open",
      | FilterMode::Done => "done"
    }
  }

  pub fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | FilterMode::All => true,
      | FilterMode::Open => !task.done,
      | FilterMode::Done => task.done
    }
  }
}

impl fmt::Display for FilterMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FilterMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(FilterMode::All),
      | "open" => Ok(FilterMode::Open),
      | "done" => Ok(FilterMode::Done),
      | other => {
        Err(anyhow!(
          "invalid filter mode: {other} \
           (expected all, open or done)"
        ))
      }
    }
  }
}

/// Tasks admitted by `mode`, in input
/// order.
pub fn visible(
  tasks: &[Task],
  mode: FilterMode
) -> Vec<&Task> {
  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| mode.admits(task))
    .collect();
  trace!(
    mode = %mode,
    total = tasks.len(),
    visible = out.len(),
    "computed visible tasks"
  );
  out
}

/// Current filter selection. Holds no
/// task state; the visible set is
/// recomputed from the list on every
/// call.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
  mode: FilterMode
}

impl ViewFilter {
  pub fn new(mode: FilterMode) -> Self {
    Self {
      mode
    }
  }

  pub fn mode(&self) -> FilterMode {
    self.mode
  }

  pub fn set_mode(
    &mut self,
    mode: FilterMode
  ) {
    self.mode = mode;
  }

  pub fn visible<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    visible(tasks, self.mode)
  }
}

#[cfg(test)]
mod tests {
  use super::{
    FilterMode,
    ViewFilter,
    visible
  };
  use crate::task::{
    Task,
    TaskId
  };

  fn task(
    id: &str,
    done: bool
  ) -> Task {
    Task {
      id: TaskId::from(id),
      title: id.to_string(),
      done,
      created_at: 0
    }
  }

  fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|t| t.id.to_string())
      .collect()
  }

  #[test]
  fn modes_select_by_done_flag() {
    let tasks = vec![
      task("c", false),
      task("b", true),
      task("a", false),
    ];

    assert_eq!(
      ids(&visible(
        &tasks,
        FilterMode::All
      )),
      vec!["c", "b", "a"]
    );
    assert_eq!(
      ids(&visible(
        &tasks,
        FilterMode::Open
      )),
      vec!["c", "a"]
    );
    assert_eq!(
      ids(&visible(
        &tasks,
        FilterMode::Done
      )),
      vec!["b"]
    );
  }

  #[test]
  fn open_and_done_partition_the_list()
   {
    let tasks: Vec<Task> = (0..9)
      .map(|i| {
        task(
          &format!("t{i}"),
          i % 3 == 0
        )
      })
      .collect();

    let open =
      visible(&tasks, FilterMode::Open);
    let done =
      visible(&tasks, FilterMode::Done);

    assert_eq!(
      open.len() + done.len(),
      tasks.len()
    );
    for t in &tasks {
      let in_open = open
        .iter()
        .any(|o| o.id == t.id);
      let in_done = done
        .iter()
        .any(|d| d.id == t.id);
      assert!(in_open ^ in_done);
    }
  }

  #[test]
  fn parses_case_insensitively() {
    assert_eq!(
      " Done ".parse::<FilterMode>().ok(),
      Some(FilterMode::Done)
    );
    assert!(
      "closed"
        .parse::<FilterMode>()
        .is_err()
    );
    for mode in FilterMode::ALL_MODES {
      assert_eq!(
        mode
          .to_string()
          .parse::<FilterMode>()
          .ok(),
        Some(mode)
      );
    }
  }

  #[test]
  fn view_filter_switches_freely() {
    let tasks = vec![
      task("x", true),
      task("y", false),
    ];
    let mut view = ViewFilter::default();
    assert_eq!(view.visible(&tasks).len(), 2);

    view.set_mode(FilterMode::Done);
    assert_eq!(ids(&view.visible(&tasks)), vec!["x"]);

    view.set_mode(FilterMode::Open);
    assert_eq!(ids(&view.visible(&tasks)), vec!["y"]);

    view.set_mode(FilterMode::All);
    assert_eq!(view.mode(), FilterMode::All);
    assert_eq!(view.visible(&tasks).len(), 2);
  }
}
