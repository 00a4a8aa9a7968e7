/// Names of every board, in server order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardList {
  pub names: Vec<String>,
}

impl BoardList {
  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.names.iter().any(|n| n == name)
  }
}

/// Input to create/delete. Only `name` reaches the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardDescriptor {
  pub name: String,
  /// Initial collections (columns) for a new board
  pub collections: Vec<String>,
}

impl BoardDescriptor {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      collections: Vec::new(),
    }
  }

  pub fn with_collections(mut self, collections: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.collections = collections.into_iter().map(Into::into).collect();
    self
  }
}

/// Server acknowledgment of a create/delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acknowledgment {
  pub message: Option<String>,
  pub board: Option<String>,
}

/// Tasks of one board, grouped by collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBoard {
  pub collections: Vec<Collection>,
}

impl TaskBoard {
  pub fn task_count(&self) -> usize {
    self.collections.iter().map(|c| c.tasks.len()).sum()
  }

  pub fn collection(&self, name: &str) -> Option<&Collection> {
    self.collections.iter().find(|c| c.name == name)
  }
}

/// A column of tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
  pub name: String,
  pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
  pub title: String,
  pub description: Option<String>,
  pub status: String,
  pub subtasks: Vec<Subtask>,
}

impl Task {
  pub fn completed_subtasks(&self) -> usize {
    self.subtasks.iter().filter(|s| s.is_completed).count()
  }

  /// All subtasks done. A task without subtasks is never complete.
  pub fn is_complete(&self) -> bool {
    !self.subtasks.is_empty() && self.subtasks.iter().all(|s| s.is_completed)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtask {
  pub title: String,
  pub is_completed: bool,
}
