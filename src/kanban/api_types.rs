//! Serde-deserializable types matching board service responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{Acknowledgment, BoardList, Collection, Subtask, Task, TaskBoard};

// ============================================================================
// GET /boards
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiBoardsResponse {
  /// Board names; the service calls them collections
  pub collections: Vec<String>,
}

impl From<ApiBoardsResponse> for BoardList {
  fn from(response: ApiBoardsResponse) -> Self {
    BoardList {
      names: response.collections,
    }
  }
}

// ============================================================================
// GET /boards/{name}/gettasks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTasksResponse {
  #[serde(alias = "columns")]
  pub collections: Vec<ApiCollection>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCollection {
  pub name: String,
  #[serde(default)]
  pub tasks: Vec<ApiTask>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTask {
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub subtasks: Vec<ApiSubtask>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSubtask {
  pub title: String,
  #[serde(rename = "isCompleted", default)]
  pub is_completed: bool,
}

impl From<ApiTasksResponse> for TaskBoard {
  fn from(response: ApiTasksResponse) -> Self {
    TaskBoard {
      collections: response
        .collections
        .into_iter()
        .map(|collection| Collection {
          name: collection.name,
          tasks: collection.tasks.into_iter().map(Task::from).collect(),
        })
        .collect(),
    }
  }
}

impl From<ApiTask> for Task {
  fn from(task: ApiTask) -> Self {
    Task {
      title: task.title,
      // Treat empty descriptions as absent
      description: task.description.filter(|d| !d.is_empty()),
      status: task.status,
      subtasks: task
        .subtasks
        .into_iter()
        .map(|s| Subtask {
          title: s.title,
          is_completed: s.is_completed,
        })
        .collect(),
    }
  }
}

// ============================================================================
// createboard / deleteboard
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiAcknowledgment {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default, alias = "name")]
  pub board: Option<String>,
}

/// An empty body decodes as `None`.
impl From<Option<ApiAcknowledgment>> for Acknowledgment {
  fn from(ack: Option<ApiAcknowledgment>) -> Self {
    let ack = ack.unwrap_or_default();
    Acknowledgment {
      message: ack.message,
      board: ack.board,
    }
  }
}
