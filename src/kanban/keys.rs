//! Cache keys for board service queries.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

use super::endpoints::{GET_ALL_BOARDS, GET_TASKS_BY_COLLECTION};

/// Query key types for board service calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KanbanQueryKey {
  /// List every board
  AllBoards,
  /// Tasks of one board
  TasksByCollection { board: String },
}

impl KanbanQueryKey {
  pub fn tasks(board: impl Into<String>) -> Self {
    Self::TasksByCollection {
      board: board.into(),
    }
  }
}

impl QueryKey for KanbanQueryKey {
  fn cache_hash(&self) -> String {
    // Board names are identifiers, so no case folding or trimming
    let input = match self {
      Self::AllBoards => format!("{}:", GET_ALL_BOARDS.name),
      Self::TasksByCollection { board } => format!("{}:{}", GET_TASKS_BY_COLLECTION.name, board),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::AllBoards => "all boards".to_string(),
      Self::TasksByCollection { board } => format!("tasks for board {}", board),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_is_deterministic() {
    assert_eq!(
      KanbanQueryKey::AllBoards.cache_hash(),
      KanbanQueryKey::AllBoards.cache_hash()
    );
    assert_eq!(
      KanbanQueryKey::tasks("Roadmap").cache_key(),
      KanbanQueryKey::tasks("Roadmap").cache_key()
    );
    assert_eq!(KanbanQueryKey::AllBoards.cache_hash().len(), 64);
  }

  #[test]
  fn test_hash_depends_on_argument() {
    assert_ne!(
      KanbanQueryKey::tasks("Roadmap").cache_hash(),
      KanbanQueryKey::tasks("Marketing Plan").cache_hash()
    );
    assert_ne!(
      KanbanQueryKey::tasks("roadmap").cache_hash(),
      KanbanQueryKey::tasks("Roadmap").cache_hash()
    );
  }

  #[test]
  fn test_hash_depends_on_endpoint() {
    // An empty board name must not collide with the board list
    assert_ne!(
      KanbanQueryKey::AllBoards.cache_hash(),
      KanbanQueryKey::tasks("").cache_hash()
    );
  }
}
