//! Board service endpoint definitions.
//!
//! Each endpoint declares its path, the tags it provides or invalidates and
//! when its queries refetch. The gateway reads these; nothing else decides
//! cache behavior.

use reqwest::Method;

use crate::cache::{QueryOptions, RefetchPolicy, Tag};

use super::client::ApiRequest;
use super::types::BoardDescriptor;

/// One board service operation.
pub struct Endpoint<A: ?Sized> {
  pub name: &'static str,
  pub method: Method,
  /// Unencoded path segments for an argument
  pub path: fn(&A) -> Vec<String>,
  /// Tags attached to cached results (queries)
  pub provides: &'static [Tag],
  /// Tags marked stale once this settles (mutations)
  pub invalidates: &'static [Tag],
  pub policy: RefetchPolicy,
}

impl<A: ?Sized> Endpoint<A> {
  pub fn request(&self, arg: &A) -> ApiRequest {
    ApiRequest::new(self.method.clone(), (self.path)(arg))
  }

  pub fn query_options(&self) -> QueryOptions {
    QueryOptions {
      tags: self.provides,
      policy: self.policy,
    }
  }
}

/// `GET /boards`
pub const GET_ALL_BOARDS: Endpoint<()> = Endpoint {
  name: "getAllBoards",
  method: Method::GET,
  path: |_| vec!["boards".to_string()],
  provides: &[Tag::Boards],
  invalidates: &[],
  policy: RefetchPolicy::CacheFirst,
};

/// `/boards/{name}/createboard`
pub const CREATE_NEW_BOARD: Endpoint<BoardDescriptor> = Endpoint {
  name: "createNewBoard",
  method: Method::GET,
  path: |board| board_path(&board.name, "createboard"),
  provides: &[],
  invalidates: &[Tag::Boards],
  policy: RefetchPolicy::CacheFirst,
};

/// `/boards/{name}/deleteboard`
pub const DELETE_BOARD: Endpoint<BoardDescriptor> = Endpoint {
  name: "deleteBoard",
  method: Method::GET,
  path: |board| board_path(&board.name, "deleteboard"),
  provides: &[],
  invalidates: &[Tag::Boards],
  policy: RefetchPolicy::CacheFirst,
};

/// `GET /boards/{name}/gettasks`
///
/// Provides no tag, so board mutations never refresh it.
pub const GET_TASKS_BY_COLLECTION: Endpoint<str> = Endpoint {
  name: "getTasksByCollection",
  method: Method::GET,
  path: |board| board_path(board, "gettasks"),
  provides: &[],
  invalidates: &[],
  policy: RefetchPolicy::OnSubscribe,
};

fn board_path(board: &str, action: &str) -> Vec<String> {
  vec!["boards".to_string(), board.to_string(), action.to_string()]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_paths() {
    let board = BoardDescriptor::named("Platform Launch");

    assert_eq!(GET_ALL_BOARDS.request(&()).path(), "/boards");
    assert_eq!(
      CREATE_NEW_BOARD.request(&board).path(),
      "/boards/Platform%20Launch/createboard"
    );
    assert_eq!(
      DELETE_BOARD.request(&board).path(),
      "/boards/Platform%20Launch/deleteboard"
    );
    assert_eq!(
      GET_TASKS_BY_COLLECTION.request("Roadmap").path(),
      "/boards/Roadmap/gettasks"
    );
  }

  #[test]
  fn test_tag_graph() {
    assert_eq!(GET_ALL_BOARDS.provides, &[Tag::Boards]);
    assert_eq!(CREATE_NEW_BOARD.invalidates, &[Tag::Boards]);
    assert_eq!(DELETE_BOARD.invalidates, &[Tag::Boards]);
    assert!(GET_TASKS_BY_COLLECTION.provides.is_empty());
    assert_eq!(
      GET_TASKS_BY_COLLECTION.query_options().policy,
      RefetchPolicy::OnSubscribe
    );
  }

  #[test]
  fn test_board_name_stays_one_segment() {
    let request = GET_TASKS_BY_COLLECTION.request("Q3/Q4 Plan");
    assert_eq!(request.segments.len(), 3);
    assert_eq!(request.segments[1], "Q3/Q4 Plan");
  }
}
