//! Board data gateway: typed board service operations over the query cache.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use futures::future::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::cache::{QueryCache, Subscription};
use crate::config::Config;
use crate::error::TransportError;
use crate::query::Mutation;

use super::api_types::{ApiAcknowledgment, ApiBoardsResponse, ApiTasksResponse};
use super::client::{decode_response, HttpTransport, Transport};
use super::endpoints::{
  Endpoint, CREATE_NEW_BOARD, DELETE_BOARD, GET_ALL_BOARDS, GET_TASKS_BY_COLLECTION,
};
use super::keys::KanbanQueryKey;
use super::types::{Acknowledgment, BoardDescriptor, BoardList, TaskBoard};

/// Board service client with cached, tag-invalidated reads.
///
/// Queries return a `Subscription` that stays live until dropped; mutations
/// invalidate the tags their endpoint declares once they settle.
#[derive(Clone)]
pub struct BoardGateway {
  transport: Arc<dyn Transport>,
  cache: QueryCache,
}

impl BoardGateway {
  pub fn new(transport: Arc<dyn Transport>, cache: QueryCache) -> Self {
    Self { transport, cache }
  }

  /// Create a gateway talking HTTP to the configured service.
  pub fn from_config(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(&config.api)?;
    let cache = QueryCache::new(Duration::from_secs(config.cache.keep_unused_for_secs));
    info!(base_url = %transport.base_url(), "board gateway ready");
    Ok(Self::new(Arc::new(transport), cache))
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  /// Subscribe to the board list. Provides `Boards`.
  pub fn get_all_boards(&self) -> Subscription<BoardList> {
    self.query::<_, ApiBoardsResponse, _>(&GET_ALL_BOARDS, &(), KanbanQueryKey::AllBoards)
  }

  /// Subscribe to the tasks of `board`. Every call issues a request unless
  /// one for the same board is already in flight.
  pub fn get_tasks_by_collection(&self, board: &str) -> Subscription<TaskBoard> {
    self.query::<_, ApiTasksResponse, _>(
      &GET_TASKS_BY_COLLECTION,
      board,
      KanbanQueryKey::tasks(board),
    )
  }

  /// Board list for one-shot consumers.
  pub async fn fetch_all_boards(&self) -> Result<BoardList, TransportError> {
    let mut subscription = self.get_all_boards();
    settled_result(&mut subscription).await
  }

  /// Tasks of `board` for one-shot consumers.
  pub async fn fetch_tasks_by_collection(&self, board: &str) -> Result<TaskBoard, TransportError> {
    let mut subscription = self.get_tasks_by_collection(board);
    settled_result(&mut subscription).await
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Create a board. Invalidates `Boards`.
  pub async fn create_new_board(
    &self,
    board: &BoardDescriptor,
  ) -> Result<Acknowledgment, TransportError> {
    self
      .mutate::<_, Option<ApiAcknowledgment>, _>(&CREATE_NEW_BOARD, board)
      .await
  }

  /// Delete a board. Invalidates `Boards`.
  pub async fn delete_board(&self, board: &BoardDescriptor) -> Result<Acknowledgment, TransportError> {
    self
      .mutate::<_, Option<ApiAcknowledgment>, _>(&DELETE_BOARD, board)
      .await
  }

  /// Tracker for create-board calls, for event-loop driven UIs.
  pub fn create_new_board_mutation(&self) -> Mutation<BoardDescriptor, Acknowledgment> {
    let gateway = self.clone();
    Mutation::new(move |board: BoardDescriptor| {
      let gateway = gateway.clone();
      async move { gateway.create_new_board(&board).await }
    })
  }

  /// Tracker for delete-board calls, for event-loop driven UIs.
  pub fn delete_board_mutation(&self) -> Mutation<BoardDescriptor, Acknowledgment> {
    let gateway = self.clone();
    Mutation::new(move |board: BoardDescriptor| {
      let gateway = gateway.clone();
      async move { gateway.delete_board(&board).await }
    })
  }

  // ==========================================================================
  // Internal
  // ==========================================================================

  fn query<A, W, T>(&self, endpoint: &Endpoint<A>, arg: &A, key: KanbanQueryKey) -> Subscription<T>
  where
    A: ?Sized,
    W: DeserializeOwned + 'static,
    T: From<W> + Clone + Send + Sync + 'static,
  {
    let request = endpoint.request(arg);
    let transport = Arc::clone(&self.transport);

    self.cache.subscribe(&key, endpoint.query_options(), move || {
      let send = transport.send(request.clone());
      async move {
        let response = send.await?;
        decode_response::<W>(response).map(T::from)
      }
      .boxed()
    })
  }

  /// Send a mutation and invalidate its tags once it settles. Runs on its
  /// own task, so the invalidation still happens if this future is dropped.
  async fn mutate<A, W, R>(&self, endpoint: &Endpoint<A>, arg: &A) -> Result<R, TransportError>
  where
    A: ?Sized,
    W: DeserializeOwned + 'static,
    R: From<W> + Send + 'static,
  {
    let request = endpoint.request(arg);
    let name = endpoint.name;
    let invalidates = endpoint.invalidates;
    debug!(endpoint = name, path = %request.path(), "mutation started");

    let send = self.transport.send(request);
    let cache = self.cache.clone();
    let task = tokio::spawn(async move {
      let result = match send.await {
        Ok(response) => decode_response::<W>(response).map(R::from),
        Err(e) => Err(e),
      };

      // Tags are invalidated on settlement, successful or not
      let invalidated = cache.invalidate(invalidates);
      debug!(
        endpoint = name,
        ok = result.is_ok(),
        invalidated,
        "mutation settled"
      );

      result
    });

    task
      .await
      .unwrap_or_else(|e| Err(TransportError::network(format!("mutation task failed: {}", e))))
  }
}

async fn settled_result<T: Clone>(subscription: &mut Subscription<T>) -> Result<T, TransportError> {
  subscription
    .settled()
    .await
    .state
    .into_result()
    .unwrap_or_else(|| Err(TransportError::network("query did not settle")))
}

impl std::fmt::Debug for BoardGateway {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BoardGateway")
      .field("cache", &self.cache)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryState;
  use futures::future::BoxFuture;
  use reqwest::StatusCode;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
  use std::sync::Mutex;

  use crate::kanban::client::{ApiRequest, RawResponse};

  /// In-memory board service with per-path call counters.
  #[derive(Default)]
  struct FakeBoardService {
    boards: Mutex<Vec<String>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    /// Delay before each response, after the request has been applied
    latency_ms: AtomicU64,
    /// Canned (status, body) per request path
    overrides: Mutex<HashMap<String, (u16, String)>>,
  }

  impl FakeBoardService {
    fn with_boards(names: &[&str]) -> Arc<Self> {
      let service = Self::default();
      *service.boards.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
      Arc::new(service)
    }

    fn calls(&self, path: &str) -> usize {
      self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn override_path(&self, path: &str, status: u16, body: &str) {
      self
        .overrides
        .lock()
        .unwrap()
        .insert(path.to_string(), (status, body.to_string()));
    }

    fn respond(&self, request: &ApiRequest) -> RawResponse {
      if let Some((status, body)) = self.overrides.lock().unwrap().get(&request.path()) {
        return raw(*status, body);
      }

      let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
      let mut boards = self.boards.lock().unwrap();
      match segments.as_slice() {
        ["boards"] => raw(
          200,
          &serde_json::json!({ "collections": &*boards }).to_string(),
        ),
        ["boards", name, "createboard"] => {
          boards.push(name.to_string());
          raw(200, &serde_json::json!({ "message": "created", "board": name }).to_string())
        }
        ["boards", name, "deleteboard"] => {
          boards.retain(|b| b != name);
          raw(200, "")
        }
        ["boards", name, "gettasks"] if boards.iter().any(|b| b == name) => raw(
          200,
          &serde_json::json!({
            "collections": [
              { "name": "Todo", "tasks": [
                { "title": format!("Plan {}", name), "status": "Todo", "subtasks": [] }
              ]},
              { "name": "Done", "tasks": [] }
            ]
          })
          .to_string(),
        ),
        _ => raw(404, r#"{"message": "Board not found"}"#),
      }
    }
  }

  impl Transport for FakeBoardService {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
      *self.calls.lock().unwrap().entry(request.path()).or_default() += 1;

      let result = if self.offline.load(Ordering::SeqCst) {
        Err(TransportError::network("connection refused"))
      } else {
        Ok(self.respond(&request))
      };

      let latency = Duration::from_millis(self.latency_ms.load(Ordering::SeqCst));
      async move {
        if latency.is_zero() {
          tokio::task::yield_now().await;
        } else {
          tokio::time::sleep(latency).await;
        }
        result
      }
      .boxed()
    }
  }

  fn raw(status: u16, body: &str) -> RawResponse {
    RawResponse {
      status: StatusCode::from_u16(status).unwrap(),
      body: body.to_string(),
    }
  }

  fn gateway(service: &Arc<FakeBoardService>) -> BoardGateway {
    BoardGateway::new(service.clone(), QueryCache::new(Duration::from_secs(60)))
  }

  fn names(list: &BoardList) -> Vec<&str> {
    list.names.iter().map(String::as_str).collect()
  }

  #[tokio::test]
  async fn test_board_list_is_deduplicated() {
    let service = FakeBoardService::with_boards(&["Platform Launch", "Marketing Plan"]);
    let gateway = gateway(&service);

    let mut subscribers: Vec<_> = (0..5).map(|_| gateway.get_all_boards()).collect();
    assert!(subscribers[0].snapshot().state.is_loading());

    let mut results = Vec::new();
    for sub in &mut subscribers {
      results.push(sub.settled().await.state);
    }

    assert_eq!(service.calls("/boards"), 1);
    assert!(results.iter().all(|r| r == &results[0]));

    // A later subscriber reuses the cached entry
    let boards = gateway.fetch_all_boards().await.unwrap();
    assert_eq!(names(&boards), ["Platform Launch", "Marketing Plan"]);
    assert_eq!(service.calls("/boards"), 1);
  }

  #[tokio::test]
  async fn test_create_board_refreshes_board_list() {
    let service = FakeBoardService::with_boards(&["Platform Launch", "Marketing Plan"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    let before = boards.settled().await;
    assert_eq!(
      before.state.data().map(names),
      Some(vec!["Platform Launch", "Marketing Plan"])
    );

    let ack = gateway
      .create_new_board(&BoardDescriptor::named("Roadmap").with_collections(["Todo", "Doing", "Done"]))
      .await
      .unwrap();
    assert_eq!(ack.board.as_deref(), Some("Roadmap"));

    // No optimistic update: old data until the refetch lands
    let during = boards.snapshot();
    assert!(during.is_fetching);
    assert_eq!(during.state, before.state);

    let after = boards.settled().await;
    assert_eq!(
      after.state.data().map(names),
      Some(vec!["Platform Launch", "Marketing Plan", "Roadmap"])
    );
    assert_eq!(service.calls("/boards"), 2);
    assert_eq!(service.calls("/boards/Roadmap/createboard"), 1);
  }

  #[tokio::test]
  async fn test_delete_board_refreshes_board_list() {
    let service = FakeBoardService::with_boards(&["Platform Launch", "Marketing Plan", "Roadmap"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    boards.settled().await;

    let ack = gateway
      .delete_board(&BoardDescriptor::named("Marketing Plan"))
      .await
      .unwrap();
    assert_eq!(ack, Acknowledgment::default());

    let after = boards.settled().await;
    assert_eq!(
      after.state.data().map(names),
      Some(vec!["Platform Launch", "Roadmap"])
    );
    assert_eq!(service.calls("/boards/Marketing%20Plan/deleteboard"), 1);
  }

  #[tokio::test]
  async fn test_failed_mutation_still_invalidates() {
    let service = FakeBoardService::with_boards(&["Roadmap"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    boards.settled().await;

    service.override_path("/boards/Roadmap/createboard", 409, r#"{"error": "Board exists"}"#);
    let err = gateway
      .create_new_board(&BoardDescriptor::named("Roadmap"))
      .await
      .unwrap_err();
    assert_eq!(err.server_message(), Some("Board exists"));

    assert!(boards.settled().await.state.is_success());
    assert_eq!(service.calls("/boards"), 2);
  }

  #[tokio::test]
  async fn test_cancelled_mutation_still_invalidates() {
    let service = FakeBoardService::with_boards(&["Platform Launch"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    boards.settled().await;

    service.latency_ms.store(40, Ordering::SeqCst);
    let roadmap = BoardDescriptor::named("Roadmap");
    let create = gateway.create_new_board(&roadmap);
    let timed_out = tokio::time::timeout(Duration::from_millis(10), create).await;
    assert!(timed_out.is_err());
    service.latency_ms.store(0, Ordering::SeqCst);

    // The write landed on the server; the list must catch up with it
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = boards.settled().await;
    assert_eq!(
      after.state.data().map(names),
      Some(vec!["Platform Launch", "Roadmap"])
    );
    assert_eq!(service.calls("/boards"), 2);
  }

  #[tokio::test]
  async fn test_tasks_fetched_on_every_invocation() {
    let service = FakeBoardService::with_boards(&["Platform Launch"]);
    let gateway = gateway(&service);

    let first = gateway
      .fetch_tasks_by_collection("Platform Launch")
      .await
      .unwrap();
    assert_eq!(first.task_count(), 1);
    assert_eq!(first.collections[0].tasks[0].title, "Plan Platform Launch");

    let mut live = gateway.get_tasks_by_collection("Platform Launch");
    live.settled().await;
    gateway
      .fetch_tasks_by_collection("Platform Launch")
      .await
      .unwrap();

    assert_eq!(service.calls("/boards/Platform%20Launch/gettasks"), 3);
  }

  #[tokio::test]
  async fn test_board_mutations_do_not_refresh_tasks() {
    let service = FakeBoardService::with_boards(&["Platform Launch"]);
    let gateway = gateway(&service);

    let mut tasks = gateway.get_tasks_by_collection("Platform Launch");
    assert!(tasks.settled().await.state.is_success());

    gateway
      .delete_board(&BoardDescriptor::named("Platform Launch"))
      .await
      .unwrap();

    // Still showing the tasks of a board that no longer exists
    let snap = tasks.snapshot();
    assert!(!snap.is_fetching);
    assert!(snap.state.is_success());
    assert_eq!(service.calls("/boards/Platform%20Launch/gettasks"), 1);

    // An explicit refetch sees the deletion
    tasks.refetch();
    let snap = tasks.settled().await;
    assert_eq!(snap.state.error().and_then(|e| e.server_message()), Some("Board not found"));
  }

  #[tokio::test]
  async fn test_network_failure_surfaces_as_error() {
    let service = FakeBoardService::with_boards(&["Platform Launch"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    assert!(boards.settled().await.state.is_success());

    service.offline.store(true, Ordering::SeqCst);
    boards.refetch();

    let snap = boards.settled().await;
    assert_eq!(
      snap.state,
      QueryState::Error(TransportError::network("connection refused"))
    );
    assert!(snap.state.data().is_none());

    // A new subscriber retries instead of getting the cached error
    service.offline.store(false, Ordering::SeqCst);
    let boards = gateway.fetch_all_boards().await.unwrap();
    assert_eq!(names(&boards), ["Platform Launch"]);
  }

  #[tokio::test]
  async fn test_server_and_decode_failures() {
    let service = FakeBoardService::with_boards(&[]);
    let gateway = gateway(&service);

    let err = gateway.fetch_tasks_by_collection("Missing").await.unwrap_err();
    assert!(matches!(err, TransportError::ServerError { status: 404, .. }));

    service.override_path("/boards", 200, "[1, 2, 3]");
    let err = gateway.fetch_all_boards().await.unwrap_err();
    assert!(matches!(err, TransportError::DecodeFailure { .. }));
  }

  #[tokio::test]
  async fn test_mutation_tracker_invalidates() {
    let service = FakeBoardService::with_boards(&["Platform Launch", "Marketing Plan"]);
    let gateway = gateway(&service);

    let mut boards = gateway.get_all_boards();
    boards.settled().await;

    let mut create = gateway.create_new_board_mutation();
    create.trigger(BoardDescriptor::named("Roadmap"));
    assert!(create.is_loading());
    assert!(create.settled().await.is_success());

    let after = boards.settled().await;
    assert_eq!(after.state.data().map(BoardList::len), Some(3));

    let mut delete = gateway.delete_board_mutation();
    delete.trigger(BoardDescriptor::named("Roadmap"));
    assert!(delete.settled().await.is_success());
    assert_eq!(boards.settled().await.state.data().map(BoardList::len), Some(2));
  }

  #[tokio::test]
  async fn test_unsubscribed_board_list_refetches_lazily() {
    let service = FakeBoardService::with_boards(&["Platform Launch"]);
    let gateway = gateway(&service);

    gateway.fetch_all_boards().await.unwrap();
    gateway
      .create_new_board(&BoardDescriptor::named("Roadmap"))
      .await
      .unwrap();
    tokio::task::yield_now().await;
    assert_eq!(service.calls("/boards"), 1);

    let boards = gateway.fetch_all_boards().await.unwrap();
    assert_eq!(names(&boards), ["Platform Launch", "Roadmap"]);
    assert_eq!(service.calls("/boards"), 2);
  }
}
