//! Observable query and mutation states.
//!
//! Inspired by TanStack Query / RTK Query: a UI renders from a `QueryState`
//! and treats loading, error and success as distinct states.
//!
//! # Example
//!
//! ```ignore
//! let mut boards = gateway.get_all_boards();
//!
//! // In event loop tick
//! if boards.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match boards.snapshot().state {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(&data),
//!     QueryState::Error(e) => render_error(&e),
//!     QueryState::Idle => {}
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// The state of a query or mutation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Not started yet
  Idle,
  /// First request in flight, no data to show
  Loading,
  /// Completed successfully
  Success(T),
  /// Failed; the cause distinguishes network, server and decode failures
  Error(TransportError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&TransportError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  /// Terminal outcome, or `None` while idle or loading.
  pub fn into_result(self) -> Option<Result<T, TransportError>> {
    match self {
      QueryState::Success(data) => Some(Ok(data)),
      QueryState::Error(e) => Some(Err(e)),
      QueryState::Idle | QueryState::Loading => None,
    }
  }
}

/// What a subscriber observes for one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
  pub state: QueryState<T>,
  /// A request is in flight. True during the first load and during
  /// background refetches that keep showing the previous data.
  pub is_fetching: bool,
  /// When the last successful response arrived
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> QuerySnapshot<T> {
  pub fn idle() -> Self {
    Self {
      state: QueryState::Idle,
      is_fetching: false,
      fetched_at: None,
    }
  }

  pub fn is_settled(&self) -> bool {
    !self.is_fetching && !self.state.is_loading()
  }
}

type MutationFn<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, TransportError>> + Send + Sync>;

/// Tracks one mutation endpoint the way a UI mutation hook does.
///
/// `trigger` starts the request in the background; the event loop calls
/// `poll` to pick up the result. Cache invalidation is done by the mutation
/// function itself, not by the tracker.
pub struct Mutation<A, R> {
  state: QueryState<R>,
  run: MutationFn<A, R>,
  receiver: Option<mpsc::UnboundedReceiver<Result<R, TransportError>>>,
}

impl<A: Send + 'static, R: Send + 'static> Mutation<A, R> {
  pub fn new<F, Fut>(run: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TransportError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      run: Arc::new(move |arg| run(arg).boxed()),
      receiver: None,
    }
  }

  pub fn state(&self) -> &QueryState<R> {
    &self.state
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Start the mutation. A result still pending from an earlier trigger is
  /// dropped; the earlier request itself still runs to completion.
  pub fn trigger(&mut self, arg: A) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.run)(arg);
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }

  /// Poll for the result of a pending trigger.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.apply(result);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.apply(Err(TransportError::network("mutation task ended without a result")));
        true
      }
    }
  }

  /// Wait for the pending trigger, if any, and return the resulting state.
  pub async fn settled(&mut self) -> &QueryState<R> {
    if let Some(receiver) = &mut self.receiver {
      let result = receiver
        .recv()
        .await
        .unwrap_or_else(|| Err(TransportError::network("mutation task ended without a result")));
      self.apply(result);
    }
    &self.state
  }

  /// Forget the last outcome and go back to `Idle`.
  pub fn reset(&mut self) {
    self.receiver = None;
    self.state = QueryState::Idle;
  }

  fn apply(&mut self, result: Result<R, TransportError>) {
    self.receiver = None;
    self.state = match result {
      Ok(data) => QueryState::Success(data),
      Err(e) => QueryState::Error(e),
    };
  }
}

impl<A, R: std::fmt::Debug> std::fmt::Debug for Mutation<A, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("state", &self.state)
      .field("pending", &self.receiver.is_some())
      .finish_non_exhaustive()
  }
}
