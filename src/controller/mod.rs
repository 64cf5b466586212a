//! Incremental search and pagination controller.
//!
//! [`SearchController`] is a single-owner state machine. Fetches run on spawned
//! tasks and report back over a channel; their results only touch state inside
//! [`SearchController::step`], on the owner's task. Every fresh search bumps a
//! generation counter and completions from an older generation are dropped, so
//! a slow response can never overwrite the results of a newer query.

mod sink;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::HttpError;
use crate::sources::universities::UniversitySearch;
use crate::transform::university::{self, RowId, UniversityRow};

pub use sink::{FailureSink, TracingSink};
pub use state::{SearchSnapshot, ViewState};

use state::SearchState;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);
const DEFAULT_LOOKBACK: usize = 5;
const COMMAND_BUFFER: usize = 64;
const ABORTED_SEARCH_MESSAGE: &str = "Search stopped unexpectedly";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Quiet period after the last edit before the query is searched.
    pub debounce: Duration,
    /// A row this close to the end of the list triggers the next page.
    pub lookback: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

/// The only ways the presentation layer changes controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetQuery(String),
    ScrolledNear(RowId),
}

/// What a single [`SearchController::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing pending: no debounce timer and no fetch in flight.
    Nothing,
    /// The debounce window elapsed but the query did not change.
    Unchanged,
    SearchStarted(String),
    Replaced { rows: usize },
    SearchFailed,
    Appended { page: u32, rows: usize },
    LoadMoreFailed { page: u32 },
    /// A completion that belonged to an older search was dropped.
    Discarded,
}

type FetchResult = Result<Vec<UniversityRow>, HttpError>;

enum Outcome {
    Fetched(FetchResult),
    /// Cancelled before the fetch finished.
    Cancelled,
    /// The fetch task panicked.
    Aborted,
}

enum Completion {
    Search {
        generation: u64,
        query: String,
        outcome: Outcome,
    },
    More {
        generation: u64,
        query: String,
        page: u32,
        outcome: Outcome,
    },
}

pub struct SearchController<S> {
    service: Arc<S>,
    config: ControllerConfig,
    state: SearchState,
    generation: u64,
    debounce_deadline: Option<Instant>,
    in_flight_search: Option<CancellationToken>,
    outstanding: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<SearchSnapshot>,
    sink: Arc<dyn FailureSink>,
}

impl<S: UniversitySearch + 'static> SearchController<S> {
    pub fn new(service: S, config: ControllerConfig) -> Self {
        Self::with_shared(Arc::new(service), config)
    }

    pub fn with_shared(service: Arc<S>, config: ControllerConfig) -> Self {
        let state = SearchState::default();
        let (snapshots, _) = watch::channel(state.snapshot());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            service,
            config,
            state,
            generation: 0,
            debounce_deadline: None,
            in_flight_search: None,
            outstanding: 0,
            completions_tx,
            completions_rx,
            snapshots,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.state.snapshot()
    }

    /// True while a debounce timer is armed or a fetch has not reported back.
    pub fn is_busy(&self) -> bool {
        self.debounce_deadline.is_some() || self.outstanding > 0
    }

    /// First load: a fresh search for the current debounced query.
    pub fn start(&mut self) {
        let query = self.state.debounced_query.clone();
        self.fresh_search(query);
    }

    pub fn set_query(&mut self, text: impl Into<String>) {
        self.state.query = text.into();
        self.debounce_deadline = Some(Instant::now() + self.config.debounce);
        self.publish();
    }

    /// Called when `row_id` is about to become visible.
    pub fn notify_scrolled_near(&mut self, row_id: &RowId) {
        let Some(index) = self.state.rows.iter().position(|row| &row.id == row_id) else {
            trace!(%row_id, "Scrolled near a row that is not loaded");
            return;
        };
        if index + self.config.lookback < self.state.rows.len() {
            return;
        }
        self.load_more();
    }

    /// Cancels the in-flight fresh search, if any.
    pub fn shutdown(&mut self) {
        if let Some(token) = self.in_flight_search.take() {
            token.cancel();
        }
    }

    /// Waits for the next debounce expiry or fetch completion and applies it.
    pub async fn step(&mut self) -> Transition {
        if !self.is_busy() {
            return Transition::Nothing;
        }
        let deadline = self.debounce_deadline;
        tokio::select! {
            biased;
            Some(completion) = self.completions_rx.recv() => {
                self.outstanding = self.outstanding.saturating_sub(1);
                self.apply(completion)
            }
            () = debounce_elapsed(deadline) => {
                self.debounce_deadline = None;
                self.settle_query()
            }
            else => Transition::Nothing,
        }
    }

    /// Event loop: first load, then commands and completions until every
    /// command sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.start();
        loop {
            let busy = self.is_busy();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetQuery(text)) => self.set_query(text),
                    Some(Command::ScrolledNear(row_id)) => self.notify_scrolled_near(&row_id),
                    None => break,
                },
                transition = self.step(), if busy => {
                    trace!(?transition, "Controller transition");
                }
            }
        }
        self.shutdown();
        debug!("Search controller stopped");
    }

    fn settle_query(&mut self) -> Transition {
        // Requests trim the query, so whitespace-only edits change nothing.
        if self.state.query.trim() == self.state.debounced_query.trim() {
            return Transition::Unchanged;
        }
        self.state.debounced_query = self.state.query.clone();
        let query = self.state.debounced_query.clone();
        self.fresh_search(query.clone());
        Transition::SearchStarted(query)
    }

    fn fresh_search(&mut self, query: String) {
        self.shutdown();
        self.generation += 1;
        let generation = self.generation;

        self.state.page = 1;
        self.state.has_more = true;
        self.state.is_loading_initial = true;
        // An in-flight load-more belongs to the previous generation now.
        self.state.is_loading_more = false;
        self.state.failure = None;
        debug!(query, generation, "Starting fresh search");

        let token = CancellationToken::new();
        self.in_flight_search = Some(token.clone());
        let service = Arc::clone(&self.service);
        let search_query = query.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => Outcome::Cancelled,
                result = fetch_rows(service.as_ref(), &search_query, 1) => Outcome::Fetched(result),
            }
        });
        self.report(task, move |outcome| Completion::Search {
            generation,
            query,
            outcome,
        });
        self.publish();
    }

    fn load_more(&mut self) {
        if !self.state.can_load_more() {
            trace!(
                has_more = self.state.has_more,
                is_loading_initial = self.state.is_loading_initial,
                is_loading_more = self.state.is_loading_more,
                "Load more skipped"
            );
            return;
        }
        self.state.is_loading_more = true;
        self.state.page += 1;

        let generation = self.generation;
        let page = self.state.page;
        let query = self.state.debounced_query.clone();
        debug!(query, page, generation, "Loading more results");

        let service = Arc::clone(&self.service);
        let more_query = query.clone();
        let task = tokio::spawn(async move {
            Outcome::Fetched(fetch_rows(service.as_ref(), &more_query, page).await)
        });
        self.report(task, move |outcome| Completion::More {
            generation,
            query,
            page,
            outcome,
        });
        self.publish();
    }

    /// Sends exactly one completion for `task`, even if it panics.
    fn report(
        &mut self,
        task: JoinHandle<Outcome>,
        completion: impl FnOnce(Outcome) -> Completion + Send + 'static,
    ) {
        let tx = self.completions_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let outcome = task.await.unwrap_or_else(|err| {
                warn!(error = %err, "Fetch task ended without a result");
                Outcome::Aborted
            });
            let _ = tx.send(completion(outcome));
        });
    }

    fn apply(&mut self, completion: Completion) -> Transition {
        match completion {
            Completion::Search {
                generation,
                query,
                outcome,
            } => self.apply_search(generation, &query, outcome),
            Completion::More {
                generation,
                query,
                page,
                outcome,
            } => self.apply_more(generation, &query, page, outcome),
        }
    }

    fn apply_search(
        &mut self,
        generation: u64,
        query: &str,
        outcome: Outcome,
    ) -> Transition {
        if generation != self.generation || query != self.state.debounced_query {
            debug!(
                query,
                generation,
                current = self.generation,
                "Discarding stale search response"
            );
            return Transition::Discarded;
        }

        self.in_flight_search = None;
        self.state.is_loading_initial = false;
        let transition = match outcome {
            // Only `shutdown` cancels the current generation.
            Outcome::Cancelled => Transition::Discarded,
            Outcome::Fetched(Ok(rows)) => {
                let count = rows.len();
                debug!(query, generation, rows = count, "Search results applied");
                self.state.has_more = !rows.is_empty();
                self.state.rows = rows;
                self.state.failure = None;
                self.state.settled = true;
                Transition::Replaced { rows: count }
            }
            Outcome::Fetched(Err(err)) => {
                warn!(
                    query,
                    generation,
                    kind = err.kind(),
                    error = %err,
                    cause = ?std::error::Error::source(&err),
                    "Search failed"
                );
                self.fail_search(err.to_string())
            }
            Outcome::Aborted => self.fail_search(ABORTED_SEARCH_MESSAGE.to_string()),
        };
        self.publish();
        transition
    }

    fn apply_more(
        &mut self,
        generation: u64,
        query: &str,
        page: u32,
        outcome: Outcome,
    ) -> Transition {
        if generation != self.generation {
            debug!(
                query,
                page,
                generation,
                current = self.generation,
                "Discarding load-more response from an older search"
            );
            return Transition::Discarded;
        }

        self.state.is_loading_more = false;
        let transition = match outcome {
            Outcome::Fetched(Ok(rows)) => {
                let count = rows.len();
                self.state.has_more = !rows.is_empty();
                self.state.rows.extend(rows);
                Transition::Appended { page, rows: count }
            }
            Outcome::Fetched(Err(err)) => {
                self.state.page = page.saturating_sub(1).max(1);
                self.sink.load_more_failed(query, page, &err);
                Transition::LoadMoreFailed { page }
            }
            Outcome::Cancelled | Outcome::Aborted => {
                warn!(query, page, "Loading more results ended without a result");
                self.state.page = page.saturating_sub(1).max(1);
                Transition::LoadMoreFailed { page }
            }
        };
        self.publish();
        transition
    }

    fn fail_search(&mut self, message: String) -> Transition {
        self.state.page = 1;
        // Kept rows belong to the previous query; paging resumes after the
        // next successful search.
        self.state.has_more = false;
        self.state.failure = Some(message);
        Transition::SearchFailed
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}

impl<S> Drop for SearchController<S> {
    fn drop(&mut self) {
        if let Some(token) = self.in_flight_search.take() {
            token.cancel();
        }
    }
}

async fn fetch_rows<S: UniversitySearch + ?Sized>(
    service: &S,
    query: &str,
    page: u32,
) -> FetchResult {
    let universities = service.search(query, page).await?;
    Ok(universities.iter().map(university::from_university).collect())
}

async fn debounce_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable front end for a controller running on its own task.
///
/// The loop stops, cancelling any in-flight fresh search, once every handle
/// is dropped.
#[derive(Clone)]
pub struct SearchHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SearchSnapshot>,
}

impl SearchHandle {
    /// Spawns `controller.run` on the current tokio runtime.
    pub fn spawn<S: UniversitySearch + 'static>(controller: SearchController<S>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let snapshots = controller.subscribe();
        tokio::spawn(controller.run(rx));
        Self {
            commands,
            snapshots,
        }
    }

    /// Returns `false` once the controller loop has stopped.
    pub async fn set_query(&self, text: impl Into<String>) -> bool {
        self.commands
            .send(Command::SetQuery(text.into()))
            .await
            .is_ok()
    }

    /// Returns `false` once the controller loop has stopped.
    pub async fn notify_scrolled_near(&self, row_id: RowId) -> bool {
        self.commands
            .send(Command::ScrolledNear(row_id))
            .await
            .is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.snapshots.borrow().clone()
    }
}
