//! Drives the move-probability model, the opening book and the search engine
//! for the node under inspection and writes their results into the graph.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chess_core::rules::legal_move_count;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::engines::{EngineStatus, ModelStatus, MoveModel, OpeningBook, SearchEngine};
use crate::evaluation::MoveProbabilities;
use crate::graph::{NodeId, PositionGraph};
use crate::skill::SkillLevels;

/// Graph handle shared between the scheduler's tasks and readers.
pub type SharedGraph = Arc<Mutex<PositionGraph>>;

/// How one analysis attempt for a node ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Results were written
    Completed,
    /// Nothing to do: data already present or the position is being analyzed
    Skipped,
    /// Source never became ready within the readiness bound
    Abandoned,
    /// Source or graph reported an error; logged only
    Failed,
}

/// State shared by the scheduler and the tasks it spawns.
struct Inner<M, S, B> {
    graph: SharedGraph,
    model: Arc<M>,
    engine: Arc<S>,
    book: Arc<B>,
    levels: SkillLevels,
    target_depth: u32,
    readiness_poll: Duration,
    readiness_timeout: Duration,
    opening_book_plies: u32,
    in_progress: Arc<StdMutex<HashSet<String>>>,
}

struct ActiveSearch {
    node: NodeId,
    handle: JoinHandle<AnalysisOutcome>,
}

pub struct EvaluationScheduler<M, S, B> {
    inner: Arc<Inner<M, S, B>>,
    active_search: Option<ActiveSearch>,
    model_tasks: Vec<JoinHandle<AnalysisOutcome>>,
}

impl<M, S, B> EvaluationScheduler<M, S, B>
where
    M: MoveModel + 'static,
    S: SearchEngine + 'static,
    B: OpeningBook + 'static,
{
    pub fn new(
        graph: SharedGraph,
        model: Arc<M>,
        engine: Arc<S>,
        book: Arc<B>,
        levels: SkillLevels,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                graph,
                model,
                engine,
                book,
                levels,
                target_depth: config.target_depth,
                readiness_poll: config.readiness_poll,
                readiness_timeout: config.readiness_timeout,
                opening_book_plies: config.opening_book_plies,
                in_progress: Arc::new(StdMutex::new(HashSet::new())),
            }),
            active_search: None,
            model_tasks: Vec::new(),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.inner.graph
    }

    /// Node whose search stream is currently running, if any.
    pub fn inspected(&self) -> Option<NodeId> {
        self.active_search.as_ref().map(|s| s.node)
    }

    /// Make `node` the node of interest.
    ///
    /// Stops the previous node's search stream, then starts the model and
    /// search analyses for `node` in the background. A model call still in
    /// flight for the previous node is left to finish and write its result.
    pub async fn inspect(&mut self, node: NodeId) {
        if let Some(previous) = self.active_search.take() {
            if previous.node != node || previous.handle.is_finished() {
                debug!(node = %previous.node, "Stopping previous search");
                self.inner.engine.stop_evaluation().await;
                previous.handle.abort();
            } else {
                // Same node, stream still running
                self.active_search = Some(previous);
                return;
            }
        }

        self.model_tasks.retain(|task| !task.is_finished());

        let inner = Arc::clone(&self.inner);
        self.model_tasks
            .push(tokio::spawn(async move { inner.evaluate_move_probabilities(node).await }));

        let inner = Arc::clone(&self.inner);
        self.active_search = Some(ActiveSearch {
            node,
            handle: tokio::spawn(async move { inner.run_search(node).await }),
        });
    }

    /// Wait for every background analysis started so far.
    pub async fn settle(&mut self) -> Vec<AnalysisOutcome> {
        let mut handles: Vec<JoinHandle<AnalysisOutcome>> = self.model_tasks.drain(..).collect();
        if let Some(active) = self.active_search.take() {
            handles.push(active.handle);
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_cancelled() => outcomes.push(AnalysisOutcome::Skipped),
                Err(e) => {
                    warn!(error = %e, "Analysis task panicked");
                    outcomes.push(AnalysisOutcome::Failed);
                }
            }
        }
        outcomes
    }

    /// Stop the active stream without starting a new one.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active_search.take() {
            self.inner.engine.stop_evaluation().await;
            active.handle.abort();
        }
    }

    /// Query the model (and the book for early plies) for `node`.
    pub async fn evaluate_move_probabilities(&self, node: NodeId) -> AnalysisOutcome {
        self.inner.evaluate_move_probabilities(node).await
    }

    /// Consume the search stream for `node` until it ends or reaches the
    /// target depth.
    pub async fn run_search(&self, node: NodeId) -> AnalysisOutcome {
        self.inner.run_search(node).await
    }

    /// FENs currently being evaluated by the model.
    pub fn in_progress(&self) -> Vec<String> {
        match self.inner.in_progress.lock() {
            Ok(set) => set.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl<M, S, B> Inner<M, S, B>
where
    M: MoveModel,
    S: SearchEngine,
    B: OpeningBook,
{
    async fn evaluate_move_probabilities(&self, node: NodeId) -> AnalysisOutcome {
        let (fen, ply) = {
            let graph = self.graph.lock().await;
            match graph.get(node) {
                Ok(n) if n.move_probabilities.is_some() => return AnalysisOutcome::Skipped,
                Ok(n) => (n.fen.clone(), n.ply),
                Err(e) => {
                    warn!(error = %e, "Cannot evaluate move probabilities");
                    return AnalysisOutcome::Failed;
                }
            }
        };

        let Some(_guard) = InProgressGuard::acquire(&self.in_progress, &fen) else {
            debug!(fen = %fen, "Position already being analyzed");
            return AnalysisOutcome::Skipped;
        };

        let model = &self.model;
        if !wait_until_ready(
            || model.status() == ModelStatus::Ready,
            self.readiness_poll,
            self.readiness_timeout,
        )
        .await
        {
            warn!(fen = %fen, status = ?model.status(), "Move model not ready, abandoning node");
            return AnalysisOutcome::Abandoned;
        }

        let levels = self.levels.levels().to_vec();
        let fens = vec![fen.clone(); levels.len()];
        let thresholds = vec![0.0; levels.len()];

        let batch = match model.batch_evaluate(&fens, &levels, &thresholds).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(fen = %fen, error = %e, "Move model evaluation failed");
                return AnalysisOutcome::Failed;
            }
        };
        if batch.results.len() != levels.len() {
            warn!(
                expected = levels.len(),
                received = batch.results.len(),
                "Move model returned a partial batch"
            );
        }
        debug!(fen = %fen, time = batch.time, "Move model batch evaluated");

        let mut probabilities: MoveProbabilities = levels.into_iter().zip(batch.results).collect();

        if ply < self.opening_book_plies {
            match self.book.get_book_moves(&fen).await {
                Ok(book) => {
                    for (level, policy) in book {
                        if policy.is_empty() {
                            continue;
                        }
                        if let Some(entry) = probabilities.get_mut(&level) {
                            entry.policy = policy;
                        }
                    }
                }
                Err(e) => warn!(fen = %fen, error = %e, "Opening book lookup failed"),
            }
        }

        match self.graph.lock().await.set_move_probabilities(node, probabilities) {
            Ok(()) => AnalysisOutcome::Completed,
            Err(e) => {
                debug!(error = %e, "Node removed before model result arrived");
                AnalysisOutcome::Failed
            }
        }
    }

    async fn run_search(&self, node: NodeId) -> AnalysisOutcome {
        let fen = {
            let graph = self.graph.lock().await;
            match graph.get(node) {
                Ok(n) if n.search_depth() >= self.target_depth => return AnalysisOutcome::Skipped,
                Ok(n) => n.fen.clone(),
                Err(e) => {
                    warn!(error = %e, "Cannot search");
                    return AnalysisOutcome::Failed;
                }
            }
        };

        let moves = legal_move_count(&fen);
        if moves == 0 {
            debug!(fen = %fen, "No legal moves to search");
            return AnalysisOutcome::Skipped;
        }

        let engine = &self.engine;
        if !wait_until_ready(
            || engine.status() == EngineStatus::Ready,
            self.readiness_poll,
            self.readiness_timeout,
        )
        .await
        {
            warn!(fen = %fen, status = ?engine.status(), "Search engine not ready, abandoning node");
            return AnalysisOutcome::Abandoned;
        }

        let Some(mut stream) = engine.stream_evaluations(&fen, moves).await else {
            warn!(fen = %fen, "Search engine did not start a stream");
            return AnalysisOutcome::Failed;
        };

        while let Some(evaluation) = stream.next().await {
            let depth = evaluation.depth;
            let written = self.graph.lock().await.set_search_evaluation(node, evaluation);
            match written {
                Ok(accepted) => debug!(fen = %fen, depth, accepted, "Search evaluation received"),
                Err(e) => {
                    debug!(error = %e, "Node removed during search");
                    engine.stop_evaluation().await;
                    return AnalysisOutcome::Failed;
                }
            }

            if depth >= self.target_depth {
                info!(fen = %fen, depth, "Target depth reached");
                engine.stop_evaluation().await;
                break;
            }
        }
        AnalysisOutcome::Completed
    }
}

/// Poll `ready` every `poll` until it holds or `timeout` has passed.
pub async fn wait_until_ready(mut ready: impl FnMut() -> bool, poll: Duration, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(poll).await;
    }
}

/// Membership in the in-progress set, released on drop.
struct InProgressGuard {
    set: Arc<StdMutex<HashSet<String>>>,
    fen: String,
}

impl InProgressGuard {
    fn acquire(set: &Arc<StdMutex<HashSet<String>>>, fen: &str) -> Option<Self> {
        let inserted = set.lock().ok()?.insert(fen.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            fen: fen.to_string(),
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.fen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_times_out() {
        let start = Instant::now();
        let mut polls = 0;
        let ready = wait_until_ready(
            || {
                polls += 1;
                false
            },
            Duration::from_millis(100),
            Duration::from_secs(3),
        )
        .await;

        assert!(!ready);
        assert_eq!(polls, 31);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_millis(3200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_succeeds_late() {
        let mut polls = 0;
        let ready = wait_until_ready(
            || {
                polls += 1;
                polls == 5
            },
            Duration::from_millis(100),
            Duration::from_secs(3),
        )
        .await;
        assert!(ready);
    }

    #[test]
    fn test_in_progress_guard() {
        let set = Arc::new(StdMutex::new(HashSet::new()));
        let guard = InProgressGuard::acquire(&set, "fen").unwrap();
        assert!(InProgressGuard::acquire(&set, "fen").is_none());
        assert!(InProgressGuard::acquire(&set, "other").is_some());
        drop(guard);
        assert!(InProgressGuard::acquire(&set, "fen").is_some());
    }
}
