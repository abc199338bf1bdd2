#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use position_analysis::engines::{
    BatchEvaluation, BookMoves, EngineStatus, ModelStatus, MoveModel, OpeningBook, SearchEngine,
};
use position_analysis::evaluation::{LevelEvaluation, MovePolicy, SearchEvaluation};
use position_analysis::{AnalysisConfig, AnalysisError, EvaluationScheduler, PositionGraph, SharedGraph, SkillLevels};

pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
pub const AFTER_D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq - 0 1";

pub fn policy(entries: &[(&str, f64)]) -> MovePolicy {
    entries.iter().map(|(m, p)| (m.to_string(), *p)).collect()
}

pub fn cp_table(entries: &[(&str, i32)]) -> BTreeMap<String, i32> {
    entries.iter().map(|(m, c)| (m.to_string(), *c)).collect()
}

/// White-to-move evaluation of the start position at `depth`.
pub fn start_eval(depth: u32) -> SearchEvaluation {
    SearchEvaluation::new(
        depth,
        "e2e4",
        cp_table(&[("e2e4", 35), ("d2d4", 30), ("g2g4", -140)]),
        true,
    )
    .with_win_rates(true)
}

/// Move model answering every level with the same policy.
pub struct FakeModel {
    pub status: StdMutex<ModelStatus>,
    pub policy: MovePolicy,
    pub value: f64,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeModel {
    pub fn ready(policy: MovePolicy) -> Self {
        Self {
            status: StdMutex::new(ModelStatus::Ready),
            policy,
            value: 0.55,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(mut self, status: ModelStatus) -> Self {
        self.status = StdMutex::new(status);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MoveModel for FakeModel {
    fn status(&self) -> ModelStatus {
        *self.status.lock().unwrap()
    }

    async fn batch_evaluate(
        &self,
        fens: &[String],
        levels: &[String],
        _thresholds: &[f64],
    ) -> Result<BatchEvaluation, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(fens.len(), levels.len());
        assert!(fens.windows(2).all(|w| w[0] == w[1]));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(BatchEvaluation {
            results: levels
                .iter()
                .map(|_| LevelEvaluation { value: self.value, policy: self.policy.clone() })
                .collect(),
            time: 0.01,
        })
    }
}

/// Search engine replaying a fixed list of evaluations.
pub struct FakeEngine {
    pub status: StdMutex<EngineStatus>,
    pub evaluations: Vec<SearchEvaluation>,
    /// Keep the stream open after the scripted items, like `go infinite`
    pub hold_open: bool,
    pub streams: AtomicUsize,
    pub stops: AtomicUsize,
    pub last_request: StdMutex<Option<(String, usize)>>,
}

impl FakeEngine {
    pub fn scripted(evaluations: Vec<SearchEvaluation>) -> Self {
        Self {
            status: StdMutex::new(EngineStatus::Ready),
            evaluations,
            hold_open: false,
            streams: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_request: StdMutex::new(None),
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn with_status(mut self, status: EngineStatus) -> Self {
        self.status = StdMutex::new(status);
        self
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SearchEngine for FakeEngine {
    fn status(&self) -> EngineStatus {
        *self.status.lock().unwrap()
    }

    async fn stream_evaluations(
        &self,
        fen: &str,
        legal_move_count: usize,
    ) -> Option<BoxStream<'static, SearchEvaluation>> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((fen.to_string(), legal_move_count));
        let items = stream::iter(self.evaluations.clone());
        if self.hold_open {
            Some(items.chain(stream::pending()).boxed())
        } else {
            Some(items.boxed())
        }
    }

    async fn stop_evaluation(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeBook {
    pub moves: BookMoves,
    pub lookups: AtomicUsize,
}

impl FakeBook {
    pub fn with_level(level: &str, moves: MovePolicy) -> Self {
        let mut book = Self::default();
        book.moves.insert(level.to_string(), moves);
        book
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl OpeningBook for FakeBook {
    async fn get_book_moves(&self, _fen: &str) -> Result<BookMoves, AnalysisError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.moves.clone())
    }
}

pub type FakeScheduler = EvaluationScheduler<FakeModel, FakeEngine, FakeBook>;

pub fn shared_graph(graph: PositionGraph) -> SharedGraph {
    Arc::new(Mutex::new(graph))
}

pub fn scheduler(
    graph: &SharedGraph,
    model: FakeModel,
    engine: FakeEngine,
    book: FakeBook,
) -> (FakeScheduler, Arc<FakeModel>, Arc<FakeEngine>, Arc<FakeBook>) {
    let model = Arc::new(model);
    let engine = Arc::new(engine);
    let book = Arc::new(book);
    let scheduler = EvaluationScheduler::new(
        Arc::clone(graph),
        Arc::clone(&model),
        Arc::clone(&engine),
        Arc::clone(&book),
        SkillLevels::default(),
        &AnalysisConfig::default(),
    );
    (scheduler, model, engine, book)
}
