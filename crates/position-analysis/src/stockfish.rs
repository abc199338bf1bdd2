//! Stockfish engine wrapper using UCI protocol (async I/O)
//!
//! Runs `go infinite` with one MultiPV line per legal move and turns each
//! completed depth into a [`SearchEvaluation`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chess_core::rules::Side;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::engines::{EngineStatus, SearchEngine};
use crate::error::AnalysisError;
use crate::evaluation::SearchEvaluation;
use crate::win_rate::mate_to_cp;

/// One scored line of a MultiPV `info` report
#[derive(Debug, Clone, PartialEq)]
pub struct PvLine {
    pub depth: u32,
    /// 1-based MultiPV index
    pub multipv: usize,
    /// Centipawns from the side to move's perspective (mates converted)
    pub cp: i32,
    /// Principal variation moves
    pub pv: Vec<String>,
}

type Output = Arc<Mutex<BufReader<ChildStdout>>>;

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Output,
    failed: Arc<AtomicBool>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let mut process = Command::new(&config.stockfish_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnalysisError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AnalysisError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| AnalysisError::Stockfish("Stockfish stdout unavailable".into()))?;

        let engine = Self {
            process: Mutex::new(process),
            stdin: Mutex::new(stdin),
            stdout: Arc::new(Mutex::new(BufReader::new(stdout))),
            failed: Arc::new(AtomicBool::new(false)),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        // Configure for analysis
        engine
            .send(&format!("setoption name Threads value {}", config.stockfish_threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", config.stockfish_hash_mb))
            .await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&self, cmd: &str) -> Result<(), AnalysisError> {
        debug!(cmd, "SF <");
        let mut stdin = self.stdin.lock().await;
        let result = async {
            stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        result.map_err(|e| {
            self.failed.store(true, Ordering::Relaxed);
            AnalysisError::Stockfish(format!("Failed to write to Stockfish: {e}"))
        })
    }

    /// Wait for a specific response line, discarding everything before it
    async fn wait_for(&self, expected: &str) -> Result<(), AnalysisError> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| AnalysisError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
            if read == 0 {
                self.failed.store(true, Ordering::Relaxed);
                return Err(AnalysisError::Stockfish("Stockfish closed its output".into()));
            }
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    async fn start_search(&self, fen: &str, multipv: usize) -> Result<OwnedMutexGuard<BufReader<ChildStdout>>, AnalysisError> {
        // Finish any search still running and drain its output
        self.send("stop").await?;
        self.send("isready").await?;
        self.wait_for("readyok").await?;

        self.send(&format!("setoption name MultiPV value {multipv}")).await?;
        self.send(&format!("position fen {fen}")).await?;
        let stdout = Arc::clone(&self.stdout).lock_owned().await;
        self.send("go infinite").await?;
        Ok(stdout)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&self) {
        let _ = self.send("quit").await;
        let _ = self.process.lock().await.wait().await;
    }
}

impl SearchEngine for StockfishEngine {
    fn status(&self) -> EngineStatus {
        if self.failed.load(Ordering::Relaxed) {
            EngineStatus::Error
        } else {
            EngineStatus::Ready
        }
    }

    async fn stream_evaluations(
        &self,
        fen: &str,
        legal_move_count: usize,
    ) -> Option<BoxStream<'static, SearchEvaluation>> {
        if legal_move_count == 0 {
            return None;
        }
        let stdout = match self.start_search(fen, legal_move_count).await {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(fen, error = %e, "Failed to start search");
                return None;
            }
        };

        let state = StreamState {
            stdout,
            failed: Arc::clone(&self.failed),
            white_to_move: Side::from_fen(fen).is_white(),
            multipv: legal_move_count,
            collector: DepthCollector::default(),
        };
        Some(stream::unfold(state, next_evaluation).boxed())
    }

    async fn stop_evaluation(&self) {
        if let Err(e) = self.send("stop").await {
            warn!(error = %e, "Failed to stop search");
        }
    }
}

struct StreamState {
    stdout: OwnedMutexGuard<BufReader<ChildStdout>>,
    failed: Arc<AtomicBool>,
    white_to_move: bool,
    multipv: usize,
    collector: DepthCollector,
}

/// Read `info` lines until a depth completes; ends the stream at `bestmove`.
async fn next_evaluation(mut state: StreamState) -> Option<(SearchEvaluation, StreamState)> {
    let mut line = String::new();
    loop {
        line.clear();
        match state.stdout.read_line(&mut line).await {
            Ok(0) | Err(_) => {
                state.failed.store(true, Ordering::Relaxed);
                return None;
            }
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.starts_with("bestmove") {
            debug!(line = trimmed, "SF >");
            return None;
        }
        let Some(pv_line) = parse_info_line(trimmed) else {
            continue;
        };
        if let Some(evaluation) = state.collector.push(pv_line, state.multipv, state.white_to_move) {
            return Some((evaluation, state));
        }
    }
}

/// Groups MultiPV lines of one depth into a single evaluation.
#[derive(Debug, Default)]
struct DepthCollector {
    depth: u32,
    lines: BTreeMap<usize, PvLine>,
    last_emitted: u32,
}

impl DepthCollector {
    fn push(&mut self, line: PvLine, multipv: usize, white_to_move: bool) -> Option<SearchEvaluation> {
        if line.depth != self.depth {
            // Incomplete groups (e.g. cut short by a stop) are dropped
            self.depth = line.depth;
            self.lines.clear();
        }
        let last_index = line.multipv >= multipv;
        self.lines.insert(line.multipv, line);

        if !last_index || self.lines.len() < multipv || self.depth <= self.last_emitted {
            return None;
        }
        self.last_emitted = self.depth;
        let lines = std::mem::take(&mut self.lines);
        build_evaluation(self.depth, lines.into_values().collect(), white_to_move)
    }
}

fn build_evaluation(depth: u32, lines: Vec<PvLine>, white_to_move: bool) -> Option<SearchEvaluation> {
    let model_move = lines.iter().find(|l| l.multipv == 1)?.pv.first()?.clone();
    let cp_vec: BTreeMap<String, i32> = lines
        .iter()
        .filter_map(|l| {
            let mv = l.pv.first()?.clone();
            let white_cp = if white_to_move { l.cp } else { -l.cp };
            Some((mv, white_cp))
        })
        .collect();
    Some(SearchEvaluation::new(depth, model_move, cp_vec, white_to_move).with_win_rates(white_to_move))
}

/// Parse a scored MultiPV `info` line. Bound scores and lines without a PV
/// are ignored.
fn parse_info_line(line: &str) -> Option<PvLine> {
    if !line.starts_with("info") || !line.contains(" pv ") {
        return None;
    }
    if line.contains("lowerbound") || line.contains("upperbound") {
        return None;
    }
    let cp = match (parse_field(line, "cp"), parse_field(line, "mate")) {
        (Some(cp), _) => cp,
        (None, Some(mate)) => mate_to_cp(mate),
        (None, None) => return None,
    };
    Some(PvLine {
        depth: parse_field(line, "depth")?,
        multipv: parse_field(line, "multipv").unwrap_or(1),
        cp,
        pv: parse_pv(line),
    })
}

/// Value following `key` in a whitespace-separated info line
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    parts.find(|part| *part == key)?;
    parts.next()?.parse().ok()
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|part| *part != "pv")
        .skip(1)
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(str::to_string)
        .collect()
}
