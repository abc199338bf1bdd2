//! Analyze one position from the command line.
//!
//! Usage: analyze-position [FEN] [--pgn game.pgn] [--moves e2e4,e7e5] [--json]
//!
//! Runs Stockfish and the opening book on the position reached after the
//! PGN main line (if any) and the given moves, and prints the ranked moves, blunder meter, move colors and
//! description.

use std::sync::Arc;

use anyhow::Context;
use chess_core::rules::play_uci;
use chess_core::STANDARD_START_FEN;
use tokio::sync::Mutex;
use tracing::info;

use position_analysis::book_cache::{BookCache, BookMoveModel};
use position_analysis::description::describe_position_random;
use position_analysis::stockfish::StockfishEngine;
use position_analysis::{AnalysisConfig, EvaluationScheduler, PositionGraph, Recommendations, SkillLevels};

struct Args {
    fen: String,
    pgn: Option<String>,
    moves: Vec<String>,
    json: bool,
}

/// Parse `[FEN] [--pgn path] [--moves a,b,c] [--json]` from CLI args
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = Args {
        fen: STANDARD_START_FEN.to_string(),
        pgn: None,
        moves: Vec::new(),
        json: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--moves" => {
                if let Some(list) = args.get(i + 1) {
                    parsed.moves = list
                        .split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect();
                    i += 1;
                }
            }
            "--pgn" => {
                parsed.pgn = args.get(i + 1).cloned();
                i += 1;
            }
            "--json" => parsed.json = true,
            fen => parsed.fen = fen.to_string(),
        }
        i += 1;
    }
    parsed
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let config = AnalysisConfig::from_env()?;
    let levels = SkillLevels::with_reference(config.reference_level.clone());

    let mut graph = match &args.pgn {
        Some(path) => {
            let pgn = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
            PositionGraph::from_pgn(&pgn, levels.reference())?
        }
        None => PositionGraph::new(&args.fen, levels.reference()),
    };
    let mut node = graph.main_line(graph.root()).last().copied().unwrap_or(graph.root());
    let mut fen = graph.get(node)?.fen.clone();
    for mv in &args.moves {
        let played = play_uci(&fen, mv).with_context(|| format!("Cannot play {mv}"))?;
        node = graph.add_main_move(node, &played.fen, &played.uci, &played.san)?;
        fen = played.fen;
    }

    let book = BookCache::load_or_empty(&config.book_path);
    let model = Arc::new(BookMoveModel::new(book.clone()));
    let engine = Arc::new(
        StockfishEngine::new(&config)
            .await
            .context("Failed to start Stockfish")?,
    );

    let graph = Arc::new(Mutex::new(graph));
    let mut scheduler = EvaluationScheduler::new(
        Arc::clone(&graph),
        model,
        Arc::clone(&engine),
        Arc::new(book),
        levels.clone(),
        &config,
    );

    info!(fen = %fen, target_depth = config.target_depth, "Analyzing position");
    scheduler.inspect(node).await;
    let outcomes = scheduler.settle().await;
    info!(?outcomes, "Analysis finished");
    engine.quit().await;

    let graph = graph.lock().await;
    let recommendations = Recommendations::for_node(&graph, node, &levels)?;
    let position = graph.get(node)?;
    let description = match (&position.search, &position.move_probabilities) {
        (Some(search), Some(probabilities)) => {
            Some(describe_position_random(&position.fen, search, probabilities, &levels))
        }
        _ => None,
    };

    if args.json {
        let output = serde_json::json!({
            "fen": position.fen,
            "pgn": graph.to_pgn(),
            "depth": position.search_depth(),
            "recommendations": recommendations,
            "description": description,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", graph.to_pgn());
    println!("\nDepth {}", position.search_depth());
    println!("\nEngine moves:");
    for m in recommendations.engine_moves.iter().take(8) {
        println!(
            "  {:<6} {:>6} cp  loss {:>6}",
            m.mv,
            m.cp,
            m.win_rate_loss.map_or("…".to_string(), |l| format!("{:.3}", l))
        );
    }
    println!("\nMost likely at {}:", levels.reference());
    for m in recommendations.probabilities.iter().take(8) {
        println!("  {:<6} {:>5.1}%", m.mv, m.probability * 100.0);
    }
    let meter = recommendations.blunder_meter;
    println!("\nBlunder meter: good {}% / ok {}% / blunder {}%", meter.good, meter.ok, meter.blunder);
    if let Some(description) = description {
        println!("\n{}", description.text);
    }
    Ok(())
}
