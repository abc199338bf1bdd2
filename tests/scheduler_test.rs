mod common;

use std::time::Duration;

use chess_core::STANDARD_START_FEN;
use position_analysis::engines::{EngineStatus, ModelStatus};
use position_analysis::{AnalysisOutcome, PositionGraph};

use common::*;

fn start_graph() -> PositionGraph {
    PositionGraph::from_start("maia_kdd_1500")
}

#[tokio::test]
async fn test_model_result_written_for_every_level() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, model, _, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 0.6), ("d2d4", 0.4)])),
        FakeEngine::scripted(vec![]),
        FakeBook::default(),
    );

    let outcome = scheduler.evaluate_move_probabilities(root).await;
    assert_eq!(outcome, AnalysisOutcome::Completed);
    assert_eq!(model.calls(), 1);

    let g = graph.lock().await;
    let probabilities = g.get(root).unwrap().move_probabilities.as_ref().unwrap();
    assert_eq!(probabilities.len(), 9);
    assert_eq!(probabilities["maia_kdd_1900"].policy["e2e4"], 0.6);
}

#[tokio::test]
async fn test_book_replaces_policy_in_opening() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, _, _, book) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 0.6), ("d2d4", 0.4)])),
        FakeEngine::scripted(vec![]),
        FakeBook::with_level("maia_kdd_1500", policy(&[("c2c4", 1.0)])),
    );

    scheduler.evaluate_move_probabilities(root).await;
    assert_eq!(book.lookups(), 1);

    let g = graph.lock().await;
    let probabilities = g.get(root).unwrap().move_probabilities.as_ref().unwrap();
    let reference = &probabilities["maia_kdd_1500"];
    assert_eq!(reference.policy, policy(&[("c2c4", 1.0)]));
    // Model value is kept
    assert_eq!(reference.value, 0.55);
    // Levels without book data keep the model policy
    assert_eq!(probabilities["maia_kdd_1100"].policy["e2e4"], 0.6);
}

#[tokio::test]
async fn test_book_not_consulted_after_opening() {
    let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR w KQkq - 2 12";
    let graph = shared_graph(PositionGraph::new(fen, "maia_kdd_1500"));
    let root = graph.lock().await.root();
    let (scheduler, _, _, book) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("f3f7", 0.9)])),
        FakeEngine::scripted(vec![]),
        FakeBook::with_level("maia_kdd_1500", policy(&[("c4b5", 1.0)])),
    );

    scheduler.evaluate_move_probabilities(root).await;
    assert_eq!(book.lookups(), 0);
    let g = graph.lock().await;
    let probabilities = g.get(root).unwrap().move_probabilities.as_ref().unwrap();
    assert_eq!(probabilities["maia_kdd_1500"].policy, policy(&[("f3f7", 0.9)]));
}

#[tokio::test(start_paused = true)]
async fn test_model_not_ready_abandons_after_timeout() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, model, _, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])).with_status(ModelStatus::Downloading),
        FakeEngine::scripted(vec![]),
        FakeBook::default(),
    );

    let start = tokio::time::Instant::now();
    let outcome = scheduler.evaluate_move_probabilities(root).await;

    assert_eq!(outcome, AnalysisOutcome::Abandoned);
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(model.calls(), 0);
    assert!(graph.lock().await.get(root).unwrap().move_probabilities.is_none());
    // The in-progress mark is released so a revisit can retry
    assert!(scheduler.in_progress().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_engine_not_ready_abandons_search() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, _, engine, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])),
        FakeEngine::scripted(vec![start_eval(12)]).with_status(EngineStatus::Loading),
        FakeBook::default(),
    );

    assert_eq!(scheduler.run_search(root).await, AnalysisOutcome::Abandoned);
    assert_eq!(engine.streams.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(graph.lock().await.get(root).unwrap().search.is_none());
}

#[tokio::test]
async fn test_search_keeps_deepest_evaluation() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, _, engine, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])),
        FakeEngine::scripted(vec![start_eval(8), start_eval(10), start_eval(9)]),
        FakeBook::default(),
    );

    assert_eq!(scheduler.run_search(root).await, AnalysisOutcome::Completed);
    assert_eq!(
        *engine.last_request.lock().unwrap(),
        Some((STANDARD_START_FEN.to_string(), 20))
    );
    assert_eq!(graph.lock().await.get(root).unwrap().search_depth(), 10);
}

#[tokio::test]
async fn test_search_stops_at_target_depth() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, _, engine, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])),
        FakeEngine::scripted(vec![start_eval(12), start_eval(18), start_eval(19)]).held_open(),
        FakeBook::default(),
    );

    assert_eq!(scheduler.run_search(root).await, AnalysisOutcome::Completed);
    assert_eq!(engine.stops(), 1);
    assert_eq!(graph.lock().await.get(root).unwrap().search_depth(), 18);

    // Already deep enough: not searched again
    assert_eq!(scheduler.run_search(root).await, AnalysisOutcome::Skipped);
}

#[tokio::test]
async fn test_search_classifies_children() {
    let graph = shared_graph(start_graph());
    let (root, e4, g4) = {
        let mut g = graph.lock().await;
        let root = g.root();
        let e4 = g.add_main_move(root, AFTER_E4, "e2e4", "e4").unwrap();
        let g4 = g.add_variation(root, "fen-after-g4", "g2g4", "g4").unwrap();
        (root, e4, g4)
    };
    let (scheduler, _, _, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])),
        FakeEngine::scripted(vec![start_eval(14)]),
        FakeBook::default(),
    );

    scheduler.run_search(root).await;
    let g = graph.lock().await;
    assert!(g.get(e4).unwrap().tags.best);
    assert!(g.get(g4).unwrap().tags.blunder);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_analysis_of_same_position_is_skipped() {
    let graph = shared_graph(start_graph());
    let root = graph.lock().await.root();
    let (scheduler, model, _, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])).with_delay(Duration::from_millis(500)),
        FakeEngine::scripted(vec![]),
        FakeBook::default(),
    );

    let (first, second) = tokio::join!(
        scheduler.evaluate_move_probabilities(root),
        scheduler.evaluate_move_probabilities(root),
    );

    let mut outcomes = [first, second];
    outcomes.sort_by_key(|o| *o != AnalysisOutcome::Completed);
    assert_eq!(outcomes, [AnalysisOutcome::Completed, AnalysisOutcome::Skipped]);
    assert_eq!(model.calls(), 1);

    // Data present: later triggers do not query again
    assert_eq!(scheduler.evaluate_move_probabilities(root).await, AnalysisOutcome::Skipped);
    assert_eq!(model.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_nodes_stops_previous_stream() {
    let graph = shared_graph(start_graph());
    let (root, e4) = {
        let mut g = graph.lock().await;
        let root = g.root();
        let e4 = g.add_main_move(root, AFTER_E4, "e2e4", "e4").unwrap();
        (root, e4)
    };
    let (mut scheduler, _, engine, _) = scheduler(
        &graph,
        FakeModel::ready(policy(&[("e2e4", 1.0)])).with_delay(Duration::from_millis(200)),
        FakeEngine::scripted(vec![]).held_open(),
        FakeBook::default(),
    );

    scheduler.inspect(root).await;
    assert_eq!(scheduler.inspected(), Some(root));
    tokio::task::yield_now().await;

    scheduler.inspect(e4).await;
    assert_eq!(engine.stops(), 1);
    assert_eq!(scheduler.inspected(), Some(e4));

    // Let the model calls finish; the stale result for the root is still written
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop().await;
    scheduler.settle().await;

    let g = graph.lock().await;
    assert!(g.get(root).unwrap().move_probabilities.is_some());
    assert!(g.get(e4).unwrap().move_probabilities.is_some());
}
