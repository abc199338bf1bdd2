//! Game tree of analyzed positions.
//!
//! Nodes live in a flat arena owned by [`PositionGraph`]; parent, child and
//! main-child links are [`NodeId`] indices. Each node is reachable from
//! exactly one parent. Callers get shared references only and request
//! structural changes through the graph's methods.

use std::fmt;

use chess_core::pgn::{extract_header, format_header, mainline_sans, move_number_prefix, parse_headers};
use chess_core::rules::{play_san, ply_from_fen, Side, STANDARD_START_FEN};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{classify_move, MoveTags};
use crate::error::AnalysisError;
use crate::evaluation::{MoveProbabilities, SearchEvaluation};

/// Index of a node in the graph's arena. Ids are never reused, so an id of a
/// removed node simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("No variation {mv} at node {node}")]
    VariationNotFound { node: NodeId, mv: String },

    #[error("Move {mv} at node {node} is the main continuation")]
    MainlineRemoval { node: NodeId, mv: String },
}

/// One position reached by a sequence of moves.
#[derive(Debug, Clone, Serialize)]
pub struct PositionNode {
    pub fen: String,
    /// Move that produced this position (UCI); `None` only for the root
    pub mv: Option<String>,
    /// SAN of `mv`
    pub san: Option<String>,
    pub turn: Side,
    pub check: bool,
    /// Half-moves played since the start of the game
    pub ply: u32,
    /// Elapsed clock time for the move, in seconds
    pub time: Option<f64>,

    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub main_child: Option<NodeId>,
    pub is_mainline: bool,

    pub move_probabilities: Option<MoveProbabilities>,
    pub search: Option<SearchEvaluation>,
    /// Quality of `mv`, derived from the parent's evaluations
    pub tags: MoveTags,
}

impl PositionNode {
    fn new(fen: &str, mv: Option<&str>, san: Option<&str>, parent: Option<NodeId>, ply: u32) -> Self {
        Self {
            fen: fen.to_string(),
            mv: mv.map(str::to_string),
            san: san.map(str::to_string),
            turn: Side::from_fen(fen),
            check: san.is_some_and(|s| s.ends_with('+') || s.ends_with('#')),
            ply,
            time: None,
            parent,
            children: Vec::new(),
            main_child: None,
            is_mainline: false,
            move_probabilities: None,
            search: None,
            tags: MoveTags::default(),
        }
    }

    /// Full-move number of this position.
    pub fn move_number(&self) -> u32 {
        self.ply / 2 + 1
    }

    pub fn search_depth(&self) -> u32 {
        self.search.as_ref().map_or(0, |s| s.depth)
    }
}

/// Tree of positions plus PGN headers.
///
/// Removing a side line leaves empty arena slots behind rather than
/// compacting, so ids held elsewhere never point at a different node. The
/// arena only grows and [`PositionGraph::len`] scans the slots.
#[derive(Debug, Clone)]
pub struct PositionGraph {
    nodes: Vec<Option<PositionNode>>,
    root: NodeId,
    headers: IndexMap<String, String>,
    /// Skill level whose policy feeds the excellent-move tag
    reference_level: String,
}

impl PositionGraph {
    pub fn new(root_fen: &str, reference_level: impl Into<String>) -> Self {
        let mut root = PositionNode::new(root_fen, None, None, None, ply_from_fen(root_fen));
        root.is_mainline = true;

        let mut headers = IndexMap::new();
        if root_fen != STANDARD_START_FEN {
            headers.insert("SetUp".to_string(), "1".to_string());
            headers.insert("FEN".to_string(), root_fen.to_string());
        }

        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            headers,
            reference_level: reference_level.into(),
        }
    }

    pub fn from_start(reference_level: impl Into<String>) -> Self {
        Self::new(STANDARD_START_FEN, reference_level)
    }

    /// Build a graph from PGN text: headers are kept in order, the root is
    /// the `FEN` header's position if present, and the main line is played
    /// from it. Side lines in the movetext are not imported.
    pub fn from_pgn(pgn: &str, reference_level: impl Into<String>) -> Result<Self, AnalysisError> {
        let root_fen = extract_header(pgn, "FEN").unwrap_or_else(|| STANDARD_START_FEN.to_string());
        let mut graph = Self::new(&root_fen, reference_level);
        for (key, value) in parse_headers(pgn) {
            graph.set_header(key, value);
        }

        let mut node = graph.root;
        let mut fen = root_fen;
        for san in mainline_sans(pgn) {
            let played = play_san(&fen, &san)?;
            node = graph.add_main_move(node, &played.fen, &played.uci, &played.san)?;
            fen = played.fen;
        }
        Ok(graph)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&PositionNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get(&self, id: NodeId) -> Result<&PositionNode, GraphError> {
        self.node(id).ok_or(GraphError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut PositionNode, GraphError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reference_level(&self) -> &str {
        &self.reference_level
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Child of `node` reached by `mv`, mainline or not.
    pub fn find_child(&self, node: NodeId, mv: &str) -> Option<NodeId> {
        self.node(node)?
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).is_some_and(|n| n.mv.as_deref() == Some(mv)))
    }

    /// Extend the main continuation of `node` with `mv`.
    ///
    /// If `mv` is already the main child it is returned; if it exists as a
    /// variation it is promoted. Otherwise a new child becomes the main child
    /// and the previous main child is demoted to a variation.
    pub fn add_main_move(
        &mut self,
        node: NodeId,
        new_fen: &str,
        mv: &str,
        san: &str,
    ) -> Result<NodeId, GraphError> {
        if let Some(existing) = self.find_child(node, mv) {
            if self.get(node)?.main_child != Some(existing) {
                self.promote_variation(node, mv)?;
            }
            return Ok(existing);
        }

        let child = self.attach(node, new_fen, mv, san)?;
        let previous = self.get(node)?.main_child;
        if let Some(previous) = previous {
            self.get_mut(previous)?.is_mainline = false;
        }
        self.get_mut(child)?.is_mainline = true;
        self.get_mut(node)?.main_child = Some(child);
        Ok(child)
    }

    /// Add `mv` as a side line of `node`, or return the existing child for it.
    pub fn add_variation(
        &mut self,
        node: NodeId,
        new_fen: &str,
        mv: &str,
        san: &str,
    ) -> Result<NodeId, GraphError> {
        if let Some(existing) = self.find_child(node, mv) {
            return Ok(existing);
        }
        self.attach(node, new_fen, mv, san)
    }

    /// Make the variation `mv` the main continuation of `node`.
    pub fn promote_variation(&mut self, node: NodeId, mv: &str) -> Result<(), GraphError> {
        let variation = self
            .find_child(node, mv)
            .ok_or_else(|| GraphError::VariationNotFound { node, mv: mv.to_string() })?;

        let previous = self.get(node)?.main_child;
        if previous == Some(variation) {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.get_mut(previous)?.is_mainline = false;
        }
        self.get_mut(variation)?.is_mainline = true;
        self.get_mut(node)?.main_child = Some(variation);
        Ok(())
    }

    /// Detach and drop the side line `mv` of `node` with its whole subtree.
    /// Returns the number of nodes removed.
    pub fn remove_variation(&mut self, node: NodeId, mv: &str) -> Result<usize, GraphError> {
        let variation = self
            .find_child(node, mv)
            .ok_or_else(|| GraphError::VariationNotFound { node, mv: mv.to_string() })?;
        if self.get(node)?.main_child == Some(variation) {
            return Err(GraphError::MainlineRemoval { node, mv: mv.to_string() });
        }

        self.get_mut(node)?.children.retain(|&c| c != variation);

        let mut removed = 0;
        let mut stack = vec![variation];
        while let Some(id) = stack.pop() {
            if let Some(dropped) = self.nodes.get_mut(id.0).and_then(Option::take) {
                stack.extend(dropped.children);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// `node` followed by its main children down to a leaf.
    pub fn main_line(&self, node: NodeId) -> Vec<NodeId> {
        std::iter::successors(self.node(node).map(|_| node), |&n| {
            self.node(n).and_then(|n| n.main_child)
        })
        .collect()
    }

    /// Root to `node`, inclusive.
    pub fn path_to(&self, node: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> =
            std::iter::successors(self.node(node).map(|_| node), |&n| {
                self.node(n).and_then(|n| n.parent)
            })
            .collect();
        path.reverse();
        path
    }

    /// UCI moves of the game's main line.
    pub fn main_line_moves(&self) -> Vec<String> {
        self.main_line(self.root)
            .into_iter()
            .filter_map(|id| self.node(id)?.mv.clone())
            .collect()
    }

    pub fn set_time(&mut self, node: NodeId, seconds: f64) -> Result<(), GraphError> {
        self.get_mut(node)?.time = Some(seconds);
        Ok(())
    }

    /// Store the model output for `node` (overwriting any previous table) and
    /// re-classify its children.
    pub fn set_move_probabilities(
        &mut self,
        node: NodeId,
        probabilities: MoveProbabilities,
    ) -> Result<(), GraphError> {
        self.get_mut(node)?.move_probabilities = Some(probabilities);
        self.reclassify_children(node)
    }

    /// Store a search evaluation unless it is shallower than the current one.
    /// Equal depth is accepted. Children are re-classified on every accepted
    /// write; returns whether the write was accepted.
    pub fn set_search_evaluation(
        &mut self,
        node: NodeId,
        evaluation: SearchEvaluation,
    ) -> Result<bool, GraphError> {
        let target = self.get_mut(node)?;
        if evaluation.depth < target.search_depth() && target.search.is_some() {
            return Ok(false);
        }
        target.search = Some(evaluation);
        self.reclassify_children(node)?;
        Ok(true)
    }

    fn reclassify_children(&mut self, node: NodeId) -> Result<(), GraphError> {
        let parent = self.get(node)?;
        let policy = parent
            .move_probabilities
            .as_ref()
            .and_then(|p| p.get(&self.reference_level))
            .map(|level| &level.policy);

        let updates: Vec<(NodeId, MoveTags)> = parent
            .children
            .iter()
            .filter_map(|&c| {
                let mv = self.node(c)?.mv.as_deref()?;
                Some((c, classify_move(parent.search.as_ref(), policy, mv)))
            })
            .collect();

        for (child, tags) in updates {
            self.get_mut(child)?.tags = tags;
        }
        Ok(())
    }

    fn attach(&mut self, node: NodeId, new_fen: &str, mv: &str, san: &str) -> Result<NodeId, GraphError> {
        let ply = self.get(node)?.ply + 1;
        let id = NodeId(self.nodes.len());
        self.nodes
            .push(Some(PositionNode::new(new_fen, Some(mv), Some(san), Some(node), ply)));
        self.get_mut(node)?.children.push(id);
        self.reclassify_children(node)?;
        Ok(id)
    }

    /// PGN-like text: headers, then movetext with side lines in parentheses.
    pub fn to_pgn(&self) -> String {
        let result = self.headers.get("Result").map_or("*", String::as_str);
        let mut out = String::new();
        for (key, value) in &self.headers {
            out.push_str(&format_header(key, value));
            out.push('\n');
        }
        if !out.is_empty() {
            out.push('\n');
        }

        let mut tokens = self.movetext_from(self.root, false);
        tokens.push(result.to_string());
        out.push_str(&tokens.join(" "));
        out
    }

    fn movetext_from(&self, node: NodeId, force_number: bool) -> Vec<String> {
        let mut tokens = Vec::new();
        let Some(current) = self.node(node) else {
            return tokens;
        };
        let Some(next) = current.main_child.or_else(|| current.children.first().copied()) else {
            return tokens;
        };

        tokens.push(self.move_token(next, force_number));
        let mut had_variation = false;
        for &child in current.children.iter().filter(|&&c| c != next) {
            let mut line = vec![self.move_token(child, true)];
            line.extend(self.movetext_from(child, false));
            tokens.push(format!("({})", line.join(" ")));
            had_variation = true;
        }
        tokens.extend(self.movetext_from(next, had_variation));
        tokens
    }

    fn move_token(&self, id: NodeId, force_number: bool) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let san = node.san.as_deref().or(node.mv.as_deref()).unwrap_or("--");
        match move_number_prefix(node.ply.saturating_sub(1), force_number) {
            Some(prefix) => format!("{prefix} {san}"),
            None => san.to_string(),
        }
    }
}
