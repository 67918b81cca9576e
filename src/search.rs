//! Batched PUCT tree search.
//!
//! The tree is an arena of nodes addressed by index; each node owns its
//! children through a move-to-index table and no back-pointers exist, so a
//! simulation records its descent path explicitly and backpropagation walks
//! that path in reverse. Simulations run in batches purely to amortize
//! evaluator calls: virtual loss makes the simulations inside one batch
//! diverge, and the fill / evaluate / backpropagate phases are sequential, so
//! the tree is never mutated concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use rand_distr::{Distribution, Gamma};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::record::SearchSummary;
use crate::{GamePosition, Repetition};

/// Search behavior knobs. The self-play driver flips several of these per
/// move when playout cap oscillation is active.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Total simulations per `run`.
    pub simulations: u32,
    /// Leaves collected per evaluator call.
    pub batch_size: usize,
    /// Apply the forced-playout visit floor when extracting training targets.
    pub forced_playouts: bool,
    /// Mix Dirichlet noise into the root priors on expansion.
    pub use_dirichlet: bool,
    /// Keep the played move's subtree as the next search's starting tree.
    pub reuse_tree: bool,
    /// Prune under-visited children out of dumped training targets.
    pub target_pruning: bool,
    /// Return early once the leader cannot be overtaken by the remaining
    /// budget.
    pub immediate: bool,
    pub c_base: f32,
    pub c_init: f32,
    pub dirichlet_alpha: f32,
    pub dirichlet_eps: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            simulations: 800,
            batch_size: 16,
            forced_playouts: false,
            use_dirichlet: true,
            reuse_tree: true,
            target_pruning: false,
            immediate: false,
            c_base: 19652.0,
            c_init: 1.25,
            dirichlet_alpha: 0.3,
            dirichlet_eps: 0.25,
        }
    }
}

/// One explored position. `children` keeps insertion order, which doubles as
/// the deterministic tie-break order everywhere a maximum is taken.
struct Node<M> {
    visits: u32,
    value_sum: f64,
    /// Evaluator output (or rule-defined terminal value), kept so re-reached
    /// terminals backpropagate without another evaluator call.
    value: f32,
    prior: f32,
    virtual_loss: i32,
    children: Vec<(M, u32)>,
    terminal: bool,
}

impl<M> Node<M> {
    fn new(prior: f32) -> Node<M> {
        Node {
            visits: 0,
            value_sum: 0.0,
            value: 0.0,
            prior,
            virtual_loss: 0,
            children: Vec::new(),
            terminal: false,
        }
    }

    fn expanded(&self) -> bool {
        !self.children.is_empty() && !self.terminal
    }

    fn puct(&self, parent_visits: f32, config: &SearchConfig) -> f32 {
        let c = (1.0 + parent_visits + config.c_base) / config.c_base + config.c_init;
        let q = if self.visits == 0 {
            0.0
        } else {
            1.0 - (self.value_sum / (self.visits as f64 + self.virtual_loss as f64)) as f32
        };
        let u = c * self.prior * parent_visits.sqrt()
            / (1.0 + self.visits as f32 + self.virtual_loss as f32);
        q + u
    }
}

/// A batched PUCT search engine over positions of type `P`.
///
/// The engine owns one mutable tree across calls to [`run`](Self::run); with
/// tree reuse enabled, [`advance`](Self::advance) promotes the played move's
/// child to the new root and releases the siblings.
pub struct SearchEngine<P: GamePosition> {
    pub config: SearchConfig,
    nodes: Vec<Node<P::Move>>,
    root: u32,
    stop: Arc<AtomicBool>,
}

impl<P: GamePosition> SearchEngine<P> {
    pub fn new(config: SearchConfig) -> SearchEngine<P> {
        SearchEngine {
            config,
            nodes: Vec::new(),
            root: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for interrupting a running search from another thread. The
    /// in-flight batch completes and `run` returns the root as-is.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Discards the whole tree.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = 0;
    }

    /// Promotes the child reached by `mv` to the root, keeping its subtree
    /// and statistics and releasing everything else. Clears the tree if the
    /// move was never explored.
    pub fn advance(&mut self, mv: &P::Move) {
        let child = match self.nodes.get(self.root as usize) {
            Some(root) => root.children.iter().find(|(m, _)| m == mv).map(|&(_, c)| c),
            None => None,
        };
        let Some(child) = child else {
            self.clear();
            return;
        };

        // Compact the kept subtree into a fresh arena, remapping indices.
        let mut kept = Vec::new();
        let mut queue = std::collections::VecDeque::from([child]);
        let mut remap = std::collections::HashMap::new();
        while let Some(old) = queue.pop_front() {
            remap.insert(old, kept.len() as u32);
            kept.push(old);
            for &(_, c) in &self.nodes[old as usize].children {
                queue.push_back(c);
            }
        }
        let mut nodes = Vec::with_capacity(kept.len());
        for old in kept {
            let mut node = std::mem::replace(&mut self.nodes[old as usize], Node::new(0.0));
            for (_, c) in node.children.iter_mut() {
                *c = remap[c];
            }
            nodes.push(node);
        }
        self.nodes = nodes;
        self.root = 0;
    }

    /// Runs `config.simulations` simulations from `position` and returns the
    /// root node handle. Batching changes only how many evaluator calls are
    /// made, not the search outcome.
    pub fn run<E: Evaluator>(
        &mut self,
        position: &P,
        evaluator: &mut E,
        rng: &mut impl Rng,
    ) -> Result<u32> {
        self.stop.store(false, Ordering::Relaxed);

        if !self.config.reuse_tree || self.nodes.is_empty() {
            self.clear();
            self.nodes.push(Node::new(0.0));
        }
        let root = self.root;

        if !self.nodes[root as usize].expanded() && !self.nodes[root as usize].terminal {
            // Expand the root without committing a visit; every root visit is
            // attributed to a simulation through one of its children.
            self.evaluate_batch(&[(root, position.clone())], evaluator)?;
            if self.config.use_dirichlet {
                self.apply_root_noise(rng);
            }
        }

        let mut done: u32 = 0;
        while done < self.config.simulations {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if self.config.immediate && self.decided(done) {
                break;
            }

            let want = (self.config.simulations - done).min(self.config.batch_size as u32);
            let mut batch: Vec<(u32, P)> = Vec::with_capacity(want as usize);
            let mut paths: Vec<Vec<u32>> = Vec::with_capacity(want as usize);

            for _ in 0..want {
                let mut pos = position.clone();
                let mut path = vec![root];
                let mut node = root;
                while self.nodes[node as usize].expanded() {
                    let (mv, child) = self.select_child(node);
                    self.nodes[child as usize].virtual_loss += 1;
                    pos.apply(&mv);
                    path.push(child);
                    node = child;
                }
                if batch.iter().any(|&(leaf, _)| leaf == node) {
                    // No more distinct paths this batch; undo this path's
                    // virtual loss and evaluate what we have.
                    for &n in &path[1..] {
                        self.nodes[n as usize].virtual_loss -= 1;
                    }
                    break;
                }
                batch.push((node, pos));
                paths.push(path);
            }

            let values = self.evaluate_batch(&batch, evaluator)?;
            for (path, value) in paths.iter().zip(values) {
                self.backpropagate(path, value);
            }
            done += paths.len() as u32;
        }

        Ok(root)
    }

    /// The most-visited root child's move; first-seen order breaks ties.
    pub fn best_move(&self) -> Result<P::Move> {
        let root = self
            .nodes
            .get(self.root as usize)
            .ok_or(Error::IllegalSearchState("search has no tree"))?;
        let mut best: Option<(&P::Move, u32)> = None;
        for (mv, child) in &root.children {
            let visits = self.nodes[*child as usize].visits;
            if best.map_or(true, |(_, n)| visits > n) {
                best = Some((mv, visits));
            }
        }
        best.map(|(mv, _)| mv.clone())
            .ok_or(Error::IllegalSearchState("root has no children"))
    }

    /// Produces the training-target view of the finished search. With target
    /// pruning active, non-best children whose visits fall under the
    /// forced-playout floor are excluded and the total is re-summed over the
    /// survivors.
    pub fn dump(&self, position: &P) -> SearchSummary {
        let root = &self.nodes[self.root as usize];
        let root_value = if root.visits == 0 {
            0.0
        } else {
            (1.0 - root.value_sum / root.visits as f64) as f32
        };

        let prune = self.config.target_pruning && self.config.forced_playouts;
        // Same strictly-greater rule as best_move, so the protected child is
        // always the move the search would actually play.
        let mut best_child: Option<(u32, u32)> = None;
        for &(_, child) in &root.children {
            let visits = self.nodes[child as usize].visits;
            if best_child.map_or(true, |(_, n)| visits > n) {
                best_child = Some((child, visits));
            }
        }
        let best_child = best_child.map(|(child, _)| child);

        let mut visits = Vec::new();
        let mut total = 0u32;
        for (mv, child) in &root.children {
            let node = &self.nodes[*child as usize];
            if node.visits == 0 {
                continue;
            }
            if prune && Some(*child) != best_child {
                let floor = (2.0 * node.prior * root.visits as f32).sqrt();
                if (node.visits as f32) <= floor {
                    continue;
                }
            }
            visits.push((position.notation(mv), node.visits));
            total += node.visits;
        }
        let total_visits = if prune { total } else { root.visits };

        SearchSummary {
            total_visits,
            root_value,
            visits,
        }
    }

    fn select_child(&self, parent: u32) -> (P::Move, u32) {
        let node = &self.nodes[parent as usize];
        let parent_visits = node.visits as f32 + node.virtual_loss as f32;
        let mut best_score = f32::NEG_INFINITY;
        let mut best: Option<(&P::Move, u32)> = None;
        for (mv, child) in &node.children {
            let score = self.nodes[*child as usize].puct(parent_visits, &self.config);
            if score > best_score {
                best_score = score;
                best = Some((mv, *child));
            }
        }
        let (mv, child) = best.expect("select_child called on unexpanded node");
        (mv.clone(), child)
    }

    /// Evaluates a batch of leaves: expands non-terminal ones with priors
    /// renormalized over legal moves, applies the rule-defined outcome to
    /// terminal ones, and returns the value to backpropagate for each leaf.
    fn evaluate_batch<E: Evaluator>(
        &mut self,
        batch: &[(u32, P)],
        evaluator: &mut E,
    ) -> Result<Vec<f32>> {
        // Leaves already carrying a value (re-reached terminals) skip the
        // evaluator entirely.
        let fresh: Vec<usize> = (0..batch.len())
            .filter(|&i| {
                let node = &self.nodes[batch[i].0 as usize];
                node.visits == 0 && !node.terminal
            })
            .collect();

        let inputs: Vec<Vec<f32>> = fresh
            .par_iter()
            .map(|&i| batch[i].1.encode())
            .collect();
        let (policies, raw_values) = if inputs.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            evaluator.predict(&inputs)
        };

        let mut out = vec![0.0f32; batch.len()];
        for (slot, &i) in fresh.iter().enumerate() {
            let (leaf, position) = &batch[i];
            let leaf = *leaf as usize;
            let policy = &policies[slot];
            // Map the evaluator's [-1, 1] output onto the [0, 1] scale the
            // tree accumulates.
            let mut value = (raw_values[slot] + 1.0) / 2.0;

            let moves = position.legal_moves();
            let repetition = position.repetition();
            if repetition != Repetition::None || moves.is_empty() {
                self.nodes[leaf].terminal = true;
                value = match repetition {
                    // A repetition while giving check loses for the side to
                    // move; a plain repetition favors side 0 by rule. The two
                    // conventions differ only in side-to-move parity.
                    Repetition::Check => 0.0,
                    Repetition::Plain => {
                        if position.side_to_move() == 0 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    Repetition::None => 0.0,
                };
            } else if self.nodes[leaf].children.is_empty() {
                let legal_sum: f32 = moves.iter().map(|m| policy[position.policy_index(m)]).sum();
                for mv in moves {
                    let prior = if legal_sum > 0.0 {
                        policy[position.policy_index(&mv)] / legal_sum
                    } else {
                        0.0
                    };
                    let child = Node::new(prior);
                    self.nodes.push(child);
                    let index = self.nodes.len() as u32 - 1;
                    self.nodes[leaf].children.push((mv, index));
                }
            }
            self.nodes[leaf].value = value;
            out[i] = value;
        }
        for i in 0..batch.len() {
            if !fresh.contains(&i) {
                out[i] = self.nodes[batch[i].0 as usize].value;
            }
        }
        Ok(out)
    }

    /// Walks `path` from the leaf back to the root, accumulating the value
    /// with a perspective flip at every step and reverting the virtual loss
    /// applied during descent (the root never received any).
    fn backpropagate(&mut self, path: &[u32], value: f32) {
        for (i, &index) in path.iter().enumerate().rev() {
            let node = &mut self.nodes[index as usize];
            let flipped = (path.len() - 1 - i) % 2 == 1;
            node.value_sum += if flipped { 1.0 - value as f64 } else { value as f64 };
            node.visits += 1;
            if i > 0 {
                node.virtual_loss -= 1;
            }
        }
    }

    /// True when the most-visited child's lead over the runner-up exceeds
    /// the remaining simulation budget.
    fn decided(&self, done: u32) -> bool {
        let root = &self.nodes[self.root as usize];
        let mut top = 0u32;
        let mut second = 0u32;
        for &(_, child) in &root.children {
            let n = self.nodes[child as usize].visits;
            if n > top {
                second = top;
                top = n;
            } else if n > second {
                second = n;
            }
        }
        top - second > self.config.simulations - done
    }

    fn apply_root_noise(&mut self, rng: &mut impl Rng) {
        let children: Vec<u32> = self.nodes[self.root as usize]
            .children
            .iter()
            .map(|&(_, c)| c)
            .collect();
        if children.is_empty() {
            return;
        }
        let gamma = Gamma::new(self.config.dirichlet_alpha as f64, 1.0)
            .expect("dirichlet alpha must be positive");
        let mut noise: Vec<f64> = (0..children.len()).map(|_| gamma.sample(rng)).collect();
        let sum: f64 = noise.iter().sum();
        if sum > 0.0 {
            for n in noise.iter_mut() {
                *n /= sum;
            }
        }
        let eps = self.config.dirichlet_eps;
        for (child, n) in children.into_iter().zip(noise) {
            let node = &mut self.nodes[child as usize];
            node.prior = (1.0 - eps) * node.prior + eps * n as f32;
        }
    }

    #[cfg(test)]
    fn node_stats(&self, index: u32) -> (u32, f64, i32) {
        let node = &self.nodes[index as usize];
        (node.visits, node.value_sum, node.virtual_loss)
    }

    /// Visit counts of the root children in insertion order, keyed by move.
    pub fn root_visits(&self) -> Vec<(P::Move, u32)> {
        match self.nodes.get(self.root as usize) {
            Some(root) => root
                .children
                .iter()
                .map(|(mv, c)| (mv.clone(), self.nodes[*c as usize].visits))
                .collect(),
            None => Vec::new(),
        }
    }
}
