//! Depth-limited Monte Carlo Tree Search over agent-proposed actions.
//!
//! The tree is arena-allocated; nodes refer to each other by index. The
//! search itself is deterministic given a [`WorldModel`] and a
//! [`SearchPolicy`]: all nondeterminism (agents, live pages) sits behind
//! those traits, so the algorithm is testable with scripted
//! implementations.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{BrowserState, RankedAction};

/// Visit count assigned to a child whose edge replay keeps failing,
/// pushing it to the bottom of the UCB1 ordering.
const POISON_VISITS: u32 = 1_000;

/// Candidates carrying at least this many negative fast rewards abort the
/// simulation descent.
const NEGATIVE_CANDIDATE_ABORT: usize = 3;

/// Policy verdict on a freshly materialized state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepScore {
    pub reward: f64,
    pub terminal: bool,
}

/// Stateful environment the search replays actions against.
pub trait WorldModel {
    /// Initial state for the search root.
    fn init_state(&mut self) -> Result<BrowserState>;

    /// Called at the top of every iteration, before the selected path is
    /// replayed from the root.
    fn begin_iteration(&mut self) -> Result<()>;

    /// Execute `action` from `state` and observe the resulting state.
    fn step(&mut self, state: &BrowserState, action: &RankedAction) -> Result<BrowserState>;
}

/// Action proposal and scoring seam (the agent side of the search).
pub trait SearchPolicy {
    /// Ranked candidate actions for `state`, best first. May append to the
    /// state's completed tasks when the proposer declares completion.
    fn candidates(&mut self, state: &mut BrowserState) -> Result<Vec<RankedAction>>;

    /// Terminal check plus step reward for a materialized state. May fill
    /// in the state's done-objective/description fields.
    fn score(&mut self, state: &mut BrowserState) -> Result<StepScore>;
}

/// Search hyperparameters.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub n_iterations: u32,
    /// Nodes at this depth are treated as terminal during selection and
    /// simulation.
    pub depth_limit: u32,
    /// UCB1 exploration weight.
    pub exploration_weight: f64,
    /// How many times a failed edge replay may restart selection from the
    /// root before the partial path is accepted.
    pub select_restart_budget: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            n_iterations: 8,
            depth_limit: 15,
            exploration_weight: 1.0,
            select_restart_budget: 3,
        }
    }
}

/// A root-to-leaf trajectory. `states[i]` is the page *before*
/// `actions[i]`; there is one more state than action on complete paths.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub states: Vec<BrowserState>,
    pub actions: Vec<RankedAction>,
}

/// Everything a search run produces.
#[derive(Debug)]
pub struct SearchOutcome {
    /// State of the best terminal leaf, when one was reached.
    pub terminal_state: Option<BrowserState>,
    /// Cumulative step reward of the best terminal path.
    pub cum_reward: Option<f64>,
    /// Success traces: DFS max-reward, next-best, then greedy follow-max,
    /// each present only when found.
    pub traces: Vec<Trace>,
    /// Terminal paths recorded at backpropagation time, one per
    /// successful iteration.
    pub iteration_successes: Vec<Trace>,
    /// Iteration paths whose leaf never reached a terminal state.
    pub fail_traces: Vec<Trace>,
}

type NodeId = usize;

/// How an expansion attempt left a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    /// The node has children to descend into.
    Open,
    /// The node is settled: terminal, a lone STOP, or no candidates.
    Closed,
    /// The node's state could not be materialized.
    Failed,
}

struct Node {
    state: Option<BrowserState>,
    action: Option<RankedAction>,
    parent: Option<NodeId>,
    /// `None` until expanded; `Some(vec![])` for expanded dead ends.
    children: Option<Vec<NodeId>>,
    /// Running-mean value over backpropagated rewards.
    q: f64,
    n: u32,
    /// Step reward; initialized to the fast reward until scored.
    reward: f64,
    fast_reward: f64,
    is_terminal: bool,
    depth: u32,
}

impl Node {
    fn root(state: BrowserState) -> Self {
        Self {
            state: Some(state),
            action: None,
            parent: None,
            children: None,
            q: 0.0,
            n: 0,
            reward: 0.0,
            fast_reward: 0.0,
            is_terminal: false,
            depth: 0,
        }
    }

    fn child(parent: NodeId, depth: u32, action: RankedAction) -> Self {
        let fast_reward = action.rank;
        Self {
            state: None,
            action: Some(action),
            parent: Some(parent),
            children: None,
            q: 0.0,
            n: 0,
            reward: fast_reward,
            fast_reward,
            is_terminal: false,
            depth,
        }
    }
}

/// Monte Carlo Tree Search engine.
pub struct Mcts {
    params: SearchParams,
    nodes: Vec<Node>,
}

const ROOT: NodeId = 0;

impl Mcts {
    pub fn new(params: SearchParams) -> Self {
        Self {
            params,
            nodes: Vec::new(),
        }
    }

    /// Run the full search and assemble the outcome.
    pub fn search<W: WorldModel, P: SearchPolicy>(
        &mut self,
        world: &mut W,
        policy: &mut P,
    ) -> Result<SearchOutcome> {
        self.nodes.clear();
        self.nodes.push(Node::root(world.init_state()?));

        let mut iteration_successes = Vec::new();
        let mut fail_paths: Vec<Vec<NodeId>> = Vec::new();

        for iter in 0..self.params.n_iterations {
            debug!(iter, "search iteration");
            world.begin_iteration()?;
            let mut path = self.select(world)?;
            let leaf = *path.last().expect("selection path is never empty");
            if !self.terminal_with_depth_limit(leaf) {
                self.expand(leaf, world, policy)?;
                self.simulate(&mut path, world, policy)?;
            }
            self.backpropagate(&path, &mut iteration_successes);
            let leaf = *path.last().expect("selection path is never empty");
            if !self.node(leaf).is_terminal {
                fail_paths.push(path);
            }
        }

        let best = self.dfs_max_reward(vec![ROOT]);
        let next = self.dfs_next_reward(vec![ROOT]);
        let follow = self.follow_max();

        let mut traces = Vec::new();
        let mut terminal_state = None;
        let mut cum_reward = None;
        if let Some((reward, path)) = &best {
            terminal_state = self.node(*path.last().expect("non-empty path")).state.clone();
            cum_reward = Some(*reward);
            traces.push(self.trace_of(path));
        }
        if let Some((_, path)) = &next {
            traces.push(self.trace_of(path));
        }
        if let Some((_, path)) = &follow {
            traces.push(self.trace_of(path));
        }

        let fail_traces = fail_paths.iter().map(|p| self.trace_of(p)).collect();
        Ok(SearchOutcome {
            terminal_state,
            cum_reward,
            traces,
            iteration_successes,
            fail_traces,
        })
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    fn terminal_with_depth_limit(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_terminal || node.depth >= self.params.depth_limit
    }

    /// Descend from the root to a leaf, replaying each chosen edge against
    /// the world so the live session tracks the selected path.
    fn select<W: WorldModel>(&mut self, world: &mut W) -> Result<Vec<NodeId>> {
        let mut restarts = 0u32;
        'restart: loop {
            let mut path = Vec::new();
            let mut node = ROOT;
            loop {
                path.push(node);
                let has_children = self
                    .node(node)
                    .children
                    .as_ref()
                    .is_some_and(|c| !c.is_empty());
                if !has_children || self.terminal_with_depth_limit(node) {
                    return Ok(path);
                }

                let next = self.uct_child(node);
                let parent_state = self
                    .node(node)
                    .state
                    .clone()
                    .ok_or_else(|| anyhow!("selected interior node has no state"))?;
                let action = self
                    .node(next)
                    .action
                    .clone()
                    .ok_or_else(|| anyhow!("non-root node has no action"))?;

                let replayed = world
                    .step(&parent_state, &action)
                    .or_else(|err| {
                        debug!(%err, "edge replay failed, retrying");
                        world.step(&parent_state, &action)
                    })
                    .is_ok();
                if !replayed {
                    self.nodes[next].n = POISON_VISITS;
                    restarts += 1;
                    if restarts <= self.params.select_restart_budget {
                        warn!(restarts, "edge replay failed twice, restarting selection");
                        continue 'restart;
                    }
                    warn!("selection restart budget exhausted, keeping partial path");
                    return Ok(path);
                }
                node = next;
            }
        }
    }

    /// Unvisited children first, then UCB1.
    fn uct_child(&self, parent: NodeId) -> NodeId {
        let children = self
            .node(parent)
            .children
            .as_ref()
            .expect("uct_child requires an expanded parent");
        if let Some(&unvisited) = children.iter().find(|&&c| self.node(c).n == 0) {
            return unvisited;
        }
        let parent_n = self.node(parent).n.max(1) as f64;
        *children
            .iter()
            .max_by(|&&a, &&b| self.uct(parent_n, a).total_cmp(&self.uct(parent_n, b)))
            .expect("expanded parent has children")
    }

    fn uct(&self, parent_n: f64, id: NodeId) -> f64 {
        let node = self.node(id);
        node.q + self.params.exploration_weight * (parent_n.ln() / (1.0 + node.n as f64)).sqrt()
    }

    /// Materialize the node's state if needed and attach one child per
    /// policy candidate.
    fn expand<W: WorldModel, P: SearchPolicy>(
        &mut self,
        id: NodeId,
        world: &mut W,
        policy: &mut P,
    ) -> Result<Expansion> {
        if self.node(id).state.is_none() {
            let parent = self
                .node(id)
                .parent
                .ok_or_else(|| anyhow!("unmaterialized node has no parent"))?;
            let parent_state = self
                .node(parent)
                .state
                .clone()
                .ok_or_else(|| anyhow!("parent of expanded node has no state"))?;
            let action = self
                .node(id)
                .action
                .clone()
                .ok_or_else(|| anyhow!("non-root node has no action"))?;

            match world.step(&parent_state, &action) {
                Ok(mut state) => {
                    let score = policy.score(&mut state)?;
                    let node = &mut self.nodes[id];
                    node.state = Some(state);
                    node.reward = score.reward;
                    node.is_terminal = score.terminal;
                }
                Err(err) => {
                    debug!(%err, "step failed during expansion");
                    let node = &mut self.nodes[id];
                    node.fast_reward = -1.0;
                    node.reward = -1.0;
                    return Ok(Expansion::Failed);
                }
            }
        }
        if self.node(id).is_terminal {
            return Ok(Expansion::Closed);
        }

        let mut state = self.nodes[id].state.take().expect("state set above");
        let candidates = policy.candidates(&mut state);
        self.nodes[id].state = Some(state);
        let candidates = candidates?;

        // A lone STOP proposal means the proposer wants to end here: score
        // the node once more and close it without children.
        if candidates.len() == 1 && candidates[0].task_with_action.is_lone_stop() {
            let mut state = self.nodes[id].state.take().expect("state set above");
            let score = policy.score(&mut state)?;
            let node = &mut self.nodes[id];
            node.state = Some(state);
            node.reward = score.reward;
            node.is_terminal = score.terminal;
            node.children = Some(Vec::new());
            return Ok(Expansion::Closed);
        }

        let depth = self.node(id).depth + 1;
        let mut children = Vec::with_capacity(candidates.len());
        for action in candidates {
            let child = Node::child(id, depth, action);
            self.nodes.push(child);
            children.push(self.nodes.len() - 1);
        }
        let open = !children.is_empty();
        self.nodes[id].children = Some(children);
        Ok(if open {
            Expansion::Open
        } else {
            Expansion::Closed
        })
    }

    /// Greedy rollout from the expanded leaf: repeatedly descend the child
    /// with the highest fast reward, materializing as we go.
    ///
    /// A child whose materialization fails is left off the path, so
    /// backpropagation scores the last state that actually existed.
    fn simulate<W: WorldModel, P: SearchPolicy>(
        &mut self,
        path: &mut Vec<NodeId>,
        world: &mut W,
        policy: &mut P,
    ) -> Result<()> {
        let mut node = *path.last().expect("simulation starts from a path");
        loop {
            let mut expansion = Expansion::Open;
            if self.node(node).state.is_none() {
                expansion = self.expand(node, world, policy)?;
                if expansion != Expansion::Failed {
                    path.push(node);
                }
            }
            if expansion != Expansion::Open || self.terminal_with_depth_limit(node) {
                return Ok(());
            }
            let children = match self.node(node).children.as_ref() {
                Some(c) if !c.is_empty() => c.clone(),
                _ => return Ok(()),
            };
            let rewards: Vec<f64> = children.iter().map(|&c| self.node(c).fast_reward).collect();
            if rewards.iter().filter(|r| **r < 0.0).count() >= NEGATIVE_CANDIDATE_ABORT {
                return Ok(());
            }
            let best = rewards
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .expect("non-empty candidate list");
            node = children[best];
        }
    }

    /// Push the leaf reward up the path as a running mean. Terminal leaves
    /// record the path as a per-iteration success trace.
    fn backpropagate(&mut self, path: &[NodeId], iteration_successes: &mut Vec<Trace>) {
        let leaf = *path.last().expect("backpropagation needs a path");
        let reward = self.node(leaf).reward;
        if self.node(leaf).is_terminal {
            iteration_successes.push(self.trace_of(path));
        }
        for &id in path.iter().rev() {
            if self.node(id).state.is_none() {
                continue;
            }
            let node = &mut self.nodes[id];
            node.q = (node.q * node.n as f64 + reward) / (node.n as f64 + 1.0);
            node.n += 1;
        }
    }

    fn visited_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .as_ref()
            .map(|children| {
                children
                    .iter()
                    .copied()
                    .filter(|&c| self.node(c).state.is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn path_reward(&self, path: &[NodeId]) -> f64 {
        path.iter().skip(1).map(|&id| self.node(id).reward).sum()
    }

    /// Highest-cumulative-reward terminal path over visited nodes.
    fn dfs_max_reward(&self, path: Vec<NodeId>) -> Option<(f64, Vec<NodeId>)> {
        let cur = *path.last().expect("dfs path is never empty");
        if self.node(cur).is_terminal {
            return Some((self.path_reward(&path), path));
        }
        let children = self.visited_children(cur);
        children
            .into_iter()
            .filter_map(|child| {
                let mut next = path.clone();
                next.push(child);
                self.dfs_max_reward(next)
            })
            .max_by(|a, b| a.0.total_cmp(&b.0))
    }

    /// Runner-up path: at each level, the second-best candidate among the
    /// children's results.
    fn dfs_next_reward(&self, path: Vec<NodeId>) -> Option<(f64, Vec<NodeId>)> {
        let cur = *path.last().expect("dfs path is never empty");
        if self.node(cur).is_terminal {
            return Some((self.path_reward(&path), path));
        }
        let mut found: Vec<(f64, Vec<NodeId>)> = self
            .visited_children(cur)
            .into_iter()
            .filter_map(|child| {
                let mut next = path.clone();
                next.push(child);
                self.dfs_next_reward(next)
            })
            .collect();
        found.sort_by(|a, b| b.0.total_cmp(&a.0));
        if found.len() >= 2 {
            found.into_iter().nth(1)
        } else {
            None
        }
    }

    /// Greedy descent by step reward. May stop at a non-terminal dead end.
    fn follow_max(&self) -> Option<(f64, Vec<NodeId>)> {
        let mut path = vec![ROOT];
        loop {
            let cur = *path.last().expect("follow path is never empty");
            if self.node(cur).is_terminal {
                break;
            }
            let children = self.visited_children(cur);
            let Some(best) = children
                .into_iter()
                .max_by(|&a, &b| self.node(a).reward.total_cmp(&self.node(b).reward))
            else {
                break;
            };
            path.push(best);
        }
        Some((self.path_reward(&path), path))
    }

    fn trace_of(&self, path: &[NodeId]) -> Trace {
        let states = path
            .iter()
            .filter_map(|&id| self.node(id).state.clone())
            .collect();
        let actions = path
            .iter()
            .skip(1)
            .filter_map(|&id| self.node(id).action.clone())
            .collect();
        Trace { states, actions }
    }

    #[cfg(test)]
    fn root_stats(&self) -> (f64, u32) {
        (self.node(ROOT).q, self.node(ROOT).n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Action, TaskWithActions};
    use crate::test_support::browser_state;

    const GOAL_TASK: i64 = 7;

    fn ranked(id: i64, rank: f64) -> RankedAction {
        RankedAction {
            task_with_action: TaskWithActions {
                id,
                description: format!("task {id}"),
                actions_to_be_performed: vec![Action::Click {
                    mmid: id as u64,
                    wait_before_execution: None,
                }],
                result: None,
            },
            rank,
        }
    }

    fn lone_stop(rank: f64) -> RankedAction {
        RankedAction {
            task_with_action: TaskWithActions {
                id: 99,
                description: "stop".to_string(),
                actions_to_be_performed: vec![Action::Stop {
                    answer: "done".to_string(),
                }],
                result: None,
            },
            rank,
        }
    }

    /// World where stepping task 7 lands on the goal page and every other
    /// task appends its id to the URL. Steps can be scripted to fail after
    /// a given number of successes.
    struct FakeWorld {
        steps: u32,
        fail_after: Option<u32>,
    }

    impl FakeWorld {
        fn new() -> Self {
            Self {
                steps: 0,
                fail_after: None,
            }
        }
    }

    impl WorldModel for FakeWorld {
        fn init_state(&mut self) -> Result<BrowserState> {
            Ok(browser_state("home"))
        }

        fn begin_iteration(&mut self) -> Result<()> {
            Ok(())
        }

        fn step(&mut self, state: &BrowserState, action: &RankedAction) -> Result<BrowserState> {
            if let Some(limit) = self.fail_after
                && self.steps >= limit
            {
                return Err(anyhow!("browser session lost"));
            }
            self.steps += 1;
            let url = if action.task_with_action.id == GOAL_TASK {
                "goal".to_string()
            } else {
                format!("{}/{}", state.current_url, action.task_with_action.id)
            };
            Ok(browser_state(&url))
        }
    }

    /// Policy with a fixed candidate table keyed by URL; the goal page is
    /// the only terminal state.
    struct FakePolicy {
        candidates_by_url: Vec<(&'static str, Vec<RankedAction>)>,
    }

    impl SearchPolicy for FakePolicy {
        fn candidates(&mut self, state: &mut BrowserState) -> Result<Vec<RankedAction>> {
            Ok(self
                .candidates_by_url
                .iter()
                .find(|(url, _)| *url == state.current_url)
                .map(|(_, c)| c.clone())
                .unwrap_or_default())
        }

        fn score(&mut self, state: &mut BrowserState) -> Result<StepScore> {
            let terminal = state.current_url == "goal";
            Ok(StepScore {
                reward: if terminal { 1.0 } else { -0.01 },
                terminal,
            })
        }
    }

    fn params(n_iterations: u32, depth_limit: u32) -> SearchParams {
        SearchParams {
            n_iterations,
            depth_limit,
            ..SearchParams::default()
        }
    }

    #[test]
    fn search_finds_terminal_path_and_partitions_traces() {
        let mut world = FakeWorld::new();
        let mut policy = FakePolicy {
            candidates_by_url: vec![
                ("home", vec![ranked(GOAL_TASK, 0.9), ranked(2, 0.4)]),
                ("home/2", vec![lone_stop(0.3)]),
            ],
        };
        let mut mcts = Mcts::new(params(2, 10));
        let outcome = mcts.search(&mut world, &mut policy).expect("search");

        // Iteration 1 reaches the goal greedily; iteration 2 explores the
        // unvisited sibling and dead-ends on a lone STOP.
        assert_eq!(outcome.iteration_successes.len(), 1);
        assert_eq!(outcome.fail_traces.len(), 1);

        let terminal = outcome.terminal_state.expect("terminal state");
        assert_eq!(terminal.current_url, "goal");
        assert_eq!(outcome.cum_reward, Some(1.0));

        // Max-reward and follow-max both land on the goal path; there is
        // no runner-up terminal path.
        assert_eq!(outcome.traces.len(), 2);
        let best = &outcome.traces[0];
        assert_eq!(best.states.len(), 2);
        assert_eq!(best.actions.len(), 1);
        assert_eq!(best.actions[0].task_with_action.id, GOAL_TASK);
        assert_eq!(best.states[0].current_url, "home");

        // Root saw one success (1.0) and one dead end (-0.01).
        let (q, n) = mcts.root_stats();
        assert_eq!(n, 2);
        assert!((q - (1.0 - 0.01) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn depth_limit_caps_the_rollout() {
        let mut world = FakeWorld::new();
        // Task 2 loops forever: home -> home/2 -> home/2/2 -> ...
        let mut policy = FakePolicy {
            candidates_by_url: vec![
                ("home", vec![ranked(2, 0.9)]),
                ("home/2", vec![ranked(2, 0.9)]),
            ],
        };
        let mut mcts = Mcts::new(params(1, 1));
        let outcome = mcts.search(&mut world, &mut policy).expect("search");

        assert!(outcome.terminal_state.is_none());
        assert!(outcome.iteration_successes.is_empty());
        assert_eq!(outcome.fail_traces.len(), 1);
        // The rollout stopped at depth 1.
        assert!(outcome.fail_traces[0].states.len() <= 2);
    }

    #[test]
    fn negative_candidates_abort_the_rollout() {
        let mut world = FakeWorld::new();
        let mut policy = FakePolicy {
            candidates_by_url: vec![(
                "home",
                vec![ranked(2, -0.1), ranked(3, -0.2), ranked(4, -0.3)],
            )],
        };
        let mut mcts = Mcts::new(params(1, 10));
        let outcome = mcts.search(&mut world, &mut policy).expect("search");

        // No child was ever materialized: the rollout aborted at the root.
        assert!(outcome.terminal_state.is_none());
        assert_eq!(outcome.fail_traces.len(), 1);
        assert_eq!(outcome.fail_traces[0].states.len(), 1);
    }

    #[test]
    fn failed_edge_replay_poisons_the_child_and_survives() {
        let mut world = FakeWorld::new();
        world.fail_after = Some(1);
        let mut policy = FakePolicy {
            candidates_by_url: vec![("home", vec![ranked(GOAL_TASK, 0.9)])],
        };
        let mut mcts = Mcts::new(SearchParams {
            select_restart_budget: 1,
            ..params(3, 10)
        });

        // Iteration 1 succeeds; later iterations hit a dead browser on
        // every replay. The search must degrade, not hang or error.
        let outcome = mcts.search(&mut world, &mut policy).expect("search");
        assert_eq!(outcome.iteration_successes.len(), 1);
        assert_eq!(outcome.fail_traces.len(), 2);
    }
}
