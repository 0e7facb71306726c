//! MCTS training-data generator for a web-automation agent.
//!
//! This crate explores web tasks with a depth-limited Monte Carlo Tree
//! Search and turns the resulting trajectories into fine-tune records.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (search tree, trace assembly,
//!   record rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, agent and browser
//!   subprocesses). Isolated behind traits to enable scripting in tests.
//!
//! [`world`] binds the two (browser world model + agent-backed search
//! policy) and [`run`] implements the `datagen` CLI run over a task
//! directory.

pub mod agents;
pub mod core;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod world;
