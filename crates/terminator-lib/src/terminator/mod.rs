//! The terminator: the loop that composes pod resolution, sampling and the
//! over-limit tracker, and issues graceful deletes.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{IterationReport, TerminatorConfig, TerminatorLoop, TerminatorLoopBuilder};
