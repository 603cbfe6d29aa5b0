//! The harvest engine: chunk planning, the per-URL scrape loop and run
//! statistics.

pub mod chunk;
pub mod planner;
pub mod runner;
pub mod stats;

pub use runner::{Pipeline, RunReport};
