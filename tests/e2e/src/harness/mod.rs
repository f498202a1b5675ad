//! Test harness

mod engine;
mod repo;

pub use engine::TestEngine;
pub use repo::TestRepo;
