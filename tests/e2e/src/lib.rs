//! End-to-end test support for engram
//!
//! - [`harness::TestEngine`]: a fully wired engine over a temporary data dir
//! - [`harness::TestRepo`]: a real git repository on disk
//! - [`mocks::TestDataFactory`]: realistic source files and transcripts

pub mod harness;
pub mod mocks;

pub use harness::{TestEngine, TestRepo};
pub use mocks::TestDataFactory;
