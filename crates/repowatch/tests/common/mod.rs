//! Shared test utilities for repowatch integration tests.
//!
//! This module provides:
//! - `TestHarness`: a temp directory with a bare "remote", a working clone
//!   to push from, and a mirrors directory
//! - Builders for repository descriptors and configurations
//! - `RecordingBuilder`, an image builder that records instead of running docker

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{git, TestHarness};
