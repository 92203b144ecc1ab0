//! Git mirror management.
//!
//! - `repository`: thin async wrapper over the git CLI
//! - `reconciler`: brings a mirror in line with its remote branch
//! - `parse`/`types`: output parsing and plain data

pub mod error;
pub mod parse;
pub mod reconciler;
pub mod repository;
pub mod types;

pub use error::{classify_git_error, GitError, Result};
pub use reconciler::{GitReconciler, MirrorSync, ReconcileStrategy};
pub use repository::GitRepository;
pub use types::*;
