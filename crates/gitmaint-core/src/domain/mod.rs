//! Domain model for stable branch maintenance.
//!
//! - [`commit::Commit`] / [`commit::CommitId`]: upstream and backported commits
//! - [`branch::Branch`]: a maintained stable line and its refs
//! - [`ci::CiBuild`]: CI state of a `(branch, commit)` pair
//! - [`error::MaintainError`]: error taxonomy

pub mod branch;
pub mod ci;
pub mod commit;
pub mod error;

pub use branch::{Branch, BranchKind, BranchVersion, PRIMARY_SUFFIX};
pub use ci::{CiBuild, CiStatus, CiTarget};
pub use commit::{Commit, CommitId, StableMarker};
pub use error::{CiError, MaintainError, Result, VcsError};
