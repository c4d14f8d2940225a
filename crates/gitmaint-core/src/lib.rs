//! git-maintain core library
//!
//! Commit correlation, backport execution, steal checkpoints and the
//! CI-gated promotion pipeline for long-lived stable branches.

pub mod backport;
pub mod checkpoint;
pub mod ci;
pub mod config;
pub mod correlation;
pub mod domain;
pub mod naming;
pub mod obs;
pub mod operator;
pub mod pipeline;
pub mod registry;
pub mod release;
pub mod telemetry;
pub mod vcs;

pub use domain::{
    Branch, BranchKind, BranchVersion, CiBuild, CiError, CiStatus, CiTarget, Commit, CommitId,
    MaintainError, Result, StableMarker, VcsError, PRIMARY_SUFFIX,
};

pub use backport::{Applied, BackportExecutor, Provenance};
pub use checkpoint::{CheckpointStore, StartMode, StartPoint};
pub use ci::{CiProvider, CiRouter};
pub use config::{CiRouting, CiSettings, RepoConfig};
pub use correlation::{CorrelationEngine, Relevance};
pub use naming::{BranchNaming, PatternNaming};
pub use operator::{Escalation, EscalationReason, Operator, ScriptedOperator, SessionExit};
pub use pipeline::{
    Action, BranchOutcome, CommitOutcome, GlobalOutcome, PromotionPipeline, PromotionState,
    RunOptions, RunReport, StealReport, WatchOptions,
};
pub use registry::{MaintainContext, RepoStrategies, StrategyRegistry};
pub use release::{ReleaseKind, ReleasePlan, ReleaseStrategy, TagRelease};
pub use vcs::{GitCli, MemoryVcs, VersionControl};
