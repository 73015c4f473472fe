//! lipoforge - multi-architecture static library builder for Apple platforms
//!
//! This crate builds native static libraries from source for the Apple
//! platform matrix (device, simulator, desktop, Catalyst), merges the
//! per-architecture outputs into per-platform fat libraries, and packages
//! the per-platform libraries into multi-platform XCFramework bundles.
//!
//! The core is the build orchestration pipeline in [`pipeline`]: it expands
//! a library definition into (platform × architecture) jobs, drives each
//! job as an external toolchain invocation, enforces inter-library build
//! prerequisites, merges binary artifacts, and caches completed work so
//! re-runs are incremental.

pub mod cache;
pub mod config;
pub mod deps;
pub mod fsutil;
pub mod library;
pub mod matrix;
pub mod merge;
pub mod mock;
pub mod pipeline;
pub mod recipe;
pub mod report;
pub mod resource;
pub mod state;

pub use cache::{ArtifactCache, CacheError, PlatformArtifact};
pub use config::{BuildConfig, ConfigError};
pub use deps::{DependencyError, DependencyResolver};
pub use library::{BuildOptions, LibraryDefinition, LibraryRegistry, OptionRule, TargetSpec, Toggle};
pub use matrix::{ArchitectureTarget, BuildJob, MatrixError, MatrixExpander};
pub use merge::{BundleSlice, HeaderSourceStrategy, MergeError, Merger};
pub use pipeline::{
    BuildOutcome, BuildRequest, BundleRequest, Orchestrator, PipelineError, PipelineResult,
};
pub use recipe::BuildRecipe;
pub use report::{BuildReport, JobReport};
pub use state::{BuildState, BuildStateData, StateError};

pub use lipoforge_acquire::{AcquireError, DefaultAcquirer, SourceAcquirer, SourceSpec};
pub use lipoforge_exec::{
    CancellationFlag, CommandRequest, CommandRunner, ProcessError, ProcessOutput, SystemRunner,
};
pub use lipoforge_toolchain::{Platform, ToolchainError, ToolchainProvider, XcodeToolchain};
