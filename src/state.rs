//! Build state machine.
//!
//! Build states: PENDING → SOURCE_READY → MATRIX_EXPANDED → ARCH_BUILDING
//! → ARCH_MERGED → DONE, with FAILED reachable from every non-terminal
//! state and DONE reachable directly from PENDING when the cache already
//! satisfies the request. ARCH_MERGED loops back to ARCH_BUILDING while
//! further platforms remain.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use lipoforge_toolchain::Platform;
use serde::{Deserialize, Serialize};

/// Schema version for build_state.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "lipoforge/build_state@1";

/// Sequence counter for ordering state events within one process
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Build state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    /// Request accepted, nothing started
    Pending,
    /// Source tree acquired and ready
    SourceReady,
    /// Build matrix expanded into jobs
    MatrixExpanded,
    /// Per-architecture builds in progress for the current platform
    ArchBuilding,
    /// Current platform's architectures merged into a fat library
    ArchMerged,
    /// All requested platforms built and merged
    Done,
    /// Build aborted
    Failed,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Done | BuildState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: BuildState) -> bool {
        match (self, target) {
            // From PENDING
            (BuildState::Pending, BuildState::SourceReady) => true,
            (BuildState::Pending, BuildState::Done) => true, // cache hit, nothing to do

            // Forward through the pipeline
            (BuildState::SourceReady, BuildState::MatrixExpanded) => true,
            (BuildState::MatrixExpanded, BuildState::ArchBuilding) => true,
            (BuildState::ArchBuilding, BuildState::ArchMerged) => true,

            // From ARCH_MERGED
            (BuildState::ArchMerged, BuildState::ArchBuilding) => true, // next platform
            (BuildState::ArchMerged, BuildState::Done) => true,

            // Any non-terminal state can fail
            (from, BuildState::Failed) if !from.is_terminal() => true,

            _ => false,
        }
    }
}

/// Build state artifact data (build_state.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStateData {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Library being built
    pub library: String,

    /// Platforms in build order
    pub platforms: Vec<Platform>,

    /// Current state
    pub state: BuildState,

    /// When the build was created
    pub created_at: DateTime<Utc>,

    /// When the state was last updated
    pub updated_at: DateTime<Utc>,

    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

/// Errors for build state operations
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: BuildState, to: BuildState },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildStateData {
    /// Create a new build in PENDING state
    pub fn new(library: String, platforms: Vec<Platform>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            library,
            platforms,
            state: BuildState::Pending,
            created_at: now,
            updated_at: now,
            seq: next_seq(),
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: BuildState) -> Result<(), StateError> {
        if !self.state.can_transition_to(new_state) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        self.state = new_state;
        self.updated_at = Utc::now();
        self.seq = next_seq();

        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to a file as JSON
    pub fn write(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
