//! Build report artifact.
//!
//! One report is written per completed build, summarizing what was built
//! and how long each job took. Reports are advisory; nothing reads them
//! back during later builds.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use lipoforge_toolchain::Platform;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version for build_report.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "lipoforge/build_report@1";

/// Errors for report operations
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One architecture job's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub platform: Platform,
    pub triple: String,
    pub arch: String,
    pub duration_ms: u64,
}

/// Build report artifact data (build_report.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Unique identifier for this build run
    pub run_id: String,

    /// Library that was built
    pub library: String,

    /// Version that was built
    pub version: String,

    /// Platforms in build order
    pub platforms: Vec<Platform>,

    /// Per-architecture job outcomes
    pub jobs: Vec<JobReport>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn new(library: String, version: String, platforms: Vec<Platform>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            run_id: Uuid::new_v4().to_string(),
            library,
            version,
            platforms,
            jobs: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record_job(&mut self, job: JobReport) {
        self.jobs.push(job);
    }

    /// Stamp the finish time and write the report as JSON
    pub fn finish(&mut self, path: &Path) -> Result<(), ReportError> {
        self.finished_at = Utc::now();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_with_schema_markers() {
        let temp = tempfile::tempdir().unwrap();
        let mut report = BuildReport::new(
            "openssl".to_string(),
            "1.1.1i".to_string(),
            vec![Platform::Ios, Platform::Macos],
        );
        report.record_job(JobReport {
            platform: Platform::Ios,
            triple: "ios-arm64".to_string(),
            arch: "arm64".to_string(),
            duration_ms: 1234,
        });

        let path = temp.path().join("build_report.json");
        report.finish(&path).unwrap();

        let loaded: BuildReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.schema_id, SCHEMA_ID);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].triple, "ios-arm64");
        assert!(loaded.finished_at >= loaded.started_at);
    }

    #[test]
    fn run_ids_are_unique() {
        let a = BuildReport::new("a".to_string(), "1".to_string(), vec![]);
        let b = BuildReport::new("a".to_string(), "1".to_string(), vec![]);
        assert_ne!(a.run_id, b.run_id);
    }
}
