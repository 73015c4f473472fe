//! Mock collaborators for tests.
//!
//! Everything behind a process or toolchain boundary has a scripted stand-in
//! here, so pipeline behavior can be exercised without Xcode, a network, or
//! any real subprocess.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lipoforge_acquire::{AcquireError, SourceAcquirer, SourceSpec};
use lipoforge_exec::{CommandRequest, CommandRunner, ProcessOutput, ProcessResult};
use lipoforge_toolchain::{Platform, ToolchainError, ToolchainProvider};

type Handler = Box<dyn Fn(&CommandRequest) -> ProcessResult<ProcessOutput> + Send + Sync>;

/// A [`CommandRunner`] that records every request and answers from a
/// caller-supplied handler.
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandRequest>>,
    handler: Handler,
}

impl ScriptedRunner {
    pub fn new(
        handler: impl Fn(&CommandRequest) -> ProcessResult<ProcessOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// A runner that reports success with empty output for everything.
    pub fn always_ok() -> Self {
        Self::new(|_| Ok(ProcessOutput::default()))
    }

    /// Snapshot of all requests seen so far, in order.
    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> ProcessResult<ProcessOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        (self.handler)(request)
    }
}

/// A [`ToolchainProvider`] with canned answers and no Xcode dependency.
pub struct FixedToolchain {
    pub developer_dir: PathBuf,
    pub sdk_version: String,
    pub parallel_jobs: u32,
}

impl Default for FixedToolchain {
    fn default() -> Self {
        Self {
            developer_dir: PathBuf::from("/Applications/Xcode.app/Contents/Developer"),
            sdk_version: "17.0".to_string(),
            parallel_jobs: 4,
        }
    }
}

impl ToolchainProvider for FixedToolchain {
    fn developer_dir(&self) -> Result<PathBuf, ToolchainError> {
        Ok(self.developer_dir.clone())
    }

    fn sdk_version(&self, _platform: Platform) -> Result<String, ToolchainError> {
        Ok(self.sdk_version.clone())
    }

    fn parallel_jobs(&self) -> Result<u32, ToolchainError> {
        Ok(self.parallel_jobs)
    }

    fn cross_compile_env(&self, platform: Platform) -> Result<HashMap<String, String>, ToolchainError> {
        let developer = self.developer_dir.display().to_string();
        let sdk = platform.sdk_name();
        Ok(HashMap::from([
            (
                lipoforge_toolchain::ENV_CROSS_COMPILE.to_string(),
                format!("{developer}/Toolchains/XcodeDefault.xctoolchain/usr/bin/"),
            ),
            (
                lipoforge_toolchain::ENV_CROSS_TOP.to_string(),
                format!("{developer}/Platforms/{sdk}.platform/Developer"),
            ),
            (
                lipoforge_toolchain::ENV_CROSS_SDK.to_string(),
                format!("{sdk}{}.sdk", self.sdk_version),
            ),
            (
                lipoforge_toolchain::ENV_MIN_SDK_VERSION.to_string(),
                platform.minimum_os().to_string(),
            ),
        ]))
    }
}

/// A [`SourceAcquirer`] that fabricates a tiny source tree instead of
/// downloading or cloning anything.
#[derive(Default)]
pub struct StubAcquirer;

impl SourceAcquirer for StubAcquirer {
    fn acquire(&self, name: &str, _source: &SourceSpec, dest: &Path) -> Result<(), AcquireError> {
        fs::create_dir_all(dest)?;
        fs::write(dest.join("SOURCE"), name)?;
        Ok(())
    }
}
