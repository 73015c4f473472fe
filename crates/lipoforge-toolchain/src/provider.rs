//! Toolchain resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use lipoforge_exec::{output_line, CommandRunner, ProcessError};
use thiserror::Error;
use tracing::debug;

use crate::platform::Platform;

/// Cross-compiler binary directory, trailing slash included.
pub const ENV_CROSS_COMPILE: &str = "CROSS_COMPILE";
/// Platform developer directory inside Xcode.
pub const ENV_CROSS_TOP: &str = "CROSS_TOP";
/// Versioned SDK directory name.
pub const ENV_CROSS_SDK: &str = "CROSS_SDK";
/// Minimum supported OS version for the build.
pub const ENV_MIN_SDK_VERSION: &str = "MIN_SDK_VERSION";

/// Errors from toolchain resolution.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Xcode developer directory is not set; run `sudo xcode-select --switch <path>`")]
    DeveloperDirNotSet,

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("toolchain probe failed: {0}")]
    Probe(#[from] ProcessError),

    #[error("unparseable probe output: {0}")]
    Unparseable(String),
}

/// Supplies the environment a cross-compiling build job needs.
///
/// The pipeline consumes this purely as "given a platform, return an
/// environment mapping"; the mapping is merged over the ambient process
/// environment with override-wins semantics by the executor.
pub trait ToolchainProvider: Send + Sync {
    /// Root of the selected Xcode developer directory.
    fn developer_dir(&self) -> Result<PathBuf, ToolchainError>;

    /// Installed SDK version for the platform (e.g. "17.4").
    fn sdk_version(&self, platform: Platform) -> Result<String, ToolchainError>;

    /// Number of parallel compile jobs to ask of the build tool.
    fn parallel_jobs(&self) -> Result<u32, ToolchainError>;

    /// The cross-compile environment mapping for one platform.
    fn cross_compile_env(&self, platform: Platform)
        -> Result<HashMap<String, String>, ToolchainError>;
}

/// Toolchain provider backed by the locally selected Xcode.
pub struct XcodeToolchain {
    runner: Arc<dyn CommandRunner>,
}

impl XcodeToolchain {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl ToolchainProvider for XcodeToolchain {
    fn developer_dir(&self) -> Result<PathBuf, ToolchainError> {
        let path = output_line(self.runner.as_ref(), "xcode-select", ["-print-path"])?;
        if path.is_empty() {
            return Err(ToolchainError::DeveloperDirNotSet);
        }
        Ok(PathBuf::from(path))
    }

    fn sdk_version(&self, platform: Platform) -> Result<String, ToolchainError> {
        let version = output_line(
            self.runner.as_ref(),
            "xcrun",
            ["-sdk", platform.sdk_query_name(), "--show-sdk-version"],
        )?;
        if version.is_empty() {
            return Err(ToolchainError::Unparseable(format!(
                "empty SDK version for {platform}"
            )));
        }
        Ok(version)
    }

    fn parallel_jobs(&self) -> Result<u32, ToolchainError> {
        let ncpu = output_line(self.runner.as_ref(), "sysctl", ["-n", "hw.ncpu"])?;
        ncpu.parse::<u32>()
            .map_err(|_| ToolchainError::Unparseable(format!("hw.ncpu: {ncpu:?}")))
    }

    fn cross_compile_env(
        &self,
        platform: Platform,
    ) -> Result<HashMap<String, String>, ToolchainError> {
        let developer_dir = self.developer_dir()?;
        let sdk_version = self.sdk_version(platform)?;
        let developer_dir = developer_dir.display();
        let sdk_name = platform.sdk_name();

        debug!(%platform, %sdk_version, "resolved cross-compile environment");

        let mut env = HashMap::new();
        env.insert(
            ENV_CROSS_COMPILE.to_string(),
            format!("{developer_dir}/Toolchains/XcodeDefault.xctoolchain/usr/bin/"),
        );
        env.insert(
            ENV_CROSS_TOP.to_string(),
            format!("{developer_dir}/Platforms/{sdk_name}.platform/Developer"),
        );
        env.insert(
            ENV_CROSS_SDK.to_string(),
            format!("{sdk_name}{sdk_version}.sdk"),
        );
        env.insert(
            ENV_MIN_SDK_VERSION.to_string(),
            platform.minimum_os().to_string(),
        );
        Ok(env)
    }
}
