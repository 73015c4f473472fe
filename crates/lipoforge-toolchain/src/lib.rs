//! Apple platform model and Xcode toolchain resolution.
//!
//! [`Platform`] enumerates the fixed set of Apple build targets with their
//! SDK identities and minimum OS versions. [`ToolchainProvider`] answers
//! "given a platform, what environment does a cross-compiling build job
//! need"; the production [`XcodeToolchain`] probes the locally selected
//! Xcode via `xcode-select` and `xcrun`.

mod platform;
mod provider;

pub use platform::Platform;
pub use provider::{
    ToolchainError, ToolchainProvider, XcodeToolchain, ENV_CROSS_COMPILE, ENV_CROSS_SDK,
    ENV_CROSS_TOP, ENV_MIN_SDK_VERSION,
};
