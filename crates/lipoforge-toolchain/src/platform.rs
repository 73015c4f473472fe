//! The fixed Apple platform set.

use serde::{Deserialize, Serialize};

use crate::provider::ToolchainError;

/// A target operating environment.
///
/// The set is fixed and enumerable at orchestration time; every platform
/// carries its canonical identifier (the `-sdk` style name), the Xcode SDK
/// directory name, a default minimum supported OS version and a derived
/// build-directory path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "iphoneos")]
    Ios,
    #[serde(rename = "iphonesimulator")]
    IosSimulator,
    #[serde(rename = "appletvos")]
    Tvos,
    #[serde(rename = "appletvsimulator")]
    TvosSimulator,
    #[serde(rename = "watchos")]
    Watchos,
    #[serde(rename = "watchsimulator")]
    WatchosSimulator,
    #[serde(rename = "macosx")]
    Macos,
    #[serde(rename = "maccatalyst")]
    MacCatalyst,
}

impl Platform {
    /// All supported platforms, in build order.
    pub const ALL: [Platform; 8] = [
        Platform::Ios,
        Platform::IosSimulator,
        Platform::Tvos,
        Platform::TvosSimulator,
        Platform::Watchos,
        Platform::WatchosSimulator,
        Platform::Macos,
        Platform::MacCatalyst,
    ];

    /// Canonical identifier, as accepted on the command line.
    pub fn identifier(&self) -> &'static str {
        match self {
            Platform::Ios => "iphoneos",
            Platform::IosSimulator => "iphonesimulator",
            Platform::Tvos => "appletvos",
            Platform::TvosSimulator => "appletvsimulator",
            Platform::Watchos => "watchos",
            Platform::WatchosSimulator => "watchsimulator",
            Platform::Macos => "macosx",
            Platform::MacCatalyst => "maccatalyst",
        }
    }

    /// Xcode SDK directory name (`<name>.platform`, `<name><ver>.sdk`).
    pub fn sdk_name(&self) -> &'static str {
        match self {
            Platform::Ios => "iPhoneOS",
            Platform::IosSimulator => "iPhoneSimulator",
            Platform::Tvos => "AppleTVOS",
            Platform::TvosSimulator => "AppleTVSimulator",
            Platform::Watchos => "WatchOS",
            Platform::WatchosSimulator => "WatchSimulator",
            Platform::Macos => "MacOSX",
            // Catalyst builds against the macOS SDK
            Platform::MacCatalyst => "MacOSX",
        }
    }

    /// SDK name for `xcrun -sdk <name>` version queries.
    pub fn sdk_query_name(&self) -> &'static str {
        match self {
            Platform::Ios | Platform::IosSimulator => "iphoneos",
            Platform::Tvos | Platform::TvosSimulator => "appletvos",
            Platform::Watchos | Platform::WatchosSimulator => "watchos",
            Platform::Macos | Platform::MacCatalyst => "macosx",
        }
    }

    /// Default minimum supported OS version for this platform.
    pub fn minimum_os(&self) -> &'static str {
        match self {
            Platform::Ios | Platform::IosSimulator => "11.0",
            Platform::Tvos | Platform::TvosSimulator => "11.0",
            Platform::Watchos | Platform::WatchosSimulator => "6.0",
            Platform::Macos => "10.11",
            // Catalyst versions track iOS
            Platform::MacCatalyst => "14.0",
        }
    }

    /// Whether this platform family lacks a usable `fork()` in its SDK,
    /// which rules out running library self-test suites.
    pub fn is_constrained_os(&self) -> bool {
        matches!(
            self,
            Platform::Tvos | Platform::TvosSimulator | Platform::Watchos | Platform::WatchosSimulator
        )
    }

    /// Deterministic per-platform build directory component.
    pub fn build_dir_component(&self) -> String {
        format!("Release-{}", self.identifier())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.identifier())
    }
}

impl std::str::FromStr for Platform {
    type Err = ToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .find(|p| p.identifier() == s)
            .copied()
            .ok_or_else(|| ToolchainError::UnknownPlatform(s.to_string()))
    }
}
