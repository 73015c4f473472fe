//! Library definitions and the declarative registry.
//!
//! A [`LibraryDefinition`] captures everything the pipeline needs to build
//! one library: where its source comes from, which architecture targets
//! exist per platform, which build options each target gets, which other
//! library must already be built, and how the build is invoked. The
//! per-platform target tables and option amendments are plain data so the
//! matrix expander stays free of per-library branching.

use lipoforge_acquire::SourceSpec;
use lipoforge_toolchain::Platform;

use crate::recipe::BuildRecipe;

/// Global toggles selected by the caller for one build invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Invalidate cached output and rebuild from scratch.
    pub force_rebuild: bool,
    /// Enable the extended NIST curve ops (`enable-ec_nistp_64_gcc_128`)
    /// on 64-bit architectures.
    pub extended_nist_ops: bool,
}

/// A named global toggle an option rule can be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    ExtendedNistOps,
}

impl Toggle {
    fn enabled(&self, options: &BuildOptions) -> bool {
        match self {
            Toggle::ExtendedNistOps => options.extended_nist_ops,
        }
    }
}

/// One architecture target within a platform's target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Target triple; the trailing dash-separated token names the
    /// architecture (e.g. `ios-arm64` → `arm64`).
    pub triple: String,
    /// Build-tool-specific platform key (cmake `-DPLATFORM=`), when the
    /// recipe needs one.
    pub tool_platform: Option<String>,
}

impl TargetSpec {
    pub fn new(triple: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            tool_platform: None,
        }
    }

    pub fn with_tool_platform(triple: impl Into<String>, tool_platform: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            tool_platform: Some(tool_platform.into()),
        }
    }
}

/// A conditional build-option amendment.
///
/// The flag is appended when every present predicate matches: the job's
/// platform is in `platforms` (when set), the architecture name ends with
/// `arch_suffix` (when set), and the gating toggle is enabled (when set).
#[derive(Debug, Clone)]
pub struct OptionRule {
    pub platforms: Option<Vec<Platform>>,
    pub arch_suffix: Option<String>,
    pub toggle: Option<Toggle>,
    pub flag: String,
}

impl OptionRule {
    pub fn applies(&self, platform: Platform, arch: &str, options: &BuildOptions) -> bool {
        if let Some(platforms) = &self.platforms {
            if !platforms.contains(&platform) {
                return false;
            }
        }
        if let Some(suffix) = &self.arch_suffix {
            if !arch.ends_with(suffix.as_str()) {
                return false;
            }
        }
        if let Some(toggle) = &self.toggle {
            if !toggle.enabled(options) {
                return false;
            }
        }
        true
    }
}

/// A buildable library.
#[derive(Debug, Clone)]
pub struct LibraryDefinition {
    /// Stable name the library is looked up by.
    pub name: String,
    /// Human version string; `{version}` in archive URLs resolves to it.
    pub version: String,
    /// File name of the merged static library (`libopenssl.a`).
    pub artifact_name: String,
    /// File name of the multi-platform bundle (`OpenSSL.xcframework`).
    pub bundle_name: String,
    /// Where the source tree comes from.
    pub source: SourceSpec,
    /// Name of a library whose per-platform artifacts must exist before
    /// this one builds.
    pub prerequisite: Option<String>,
    /// Build the host (macosx) platform even when not requested; dependent
    /// libraries cross-compile against the host artifact.
    pub always_build_host: bool,
    /// Platform → architecture target table, in build order.
    pub targets: Vec<(Platform, Vec<TargetSpec>)>,
    /// Options every target starts from.
    pub base_options: Vec<String>,
    /// Conditional option amendments.
    pub option_rules: Vec<OptionRule>,
    /// Per-platform minimum-OS overrides; platforms not listed use the
    /// platform default.
    pub deployment_overrides: Vec<(Platform, String)>,
    /// How a single architecture target is configured, compiled and
    /// installed.
    pub recipe: BuildRecipe,
}

impl LibraryDefinition {
    /// Architecture targets declared for `platform`, if any.
    pub fn targets_for(&self, platform: Platform) -> Option<&[TargetSpec]> {
        self.targets
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, specs)| specs.as_slice())
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.targets_for(platform).is_some()
    }

    /// Platforms this library builds for, in declaration order.
    pub fn supported_platforms(&self) -> Vec<Platform> {
        self.targets.iter().map(|(p, _)| *p).collect()
    }

    /// Minimum OS version for `platform`, honoring per-library overrides.
    pub fn deployment_target(&self, platform: Platform) -> &str {
        self.deployment_overrides
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| platform.minimum_os())
    }

    /// The source spec with `{version}` placeholders resolved.
    pub fn resolved_source(&self) -> SourceSpec {
        match &self.source {
            SourceSpec::Archive { url, sha256 } => SourceSpec::Archive {
                url: url.replace("{version}", &self.version),
                sha256: sha256.clone(),
            },
            git @ SourceSpec::Git { .. } => git.clone(),
        }
    }
}

/// Lookup table of known libraries.
#[derive(Debug, Clone, Default)]
pub struct LibraryRegistry {
    libraries: Vec<LibraryDefinition>,
}

impl LibraryRegistry {
    /// An empty registry; used by tests that register their own libraries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in library set: OpenSSL and TON.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(openssl_definition());
        registry.register(ton_definition());
        registry
    }

    /// Register a definition, replacing any previous one of the same name.
    pub fn register(&mut self, definition: LibraryDefinition) {
        self.libraries.retain(|def| def.name != definition.name);
        self.libraries.push(definition);
    }

    pub fn get(&self, name: &str) -> Option<&LibraryDefinition> {
        self.libraries.iter().find(|def| def.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.libraries.iter().map(|def| def.name.as_str()).collect()
    }
}

fn openssl_definition() -> LibraryDefinition {
    let constrained = vec![
        Platform::Tvos,
        Platform::TvosSimulator,
        Platform::Watchos,
        Platform::WatchosSimulator,
    ];

    LibraryDefinition {
        name: "openssl".to_string(),
        version: "1.1.1i".to_string(),
        artifact_name: "libopenssl.a".to_string(),
        bundle_name: "OpenSSL.xcframework".to_string(),
        source: SourceSpec::Archive {
            url: "https://www.openssl.org/source/openssl-{version}.tar.gz".to_string(),
            sha256: None,
        },
        prerequisite: None,
        always_build_host: true,
        targets: vec![
            (Platform::Ios, vec![TargetSpec::new("ios-arm64")]),
            (
                Platform::IosSimulator,
                vec![
                    TargetSpec::new("ios-simulator-x86_64"),
                    TargetSpec::new("ios-simulator-arm64"),
                ],
            ),
            (Platform::Tvos, vec![TargetSpec::new("tvos-arm64")]),
            (
                Platform::TvosSimulator,
                vec![TargetSpec::new("tvos-simulator-x86_64")],
            ),
            (
                Platform::Watchos,
                vec![
                    TargetSpec::new("watchos-armv7k"),
                    TargetSpec::new("watchos-arm64_32"),
                ],
            ),
            (
                Platform::WatchosSimulator,
                vec![TargetSpec::new("watchos-simulator-i386")],
            ),
            (
                Platform::Macos,
                vec![
                    TargetSpec::new("macos-x86_64"),
                    TargetSpec::new("macos-arm64"),
                ],
            ),
            (
                Platform::MacCatalyst,
                vec![
                    TargetSpec::new("mac-catalyst-x86_64"),
                    TargetSpec::new("mac-catalyst-arm64"),
                ],
            ),
        ],
        // no-async: getcontext/setcontext/makecontext trigger App Store
        // rejections; no-shared: static outputs only.
        base_options: vec!["no-async".to_string(), "no-shared".to_string()],
        option_rules: vec![
            // The self-test suite uses an unguarded fork(), absent from the
            // tvOS and watchOS SDKs.
            OptionRule {
                platforms: Some(constrained),
                arch_suffix: None,
                toggle: None,
                flag: "no-tests".to_string(),
            },
            OptionRule {
                platforms: None,
                arch_suffix: Some("64".to_string()),
                toggle: Some(Toggle::ExtendedNistOps),
                flag: "enable-ec_nistp_64_gcc_128".to_string(),
            },
        ],
        deployment_overrides: vec![],
        recipe: BuildRecipe::Configure {
            local_config_env: Some("OPENSSL_LOCAL_CONFIG_DIR".to_string()),
            install_target: "install_dev".to_string(),
            component_archives: vec!["libssl.a".to_string(), "libcrypto.a".to_string()],
        },
    }
}

fn ton_definition() -> LibraryDefinition {
    LibraryDefinition {
        name: "ton".to_string(),
        version: "labraburn".to_string(),
        artifact_name: "libton.a".to_string(),
        bundle_name: "TON.xcframework".to_string(),
        source: SourceSpec::Git {
            url: "https://github.com/labraburn/ton.git".to_string(),
            branch: "labraburn".to_string(),
        },
        prerequisite: Some("openssl".to_string()),
        always_build_host: false,
        targets: vec![
            (
                Platform::Ios,
                vec![TargetSpec::with_tool_platform("ios-arm64", "OS")],
            ),
            (
                Platform::IosSimulator,
                vec![
                    TargetSpec::with_tool_platform("ios-simulator-x86_64", "SIMULATOR"),
                    TargetSpec::with_tool_platform("ios-simulator-arm64", "SIMULATORARM64"),
                ],
            ),
            (
                Platform::Tvos,
                vec![TargetSpec::with_tool_platform("tvos-arm64", "TVOS")],
            ),
            (
                Platform::TvosSimulator,
                vec![TargetSpec::with_tool_platform(
                    "tvos-simulator-x86_64",
                    "TVOS_SIMULATOR",
                )],
            ),
            (
                Platform::Watchos,
                vec![TargetSpec::with_tool_platform("watchos-arm64_32", "WATCHOS")],
            ),
            (
                Platform::WatchosSimulator,
                vec![TargetSpec::with_tool_platform(
                    "watchos-simulator-i386",
                    "WATCHOS_SIMULATOR",
                )],
            ),
            (
                Platform::Macos,
                vec![
                    TargetSpec::with_tool_platform("macos-x86_64", "MAC"),
                    TargetSpec::with_tool_platform("macos-arm64", "MAC_ARM64"),
                ],
            ),
            (
                Platform::MacCatalyst,
                vec![
                    TargetSpec::with_tool_platform("mac-catalyst-x86_64", "MAC_CATALYST"),
                    TargetSpec::with_tool_platform("mac-catalyst-arm64", "MAC_CATALYST_ARM64"),
                ],
            ),
        ],
        base_options: vec![],
        option_rules: vec![],
        deployment_overrides: vec![
            (Platform::Ios, "12.0".to_string()),
            (Platform::IosSimulator, "12.0".to_string()),
            (Platform::Tvos, "12.0".to_string()),
            (Platform::TvosSimulator, "12.0".to_string()),
            (Platform::Watchos, "6.0".to_string()),
            (Platform::WatchosSimulator, "6.0".to_string()),
            (Platform::Macos, "11.0".to_string()),
            (Platform::MacCatalyst, "14.0".to_string()),
        ],
        recipe: BuildRecipe::Cmake {
            defines: vec![
                "-DCMAKE_BUILD_TYPE=Release".to_string(),
                "-DTON_ONLY_TONLIB=ON".to_string(),
                "-DTON_ARCH=".to_string(),
                "-DGIT_EXECUTABLE=/usr/bin/git".to_string(),
            ],
            prepare_cross_compiling: true,
            enable_bitcode: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_both_libraries() {
        let registry = LibraryRegistry::builtin();
        assert!(registry.get("openssl").is_some());
        assert!(registry.get("ton").is_some());
        assert!(registry.get("zlib").is_none());
    }

    #[test]
    fn every_supported_platform_has_a_non_empty_target_list() {
        let registry = LibraryRegistry::builtin();
        for name in registry.names() {
            let def = registry.get(name).unwrap();
            for platform in def.supported_platforms() {
                let targets = def.targets_for(platform).unwrap();
                assert!(
                    !targets.is_empty(),
                    "{name} has an empty target list for {platform}"
                );
            }
        }
    }

    #[test]
    fn archive_url_resolves_version() {
        let registry = LibraryRegistry::builtin();
        let openssl = registry.get("openssl").unwrap();
        match openssl.resolved_source() {
            SourceSpec::Archive { url, .. } => {
                assert_eq!(url, "https://www.openssl.org/source/openssl-1.1.1i.tar.gz");
            }
            other => panic!("expected archive source, got {other:?}"),
        }
    }

    #[test]
    fn deployment_target_prefers_override() {
        let registry = LibraryRegistry::builtin();
        let ton = registry.get("ton").unwrap();
        assert_eq!(ton.deployment_target(Platform::Macos), "11.0");

        let openssl = registry.get("openssl").unwrap();
        assert_eq!(openssl.deployment_target(Platform::Macos), "10.11");
    }

    #[test]
    fn option_rule_predicates_compose() {
        let rule = OptionRule {
            platforms: Some(vec![Platform::Tvos]),
            arch_suffix: Some("64".to_string()),
            toggle: Some(Toggle::ExtendedNistOps),
            flag: "x".to_string(),
        };
        let enabled = BuildOptions {
            extended_nist_ops: true,
            ..Default::default()
        };
        let disabled = BuildOptions::default();

        assert!(rule.applies(Platform::Tvos, "arm64", &enabled));
        assert!(!rule.applies(Platform::Ios, "arm64", &enabled));
        assert!(!rule.applies(Platform::Tvos, "armv7k", &enabled));
        assert!(!rule.applies(Platform::Tvos, "arm64", &disabled));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = LibraryRegistry::builtin();
        let mut replacement = registry.get("openssl").unwrap().clone();
        replacement.version = "3.0.0".to_string();
        registry.register(replacement);
        assert_eq!(registry.get("openssl").unwrap().version, "3.0.0");
        assert_eq!(registry.names().len(), 2);
    }
}
