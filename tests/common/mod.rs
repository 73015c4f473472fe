//! Shared test fixtures: a tiny library registry and an orchestrator wired
//! entirely to scripted collaborators. The fabricating runner plays the role
//! of every external tool, leaving on disk exactly what the real tools
//! would, so the pipeline can be exercised end to end without Xcode.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lipoforge::mock::{FixedToolchain, ScriptedRunner, StubAcquirer};
use lipoforge::{
    BuildConfig, BuildRecipe, LibraryDefinition, LibraryRegistry, Orchestrator, Platform,
    SourceSpec, TargetSpec,
};
use lipoforge_exec::{CommandRequest, Invocation, ProcessOutput};
use tempfile::TempDir;

/// A two-architecture library on macOS plus a single-architecture iOS slice.
pub fn alpha_definition() -> LibraryDefinition {
    LibraryDefinition {
        name: "alpha".to_string(),
        version: "1.0.0".to_string(),
        artifact_name: "libalpha.a".to_string(),
        bundle_name: "Alpha.xcframework".to_string(),
        source: SourceSpec::Archive {
            url: "https://example.invalid/alpha-{version}.tar.gz".to_string(),
            sha256: None,
        },
        prerequisite: None,
        always_build_host: false,
        targets: vec![
            (
                Platform::Macos,
                vec![
                    TargetSpec::new("alpha-macos-x86_64"),
                    TargetSpec::new("alpha-macos-arm64"),
                ],
            ),
            (Platform::Ios, vec![TargetSpec::new("alpha-ios-arm64")]),
        ],
        base_options: vec!["no-shared".to_string()],
        option_rules: vec![],
        deployment_overrides: vec![],
        recipe: BuildRecipe::Configure {
            local_config_env: None,
            install_target: "install".to_string(),
            component_archives: vec!["liba.a".to_string(), "libb.a".to_string()],
        },
    }
}

/// A library that requires alpha to be built first.
pub fn beta_definition() -> LibraryDefinition {
    LibraryDefinition {
        prerequisite: Some("alpha".to_string()),
        name: "beta".to_string(),
        artifact_name: "libbeta.a".to_string(),
        bundle_name: "Beta.xcframework".to_string(),
        targets: vec![(Platform::Macos, vec![TargetSpec::new("beta-macos-arm64")])],
        ..alpha_definition()
    }
}

pub fn test_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::empty();
    registry.register(alpha_definition());
    registry.register(beta_definition());
    registry
}

/// Orchestrator plus the scripted runner backing it.
pub struct Harness {
    pub temp: TempDir,
    pub runner: Arc<ScriptedRunner>,
    pub orchestrator: Orchestrator,
}

pub fn harness() -> Harness {
    harness_with_handler(fabricate)
}

pub fn harness_with_handler(
    handler: impl Fn(&CommandRequest) -> Result<ProcessOutput, lipoforge::ProcessError>
        + Send
        + Sync
        + 'static,
) -> Harness {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(handler));

    let config = BuildConfig {
        cache_root: temp.path().join("cache"),
        downloads_dir: temp.path().join("downloads"),
        parallel_jobs: Some(2),
    };

    let orchestrator = Orchestrator::new(
        config,
        test_registry(),
        runner.clone(),
        Arc::new(FixedToolchain::default()),
        Box::new(StubAcquirer),
    );

    Harness {
        temp,
        runner,
        orchestrator,
    }
}

/// Leave behind what the real tool would: archives for build scripts, the
/// output file for libtool/lipo, the output directory for xcodebuild.
pub fn fabricate(request: &CommandRequest) -> Result<ProcessOutput, lipoforge::ProcessError> {
    match &request.invocation {
        Invocation::Script { text } => {
            if text.contains("Configure") {
                let install = request
                    .working_dir
                    .clone()
                    .expect("build script runs in the install dir");
                let lib = install.join("lib");
                fs::create_dir_all(&lib).unwrap();
                fs::write(lib.join("liba.a"), "component-a").unwrap();
                fs::write(lib.join("libb.a"), "component-b").unwrap();
                let include = install.join("include").join("alpha");
                fs::create_dir_all(&include).unwrap();
                fs::write(include.join("alpha.h"), "// header").unwrap();
            }
            Ok(ProcessOutput::default())
        }
        Invocation::Command { program, args } => {
            match program.as_str() {
                "libtool" => {
                    // libtool -static -o <output> <inputs..>
                    write_merge_output(Path::new(&args[2]), "combined");
                }
                "lipo" => {
                    let pos = args.iter().position(|a| a == "-output").unwrap();
                    write_merge_output(Path::new(&args[pos + 1]), "fat");
                }
                "xcodebuild" => {
                    let output = args.last().unwrap();
                    fs::create_dir_all(output).unwrap();
                    fs::write(PathBuf::from(output).join("Info.plist"), "plist").unwrap();
                }
                _ => {}
            }
            Ok(ProcessOutput::default())
        }
    }
}

fn write_merge_output(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// The programs invoked so far, scripts shown as "sh".
pub fn invoked_programs(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .calls()
        .iter()
        .map(|call| call.program().to_string())
        .collect()
}
