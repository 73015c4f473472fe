//! Library build pipeline integration tests
//!
//! Exercises the full build flow against scripted collaborators: cache
//! behavior, merge tool invocations, prerequisite enforcement, and failure
//! propagation from a build subprocess.

mod common;

use common::{fabricate, harness, harness_with_handler, invoked_programs};
use lipoforge::{
    BuildOptions, BuildOutcome, BuildRequest, DependencyError, PipelineError, Platform,
    ProcessError, ProcessOutput,
};
use lipoforge_exec::Invocation;
use std::fs;

fn build_request(library: &str, platforms: Vec<Platform>) -> BuildRequest {
    BuildRequest {
        library: library.to_string(),
        platforms,
        version: None,
        options: BuildOptions::default(),
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn build_produces_a_merged_platform_artifact() {
    let h = harness();

    let outcome = h
        .orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();

    let report = match outcome {
        BuildOutcome::Built(report) => report,
        BuildOutcome::Cached => panic!("nothing was cached yet"),
    };
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.platforms, vec![Platform::Macos]);

    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let artifact = h
        .orchestrator
        .cache()
        .platform_artifact(&alpha, Platform::Macos);
    assert_eq!(fs::read_to_string(&artifact.lib_file).unwrap(), "fat");
    assert!(artifact.include_dir.join("alpha/alpha.h").exists());
}

#[test]
fn two_architectures_mean_two_scripts_two_libtools_one_lipo() {
    let h = harness();
    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();

    let programs = invoked_programs(&h.runner);
    assert_eq!(programs.iter().filter(|p| *p == "sh").count(), 2);
    assert_eq!(programs.iter().filter(|p| *p == "libtool").count(), 2);
    assert_eq!(programs.iter().filter(|p| *p == "lipo").count(), 1);

    // lipo sees both architecture libraries.
    let lipo = h
        .runner
        .calls()
        .into_iter()
        .find(|c| c.program() == "lipo")
        .unwrap();
    if let Invocation::Command { args, .. } = &lipo.invocation {
        assert_eq!(args[0], "-create");
        // Two architecture inputs plus the merged output path.
        assert_eq!(args.iter().filter(|a| a.ends_with("libalpha.a")).count(), 3);
        let out_pos = args.iter().position(|a| a == "-output").unwrap();
        assert!(args[out_pos + 1].ends_with("Release-macosx/lib/libalpha.a"));
    } else {
        panic!("lipo should be a plain command");
    }
}

#[test]
fn architecture_directories_are_removed_after_the_merge() {
    let h = harness();
    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();

    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let output_root = h.orchestrator.cache().canonical_path(&alpha, None);
    assert!(!output_root.join("Release-macosx-x86_64").exists());
    assert!(!output_root.join("Release-macosx-arm64").exists());
    assert!(output_root.join("Release-macosx").exists());
}

#[test]
fn state_artifact_lands_in_done() {
    let h = harness();
    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();

    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let state_path = h
        .orchestrator
        .cache()
        .library_root(&alpha)
        .join("build_state.json");
    let state = lipoforge::BuildStateData::load(&state_path).unwrap();
    assert_eq!(state.state, lipoforge::BuildState::Done);

    let report_path = h
        .orchestrator
        .cache()
        .library_root(&alpha)
        .join("build_report.json");
    assert!(report_path.exists());
}

// =============================================================================
// Caching
// =============================================================================

#[test]
fn second_build_is_a_cache_hit_with_zero_invocations() {
    let h = harness();
    let request = build_request("alpha", vec![Platform::Macos]);

    h.orchestrator.build_library(&request).unwrap();
    let first_calls = h.runner.call_count();

    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let artifact = h
        .orchestrator
        .cache()
        .platform_artifact(&alpha, Platform::Macos);
    let before = fs::read(&artifact.lib_file).unwrap();

    let outcome = h.orchestrator.build_library(&request).unwrap();
    assert!(matches!(outcome, BuildOutcome::Cached));
    assert_eq!(h.runner.call_count(), first_calls);
    assert_eq!(fs::read(&artifact.lib_file).unwrap(), before);
}

#[test]
fn only_missing_platforms_are_built() {
    let h = harness();
    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();
    let calls_after_macos = h.runner.call_count();

    // Ask for both; macOS is already cached so only iOS builds.
    let outcome = h
        .orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos, Platform::Ios]))
        .unwrap();

    let report = match outcome {
        BuildOutcome::Built(report) => report,
        BuildOutcome::Cached => panic!("iOS was not cached"),
    };
    assert_eq!(report.platforms, vec![Platform::Ios]);
    assert_eq!(report.jobs.len(), 1);
    assert!(h.runner.call_count() > calls_after_macos);
}

#[test]
fn force_rebuild_invalidates_and_rebuilds() {
    let h = harness();
    let mut request = build_request("alpha", vec![Platform::Macos]);
    h.orchestrator.build_library(&request).unwrap();
    let first_calls = h.runner.call_count();

    // A leftover only invalidation would remove.
    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let platform_dir = h
        .orchestrator
        .cache()
        .canonical_path(&alpha, Some(Platform::Macos));
    fs::write(platform_dir.join("stale-marker"), "old").unwrap();

    request.options.force_rebuild = true;
    let outcome = h.orchestrator.build_library(&request).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built(_)));
    assert!(h.runner.call_count() > first_calls);

    // The canonical directory was dropped and rebuilt, not appended to.
    assert!(!platform_dir.join("stale-marker").exists());
    let artifact = h
        .orchestrator
        .cache()
        .platform_artifact(&alpha, Platform::Macos);
    assert!(artifact.lib_file.exists());
}

// =============================================================================
// Prerequisites
// =============================================================================

#[test]
fn missing_prerequisite_fails_before_any_subprocess() {
    let h = harness();

    let err = h
        .orchestrator
        .build_library(&build_request("beta", vec![Platform::Macos]))
        .unwrap_err();

    match err {
        PipelineError::Dependency(DependencyError::MissingPrerequisite {
            library,
            prerequisite,
            platform,
        }) => {
            assert_eq!(library, "beta");
            assert_eq!(prerequisite, "alpha");
            assert_eq!(platform, Platform::Macos);
        }
        other => panic!("expected a missing prerequisite, got {other:?}"),
    }
    assert_eq!(h.runner.call_count(), 0);
}

#[test]
fn satisfied_prerequisite_lets_the_dependent_build() {
    let h = harness();
    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();

    let outcome = h
        .orchestrator
        .build_library(&build_request("beta", vec![Platform::Macos]))
        .unwrap();
    assert!(matches!(outcome, BuildOutcome::Built(_)));
}

// =============================================================================
// Failure propagation
// =============================================================================

#[test]
fn build_script_failure_stops_the_pipeline() {
    let h = harness_with_handler(|request| match &request.invocation {
        Invocation::Script { .. } => Err(ProcessError::Failed {
            code: 7,
            message: "boom".to_string(),
        }),
        _ => Ok(ProcessOutput::default()),
    });

    let err = h
        .orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap_err();

    match &err {
        PipelineError::Process(ProcessError::Failed { code, message }) => {
            assert_eq!(*code, 7);
            assert_eq!(message, "boom");
        }
        other => panic!("expected a process failure, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 50);

    // The first script failed, so no merge tool ever ran.
    let programs = invoked_programs(&h.runner);
    assert_eq!(programs, vec!["sh"]);

    // And the failure is recorded in the state artifact.
    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    let state = lipoforge::BuildStateData::load(
        &h.orchestrator
            .cache()
            .library_root(&alpha)
            .join("build_state.json"),
    )
    .unwrap();
    assert_eq!(state.state, lipoforge::BuildState::Failed);
}

#[test]
fn failed_build_leaves_no_canonical_platform_output() {
    let h = harness_with_handler(|request| match &request.invocation {
        Invocation::Script { .. } => Err(ProcessError::Failed {
            code: 1,
            message: "configure failed".to_string(),
        }),
        _ => fabricate(request),
    });

    h.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap_err();

    let alpha = h.orchestrator.registry().get("alpha").unwrap().clone();
    assert!(!h.orchestrator.cache().exists(&alpha, Some(Platform::Macos)));

    // A later request rebuilds instead of trusting the partial state.
    let h2 = harness();
    h2.orchestrator
        .build_library(&build_request("alpha", vec![Platform::Macos]))
        .unwrap();
}

// =============================================================================
// Request validation
// =============================================================================

#[test]
fn unknown_library_is_rejected() {
    let h = harness();
    let err = h
        .orchestrator
        .build_library(&build_request("gamma", vec![]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownLibrary(name) if name == "gamma"));
    assert_eq!(h.runner.call_count(), 0);
}

#[test]
fn unsupported_platform_is_rejected_up_front() {
    let h = harness();
    let err = h
        .orchestrator
        .build_library(&build_request("alpha", vec![Platform::Watchos]))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnsupportedPlatform { platform: Platform::Watchos, .. }
    ));
    assert_eq!(h.runner.call_count(), 0);
}

#[test]
fn empty_platform_list_builds_everything_supported() {
    let h = harness();
    let outcome = h
        .orchestrator
        .build_library(&build_request("alpha", vec![]))
        .unwrap();

    let report = match outcome {
        BuildOutcome::Built(report) => report,
        BuildOutcome::Cached => panic!("nothing was cached yet"),
    };
    assert_eq!(report.platforms.len(), 2);
    assert_eq!(report.jobs.len(), 3);
}
