//! Build orchestration.
//!
//! Drives one library request end to end: cache check, prerequisite
//! check, source acquisition, matrix expansion, per-architecture builds,
//! and the merge steps that produce per-platform fat libraries. Bundle
//! requests layer on top, packaging finished platform libraries into a
//! multi-platform bundle directory.
//!
//! Prerequisites are checked for every requested platform before any
//! source is fetched or any process spawned, so a missing dependency
//! fails the whole request immediately.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use lipoforge_acquire::{AcquireError, SourceAcquirer};
use lipoforge_exec::{CommandRequest, CommandRunner, ProcessError};
use lipoforge_toolchain::{Platform, ToolchainError, ToolchainProvider, ENV_MIN_SDK_VERSION};
use thiserror::Error;
use tracing::info;

use crate::cache::{ArtifactCache, CacheError, PlatformArtifact};
use crate::config::BuildConfig;
use crate::deps::{DependencyError, DependencyResolver};
use crate::fsutil;
use crate::library::{BuildOptions, LibraryDefinition, LibraryRegistry};
use crate::matrix::{BuildJob, MatrixError, MatrixExpander};
use crate::merge::{BundleSlice, MergeError, Merger};
use crate::recipe::{PrepareContext, ScriptContext};
use crate::report::{BuildReport, JobReport, ReportError};
use crate::state::{BuildState, BuildStateData, StateError};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown library: {0}")]
    UnknownLibrary(String),

    #[error("source acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("bundle output directory is not empty: {0}")]
    DirectoryNotEmpty(PathBuf),

    #[error("library {library} does not support platform {platform}")]
    UnsupportedPlatform { library: String, platform: Platform },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::UnknownLibrary(_) => 10,
            PipelineError::UnsupportedPlatform { .. } => 10,
            PipelineError::Acquire(_) => 20,
            PipelineError::Toolchain(_) => 30,
            PipelineError::Dependency(_) => 40,
            PipelineError::Matrix(_) => 40,
            PipelineError::Process(e) => match e {
                ProcessError::Cancelled => 80,
                _ => 50,
            },
            PipelineError::Merge(_) => 50,
            PipelineError::DirectoryNotEmpty(_) => 60,
            PipelineError::Cache(_) => 1,
            PipelineError::State(_) => 1,
            PipelineError::Report(_) => 1,
            PipelineError::Io(_) => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// One library build request
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Library name from the registry
    pub library: String,

    /// Platforms to build; empty means every supported platform
    pub platforms: Vec<Platform>,

    /// Version override; the registry default when `None`
    pub version: Option<String>,

    pub options: BuildOptions,
}

/// One bundle request
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Libraries to package, each into its own bundle
    pub libraries: Vec<String>,

    /// Directory receiving the bundles
    pub output_dir: PathBuf,

    /// Remove an existing output directory instead of refusing it, and
    /// rebuild each library instead of packaging cached output
    pub clean: bool,
}

/// How a build request was satisfied
#[derive(Debug)]
pub enum BuildOutcome {
    /// Every requested platform was already in the cache
    Cached,
    /// At least one platform was built
    Built(BuildReport),
}

/// Build orchestrator
pub struct Orchestrator {
    config: BuildConfig,
    registry: LibraryRegistry,
    cache: ArtifactCache,
    runner: Arc<dyn CommandRunner>,
    toolchain: Arc<dyn ToolchainProvider>,
    acquirer: Box<dyn SourceAcquirer>,
    merger: Merger,
}

impl Orchestrator {
    pub fn new(
        config: BuildConfig,
        registry: LibraryRegistry,
        runner: Arc<dyn CommandRunner>,
        toolchain: Arc<dyn ToolchainProvider>,
        acquirer: Box<dyn SourceAcquirer>,
    ) -> Self {
        let cache = ArtifactCache::new(config.cache_root.clone());
        let merger = Merger::new(runner.clone());
        Self {
            config,
            registry,
            cache,
            runner,
            toolchain,
            acquirer,
            merger,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn registry(&self) -> &LibraryRegistry {
        &self.registry
    }

    /// Build one library for the requested platforms.
    pub fn build_library(&self, request: &BuildRequest) -> PipelineResult<BuildOutcome> {
        let library = self.resolve_library(request)?;
        let platforms = self.resolve_platforms(&library, &request.platforms)?;

        let mut state = BuildStateData::new(library.name.clone(), platforms.clone());
        let state_path = self.cache.library_root(&library).join("build_state.json");

        let outcome = self.run_build(&library, &platforms, request, &mut state, &state_path);
        if outcome.is_err() && !state.is_terminal() {
            // Best-effort failure marker; the original error wins.
            let _ = state.transition(BuildState::Failed);
            let _ = state.write(&state_path);
        }
        outcome
    }

    fn run_build(
        &self,
        library: &LibraryDefinition,
        platforms: &[Platform],
        request: &BuildRequest,
        state: &mut BuildStateData,
        state_path: &Path,
    ) -> PipelineResult<BuildOutcome> {
        if request.options.force_rebuild {
            for platform in platforms {
                self.cache.invalidate(library, Some(*platform))?;
            }
        }

        let missing: Vec<Platform> = platforms
            .iter()
            .copied()
            .filter(|platform| !self.cache.exists(library, Some(*platform)))
            .collect();

        if missing.is_empty() {
            info!(library = %library.name, "every requested platform is cached");
            state.transition(BuildState::Done)?;
            state.write(state_path)?;
            return Ok(BuildOutcome::Cached);
        }

        // Prerequisites for every platform that will build, plus the host
        // platform when a preparation step needs it. Checked before any
        // acquisition or subprocess.
        let resolver = DependencyResolver::new(&self.registry, &self.cache);
        let mut prerequisites: HashMap<Platform, PlatformArtifact> = HashMap::new();
        for platform in &missing {
            if let Some(artifact) = resolver.require_prerequisite(library, *platform)? {
                prerequisites.insert(*platform, artifact);
            }
        }
        let host_prerequisite = if library.recipe.needs_prepare() {
            resolver.require_prerequisite(library, Platform::Macos)?
        } else {
            None
        };

        let source_dir = self.cache.source_dir(library);
        info!(library = %library.name, version = %library.version, "acquiring source");
        self.acquirer
            .acquire(&library.name, &library.resolved_source(), &source_dir)?;
        state.transition(BuildState::SourceReady)?;
        state.write(state_path)?;

        let config_dir = self.cache.config_dir(library);
        for resource in library.recipe.resources() {
            resource.write_into(&config_dir)?;
        }

        let parallel_jobs = match self.config.parallel_jobs {
            Some(jobs) => jobs,
            None => self.toolchain.parallel_jobs()?,
        };

        let output_root = self.cache.canonical_path(library, None);
        if library.recipe.needs_prepare() {
            self.run_prepare_step(
                library,
                &source_dir,
                &output_root,
                &config_dir,
                host_prerequisite.as_ref(),
            )?;
        }

        let mut report = BuildReport::new(
            library.name.clone(),
            library.version.clone(),
            missing.clone(),
        );

        state.transition(BuildState::MatrixExpanded)?;
        state.write(state_path)?;

        for platform in &missing {
            state.transition(BuildState::ArchBuilding)?;
            state.write(state_path)?;

            self.build_platform(
                library,
                *platform,
                &source_dir,
                &output_root,
                &config_dir,
                parallel_jobs,
                prerequisites.get(platform),
                &request.options,
                &mut report,
            )?;

            state.transition(BuildState::ArchMerged)?;
            state.write(state_path)?;
        }

        report.finish(&self.cache.library_root(library).join("build_report.json"))?;
        state.transition(BuildState::Done)?;
        state.write(state_path)?;

        info!(library = %library.name, platforms = missing.len(), "build complete");
        Ok(BuildOutcome::Built(report))
    }

    /// Build and merge every architecture of one platform.
    #[allow(clippy::too_many_arguments)]
    fn build_platform(
        &self,
        library: &LibraryDefinition,
        platform: Platform,
        source_dir: &Path,
        output_root: &Path,
        config_dir: &Path,
        parallel_jobs: u32,
        prerequisite: Option<&PlatformArtifact>,
        options: &BuildOptions,
        report: &mut BuildReport,
    ) -> PipelineResult<()> {
        info!(library = %library.name, %platform, "building platform");

        let base_env = self.job_environment(library, platform, config_dir)?;
        let jobs = MatrixExpander::expand(
            library,
            platform,
            source_dir,
            output_root,
            &base_env,
            options,
        )?;

        let deployment_target = library.deployment_target(platform);
        let mut arch_dirs = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let started = Instant::now();
            self.run_job(library, job, config_dir, parallel_jobs, deployment_target, prerequisite)?;
            report.record_job(JobReport {
                platform,
                triple: job.target.triple.clone(),
                arch: job.target.arch.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            });
            arch_dirs.push(job.install_dir.clone());
        }

        let platform_dir = self.cache.canonical_path(library, Some(platform));
        fsutil::recreate_dir(&platform_dir)?;

        let include_dirs: Vec<PathBuf> = arch_dirs.iter().map(|dir| dir.join("include")).collect();
        self.merger
            .copy_headers(&include_dirs, &platform_dir.join("include"))?;

        let arch_libs: Vec<PathBuf> = arch_dirs
            .iter()
            .map(|dir| dir.join("lib").join(&library.artifact_name))
            .collect();
        self.merger
            .merge_architectures(&arch_libs, &platform_dir.join("lib").join(&library.artifact_name))?;

        // Architecture directories are merge inputs only; drop them.
        for dir in &arch_dirs {
            fs::remove_dir_all(dir)?;
        }

        Ok(())
    }

    /// Run one architecture job: build script, then component combine.
    fn run_job(
        &self,
        library: &LibraryDefinition,
        job: &BuildJob,
        config_dir: &Path,
        parallel_jobs: u32,
        deployment_target: &str,
        prerequisite: Option<&PlatformArtifact>,
    ) -> PipelineResult<()> {
        info!(library = %library.name, triple = %job.target.triple, "building architecture");

        let script = library.recipe.render_script(&ScriptContext {
            target: &job.target,
            source_dir: &job.source_dir,
            install_dir: &job.install_dir,
            config_dir,
            parallel_jobs,
            deployment_target,
            prerequisite,
        });

        self.runner.run(
            &CommandRequest::script(script)
                .working_dir(&job.install_dir)
                .envs(&job.env),
        )?;

        let components = library
            .recipe
            .component_archives(&job.install_dir, &library.artifact_name)?;
        self.merger.combine_archives(
            &components,
            &job.install_dir.join("lib").join(&library.artifact_name),
        )?;

        Ok(())
    }

    /// Host preparation step for recipes that need one before the first
    /// cross-compiled build.
    fn run_prepare_step(
        &self,
        library: &LibraryDefinition,
        source_dir: &Path,
        output_root: &Path,
        config_dir: &Path,
        prerequisite: Option<&PlatformArtifact>,
    ) -> PipelineResult<()> {
        let prepare_dir = output_root.join("Release-common");
        fsutil::recreate_dir(&prepare_dir)?;

        let Some(script) = library.recipe.render_prepare(&PrepareContext {
            source_dir,
            prepare_dir: &prepare_dir,
            config_dir,
            prerequisite,
        }) else {
            return Ok(());
        };

        info!(library = %library.name, "running host preparation step");
        self.runner
            .run(&CommandRequest::script(script).working_dir(&prepare_dir))?;
        Ok(())
    }

    /// Package finished platform libraries into bundles.
    pub fn build_bundle(&self, request: &BundleRequest) -> PipelineResult<Vec<PathBuf>> {
        if request.output_dir.exists() {
            if request.clean {
                fs::remove_dir_all(&request.output_dir)?;
            } else if fsutil::dir_non_empty(&request.output_dir) {
                return Err(PipelineError::DirectoryNotEmpty(request.output_dir.clone()));
            }
        }
        fs::create_dir_all(&request.output_dir)?;

        let mut bundles = Vec::with_capacity(request.libraries.len());
        for name in &request.libraries {
            let library = self
                .registry
                .get(name)
                .ok_or_else(|| PipelineError::UnknownLibrary(name.clone()))?
                .clone();

            // Make sure every supported platform is built first; a clean
            // request rebuilds instead of packaging cached output.
            self.build_library(&BuildRequest {
                library: name.clone(),
                options: BuildOptions {
                    force_rebuild: request.clean,
                    ..Default::default()
                },
                ..Default::default()
            })?;

            let slices: Vec<BundleSlice> = library
                .supported_platforms()
                .into_iter()
                .map(|platform| {
                    let artifact = self.cache.platform_artifact(&library, platform);
                    BundleSlice {
                        library: artifact.lib_file,
                        headers: artifact.include_dir,
                    }
                })
                .collect();

            let bundle_path = request.output_dir.join(&library.bundle_name);
            self.merger.merge_platforms(&slices, &bundle_path)?;
            info!(library = %library.name, bundle = %bundle_path.display(), "bundle written");
            bundles.push(bundle_path);
        }

        Ok(bundles)
    }

    /// Drop cached output for a library, or one platform of it.
    pub fn invalidate(&self, name: &str, platform: Option<Platform>) -> PipelineResult<()> {
        let library = self
            .registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownLibrary(name.to_string()))?;
        self.cache.invalidate(library, platform)?;
        Ok(())
    }

    fn resolve_library(&self, request: &BuildRequest) -> PipelineResult<LibraryDefinition> {
        let mut library = self
            .registry
            .get(&request.library)
            .ok_or_else(|| PipelineError::UnknownLibrary(request.library.clone()))?
            .clone();
        if let Some(version) = &request.version {
            library.version = version.clone();
        }
        Ok(library)
    }

    /// Requested platforms validated against the library's target table,
    /// with the host platform appended when the library always builds it.
    fn resolve_platforms(
        &self,
        library: &LibraryDefinition,
        requested: &[Platform],
    ) -> PipelineResult<Vec<Platform>> {
        let mut platforms = if requested.is_empty() {
            library.supported_platforms()
        } else {
            for platform in requested {
                if !library.supports(*platform) {
                    return Err(PipelineError::UnsupportedPlatform {
                        library: library.name.clone(),
                        platform: *platform,
                    });
                }
            }
            requested.to_vec()
        };

        if library.always_build_host && !platforms.contains(&Platform::Macos) {
            platforms.push(Platform::Macos);
        }

        Ok(platforms)
    }

    /// Per-job process environment: the toolchain's cross-compilation
    /// variables, the library's deployment override, and the recipe's
    /// configuration directory pointer.
    fn job_environment(
        &self,
        library: &LibraryDefinition,
        platform: Platform,
        config_dir: &Path,
    ) -> PipelineResult<HashMap<String, String>> {
        let mut env = self.toolchain.cross_compile_env(platform)?;
        env.insert(
            ENV_MIN_SDK_VERSION.to_string(),
            library.deployment_target(platform).to_string(),
        );
        if let Some(var) = library.recipe.local_config_env() {
            env.insert(var.to_string(), config_dir.display().to_string());
        }
        Ok(env)
    }
}
