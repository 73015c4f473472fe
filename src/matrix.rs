//! Build matrix expansion.
//!
//! Expands one (library, platform) pair into the ordered list of build
//! jobs, one per declared architecture target. Each job gets an isolated
//! working directory with a fresh copy of the source tree; the underlying
//! build systems mutate their tree in place during configure/compile, so a
//! shared tree cannot survive repeated cycles.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use lipoforge_toolchain::Platform;
use thiserror::Error;
use tracing::debug;

use crate::fsutil;
use crate::library::{BuildOptions, LibraryDefinition};

/// Errors from matrix expansion.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("cannot derive an architecture from target {0:?}")]
    MalformedArchitectureTarget(String),

    #[error("library {library} declares no targets for platform {platform}")]
    UnsupportedPlatform { library: String, platform: Platform },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One (platform, architecture, build options) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureTarget {
    pub platform: Platform,
    /// Full target triple as passed to the build tool.
    pub triple: String,
    /// Architecture name, the triple's trailing dash-separated token.
    pub arch: String,
    /// Build-tool-specific platform key, when the recipe needs one.
    pub tool_platform: Option<String>,
    /// Resolved option flags for this target.
    pub options: Vec<String>,
}

/// One unit of work: an architecture target plus its on-disk locations and
/// process environment. Created by the expander, consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub target: ArchitectureTarget,
    /// Fresh per-job copy of the library source tree.
    pub source_dir: PathBuf,
    /// Per-job install prefix; doubles as the job's working directory.
    pub install_dir: PathBuf,
    /// Environment injected into the job's external processes.
    pub env: HashMap<String, String>,
}

/// Derive the architecture name from a target triple.
///
/// The architecture is the trailing dash-separated token; a triple without
/// a dash or with an empty trailing token is malformed.
pub fn parse_arch(triple: &str) -> Result<&str, MatrixError> {
    match triple.rsplit_once('-') {
        Some((_, arch)) if !arch.is_empty() => Ok(arch),
        _ => Err(MatrixError::MalformedArchitectureTarget(triple.to_string())),
    }
}

/// Expands (library, platform) pairs into build jobs.
pub struct MatrixExpander;

impl MatrixExpander {
    /// Produce the ordered job list for `platform`.
    ///
    /// `source_root` is the acquired source tree; `output_root` is the
    /// library's canonical output directory, under which each job gets a
    /// `<Release-platform>-<arch>` install directory (recreated from
    /// scratch) holding its private source copy.
    pub fn expand(
        library: &LibraryDefinition,
        platform: Platform,
        source_root: &Path,
        output_root: &Path,
        base_env: &HashMap<String, String>,
        options: &BuildOptions,
    ) -> Result<Vec<BuildJob>, MatrixError> {
        let targets = library.targets_for(platform).ok_or_else(|| {
            MatrixError::UnsupportedPlatform {
                library: library.name.clone(),
                platform,
            }
        })?;

        let mut jobs = Vec::with_capacity(targets.len());
        for spec in targets {
            let arch = parse_arch(&spec.triple)?.to_string();

            let mut resolved = library.base_options.clone();
            for rule in &library.option_rules {
                if rule.applies(platform, &arch, options) {
                    resolved.push(rule.flag.clone());
                }
            }

            let install_dir =
                output_root.join(format!("{}-{}", platform.build_dir_component(), arch));
            fsutil::recreate_dir(&install_dir)?;

            let source_dir = install_dir.join("source");
            fsutil::copy_tree(source_root, &source_dir)?;

            debug!(
                library = %library.name,
                %platform,
                triple = %spec.triple,
                "expanded build job"
            );

            jobs.push(BuildJob {
                target: ArchitectureTarget {
                    platform,
                    triple: spec.triple.clone(),
                    arch,
                    tool_platform: spec.tool_platform.clone(),
                    options: resolved,
                },
                source_dir,
                install_dir,
                env: base_env.clone(),
            });
        }

        Ok(jobs)
    }
}
