//! Artifact merge operations.
//!
//! Three external tools carry the whole merge story: `libtool -static`
//! folds component archives into one archive within a single architecture,
//! `lipo -create` joins per-architecture archives into a platform fat
//! library, and `xcodebuild -create-xcframework` assembles platform
//! libraries into a multi-platform bundle. All three run through the
//! [`CommandRunner`] seam so tests never touch the real tools.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lipoforge_exec::{CommandRequest, CommandRunner, ProcessError};
use thiserror::Error;
use tracing::info;

use crate::fsutil;

/// Errors from merge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no inputs to merge into {}", output.display())]
    NoInputs { output: PathBuf },

    #[error("merge tool failed: {0}")]
    Combiner(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where a platform's header set comes from.
///
/// Headers are assumed identical across architectures of one platform, so
/// the merger copies them from a single designated architecture rather than
/// comparing or merging trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderSourceStrategy {
    /// Take headers from the first architecture in declaration order.
    #[default]
    FirstArchitecture,
}

/// One platform's contribution to a bundle: its fat library plus headers.
#[derive(Debug, Clone)]
pub struct BundleSlice {
    pub library: PathBuf,
    pub headers: PathBuf,
}

/// Runs the external merge tools.
pub struct Merger {
    runner: Arc<dyn CommandRunner>,
    header_strategy: HeaderSourceStrategy,
}

impl Merger {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            header_strategy: HeaderSourceStrategy::default(),
        }
    }

    /// Fold component archives into one static archive via `libtool`.
    pub fn combine_archives(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs {
                output: output.to_path_buf(),
            });
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut args = vec![
            "-static".to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ];
        args.extend(inputs.iter().map(|p| p.display().to_string()));

        self.runner.run(&CommandRequest::command("libtool", args))?;
        info!(output = %output.display(), count = inputs.len(), "combined component archives");
        Ok(())
    }

    /// Join per-architecture archives into a fat library via `lipo`.
    pub fn merge_architectures(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs {
                output: output.to_path_buf(),
            });
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut args = vec!["-create".to_string()];
        args.extend(inputs.iter().map(|p| p.display().to_string()));
        args.push("-output".to_string());
        args.push(output.display().to_string());

        self.runner.run(&CommandRequest::command("lipo", args))?;
        info!(output = %output.display(), arches = inputs.len(), "merged architectures");
        Ok(())
    }

    /// Assemble platform slices into a bundle via `xcodebuild`.
    pub fn merge_platforms(&self, slices: &[BundleSlice], output: &Path) -> Result<(), MergeError> {
        if slices.is_empty() {
            return Err(MergeError::NoInputs {
                output: output.to_path_buf(),
            });
        }

        let mut args = vec!["-create-xcframework".to_string()];
        for slice in slices {
            args.push("-library".to_string());
            args.push(slice.library.display().to_string());
            args.push("-headers".to_string());
            args.push(slice.headers.display().to_string());
        }
        args.push("-output".to_string());
        args.push(output.display().to_string());

        self.runner.run(&CommandRequest::command("xcodebuild", args))?;
        info!(output = %output.display(), platforms = slices.len(), "assembled bundle");
        Ok(())
    }

    /// Copy a platform's header tree out of its architecture install dirs.
    ///
    /// `arch_include_dirs` is in declaration order; the strategy picks
    /// which one supplies the headers.
    pub fn copy_headers(
        &self,
        arch_include_dirs: &[PathBuf],
        output: &Path,
    ) -> Result<(), MergeError> {
        let source = match self.header_strategy {
            HeaderSourceStrategy::FirstArchitecture => {
                arch_include_dirs.first().ok_or(MergeError::NoInputs {
                    output: output.to_path_buf(),
                })?
            }
        };
        fsutil::copy_tree(source, output)?;
        Ok(())
    }
}
