//! Source acquisition for lipoforge.
//!
//! The pipeline consumes this crate through one interface: "produce a ready
//! source directory given a library's source specification". Two backends
//! exist: release archives fetched over HTTP and unpacked, and git
//! repositories cloned (or updated) with their submodules. Downloaded
//! archives are kept in a downloads directory so re-runs skip the network.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use lipoforge_exec::{CommandRequest, CommandRunner, ProcessError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

/// Where a library's source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceSpec {
    /// A release tarball (`.tar.gz`), optionally checksum-pinned.
    Archive {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    /// A git repository checked out at a branch, submodules included.
    Git { url: String, branch: String },
}

/// Errors from source acquisition.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("not a supported archive: {0}")]
    NotAnArchive(String),

    #[error("archive had no top-level directory: {0}")]
    EmptyArchive(String),

    #[error("VCS operation failed: {0}")]
    Vcs(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Produces a ready source directory for a library.
pub trait SourceAcquirer: Send + Sync {
    /// Ensure `dest` holds the library's source tree, fetching or updating
    /// as needed. On success `dest` exists and is ready to copy from.
    fn acquire(&self, name: &str, source: &SourceSpec, dest: &Path) -> AcquireResult<()>;
}

/// Acquirer backed by HTTP downloads and a local `git` binary.
pub struct DefaultAcquirer {
    downloads_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl DefaultAcquirer {
    pub fn new(downloads_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            runner,
        }
    }

    fn acquire_archive(
        &self,
        name: &str,
        url: &str,
        sha256: Option<&str>,
        dest: &Path,
    ) -> AcquireResult<()> {
        let archive_name = url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| AcquireError::NotAnArchive(url.to_string()))?;
        if !archive_name.ends_with(".tar.gz") {
            return Err(AcquireError::NotAnArchive(url.to_string()));
        }

        fs::create_dir_all(&self.downloads_dir)?;
        let local = self.downloads_dir.join(archive_name);

        if local.exists() {
            info!(library = name, archive = %local.display(), "using cached archive");
        } else {
            self.download(url, &local, sha256)?;
        }

        self.unpack(&local, dest)
    }

    fn download(&self, url: &str, local: &Path, sha256: Option<&str>) -> AcquireResult<()> {
        info!(%url, "downloading source archive");

        let response =
            reqwest::blocking::get(url).map_err(|e| AcquireError::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(AcquireError::Download {
                url: url.to_string(),
                message: format!("HTTP status {}", response.status()),
            });
        }
        let bytes = response.bytes().map_err(|e| AcquireError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(expected) = sha256 {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(AcquireError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
            debug!(%url, "checksum verified");
        }

        let mut file = File::create(local)?;
        file.write_all(&bytes)?;
        info!(archive = %local.display(), "download complete");
        Ok(())
    }

    /// Unpack a tarball into `dest`, replacing any previous tree.
    ///
    /// The archive is extracted into a staging directory first; its single
    /// top-level directory becomes `dest`.
    fn unpack(&self, archive_path: &Path, dest: &Path) -> AcquireResult<()> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let staging = tempfile::tempdir_in(parent)?;

        let file = File::open(archive_path)?;
        let decoder = GzDecoder::new(BufReader::new(file));
        let mut archive = Archive::new(decoder);
        archive.unpack(staging.path())?;

        let unpacked_root = fs::read_dir(staging.path())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| path.is_dir())
            .ok_or_else(|| AcquireError::EmptyArchive(archive_path.display().to_string()))?;

        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::rename(&unpacked_root, dest)?;
        info!(source = %dest.display(), "source tree ready");
        Ok(())
    }

    fn acquire_git(&self, name: &str, url: &str, branch: &str, dest: &Path) -> AcquireResult<()> {
        fs::create_dir_all(dest)?;
        let dest_display = dest.display();

        let script = if dest.join(".git").is_dir() {
            info!(library = name, source = %dest_display, "updating existing clone");
            format!(
                "#!/bin/sh\n\
                 cd {dest_display} || exit\n\
                 git checkout {branch} || exit\n\
                 git pull || exit\n\
                 git submodule update --init --recursive || exit\n\
                 git submodule sync --recursive\n"
            )
        } else {
            info!(library = name, %url, "cloning source repository");
            format!(
                "#!/bin/sh\n\
                 git clone --branch {branch} {url} {dest_display} || exit\n\
                 cd {dest_display} || exit\n\
                 git submodule update --init --recursive || exit\n\
                 git submodule sync --recursive\n"
            )
        };

        self.runner
            .run(&CommandRequest::script(script).working_dir(dest))?;
        Ok(())
    }
}

impl SourceAcquirer for DefaultAcquirer {
    fn acquire(&self, name: &str, source: &SourceSpec, dest: &Path) -> AcquireResult<()> {
        match source {
            SourceSpec::Archive { url, sha256 } => {
                self.acquire_archive(name, url, sha256.as_deref(), dest)
            }
            SourceSpec::Git { url, branch } => self.acquire_git(name, url, branch, dest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn make_tarball(dir: &Path, top_level: &str) -> PathBuf {
        let tree = dir.join(top_level);
        fs::create_dir_all(tree.join("include")).unwrap();
        fs::write(tree.join("configure"), "#!/bin/sh\n").unwrap();
        fs::write(tree.join("include/api.h"), "#pragma once\n").unwrap();

        let archive_path = dir.join(format!("{top_level}.tar.gz"));
        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(top_level, &tree).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    fn acquirer(downloads: &Path) -> DefaultAcquirer {
        DefaultAcquirer::new(downloads, Arc::new(lipoforge_exec::SystemRunner::new()))
    }

    #[test]
    fn unpack_replaces_destination_with_archive_root() {
        let temp = tempfile::tempdir().unwrap();
        let archive = make_tarball(temp.path(), "alpha-1.0.0");

        let dest = temp.path().join("source");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale"), "old").unwrap();

        acquirer(temp.path()).unpack(&archive, &dest).unwrap();

        assert!(dest.join("configure").exists());
        assert!(dest.join("include/api.h").exists());
        assert!(!dest.join("stale").exists());
    }

    #[test]
    fn non_tarball_url_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let err = acquirer(temp.path())
            .acquire_archive(
                "alpha",
                "https://example.com/alpha-1.0.0.zip",
                None,
                &temp.path().join("source"),
            )
            .unwrap_err();
        assert!(matches!(err, AcquireError::NotAnArchive(_)));
    }

    #[test]
    fn cached_archive_skips_download() {
        let temp = tempfile::tempdir().unwrap();
        let archive = make_tarball(temp.path(), "alpha-1.0.0");

        // Unreachable URL whose file name matches the cached archive; the
        // network must not be touched.
        let url = format!(
            "http://127.0.0.1:1/{}",
            archive.file_name().unwrap().to_str().unwrap()
        );
        let dest = temp.path().join("source");
        acquirer(temp.path())
            .acquire_archive("alpha", &url, None, &dest)
            .unwrap();
        assert!(dest.join("configure").exists());
    }
}
