//! Filesystem-backed artifact cache.
//!
//! The cache is stateless: it derives canonical output locations purely
//! from library and platform identity and answers "is this already built"
//! by checking that the canonical directory exists and is non-empty. No
//! metadata is persisted, and a present directory is treated as valid
//! regardless of source or version changes.
//! Concurrent invocations targeting the same library must be serialized by
//! the caller.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lipoforge_toolchain::Platform;
use thiserror::Error;

use crate::fsutil;
use crate::library::LibraryDefinition;

/// Errors from cache maintenance.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A library's merged output for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformArtifact {
    pub platform: Platform,
    /// Canonical platform output directory.
    pub root: PathBuf,
    /// The `include/` tree.
    pub include_dir: PathBuf,
    /// The merged static library file.
    pub lib_file: PathBuf,
}

/// Canonical path derivation and existence queries over the cache root.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    cache_root: PathBuf,
}

impl ArtifactCache {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Per-library build root: `<cache_root>/build/<name>`.
    pub fn library_root(&self, library: &LibraryDefinition) -> PathBuf {
        self.cache_root.join("build").join(&library.name)
    }

    /// Where the acquired source tree lives.
    pub fn source_dir(&self, library: &LibraryDefinition) -> PathBuf {
        self.library_root(library).join("source")
    }

    /// Where opaque configuration resources are written before a run.
    pub fn config_dir(&self, library: &LibraryDefinition) -> PathBuf {
        self.library_root(library).join("configurations")
    }

    /// Canonical output location, derived purely from identities.
    ///
    /// `platform` omitted addresses the library's whole output root.
    pub fn canonical_path(
        &self,
        library: &LibraryDefinition,
        platform: Option<Platform>,
    ) -> PathBuf {
        let output = self.library_root(library).join("output");
        match platform {
            Some(platform) => output.join(platform.build_dir_component()),
            None => output,
        }
    }

    /// True iff the canonical directory exists and contains at least one
    /// entry. Partial output is indistinguishable from complete output.
    pub fn exists(&self, library: &LibraryDefinition, platform: Option<Platform>) -> bool {
        fsutil::dir_non_empty(&self.canonical_path(library, platform))
    }

    /// Remove the canonical directory tree, forcing the next build to run.
    pub fn invalidate(
        &self,
        library: &LibraryDefinition,
        platform: Option<Platform>,
    ) -> Result<(), CacheError> {
        let path = self.canonical_path(library, platform);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    /// The merged artifact locations for one platform.
    pub fn platform_artifact(
        &self,
        library: &LibraryDefinition,
        platform: Platform,
    ) -> PlatformArtifact {
        let root = self.canonical_path(library, Some(platform));
        PlatformArtifact {
            platform,
            include_dir: root.join("include"),
            lib_file: root.join("lib").join(&library.artifact_name),
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryRegistry;

    fn openssl() -> LibraryDefinition {
        LibraryRegistry::builtin().get("openssl").unwrap().clone()
    }

    #[test]
    fn canonical_paths_are_deterministic() {
        let cache = ArtifactCache::new("/var/cache/lipoforge");
        let def = openssl();

        assert_eq!(
            cache.canonical_path(&def, None),
            PathBuf::from("/var/cache/lipoforge/build/openssl/output")
        );
        assert_eq!(
            cache.canonical_path(&def, Some(Platform::Ios)),
            PathBuf::from("/var/cache/lipoforge/build/openssl/output/Release-iphoneos")
        );
        // Derived twice, identical.
        assert_eq!(
            cache.canonical_path(&def, Some(Platform::Ios)),
            cache.canonical_path(&def, Some(Platform::Ios))
        );
    }

    #[test]
    fn empty_directory_does_not_count_as_built() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let def = openssl();

        assert!(!cache.exists(&def, Some(Platform::Ios)));

        let platform_dir = cache.canonical_path(&def, Some(Platform::Ios));
        fs::create_dir_all(&platform_dir).unwrap();
        assert!(!cache.exists(&def, Some(Platform::Ios)));

        fs::write(platform_dir.join("marker"), "x").unwrap();
        assert!(cache.exists(&def, Some(Platform::Ios)));
        assert!(cache.exists(&def, None));
    }

    #[test]
    fn invalidate_removes_the_tree_and_tolerates_absence() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let def = openssl();

        // Absent path is fine.
        cache.invalidate(&def, Some(Platform::Ios)).unwrap();

        let platform_dir = cache.canonical_path(&def, Some(Platform::Ios));
        fs::create_dir_all(platform_dir.join("lib")).unwrap();
        fs::write(platform_dir.join("lib/libopenssl.a"), "x").unwrap();

        cache.invalidate(&def, Some(Platform::Ios)).unwrap();
        assert!(!platform_dir.exists());
    }

    #[test]
    fn platform_artifact_points_into_the_canonical_layout() {
        let cache = ArtifactCache::new("/c");
        let artifact = cache.platform_artifact(&openssl(), Platform::Macos);
        assert_eq!(
            artifact.lib_file,
            PathBuf::from("/c/build/openssl/output/Release-macosx/lib/libopenssl.a")
        );
        assert_eq!(
            artifact.include_dir,
            PathBuf::from("/c/build/openssl/output/Release-macosx/include")
        );
    }
}
