//! Inter-library build prerequisites.
//!
//! Some libraries cross-compile against another library's per-platform
//! output (headers plus merged static library). The resolver turns that
//! declaration into an existence check against the artifact cache (no
//! content validation) and fails fast when the prerequisite is absent.

use lipoforge_toolchain::Platform;
use thiserror::Error;

use crate::cache::{ArtifactCache, PlatformArtifact};
use crate::library::{LibraryDefinition, LibraryRegistry};

/// Errors from prerequisite resolution.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("library {library} requires {prerequisite} to be built for {platform} first")]
    MissingPrerequisite {
        library: String,
        prerequisite: String,
        platform: Platform,
    },

    #[error("library {library} declares unknown prerequisite {prerequisite}")]
    UnknownPrerequisite {
        library: String,
        prerequisite: String,
    },
}

/// Existence-based prerequisite checks.
pub struct DependencyResolver<'a> {
    registry: &'a LibraryRegistry,
    cache: &'a ArtifactCache,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a LibraryRegistry, cache: &'a ArtifactCache) -> Self {
        Self { registry, cache }
    }

    /// Resolve `library`'s prerequisite artifact for `platform`.
    ///
    /// Returns `Ok(None)` when the library declares no prerequisite, the
    /// artifact locations when the prerequisite is built, and
    /// [`DependencyError::MissingPrerequisite`] otherwise.
    pub fn require_prerequisite(
        &self,
        library: &LibraryDefinition,
        platform: Platform,
    ) -> Result<Option<PlatformArtifact>, DependencyError> {
        let Some(prerequisite_name) = &library.prerequisite else {
            return Ok(None);
        };

        let prerequisite = self.registry.get(prerequisite_name).ok_or_else(|| {
            DependencyError::UnknownPrerequisite {
                library: library.name.clone(),
                prerequisite: prerequisite_name.clone(),
            }
        })?;

        if !self.cache.exists(prerequisite, Some(platform)) {
            return Err(DependencyError::MissingPrerequisite {
                library: library.name.clone(),
                prerequisite: prerequisite_name.clone(),
                platform,
            });
        }

        Ok(Some(self.cache.platform_artifact(prerequisite, platform)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_prerequisite_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let registry = LibraryRegistry::builtin();
        let cache = ArtifactCache::new(temp.path());
        let resolver = DependencyResolver::new(&registry, &cache);

        let ton = registry.get("ton").unwrap();
        let err = resolver
            .require_prerequisite(ton, Platform::Ios)
            .unwrap_err();
        match err {
            DependencyError::MissingPrerequisite {
                library,
                prerequisite,
                platform,
            } => {
                assert_eq!(library, "ton");
                assert_eq!(prerequisite, "openssl");
                assert_eq!(platform, Platform::Ios);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn present_prerequisite_resolves_to_its_artifact() {
        let temp = tempfile::tempdir().unwrap();
        let registry = LibraryRegistry::builtin();
        let cache = ArtifactCache::new(temp.path());
        let resolver = DependencyResolver::new(&registry, &cache);

        let openssl = registry.get("openssl").unwrap();
        let platform_dir = cache.canonical_path(openssl, Some(Platform::Ios));
        fs::create_dir_all(platform_dir.join("lib")).unwrap();
        fs::write(platform_dir.join("lib/libopenssl.a"), "x").unwrap();

        let ton = registry.get("ton").unwrap();
        let artifact = resolver
            .require_prerequisite(ton, Platform::Ios)
            .unwrap()
            .unwrap();
        assert!(artifact.lib_file.ends_with("lib/libopenssl.a"));
    }

    #[test]
    fn no_prerequisite_resolves_to_none() {
        let temp = tempfile::tempdir().unwrap();
        let registry = LibraryRegistry::builtin();
        let cache = ArtifactCache::new(temp.path());
        let resolver = DependencyResolver::new(&registry, &cache);

        let openssl = registry.get("openssl").unwrap();
        assert!(resolver
            .require_prerequisite(openssl, Platform::Ios)
            .unwrap()
            .is_none());
    }
}
