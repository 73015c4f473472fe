//! Configuration layering.
//!
//! Three layers, later wins: built-in defaults, an optional TOML config
//! file, then CLI flags (applied by the caller through the override
//! methods). Every file field is optional so a partial file only touches
//! what it names.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default cache directory name under the user's home.
const DEFAULT_CACHE_DIR: &str = ".lipoforge";

/// Errors for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional overrides read from a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub cache_root: Option<PathBuf>,
    pub downloads_dir: Option<PathBuf>,
    pub parallel_jobs: Option<u32>,
}

/// Effective build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Root of the artifact cache.
    pub cache_root: PathBuf,
    /// Where downloaded archives are kept.
    pub downloads_dir: PathBuf,
    /// Parallel make jobs; probed from the host when unset.
    pub parallel_jobs: Option<u32>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        let cache_root = home.join(DEFAULT_CACHE_DIR);
        let downloads_dir = cache_root.join("downloads");
        Self {
            cache_root,
            downloads_dir,
            parallel_jobs: None,
        }
    }
}

impl BuildConfig {
    /// Load defaults merged with `path`, when given and present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply(file);
        }
        Ok(config)
    }

    /// Overlay one file layer. Only named fields change; `downloads_dir`
    /// follows `cache_root` unless the file pins it explicitly.
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(cache_root) = file.cache_root {
            self.downloads_dir = cache_root.join("downloads");
            self.cache_root = cache_root;
        }
        if let Some(downloads_dir) = file.downloads_dir {
            self.downloads_dir = downloads_dir;
        }
        if let Some(parallel_jobs) = file.parallel_jobs {
            self.parallel_jobs = Some(parallel_jobs);
        }
    }
}
