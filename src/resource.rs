//! Embedded build-system support files.
//!
//! Some recipes need auxiliary configuration files on disk before their
//! build tool will run. The files are compiled into the binary and written
//! into a library's configuration directory at build time, so a build never
//! depends on files shipped next to the executable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file baked into the binary, written out before a build starts.
#[derive(Debug, Clone, Copy)]
pub struct Resource {
    pub file_name: &'static str,
    pub contents: &'static str,
}

impl Resource {
    /// Write the resource into `dir`, creating the directory if needed.
    /// Returns the path of the written file.
    pub fn write_into(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name);
        fs::write(&path, self.contents)?;
        Ok(path)
    }
}

/// Custom target table consumed by the configure-style recipe through its
/// local configuration directory environment variable.
pub const PLATFORMS_CONF: Resource = Resource {
    file_name: "platforms.conf",
    contents: include_str!("../resources/platforms.conf"),
};

/// Cross-compilation toolchain file for cmake-style recipes.
pub const APPLE_TOOLCHAIN_CMAKE: Resource = Resource {
    file_name: "Apple.cmake",
    contents: include_str!("../resources/Apple.cmake"),
};

/// Minimal host toolchain file used by the cross-compilation prepare step.
pub const SIMPLE_CMAKE: Resource = Resource {
    file_name: "Simple.cmake",
    contents: include_str!("../resources/Simple.cmake"),
};
