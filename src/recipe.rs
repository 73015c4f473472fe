//! Build recipes.
//!
//! A recipe turns one build job into the shell script that drives the
//! library's native build system. Two families exist: perl-Configure/make
//! trees and cmake trees. The recipe also knows which embedded resources
//! its build system needs on disk and how to locate the component archives
//! a finished job leaves behind.

use std::io;
use std::path::{Path, PathBuf};

use crate::cache::PlatformArtifact;
use crate::matrix::ArchitectureTarget;
use crate::resource::{self, Resource};

/// Everything a recipe needs to render one job's build script.
pub struct ScriptContext<'a> {
    pub target: &'a ArchitectureTarget,
    pub source_dir: &'a Path,
    pub install_dir: &'a Path,
    /// Directory holding the written [`Resource`] files.
    pub config_dir: &'a Path,
    pub parallel_jobs: u32,
    pub deployment_target: &'a str,
    pub prerequisite: Option<&'a PlatformArtifact>,
}

/// Context for the one-off host preparation step some cmake trees need
/// before any cross-compiled target can build.
pub struct PrepareContext<'a> {
    pub source_dir: &'a Path,
    pub prepare_dir: &'a Path,
    pub config_dir: &'a Path,
    pub prerequisite: Option<&'a PlatformArtifact>,
}

/// How a library's native build system is driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRecipe {
    /// perl `Configure` + `make` trees.
    Configure {
        /// Environment variable naming the local configuration directory,
        /// when the tree supports one.
        local_config_env: Option<String>,
        /// `make` target that installs headers and libraries.
        install_target: String,
        /// Archives the build leaves under `lib/`, in combine order.
        component_archives: Vec<String>,
    },
    /// cmake trees built out-of-source.
    Cmake {
        /// Extra `-D` defines passed to every cmake invocation.
        defines: Vec<String>,
        /// Whether a host build of the `prepare_cross_compiling` target
        /// must run before the first cross-compiled job.
        prepare_cross_compiling: bool,
        enable_bitcode: bool,
    },
}

impl BuildRecipe {
    /// Environment variable pointing the build at the configuration
    /// directory, if this recipe uses one.
    pub fn local_config_env(&self) -> Option<&str> {
        match self {
            BuildRecipe::Configure { local_config_env, .. } => local_config_env.as_deref(),
            BuildRecipe::Cmake { .. } => None,
        }
    }

    /// Whether the recipe needs the host preparation step.
    pub fn needs_prepare(&self) -> bool {
        matches!(
            self,
            BuildRecipe::Cmake {
                prepare_cross_compiling: true,
                ..
            }
        )
    }

    /// Embedded files this recipe expects in the configuration directory.
    pub fn resources(&self) -> Vec<Resource> {
        match self {
            BuildRecipe::Configure { local_config_env, .. } => {
                if local_config_env.is_some() {
                    vec![resource::PLATFORMS_CONF]
                } else {
                    vec![]
                }
            }
            BuildRecipe::Cmake {
                prepare_cross_compiling,
                ..
            } => {
                let mut files = vec![resource::APPLE_TOOLCHAIN_CMAKE];
                if *prepare_cross_compiling {
                    files.push(resource::SIMPLE_CMAKE);
                }
                files
            }
        }
    }

    /// Render the shell script that builds one architecture target.
    pub fn render_script(&self, ctx: &ScriptContext<'_>) -> String {
        match self {
            BuildRecipe::Configure { install_target, .. } => {
                let sdk = ctx.target.platform.sdk_name();
                let options = ctx.target.options.join(" ");
                format!(
                    "#!/bin/sh\n\
                     set -e\n\
                     XCODE_SELECT_PATH=\"$(xcode-select -p)\"\n\
                     export LDFLAGS=\"-L$XCODE_SELECT_PATH/Platforms/{sdk}.platform/Developer/SDKs/{sdk}.sdk/usr/lib $LDFLAGS\"\n\
                     export CPPFLAGS=\"-I$XCODE_SELECT_PATH/Platforms/{sdk}.platform/Developer/SDKs/{sdk}.sdk/usr/include $CPPFLAGS\"\n\
                     cd {source}\n\
                     perl ./Configure {triple} --prefix={install} {options}\n\
                     make -j{jobs}\n\
                     make {install_target}\n",
                    sdk = sdk,
                    source = ctx.source_dir.display(),
                    triple = ctx.target.triple,
                    install = ctx.install_dir.display(),
                    options = options,
                    jobs = ctx.parallel_jobs,
                    install_target = install_target,
                )
            }
            BuildRecipe::Cmake {
                defines,
                enable_bitcode,
                ..
            } => {
                let build_dir = cmake_build_dir(ctx.install_dir);
                let tool_platform = ctx
                    .target
                    .tool_platform
                    .as_deref()
                    .unwrap_or(&ctx.target.triple);

                let mut options = prerequisite_defines(ctx.prerequisite);
                options.extend(defines.iter().cloned());
                options.push(format!(
                    "-DCMAKE_TOOLCHAIN_FILE={}",
                    ctx.config_dir.join("Apple.cmake").display()
                ));
                options.push(format!(
                    "-DCMAKE_INSTALL_PREFIX={}",
                    ctx.install_dir.display()
                ));
                options.push(format!("-DPLATFORM={tool_platform}"));
                options.push(format!("-DDEPLOYMENT_TARGET={}", ctx.deployment_target));
                if *enable_bitcode {
                    options.push("-DENABLE_BITCODE=TRUE".to_string());
                }

                format!(
                    "#!/bin/sh\n\
                     set -e\n\
                     mkdir -p {build}\n\
                     cd {build}\n\
                     cmake {options} {source}\n\
                     make -j{jobs} install\n\
                     rm -rf {build}\n",
                    build = build_dir.display(),
                    options = options.join(" "),
                    source = ctx.source_dir.display(),
                    jobs = ctx.parallel_jobs,
                )
            }
        }
    }

    /// Render the host preparation script, when [`needs_prepare`] holds.
    ///
    /// [`needs_prepare`]: BuildRecipe::needs_prepare
    pub fn render_prepare(&self, ctx: &PrepareContext<'_>) -> Option<String> {
        match self {
            BuildRecipe::Cmake {
                defines,
                prepare_cross_compiling: true,
                ..
            } => {
                let mut options = prerequisite_defines(ctx.prerequisite);
                options.extend(defines.iter().cloned());
                options.push(format!(
                    "-DCMAKE_TOOLCHAIN_FILE={}",
                    ctx.config_dir.join("Simple.cmake").display()
                ));

                Some(format!(
                    "#!/bin/sh\n\
                     set -e\n\
                     cd {prepare}\n\
                     cmake {options} {source}\n\
                     cmake --build . --target prepare_cross_compiling\n",
                    prepare = ctx.prepare_dir.display(),
                    options = options.join(" "),
                    source = ctx.source_dir.display(),
                ))
            }
            _ => None,
        }
    }

    /// Locate the component archives a finished job left under `lib/`.
    ///
    /// Configure trees name theirs up front; cmake trees are scanned for
    /// every `.a` file except the combined artifact itself.
    pub fn component_archives(
        &self,
        install_dir: &Path,
        artifact_name: &str,
    ) -> io::Result<Vec<PathBuf>> {
        let lib_dir = install_dir.join("lib");
        match self {
            BuildRecipe::Configure {
                component_archives, ..
            } => Ok(component_archives
                .iter()
                .map(|name| lib_dir.join(name))
                .collect()),
            BuildRecipe::Cmake { .. } => {
                let mut archives = Vec::new();
                for entry in std::fs::read_dir(&lib_dir)? {
                    let path = entry?.path();
                    let name = match path.file_name().and_then(|n| n.to_str()) {
                        Some(name) => name,
                        None => continue,
                    };
                    if name.ends_with(".a") && name != artifact_name {
                        archives.push(path);
                    }
                }
                archives.sort();
                Ok(archives)
            }
        }
    }
}

fn cmake_build_dir(install_dir: &Path) -> PathBuf {
    let mut name = install_dir.as_os_str().to_os_string();
    name.push("-build");
    PathBuf::from(name)
}

fn prerequisite_defines(prerequisite: Option<&PlatformArtifact>) -> Vec<String> {
    match prerequisite {
        Some(artifact) => vec![
            "-DOPENSSL_FOUND=1".to_string(),
            format!("-DOPENSSL_CRYPTO_LIBRARY={}", artifact.lib_file.display()),
            format!("-DOPENSSL_INCLUDE_DIR={}", artifact.include_dir.display()),
        ],
        None => vec![],
    }
}
