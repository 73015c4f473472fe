//! lipoforge CLI
//!
//! Entry point for the `lipoforge` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use lipoforge::{
    BuildConfig, BuildOutcome, BuildOptions, BuildRequest, BundleRequest, CancellationFlag,
    DefaultAcquirer, LibraryRegistry, Orchestrator, Platform, SystemRunner, XcodeToolchain,
};

#[derive(Parser)]
#[command(name = "lipoforge")]
#[command(about = "Builds multi-platform Apple static library bundles", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a library for one or more platforms
    Build {
        /// Library name (e.g. openssl, ton)
        library: String,

        /// Platforms to build (comma-separated; default: all supported)
        #[arg(long, short = 't', value_delimiter = ',')]
        targets: Vec<Platform>,

        /// Version override
        #[arg(long)]
        version: Option<String>,

        /// Rebuild even when cached output exists
        #[arg(long)]
        force: bool,

        /// Enable the extended NIST elliptic-curve operations on 64-bit
        /// architectures
        #[arg(long)]
        extended_nist: bool,
    },

    /// Package built libraries into multi-platform bundles
    Bundle {
        /// Libraries to package
        #[arg(required = true)]
        libraries: Vec<String>,

        /// Output directory for the bundles
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Remove an existing output directory and rebuild the libraries
        /// instead of packaging cached output
        #[arg(long)]
        clean: bool,
    },

    /// List supported platforms and registered libraries
    Platforms,

    /// Drop cached output for a library
    Invalidate {
        /// Library name
        library: String,

        /// Only this platform (default: everything for the library)
        #[arg(long, short = 'p')]
        platform: Option<Platform>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match BuildConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }) {
            warn!("could not install interrupt handler: {e}");
        }
    }

    let runner = Arc::new(SystemRunner::with_cancellation(cancel));
    let toolchain = Arc::new(XcodeToolchain::new(runner.clone()));
    let acquirer = Box::new(DefaultAcquirer::new(
        config.downloads_dir.clone(),
        runner.clone(),
    ));
    let orchestrator = Orchestrator::new(
        config,
        LibraryRegistry::builtin(),
        runner,
        toolchain,
        acquirer,
    );

    let result = match cli.command {
        Commands::Build {
            library,
            targets,
            version,
            force,
            extended_nist,
        } => run_build(&orchestrator, library, targets, version, force, extended_nist),
        Commands::Bundle {
            libraries,
            output,
            clean,
        } => run_bundle(&orchestrator, libraries, output, clean),
        Commands::Platforms => {
            run_platforms(&orchestrator);
            Ok(())
        }
        Commands::Invalidate { library, platform } => {
            orchestrator.invalidate(&library, platform)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

fn run_build(
    orchestrator: &Orchestrator,
    library: String,
    targets: Vec<Platform>,
    version: Option<String>,
    force: bool,
    extended_nist: bool,
) -> Result<(), lipoforge::PipelineError> {
    let request = BuildRequest {
        library,
        platforms: targets,
        version,
        options: BuildOptions {
            force_rebuild: force,
            extended_nist_ops: extended_nist,
        },
    };

    match orchestrator.build_library(&request)? {
        BuildOutcome::Cached => {
            println!("Nothing to do; every requested platform is cached.");
        }
        BuildOutcome::Built(report) => {
            println!(
                "Built {} {} for {} platform(s), {} architecture job(s).",
                report.library,
                report.version,
                report.platforms.len(),
                report.jobs.len()
            );
        }
    }
    Ok(())
}

fn run_bundle(
    orchestrator: &Orchestrator,
    libraries: Vec<String>,
    output: PathBuf,
    clean: bool,
) -> Result<(), lipoforge::PipelineError> {
    let bundles = orchestrator.build_bundle(&BundleRequest {
        libraries,
        output_dir: output,
        clean,
    })?;

    for bundle in bundles {
        println!("Bundle: {}", bundle.display());
    }
    Ok(())
}

fn run_platforms(orchestrator: &Orchestrator) {
    println!("Platforms:");
    for platform in Platform::ALL {
        println!(
            "  {:<20} sdk {:<20} min {}",
            platform.identifier(),
            platform.sdk_name(),
            platform.minimum_os()
        );
    }

    println!();
    println!("Libraries:");
    for name in orchestrator.registry().names() {
        if let Some(library) = orchestrator.registry().get(name) {
            let platforms: Vec<&str> = library
                .supported_platforms()
                .into_iter()
                .map(|p| p.identifier())
                .collect();
            println!("  {:<10} {} [{}]", name, library.version, platforms.join(", "));
        }
    }
}
