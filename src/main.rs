use clap::Parser;
use crossrel::builder::{BuildPlan, Builder, execute};
use crossrel::catalog::{artifact_file_name, catalog, select_targets};
use crossrel::report::{Manifest, exit_code, print_summary, write_manifest};
use crossrel::runtime::RealRuntime;
use crossrel::toolchain::GoToolchain;
use crossrel::version::load_version;
use log::warn;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// crossrel - Multi-Target Release Builder
///
/// Read a version declaration, reset the output directory, and invoke the
/// build toolchain once per (os, arch) target to produce one named artifact
/// per target.
///
/// Exit status: 0 when every target builds, 1 when any target fails,
/// 2 when a precondition (version source, output directory, target
/// selection) fails before any build starts.
///
/// Examples:
///   crossrel build                          # All catalog targets
///   crossrel build --target linux/amd64     # A single target
#[derive(Parser, Debug)]
#[command(author, version = env!("CROSSREL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build release artifacts for the catalog targets
    Build(BuildArgs),

    /// List the target catalog
    Targets,
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// File containing the `version = "..."` declaration (also via CROSSREL_VERSION_FILE)
    #[arg(
        long = "version-file",
        value_name = "PATH",
        env = "CROSSREL_VERSION_FILE",
        default_value = "version.go"
    )]
    pub version_file: PathBuf,

    /// Output directory for the run's artifacts (also via CROSSREL_OUTPUT)
    #[arg(
        long = "output",
        short = 'o',
        value_name = "PATH",
        env = "CROSSREL_OUTPUT",
        default_value = "build"
    )]
    pub output: PathBuf,

    /// Artifact base name
    #[arg(long = "name", value_name = "NAME", default_value = "go-mcu")]
    pub name: String,

    /// Build delegate program (also via CROSSREL_COMPILER)
    #[arg(
        long = "compiler",
        value_name = "PROGRAM",
        env = "CROSSREL_COMPILER",
        default_value = "go"
    )]
    pub compiler: String,

    /// Restrict the run to specific catalog targets, e.g. linux/amd64 (repeatable)
    #[arg(long = "target", value_name = "OS/ARCH")]
    pub targets: Vec<String>,

    /// Number of concurrent builds (1 = sequential)
    #[arg(long = "jobs", short = 'j', value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Per-target timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print artifact names without building or touching the output directory
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Extra arguments passed to the delegate before `-o`
    #[arg(last = true, value_name = "ARGS")]
    pub compiler_args: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let code = match cli.command {
        Commands::Build(args) => match run_build(&runtime, args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e}");
                2
            }
        },
        Commands::Targets => {
            for target in catalog() {
                println!("{target}");
            }
            0
        }
    };

    process::exit(code);
}

async fn run_build(runtime: &RealRuntime, args: BuildArgs) -> crossrel::error::Result<i32> {
    let targets = select_targets(&args.targets)?;
    let version = load_version(runtime, &args.version_file)?;

    if args.dry_run {
        for target in &targets {
            println!("{}", artifact_file_name(&args.name, &version, target));
        }
        return Ok(0);
    }

    let plan = BuildPlan {
        tool_name: args.name,
        version,
        targets,
        output_dir: args.output,
        jobs: args.jobs.max(1),
        timeout: args.timeout.map(Duration::from_secs),
    };

    let toolchain = GoToolchain::new(args.compiler, args.compiler_args);
    let builder = Builder::new(Arc::new(toolchain));
    let results = execute(runtime, &builder, &plan).await?;

    print_summary(&plan.tool_name, &plan.version, &results);

    let manifest = Manifest {
        tool: &plan.tool_name,
        version: &plan.version,
        generated_by: concat!("crossrel ", env!("CROSSREL_VERSION")),
        results: &results,
    };
    if let Err(e) = write_manifest(runtime, &plan.output_dir, &manifest) {
        // The artifacts themselves are already on disk; a manifest write
        // failure downgrades to a warning.
        warn!("could not write {}: {e:#}", crossrel::report::MANIFEST_FILE);
    }

    Ok(exit_code(&results))
}
