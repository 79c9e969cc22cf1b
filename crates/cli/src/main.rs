use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use consensus_cli::{run_batch, BatchOptions, ConfigOverrides, EnvConfig, FileConfig, RunConfig};
use consensus_ilp::BackendChoice;
use consensus_protocol::{consensus_file_schema, serialize_json};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "consensus-ilp")]
#[command(about = "Select conflict-free consensus particles with integer programming", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve every unit found in a directory
    Run(RunArgs),

    /// Print the JSON schema of <unit>_consensus.json
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Directory holding the clique-enumeration output
    in_dir: PathBuf,

    /// Particle box size in pixels (written to .box files)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    box_size: u32,

    /// Keep only the N highest-weight particles in single-layer output
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    num_particles: Option<u64>,

    /// Solver backend (overrides CONSENSUS_SOLVER_BACKEND)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Units solved concurrently (overrides CONSENSUS_JOBS)
    #[arg(long)]
    jobs: Option<usize>,

    /// Per-unit solve timeout in seconds, 0 disables it
    #[arg(long)]
    solve_timeout_secs: Option<u64>,

    /// TOML file with backend, jobs and solve_timeout_secs
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the batch summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Auto,
    Native,
    Fallback,
}

impl From<BackendArg> for BackendChoice {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => BackendChoice::Auto,
            BackendArg::Native => BackendChoice::Native,
            BackendArg::Fallback => BackendChoice::Fallback,
        }
    }
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing
    if matches!(&cli.command, Commands::Run(args) if args.json) {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Schema => {
            println!("{}", consensus_file_schema()?);
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let file = args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let overrides = ConfigOverrides {
        backend: args.backend.map(Into::into),
        jobs: args.jobs,
        solve_timeout_secs: args.solve_timeout_secs,
    };
    let config = RunConfig::resolve(file, &EnvConfig::from_env(), &overrides)?;
    let num_particles = args
        .num_particles
        .map(usize::try_from)
        .transpose()
        .context("--num-particles is too large")?;

    let options = BatchOptions {
        in_dir: args.in_dir,
        box_size: args.box_size,
        num_particles,
        config,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let summary = runtime.block_on(run_batch(options));
    // Timed-out solves keep running on blocking threads; do not wait for them.
    runtime.shutdown_background();
    let summary = summary?;

    if args.json {
        println!("{}", serialize_json(&summary)?);
    }
    if summary.failed > 0 {
        bail!("{} of {} units failed", summary.failed, summary.units.len());
    }
    Ok(())
}
