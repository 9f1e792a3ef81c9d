use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use maxent_ensemble::{
    run_pipeline, CommandSolver, Execution, MaxEntError, ParameterSet, PipelineOptions,
    PipelineOutcome,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "maxent-ensemble")]
#[command(version, about = "Maximum-Entropy continuation over an ensemble of default models")]
struct Cli {
    /// Parameter file (TOML `KEY = value`) followed by `KEY=VALUE` overrides
    inputs: Vec<String>,

    /// Maxent executable invoked once per run
    #[arg(long, default_value = "maxent")]
    solver: PathBuf,

    /// Extra argument passed to the solver before the parameter file (repeatable)
    #[arg(long = "solver-arg", allow_hyphen_values = true)]
    solver_args: Vec<String>,

    /// Directory for per-run parameter files, solver output and the varspec table
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Concurrent solver runs for ensembles (1 = sequential)
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("maxent_ensemble={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_parameters(inputs: &[String]) -> Result<ParameterSet> {
    let mut file = None;
    let mut overrides = Vec::new();
    for input in inputs {
        if input.contains('=') {
            overrides.push(input.as_str());
        } else if file.is_none() {
            file = Some(PathBuf::from(input));
        } else {
            bail!("more than one parameter file given: {input}");
        }
    }

    let mut params = match &file {
        Some(path) => ParameterSet::from_toml_file(path)
            .with_context(|| format!("failed to load parameters from {}", path.display()))?,
        None => ParameterSet::new(),
    };
    for raw in overrides {
        params.apply_override(raw)?;
    }
    Ok(params)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let params = load_parameters(&cli.inputs)?;
    let solver = CommandSolver::new(&cli.solver)
        .with_args(cli.solver_args.clone())
        .with_work_dir(&cli.work_dir);
    let options = PipelineOptions {
        execution: Execution::from_jobs(cli.jobs),
        output_dir: cli.work_dir.clone(),
    };

    match run_pipeline(&params, &solver, &options) {
        Ok(PipelineOutcome::Help(text)) => println!("{text}"),
        Ok(PipelineOutcome::SingleRun { config, output }) => {
            println!(
                "Single run complete: {} frequency points | basename {}",
                output.omega_grid.len(),
                config.basename
            );
        }
        Ok(PipelineOutcome::Ensemble {
            report, artifacts, ..
        }) => {
            println!(
                "Ensemble complete: {} runs | {} frequency points",
                report.size(),
                report.omega_grid.len()
            );
            if let Some(artifacts) = artifacts {
                println!("Varspec: {}", artifacts.varspec.display());
                println!("Manifest: {}", artifacts.manifest.display());
            }
        }
        Err(MaxEntError::Validation(err)) => {
            for message in &err.messages {
                eprintln!("{message}");
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => {
            error!(%err, "pipeline failed");
            return Err(err.into());
        }
    }

    Ok(ExitCode::SUCCESS)
}
