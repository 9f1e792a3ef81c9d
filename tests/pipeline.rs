use std::collections::BTreeMap;
use std::fs;
use std::sync::Mutex;

use maxent_ensemble::params::keys;
use maxent_ensemble::{
    run_pipeline, EnsembleError, Execution, MaxEntError, ParameterSet, PipelineOptions,
    PipelineOutcome, RunConfiguration, Solver, SolverError, SolverOutput,
};

/// In-process stand-in for the maxent executable.
struct MockSolver {
    grid: Vec<f64>,
    max: BTreeMap<String, Vec<f64>>,
    calls: Mutex<Vec<RunConfiguration>>,
}

impl MockSolver {
    fn new(grid: Vec<f64>, max: &[(&str, Vec<f64>)]) -> Self {
        Self {
            grid,
            max: max
                .iter()
                .map(|(model, spec)| (model.to_string(), spec.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Solver for MockSolver {
    fn solve(&self, config: &RunConfiguration) -> Result<SolverOutput, SolverError> {
        self.calls.lock().unwrap().push(config.clone());
        let model = config.default_model().unwrap_or("flat");
        let max = self
            .max
            .get(model)
            .cloned()
            .ok_or_else(|| SolverError::Failed(format!("unknown default model {model}")))?;
        Ok(SolverOutput {
            omega_grid: self.grid.clone(),
            av_spectrum: max.iter().map(|v| v / 2.0).collect(),
            max_spectrum: max,
        })
    }
}

fn base_params() -> ParameterSet {
    let mut params = ParameterSet::new();
    params.set(keys::BETA, 10.0);
    params.set(keys::NDAT, 64_i64);
    params.set(keys::DATA, "run1.dat");
    params
}

fn with_ensemble(mut params: ParameterSet, models: &[&str]) -> ParameterSet {
    params.set(keys::MODEL_RUNS, models.len() as i64);
    for (idx, model) in models.iter().enumerate() {
        params.set(keys::run(idx), *model);
    }
    params
}

fn options(dir: &std::path::Path) -> PipelineOptions {
    PipelineOptions {
        execution: Execution::Sequential,
        output_dir: dir.to_path_buf(),
    }
}

fn three_model_solver() -> MockSolver {
    MockSolver::new(
        vec![-1.0, 1.0],
        &[
            ("flat", vec![1.0, 1.0]),
            ("gaussian", vec![2.0, 1.0]),
            ("lorentzian", vec![3.0, 1.0]),
        ],
    )
}

#[test]
fn ensemble_writes_varspec_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = with_ensemble(base_params(), &["flat", "gaussian", "lorentzian"]);
    params.set(keys::TEXT_OUTPUT, true);
    let solver = three_model_solver();

    let outcome = run_pipeline(&params, &solver, &options(dir.path())).unwrap();
    let PipelineOutcome::Ensemble {
        config,
        report,
        artifacts,
    } = outcome
    else {
        panic!("expected the ensemble path");
    };

    assert_eq!(config.basename, "run1.out");
    assert_eq!(report.max_stats.mean, vec![2.0, 1.0]);
    assert!((report.max_stats.stdev[0] - 0.816_496_580_927_726).abs() < 1e-12);
    assert_eq!(report.av_stats.mean, vec![1.0, 0.5]);

    let artifacts = artifacts.expect("TEXT_OUTPUT enables the table");
    assert_eq!(artifacts.varspec, dir.path().join("run1.out.varspec.dat"));
    let text = fs::read_to_string(&artifacts.varspec).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "#omega mean_maxspec stdev_maxspec mean_avspec stdev_avspec");
    let first: Vec<f64> = lines[1]
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(first[0], -1.0);
    assert_eq!(first[1], 2.0);
    assert!((first[2] - 0.8164965809).abs() < 1e-9);

    let calls = solver.calls.lock().unwrap();
    let basenames: Vec<_> = calls.iter().map(|c| c.basename().unwrap().to_string()).collect();
    assert_eq!(
        basenames,
        vec!["run1.out.flat", "run1.out.gaussian", "run1.out.lorentzian"]
    );
    assert!(calls.iter().all(|c| c.get(keys::BETA).is_some()));
}

#[test]
fn parallel_ensemble_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let params = with_ensemble(base_params(), &["lorentzian", "flat", "gaussian"]);
    let solver = three_model_solver();

    let seq = run_pipeline(&params, &solver, &options(dir.path())).unwrap();
    let par = run_pipeline(
        &params,
        &solver,
        &PipelineOptions {
            execution: Execution::Parallel { jobs: 3 },
            output_dir: dir.path().to_path_buf(),
        },
    )
    .unwrap();

    match (seq, par) {
        (
            PipelineOutcome::Ensemble { report: a, .. },
            PipelineOutcome::Ensemble { report: b, .. },
        ) => {
            assert_eq!(a.max_spectra, b.max_spectra);
            assert_eq!(a.max_stats, b.max_stats);
            assert_eq!(a.av_stats, b.av_stats);
            assert_eq!(a.max_spectra[0], vec![3.0, 1.0]);
        }
        _ => panic!("expected the ensemble path twice"),
    }
}

#[test]
fn without_model_runs_a_single_run_and_no_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = base_params();
    params.set(keys::TEXT_OUTPUT, true);
    let solver = three_model_solver();

    let outcome = run_pipeline(&params, &solver, &options(dir.path())).unwrap();
    match outcome {
        PipelineOutcome::SingleRun { config, output } => {
            assert_eq!(config.basename, "run1.out");
            assert_eq!(output.max_spectrum, vec![1.0, 1.0]);
        }
        other => panic!("expected a single run, got {other:?}"),
    }
    assert_eq!(solver.call_count(), 1);
    assert_eq!(solver.calls.lock().unwrap()[0].basename(), Some("run1.out"));
    assert!(!dir.path().join("run1.out.varspec.dat").exists());
}

#[test]
fn single_candidate_ensemble_has_zero_spread() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = with_ensemble(base_params(), &["gaussian"]);
    params.set(keys::TEXT_OUTPUT, true);
    let solver = three_model_solver();

    match run_pipeline(&params, &solver, &options(dir.path())).unwrap() {
        PipelineOutcome::Ensemble { report, artifacts, .. } => {
            assert_eq!(report.max_stats.mean, vec![2.0, 1.0]);
            assert_eq!(report.max_stats.stdev, vec![0.0, 0.0]);
            assert_eq!(report.max_stats.len(), report.omega_grid.len());
            assert!(artifacts.is_some());
        }
        other => panic!("expected the ensemble path, got {other:?}"),
    }
}

#[test]
fn text_output_off_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let params = with_ensemble(base_params(), &["flat", "gaussian"]);
    let solver = three_model_solver();

    match run_pipeline(&params, &solver, &options(dir.path())).unwrap() {
        PipelineOutcome::Ensemble { artifacts, .. } => assert!(artifacts.is_none()),
        other => panic!("expected the ensemble path, got {other:?}"),
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn mismatched_spectrum_lengths_abort_without_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = with_ensemble(base_params(), &["flat", "wide"]);
    params.set(keys::TEXT_OUTPUT, true);
    let solver = MockSolver::new(
        vec![-1.0, 1.0],
        &[("flat", vec![1.0, 1.0]), ("wide", vec![1.0, 1.0, 1.0])],
    );

    let err = run_pipeline(&params, &solver, &options(dir.path())).unwrap_err();
    assert!(matches!(
        err,
        MaxEntError::Ensemble(EnsembleError::LengthMismatch { index: 1, .. })
    ));
    assert!(!dir.path().join("run1.out.varspec.dat").exists());
}

#[test]
fn solver_failure_surfaces_as_ensemble_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = with_ensemble(base_params(), &["flat", "unknown", "gaussian"]);
    params.set(keys::TEXT_OUTPUT, true);
    let solver = three_model_solver();

    let err = run_pipeline(&params, &solver, &options(dir.path())).unwrap_err();
    assert!(matches!(
        err,
        MaxEntError::Ensemble(EnsembleError::Solver { index: 1, .. })
    ));
    assert_eq!(solver.call_count(), 2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn validation_failure_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = ParameterSet::new();
    params.set(keys::NDAT, 64_i64);
    let solver = three_model_solver();

    let err = run_pipeline(&params, &solver, &options(dir.path())).unwrap_err();
    match err {
        MaxEntError::Validation(err) => assert_eq!(
            err.messages,
            vec!["Please supply BETA", "Please supply input data"]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(solver.call_count(), 0);
}

#[test]
fn help_switches_skip_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = ParameterSet::new();
    params.set(keys::HELP_MODELS, true);
    let solver = three_model_solver();

    match run_pipeline(&params, &solver, &options(dir.path())).unwrap() {
        PipelineOutcome::Help(text) => assert!(text.contains("lorentzian")),
        other => panic!("expected help, got {other:?}"),
    }
    assert_eq!(solver.call_count(), 0);
}

#[test]
fn parameter_file_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.toml");
    fs::write(
        &path,
        r#"
BETA = 20
NDAT = 128
X_0 = "guess.dat"
MODEL_RUNS = 2
RUN_0 = "flat"
RUN_1 = "gaussian"
TEXT_OUTPUT = true
"#,
    )
    .unwrap();

    let mut params = ParameterSet::from_toml_file(&path).unwrap();
    params.apply_override("BASENAME=custom").unwrap();
    let solver = three_model_solver();

    match run_pipeline(&params, &solver, &options(dir.path())).unwrap() {
        PipelineOutcome::Ensemble { config, artifacts, .. } => {
            assert_eq!(config.beta, 20.0);
            assert_eq!(config.basename, "custom");
            assert_eq!(
                artifacts.unwrap().varspec,
                dir.path().join("custom.varspec.dat")
            );
        }
        other => panic!("expected the ensemble path, got {other:?}"),
    }
}
