use crate::config::RunConfig;
use crate::output::{append_runtime, render, write_atomic};
use crate::units::{discover_units, load_unit, UnitPaths};
use anyhow::{Context, Result};
use consensus_ilp::{
    ConsensusError, ConsensusOutput, ConsensusPipeline, IlpSolver, SolverBackend,
};
use consensus_protocol::{BatchSummary, UnitReport, UnitStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Per-run settings shared by every unit
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub in_dir: PathBuf,
    pub box_size: u32,
    pub num_particles: Option<usize>,
    pub config: RunConfig,
}

/// Blocking per-unit work: load the inputs and run the pipeline
pub(crate) type SolveFn = Arc<dyn Fn(&UnitPaths) -> Result<ConsensusOutput> + Send + Sync>;

/// Process every unit under `in_dir` on a bounded worker pool.
///
/// Unit failures are recorded in the summary; only startup problems (missing
/// directory, unreadable listing) are returned as errors.
pub async fn run_batch(options: BatchOptions) -> Result<BatchSummary> {
    let backend = SolverBackend::resolve(options.config.backend);
    let pipeline = ConsensusPipeline::new(backend);
    let solve: SolveFn = Arc::new(move |unit: &UnitPaths| solve_unit(&pipeline, unit));
    run_units(options, backend, solve).await
}

/// At most `jobs` solves run at once. A timed-out solve cannot be cancelled,
/// so it keeps its worker slot until it returns; later units wait for it.
pub(crate) async fn run_units(
    options: BatchOptions,
    backend: SolverBackend,
    solve: SolveFn,
) -> Result<BatchSummary> {
    let units = discover_units(&options.in_dir)?;
    log::info!(
        "{} units in {} ({} backend via {}, {} jobs)",
        units.len(),
        options.in_dir.display(),
        backend.name(),
        backend.engine(),
        options.config.jobs
    );
    if units.is_empty() {
        log::warn!("no *_constraint_matrix.json files found");
    }

    let options = Arc::new(options);
    let semaphore = Arc::new(Semaphore::new(options.config.jobs));
    let mut tasks = JoinSet::new();

    for unit in units {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        let solve = solve.clone();
        let options = options.clone();
        tasks.spawn(async move { process_unit(solve, unit, permit, &options).await });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined.context("unit task panicked")?);
    }
    reports.sort_by(|a, b| a.unit.cmp(&b.unit));

    let summary = BatchSummary::new(backend.name(), backend.engine(), reports);
    log::info!("finished: {} ok, {} failed", summary.ok, summary.failed);
    Ok(summary)
}

async fn process_unit(
    solve: SolveFn,
    unit: UnitPaths,
    permit: OwnedSemaphorePermit,
    options: &BatchOptions,
) -> UnitReport {
    let started = Instant::now();
    log::info!("--- {} ---", unit.name);

    let job = {
        let unit = unit.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            solve(&unit)
        })
    };
    let solved = match options.config.solve_timeout {
        Some(limit) => match tokio::time::timeout(limit, job).await {
            Ok(joined) => joined,
            Err(_) => return timed_out(&unit, limit, started),
        },
        None => job.await,
    };

    let result = match solved.context("solve task panicked") {
        Ok(Ok(output)) => {
            let box_size = options.box_size;
            let limit = options.num_particles;
            let persist_unit = unit.clone();
            tokio::task::spawn_blocking(move || {
                persist(&persist_unit, &output, box_size, limit, started)
            })
            .await
            .context("persist task panicked")
            .and_then(|persisted| persisted)
        }
        Ok(Err(err)) | Err(err) => Err(err),
    };

    match result {
        Ok(report) => report,
        Err(err) => failed(&unit, &err, started),
    }
}

fn solve_unit(
    pipeline: &ConsensusPipeline<SolverBackend>,
    unit: &UnitPaths,
) -> Result<ConsensusOutput> {
    let input = load_unit(unit)?;
    pipeline
        .run(&input)
        .with_context(|| format!("{}: consensus selection failed", unit.name))
}

fn persist(
    unit: &UnitPaths,
    output: &ConsensusOutput,
    box_size: u32,
    limit: Option<usize>,
    started: Instant,
) -> Result<UnitReport> {
    let path = unit.output(output.mode);
    let rendered = render(output, box_size, limit);
    write_atomic(&path, rendered.as_bytes())?;

    let elapsed_secs = started.elapsed().as_secs_f64();
    if let Err(err) = append_runtime(&unit.runtime(), elapsed_secs) {
        // failed units leave no output
        if let Err(remove_err) = std::fs::remove_file(&path) {
            log::warn!("failed to remove {}: {remove_err}", path.display());
        }
        return Err(err);
    }
    log::info!(
        "{}: {} entries ({} selected, {} synthesized) -> {} in {:.3}s",
        unit.name,
        output.entries.len(),
        output.selected_count(),
        output.synthesized_count(),
        display_name(&path),
        elapsed_secs
    );

    Ok(UnitReport {
        unit: unit.name.clone(),
        status: UnitStatus::Ok,
        output: Some(path.display().to_string()),
        entries: output.entries.len(),
        selected: output.selected_count(),
        synthesized: output.synthesized_count(),
        elapsed_secs,
        error_kind: None,
        error: None,
    })
}

fn failed(unit: &UnitPaths, err: &anyhow::Error, started: Instant) -> UnitReport {
    log::error!("{} failed: {err:#}", unit.name);
    let kind = err
        .downcast_ref::<ConsensusError>()
        .map(ConsensusError::kind)
        .unwrap_or("input");
    failure_report(unit, UnitStatus::Failed, kind, format!("{err:#}"), started)
}

fn timed_out(unit: &UnitPaths, limit: Duration, started: Instant) -> UnitReport {
    log::error!("{} timed out after {:.3}s", unit.name, limit.as_secs_f64());
    failure_report(
        unit,
        UnitStatus::TimedOut,
        "timeout",
        format!("solve exceeded {:.3}s", limit.as_secs_f64()),
        started,
    )
}

fn failure_report(
    unit: &UnitPaths,
    status: UnitStatus,
    kind: &str,
    error: String,
    started: Instant,
) -> UnitReport {
    UnitReport {
        unit: unit.name.clone(),
        status,
        output: None,
        entries: 0,
        selected: 0,
        synthesized: 0,
        elapsed_secs: started.elapsed().as_secs_f64(),
        error_kind: Some(kind.to_string()),
        error: Some(error),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
