/*! Multi-file pipeline runner.

Runs one configured pipeline over every file of the input directories:
`(input, output)` pairs go onto a shared work queue and a fixed number of
workers drain it in parallel, each with its own independent pipeline
instance. A worker builds and acquires its transform chain exactly once,
then reuses it for every file it pulls; only the source and collector are
rebuilt per file, from the per-file substituted configuration.

Failure policy: configuration errors abort the run before any file is
touched; a chain acquisition failure kills only that worker (siblings keep
draining the queue); per-file errors are logged and skipped. Partial results
always beat aborting the batch.
!*/
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info, warn};
use rayon::prelude::*;
use serde_json::Value;

use crate::config::{substitute, PipelineDescriptor, Registry, StageDescriptor};
use crate::error::Error;
use crate::pipeline::{run_scoped, Chain, Collect, Resource, Stage};
use crate::record::Record;

pub struct Runner {
    config: String,
    input_dirs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    reduced_file: Option<PathBuf>,
    vars: HashMap<String, String>,
    processes: usize,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Files processed to completion.
    pub processed: usize,
    /// Files abandoned on error (including files left behind by dead
    /// workers).
    pub failed: usize,
    /// Aggregate values collected across all workers, before reduction.
    pub collected: usize,
}

#[derive(Default)]
struct WorkerReport {
    results: Vec<Record>,
    processed: usize,
    failed: usize,
}

impl Runner {
    pub fn new(
        config: String,
        input_dirs: Vec<PathBuf>,
        output_dir: Option<PathBuf>,
        reduced_file: Option<PathBuf>,
        vars: HashMap<String, String>,
        processes: usize,
    ) -> Self {
        Self {
            config,
            input_dirs,
            output_dir,
            reduced_file,
            vars,
            processes: processes.max(1),
        }
    }

    pub fn run(&self, registry: &Registry) -> Result<RunReport, Error> {
        let probe = self.validate(registry)?;
        let reducing = probe.reducer.is_some();
        let pairs = self.file_pairs(reducing)?;
        info!("{} files to process", pairs.len());

        let queue: Mutex<VecDeque<(PathBuf, Option<PathBuf>)>> = Mutex::new(pairs.into());
        let worker_reports: Vec<Result<WorkerReport, Error>> = (0..self.processes)
            .into_par_iter()
            .map(|id| self.worker(id, &queue, registry))
            .collect();

        let mut report = RunReport::default();
        let mut results = Vec::new();
        for outcome in worker_reports {
            match outcome {
                Ok(mut w) => {
                    report.processed += w.processed;
                    report.failed += w.failed;
                    results.append(&mut w.results);
                }
                Err(e) => error!("worker died: {:?}", e),
            }
        }
        let leftover = queue.lock().expect("work queue poisoned").len();
        if leftover > 0 {
            warn!("{} files were left unprocessed", leftover);
            report.failed += leftover;
        }
        report.collected = results.len();

        if let (Some(reducer), Some(path)) = (&probe.reducer, &self.reduced_file) {
            let reduced = self.reduce(reducer, results, registry)?;
            info!("writing {} reduced values to {:?}", reduced.len(), path);
            write_reduced(path, reduced)?;
        }
        Ok(report)
    }

    /// Pre-flight checks, all fatal before any record is processed: the
    /// configuration must parse, every stage tag must resolve, and the
    /// reducer and `reduced_file` must be specified together.
    fn validate(&self, registry: &Registry) -> Result<PipelineDescriptor, Error> {
        let mut vars = self.vars.clone();
        vars.insert("process".to_string(), "0".to_string());
        let desc = PipelineDescriptor::parse(&substitute(&self.config, &vars))?;
        if desc.pipeline.len() < 2 {
            return Err(Error::Config(
                "a pipeline needs at least a source and a collector".to_string(),
            ));
        }
        for stage in desc.pipeline.iter().chain(desc.reducer.iter()) {
            if !registry.contains(&stage.class) {
                return Err(Error::Config(format!(
                    "unknown stage class '{}'",
                    stage.class
                )));
            }
        }
        if desc.reducer.is_some() != self.reduced_file.is_some() {
            return Err(Error::Config(
                "reduced_file is only valid with a reducer in the configuration, and vice versa"
                    .to_string(),
            ));
        }
        if let Some(path) = &self.reduced_file {
            if !matches!(extension_of(path), Some("json") | Some("tsv")) {
                return Err(Error::Config(
                    "the reduced file must either be a .json or a .tsv".to_string(),
                ));
            }
        }
        if desc.reducer.is_none() && self.output_dir.is_none() {
            return Err(Error::Config(
                "an output directory is required when not reducing".to_string(),
            ));
        }
        Ok(desc)
    }

    /// `(input, output)` pairs for every non-hidden file under the input
    /// directories, mirroring the tree under the output directory.
    fn file_pairs(&self, reducing: bool) -> Result<Vec<(PathBuf, Option<PathBuf>)>, Error> {
        let mut pairs = Vec::new();
        for dir in &self.input_dirs {
            let mut sources = Vec::new();
            walk_non_hidden(dir, &mut sources)?;
            sources.sort();
            for source in sources {
                let target = match (&self.output_dir, reducing) {
                    (_, true) => None,
                    (Some(out), false) => {
                        let relative = source.strip_prefix(dir).map_err(|e| {
                            Error::Custom(format!("path outside input dir: {}", e))
                        })?;
                        let target = out.join(relative);
                        if let Some(parent) = target.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        Some(target)
                    }
                    // rejected in validate
                    (None, false) => None,
                };
                pairs.push((source, target));
            }
        }
        Ok(pairs)
    }

    fn worker(
        &self,
        id: usize,
        queue: &Mutex<VecDeque<(PathBuf, Option<PathBuf>)>>,
        registry: &Registry,
    ) -> Result<WorkerReport, Error> {
        let mut vars = self.vars.clone();
        vars.insert("process".to_string(), id.to_string());
        let desc = PipelineDescriptor::parse(&substitute(&self.config, &vars))?;

        // the transform chain is built and acquired once per worker, and
        // reused for every file this worker pulls from the queue
        let mut transforms = Vec::new();
        for stage in &desc.pipeline[1..desc.pipeline.len() - 1] {
            transforms.push(registry.build(stage)?);
        }
        let mut chain = Chain::build(transforms, desc.connections())?;
        chain.acquire()?;

        let mut report = WorkerReport::default();
        loop {
            let next = queue.lock().expect("work queue poisoned").pop_front();
            let Some((input, output)) = next else { break };
            info!("started processing {:?}", input);
            match self.process_one(&mut chain, registry, &vars, &input, output.as_deref()) {
                Ok(mut results) => {
                    report.results.append(&mut results);
                    report.processed += 1;
                    info!("done processing {:?}", input);
                }
                Err(e) => {
                    error!("error processing {:?}: {:?}", input, e);
                    report.failed += 1;
                }
            }
        }
        chain.release(None);
        Ok(report)
    }

    /// One file: substitute its paths into the configuration, build the
    /// source and collector, and run them over the worker's chain.
    fn process_one(
        &self,
        chain: &mut Chain,
        registry: &Registry,
        worker_vars: &HashMap<String, String>,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<Vec<Record>, Error> {
        let mut vars = worker_vars.clone();
        vars.insert("input".to_string(), input.display().to_string());
        if let Some(output) = output {
            vars.insert("output".to_string(), output.display().to_string());
        }
        let desc = PipelineDescriptor::parse(&substitute(&self.config, &vars))?;
        let (first, last) = match (desc.pipeline.first(), desc.pipeline.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::Config("empty pipeline".to_string())),
        };
        let source = match registry.build(first)? {
            Stage::Source(s) => s,
            other => {
                return Err(Error::Config(format!(
                    "first stage must be a source, got {} '{}'",
                    other.role(),
                    other.name()
                )))
            }
        };
        let collector = match registry.build(last)? {
            Stage::Collector(c) => c,
            other => {
                return Err(Error::Config(format!(
                    "last stage must be a collector, got {} '{}'",
                    other.role(),
                    other.name()
                )))
            }
        };
        run_scoped(chain, source, collector)
    }

    /// Run the reducer stage over the concatenated worker aggregates.
    fn reduce(
        &self,
        descriptor: &StageDescriptor,
        results: Vec<Record>,
        registry: &Registry,
    ) -> Result<Vec<Record>, Error> {
        let mut reducer: Box<dyn Collect> = match registry.build(descriptor)? {
            Stage::Collector(c) => c,
            other => {
                return Err(Error::Config(format!(
                    "reducer must be a collector, got {} '{}'",
                    other.role(),
                    other.name()
                )))
            }
        };
        reducer.acquire()?;
        let outcome = reducer.collect(&mut results.into_iter());
        if let Err(e) = reducer.release(outcome.as_ref().err()) {
            error!("error while releasing reducer: {:?}", e);
        }
        outcome
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Recursively collects files, skipping hidden files and directories.
fn walk_non_hidden(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            walk_non_hidden(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Writes reduced values as JSON lines (`.json`) or tab-separated lines
/// (`.tsv`, lists become columns).
fn write_reduced(path: &Path, values: Vec<Record>) -> Result<(), Error> {
    let mut file = File::create(path)?;
    match extension_of(path) {
        Some("json") => {
            for value in values {
                serde_json::to_writer(&mut file, &value)?;
                file.write_all(b"\n")?;
            }
        }
        Some("tsv") => {
            for value in values {
                let line = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(cell)
                        .collect::<Vec<_>>()
                        .join("\t"),
                    other => cell(&other),
                };
                writeln!(file, "{}", line)?;
            }
        }
        // rejected in validate
        _ => {
            return Err(Error::Config(
                "the reduced file must either be a .json or a .tsv".to_string(),
            ))
        }
    }
    Ok(())
}

/// One TSV cell: strings unquoted, everything else as JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
