//! CLI route: run context and dispatch. Opens the stack or store per command.

use crate::cli::output::{format_demo_report, format_records_json, format_records_table, DemoReport};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, StackConfig};
use crate::error::StackError;
use crate::stack::{context_for_current_thread, install_main_stack, reset_main_stack, Stack};
use crate::store::{open_store, Model, Properties};
use crate::thread::{MainQueue, OsThreadHost};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime context for CLI execution, built from an optional config path.
pub struct RunContext {
    config: StackConfig,
}

impl RunContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, StackError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load_from_env()?,
        };
        Ok(Self { config })
    }

    pub fn from_config(config: StackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, StackError> {
        let started = Instant::now();
        let result = match command {
            Commands::Demo {
                workers,
                records,
                entity,
                field,
            } => self.run_demo(*workers, *records, entity, field),
            Commands::Inspect { entity, format } => self.run_inspect(entity, format),
        };
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "command finished"
        );
        result
    }

    /// The calling thread becomes primary for the duration of the demo.
    fn run_demo(
        &self,
        workers: usize,
        records: usize,
        entity: &str,
        field: &str,
    ) -> Result<String, StackError> {
        let (host, queue) = OsThreadHost::on_current_thread();
        let stack = Arc::new(Stack::try_open(self.config.stack_options(), host)?);
        install_main_stack(stack.clone())?;
        let report = drive_demo(&stack, &queue, workers, records, entity, field);
        reset_main_stack();
        Ok(format_demo_report(&report?))
    }

    fn run_inspect(&self, entity: &str, format: &str) -> Result<String, StackError> {
        let options = self.config.stack_options();
        let model = Arc::new(Model::from_path(&options.model_path)?);
        model.check_entity(entity)?;
        let coordinator = open_store(
            model,
            options.store_path.as_deref(),
            options.store_type,
            options.store,
        )?;
        let records = coordinator.fetch(entity)?;
        match format {
            "json" => format_records_json(&records),
            "text" => Ok(format_records_table(entity, &records)),
            other => Err(StackError::Configuration(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }
}

fn drive_demo(
    stack: &Stack,
    queue: &MainQueue,
    workers: usize,
    records: usize,
    entity: &str,
    field: &str,
) -> Result<DemoReport, StackError> {
    let primary = stack.primary_context();
    let before = primary.fetch(entity)?.len();
    info!(workers, records, entity, before, "demo starting");

    let handles: Vec<JoinHandle<Result<usize, StackError>>> = (0..workers)
        .map(|worker| {
            let entity = entity.to_string();
            let field = field.to_string();
            std::thread::spawn(move || insert_batch(worker, records, &entity, &field))
        })
        .collect();

    let finished = queue.run_until(WORKER_TIMEOUT, || handles.iter().all(|h| h.is_finished()));
    if !finished {
        return Err(StackError::Worker(format!(
            "workers did not finish within {:?}",
            WORKER_TIMEOUT
        )));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.join() {
            Ok(result) => committed += result?,
            Err(_) => return Err(StackError::Worker("worker thread panicked".to_string())),
        }
    }
    // Every commit posted before its worker finished; drain the merges.
    queue.run_pending();
    stack.settle_thread_exits();

    let primary_objects = primary.registered_count(entity);
    let stored_objects = stack.coordinator().count(entity)?;
    check_merges(before, committed, primary_objects)?;

    Ok(DemoReport {
        entity: entity.to_string(),
        workers,
        committed,
        merged_into_primary: primary_objects.saturating_sub(before),
        primary_objects,
        stored_objects,
        threads_still_registered: stack.registered_threads().len(),
    })
}

/// The primary context must hold every object committed by a worker.
fn check_merges(before: usize, committed: usize, primary_objects: usize) -> Result<(), StackError> {
    let expected = before + committed;
    if primary_objects != expected {
        return Err(StackError::Worker(format!(
            "primary context holds {} objects, expected {} after merging {} commits",
            primary_objects, expected, committed
        )));
    }
    Ok(())
}

fn insert_batch(worker: usize, records: usize, entity: &str, field: &str) -> Result<usize, StackError> {
    let context = context_for_current_thread()?;
    for n in 0..records {
        let mut properties = Properties::new();
        properties.insert(field.to_string(), json!(format!("worker-{}-{}", worker, n)));
        context.insert(entity, properties)?;
        context.commit()?;
    }
    debug!(worker, records, context = %context.id(), "worker done");
    Ok(records)
}
