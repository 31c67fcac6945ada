//! spindle - operator interface to the media task queue.

mod command_handler;
mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use spindle_core::app::{GcLoop, ProcessorBuilder, ProgressReporter, ReaperLoop, gc_loop, status};
use spindle_core::config::Config;
use spindle_core::domain::{
    InsertPayload, Processor, QueueDir, RipPayload, ScanPayload, TaskDraft, TaskId, TaskPayload,
    TranscodePayload,
};
use spindle_core::queue::{Resubmission, TaskQueue};
use spindle_core::worker::WorkerGroup;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::command_handler::CommandHandler;

#[derive(Parser)]
#[command(name = "spindle", about = "Filesystem task queue for ripping and transcoding")]
struct Cli {
    /// Config file (default: $SPINDLE_CONFIG or ~/.spindle/spindle.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the queue root
    #[arg(long, global = true)]
    tasks_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the queue directories
    Init,
    /// Enqueue a disc scan
    Scan {
        #[arg(long, default_value = "/dev/sr0")]
        device: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Enqueue a rip of one disc title
    Rip {
        #[arg(long, default_value = "/dev/sr0")]
        device: String,
        #[arg(long)]
        title: u32,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Enqueue a rip and the transcode of its result
    Process {
        #[arg(long, default_value = "/dev/sr0")]
        device: String,
        #[arg(long)]
        title: u32,
        #[arg(long)]
        label: Option<String>,
        /// Where the rip writes (and the transcode reads)
        #[arg(long)]
        ripped: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "default")]
        preset: String,
    },
    /// Enqueue a transcode
    Transcode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "default")]
        preset: String,
    },
    /// Enqueue a library insert
    Insert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        year: Option<u16>,
    },
    /// Show the queue
    Status {
        #[arg(long)]
        json: bool,
        /// Include the complete (audit) directory
        #[arg(long)]
        all: bool,
    },
    /// Re-enqueue a failed task, optionally edited
    Resubmit {
        id: String,
        /// New output path; downstream tasks follow it
        #[arg(long, conflicts_with = "clear_output")]
        output: Option<PathBuf>,
        /// Drop the output; downstream tasks are cancelled
        #[arg(long)]
        clear_output: bool,
        /// Replacement payload fields as a JSON object
        #[arg(long)]
        payload: Option<String>,
    },
    /// Dismiss a failed task
    Cancel {
        id: String,
        /// Also cancel queued tasks that depend on its output
        #[arg(long)]
        downstream: bool,
    },
    /// List queued tasks that depend on a failed task's output
    Downstream { id: String },
    /// Return a stuck in-progress task to the queue
    Requeue { id: String },
    /// Move a queued task to the front
    Prioritize { id: String },
    /// Purge old audit records and repair the ordering index
    Gc,
    /// Run a processor
    Work {
        #[arg(value_enum)]
        processor: ProcessorArg,
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProcessorArg {
    Ripper,
    Transcoder,
}

impl From<ProcessorArg> for Processor {
    fn from(arg: ProcessorArg) -> Self {
        match arg {
            ProcessorArg::Ripper => Processor::Ripper,
            ProcessorArg::Transcoder => Processor::Transcoder,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.tasks_dir {
        config.tasks_dir = dir.display().to_string();
    }
    init_tracing(&config.log_level);

    let queue = TaskQueue::open(&config.tasks_dir(), config.lock_options())
        .with_context(|| format!("opening queue at {}", config.tasks_dir().display()))?;

    match cli.command {
        Command::Init => {
            println!("queue ready at {}", config.tasks_dir().display());
        }
        Command::Scan { device, output } => {
            let mut draft = TaskDraft::new(TaskPayload::Scan(ScanPayload { device }));
            draft.output = output;
            print_created(&[queue.enqueue_one(draft)?.id]);
        }
        Command::Rip {
            device,
            title,
            label,
            output,
        } => {
            let payload = RipPayload {
                device,
                title,
                label,
            };
            let draft = TaskDraft::new(TaskPayload::Rip(payload)).with_output(output);
            print_created(&[queue.enqueue_one(draft)?.id]);
        }
        Command::Process {
            device,
            title,
            label,
            ripped,
            output,
            preset,
        } => {
            let rip = RipPayload {
                device,
                title,
                label,
            };
            let (rip, transcode) =
                queue.enqueue_process(rip, ripped, TranscodePayload { preset }, output)?;
            print_created(&[rip.id, transcode.id]);
        }
        Command::Transcode {
            input,
            output,
            preset,
        } => {
            let draft = TaskDraft::new(TaskPayload::Transcode(TranscodePayload { preset }))
                .with_input(input)
                .with_output(output);
            print_created(&[queue.enqueue_one(draft)?.id]);
        }
        Command::Insert { input, title, year } => {
            let draft =
                TaskDraft::new(TaskPayload::Insert(InsertPayload { title, year })).with_input(input);
            print_created(&[queue.enqueue_one(draft)?.id]);
        }
        Command::Status { json, all } => {
            let snapshot = status::snapshot(&queue, all)?;
            if json {
                print_json(&snapshot)?;
            } else {
                print!("{}", display::render_snapshot(&snapshot));
            }
        }
        Command::Resubmit {
            id,
            output,
            clear_output,
            payload,
        } => {
            let id = resolve_id(&queue, &id)?;
            let mut edits = Resubmission::unchanged();
            if let Some(raw) = payload {
                edits = edits.with_payload(parse_payload(&id, &raw)?);
            }
            if let Some(output) = output {
                edits = edits.with_output(output);
            }
            if clear_output {
                edits = edits.without_output();
            }
            let report = queue.resubmit(&id, edits)?;
            println!("resubmitted {} as {}", id, report.task.id);
            for (old, new) in report.cancelled.iter().zip(&report.replacements) {
                println!("  replaced {old} with {}", new.id);
            }
            for old in report.cancelled.iter().skip(report.replacements.len()) {
                println!("  cancelled {old}");
            }
        }
        Command::Cancel { id, downstream } => {
            let id = resolve_id(&queue, &id)?;
            let report = queue.cancel(&id, downstream)?;
            println!("cancelled {}", report.removed);
            for id in &report.cancelled {
                println!("  cancelled downstream {id}");
            }
        }
        Command::Downstream { id } => {
            let id = resolve_id(&queue, &id)?;
            for record in queue.downstream(&id)? {
                println!("{}", display::task_line(&record));
            }
        }
        Command::Requeue { id } => {
            let id = resolve_id(&queue, &id)?;
            queue.requeue(&id)?;
            println!("requeued {id}");
        }
        Command::Prioritize { id } => {
            let id = resolve_id(&queue, &id)?;
            queue.prioritize(&id)?;
            println!("prioritized {id}");
        }
        Command::Gc => {
            let report = gc_loop::collect(&queue, config.retention())?;
            println!(
                "purged {} records, dropped {} index entries, restored {}",
                report.purged.len(),
                report.dropped_entries,
                report.restored.len()
            );
        }
        Command::Work { processor, workers } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting async runtime")?;
            runtime.block_on(work(&config, Arc::new(queue), processor.into(), workers))?;
        }
    }
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run `processor` until interrupted or until a worker hits an
/// unrecoverable store error.
async fn work(
    config: &Config,
    queue: Arc<TaskQueue>,
    processor: Processor,
    workers: usize,
) -> anyhow::Result<()> {
    let progress = ProgressReporter::default();
    let mut builder = ProcessorBuilder::new(processor)
        .poll_interval(config.poll_interval())
        .progress(progress.clone());
    for task_type in processor.owned_types() {
        let command = config
            .command_for(task_type)
            .with_context(|| format!("no [commands.{task_type}] configured for {processor}"))?;
        builder = builder.register(task_type, Arc::new(CommandHandler::from_config(command)))?;
    }
    let worker = Arc::new(builder.build(Arc::clone(&queue))?);

    let mut events = progress.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    task_id = %event.task_id,
                    percent = ?event.percent,
                    message = event.message.as_deref().unwrap_or(""),
                    "progress"
                ),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let group = WorkerGroup::spawn(workers.max(1), worker);
    let reaper = ReaperLoop::new(
        Arc::clone(&queue),
        config.reaper_threshold(),
        config.reaper_interval(),
    );
    let gc = GcLoop::new(Arc::clone(&queue), config.retention(), config.gc_interval());
    let reaper = tokio::spawn({
        let shutdown = group.subscribe();
        async move { reaper.run(shutdown).await }
    });
    let gc = tokio::spawn({
        let shutdown = group.subscribe();
        async move { gc.run(shutdown).await }
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("interrupt received; finishing in-flight tasks");
        }
        _ = group.stopped() => {}
    }

    let result = group.shutdown_and_join().await;
    let _ = tokio::join!(reaper, gc);
    result?;
    Ok(())
}

/// Accept a full id or its `HHMM.ffffff-type` abbreviation.
fn resolve_id(queue: &TaskQueue, raw: &str) -> anyhow::Result<TaskId> {
    if let Ok(id) = TaskId::parse(raw) {
        return Ok(id);
    }
    let mut matches = Vec::new();
    for dir in QueueDir::ALL {
        for id in queue.store().list(dir)? {
            if id.short() == raw && !matches.contains(&id) {
                matches.push(id);
            }
        }
    }
    match matches.len() {
        0 => bail!("no task matches {raw:?}"),
        1 => Ok(matches.remove(0)),
        n => bail!("{raw:?} is ambiguous ({n} tasks match); use the full id"),
    }
}

/// Payload edits are given without the `type` tag; it comes from the id.
fn parse_payload(id: &TaskId, raw: &str) -> anyhow::Result<TaskPayload> {
    let mut value: serde_json::Value =
        serde_json::from_str(raw).context("--payload must be a JSON object")?;
    let Some(fields) = value.as_object_mut() else {
        bail!("--payload must be a JSON object");
    };
    fields
        .entry("type")
        .or_insert_with(|| id.task_type().as_str().into());
    serde_json::from_value(value).context("--payload does not fit the task type")
}

fn print_created(ids: &[TaskId]) {
    for id in ids {
        println!("{id}");
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use spindle_core::domain::TaskType;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn payload_edits_take_type_from_the_id() {
        let id = TaskId::parse("20240101T120000.000000-transcode").unwrap();
        let payload = parse_payload(&id, r#"{"preset": "fast"}"#).unwrap();
        assert_eq!(payload.task_type(), TaskType::Transcode);
        assert_eq!(
            payload,
            TaskPayload::Transcode(TranscodePayload {
                preset: "fast".into()
            })
        );
    }

    #[test]
    fn payload_edits_must_be_objects() {
        let id = TaskId::parse("20240101T120000.000000-rip").unwrap();
        assert!(parse_payload(&id, "[1, 2]").is_err());
        assert!(parse_payload(&id, r#"{"title": "x"}"#).is_err());
    }

    #[test]
    fn short_ids_resolve_when_unique() {
        let tmp = tempfile::TempDir::new().unwrap();
        let queue = TaskQueue::open(tmp.path(), Default::default()).unwrap();
        let record = queue
            .enqueue_one(TaskDraft::new(TaskPayload::Scan(ScanPayload {
                device: "/dev/sr0".into(),
            })))
            .unwrap();

        assert_eq!(resolve_id(&queue, &record.id.short()).unwrap(), record.id);
        assert_eq!(resolve_id(&queue, record.id.as_str()).unwrap(), record.id);
        assert!(resolve_id(&queue, "9999.000000-scan").is_err());
    }
}
