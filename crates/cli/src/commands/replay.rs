use crate::config::WorkerConfig;
use crate::echo::{EchoTaskHandler, LocalClientPool, LoggingNotifier};
use anyhow::{Context, Result};
use clap::Args;
use dispatch_core::{
    NoopDependencyWaiter, PushTaskReply, PushTaskRequest, Status, TaskId, WorkerAddress, WorkerId,
};
use serde::Serialize;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transport::{ReceiverService, TaskReceiver};

#[derive(Debug, Args)]
pub struct ReplayCommand {
    /// JSON-lines file of push requests, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// Ask the worker to exit after this many executed tasks
    #[arg(long)]
    pub max_calls: Option<usize>,
}

/// One line of replay output
#[derive(Debug, Serialize)]
struct ReplayRecord {
    task_id: TaskId,
    status: Status,
    reply: PushTaskReply,
}

impl ReplayCommand {
    pub async fn execute(&self, config: &WorkerConfig) -> Result<()> {
        let requests = self.read_requests()?;
        info!(tasks = requests.len(), input = %self.input, "Replaying tasks");

        let mut receiver = TaskReceiver::new(
            config.receiver.clone(),
            Arc::new(EchoTaskHandler::new(self.max_calls)),
            Arc::new(LoggingNotifier),
            None,
        )?;
        receiver.init(
            Arc::new(LocalClientPool),
            WorkerAddress {
                worker_id: WorkerId::new(),
                ip_address: "127.0.0.1".to_string(),
                port: 0,
            },
            Arc::new(NoopDependencyWaiter),
        );

        let shutdown = CancellationToken::new();
        let (handle, driver) = ReceiverService::spawn(receiver, shutdown.clone());
        let (records, mut replies) = mpsc::unbounded_channel();
        let mut stdout = io::stdout();
        let mut outstanding = 0usize;

        for request in requests {
            let task_id = request.task_spec.task_id();
            if request.task_spec.is_actor_creation_task() {
                // Callers only send actor tasks once the actor exists.
                let (status, reply) = handle.push_task(request).await?;
                write_record(&mut stdout, &ReplayRecord { task_id, status, reply })?;
                continue;
            }
            let records = records.clone();
            handle.handle_task(
                request,
                Box::new(move |status, reply| {
                    let _ = records.send(ReplayRecord {
                        task_id,
                        status,
                        reply,
                    });
                }),
            )?;
            outstanding += 1;
        }
        drop(records);

        while outstanding > 0 {
            let Some(record) = replies.recv().await else {
                break;
            };
            write_record(&mut stdout, &record)?;
            outstanding -= 1;
        }

        shutdown.cancel();
        driver.await.context("Receiver driver panicked")?;
        info!("Replay finished");
        Ok(())
    }

    fn read_requests(&self) -> Result<Vec<PushTaskRequest>> {
        let reader: Box<dyn BufRead> = if self.input == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = std::fs::File::open(&self.input)
                .with_context(|| format!("Failed to open {}", self.input))?;
            Box::new(BufReader::new(file))
        };
        parse_requests(reader)
    }
}

/// Parse one request per line; blank lines and `#` comments are skipped
fn parse_requests(reader: impl BufRead) -> Result<Vec<PushTaskRequest>> {
    let mut requests = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request = serde_json::from_str(line)
            .with_context(|| format!("Invalid push request on line {}", index + 1))?;
        requests.push(request);
    }
    Ok(requests)
}

fn write_record(out: &mut impl Write, record: &ReplayRecord) -> Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
