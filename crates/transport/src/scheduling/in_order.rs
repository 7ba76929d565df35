use super::{
    cancel_released, queue_stopped_status, release, task_cancelled_status, DependencyResolver,
    InboundRequest, Released, SchedulingQueue, SendReplyCallback, TaskOutcomeHandler,
};
use crate::concurrency_group::ActorExecutors;
use dispatch_core::{DependencyWaiter, Status, TaskId, TaskSpecification};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

enum Pending {
    /// Buffered; `ready` once its dependencies are local
    Waiting {
        request: InboundRequest,
        ticket: u64,
        ready: bool,
    },
    /// Cancelled while buffered; still counts as delivered for ordering
    Cancelled,
}

/// Dependencies of the entry holding `ticket` at `seq_no` are local
struct Resolved {
    seq_no: i64,
    ticket: u64,
}

/// Releases one caller's actor tasks strictly in sequence-number order.
///
/// Sequence numbers start at 0. `client_processed_up_to` is an inclusive
/// watermark: the caller has seen every reply up to it, so the queue jumps past
/// it and rejects whatever is still buffered below.
///
/// An entry is released only once its dependencies are resolved, so later entries
/// never overtake an earlier one that is still waiting on its arguments.
pub struct ActorSchedulingQueue {
    pending: BTreeMap<i64, Pending>,
    next_seq_no: i64,
    /// Gap we are currently blocked on and since when
    waiting_since: Option<(i64, Instant)>,
    reorder_wait: Duration,
    executors: ActorExecutors,
    waiter: Arc<dyn DependencyWaiter>,
    resolver: DependencyResolver,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
    resolved_rx: mpsc::UnboundedReceiver<Resolved>,
    next_ticket: u64,
    released: Vec<Released>,
    stopped: bool,
}

impl ActorSchedulingQueue {
    pub fn new(
        executors: ActorExecutors,
        waiter: Arc<dyn DependencyWaiter>,
        resolver: DependencyResolver,
        reorder_wait: Duration,
    ) -> Self {
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        Self {
            pending: BTreeMap::new(),
            next_seq_no: 0,
            waiting_since: None,
            reorder_wait,
            executors,
            waiter,
            resolver,
            resolved_tx,
            resolved_rx,
            next_ticket: 0,
            released: Vec::new(),
            stopped: false,
        }
    }

    pub fn next_seq_no(&self) -> i64 {
        self.next_seq_no
    }

    fn buffered(&self) -> usize {
        self.pending
            .values()
            .filter(|entry| matches!(entry, Pending::Waiting { .. }))
            .count()
    }

    fn release_request(&mut self, request: InboundRequest) {
        let spec = request.task_spec().clone();
        let executors = &self.executors;
        // Dependencies were resolved before the entry became ready.
        if let Some(released) = release(request, None, |job| executors.post(&spec, job)) {
            self.released.push(released);
        }
    }

    /// Start resolving the dependencies of a new entry; `true` if none are needed
    fn resolve_dependencies(&self, request: &InboundRequest, ticket: u64) -> Result<bool, Status> {
        let dependencies = request.task_spec().dependencies();
        if dependencies.is_empty() || request.seq_no() < self.next_seq_no {
            return Ok(true);
        }

        let resolved = self.resolved_tx.clone();
        let seq_no = request.seq_no();
        self.resolver
            .wait(self.waiter.clone(), dependencies.to_vec(), move || {
                let _ = resolved.send(Resolved { seq_no, ticket });
            })
            .map(|()| false)
            .map_err(|e| e.to_status())
    }

    fn mark_resolved(&mut self) {
        while let Ok(Resolved { seq_no, ticket }) = self.resolved_rx.try_recv() {
            if let Some(Pending::Waiting {
                ticket: current,
                ready,
                ..
            }) = self.pending.get_mut(&seq_no)
            {
                if *current == ticket {
                    debug!(seq_no, "Dependencies resolved");
                    *ready = true;
                }
            }
        }
    }

    fn reject_stale(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() >= self.next_seq_no {
                break;
            }
            let (seq_no, pending) = entry.remove_entry();
            if let Pending::Waiting { request, .. } = pending {
                debug!(seq_no, task_id = %request.task_id(), "Rejecting stale request");
                request.cancel(Status::invalid("client cancelled stale rpc"));
            }
        }
    }

    fn release_in_order(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.next_seq_no {
                break;
            }
            if matches!(entry.get(), Pending::Waiting { ready: false, .. }) {
                break;
            }
            let pending = entry.remove();
            self.next_seq_no = self.next_seq_no.saturating_add(1);
            if let Pending::Waiting { request, .. } = pending {
                self.release_request(request);
            }
        }
    }

    fn check_reorder_timeout(&mut self) {
        // Only a missing sequence number times out; dependency waits do not.
        if self.buffered() == 0 || self.pending.contains_key(&self.next_seq_no) {
            self.waiting_since = None;
            return;
        }

        let now = Instant::now();
        match self.waiting_since {
            Some((seq_no, since)) if seq_no == self.next_seq_no => {
                if now.duration_since(since) >= self.reorder_wait {
                    self.fail_pending_after_timeout(seq_no);
                    self.waiting_since = None;
                }
            }
            _ => self.waiting_since = Some((self.next_seq_no, now)),
        }
    }

    fn fail_pending_after_timeout(&mut self, missing: i64) {
        error!(
            missing_seq_no = missing,
            buffered = self.buffered(),
            "Timed out waiting for request, cancelling all queued tasks"
        );
        let pending = std::mem::take(&mut self.pending);
        for (seq_no, entry) in pending {
            self.next_seq_no = self.next_seq_no.max(seq_no.saturating_add(1));
            if let Pending::Waiting { request, .. } = entry {
                request.cancel(Status::invalid(format!(
                    "Timed out waiting for request with seq_no {missing}"
                )));
            }
        }
    }
}

impl SchedulingQueue for ActorSchedulingQueue {
    fn add(
        &mut self,
        seq_no: i64,
        client_processed_up_to: i64,
        handler: Box<dyn TaskOutcomeHandler>,
        send_reply: SendReplyCallback,
        task_spec: TaskSpecification,
    ) {
        let request =
            InboundRequest::new(seq_no, client_processed_up_to, handler, send_reply, task_spec);
        if self.stopped {
            request.cancel(queue_stopped_status());
            return;
        }

        if client_processed_up_to >= self.next_seq_no {
            debug!(
                client_processed_up_to,
                next_seq_no = self.next_seq_no,
                "Client skipped requests"
            );
            self.next_seq_no = client_processed_up_to.saturating_add(1);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let ready = match self.resolve_dependencies(&request, ticket) {
            Ok(ready) => ready,
            Err(status) => {
                warn!(seq_no, task_id = %request.task_id(), error = %status, "Dependency wait refused");
                request.cancel(status);
                return;
            }
        };

        let task_id = request.task_id();
        let entry = Pending::Waiting {
            request,
            ticket,
            ready,
        };
        if let Some(Pending::Waiting {
            request: previous, ..
        }) = self.pending.insert(seq_no, entry)
        {
            warn!(seq_no, task_id = %task_id, "Replacing buffered request with retry");
            previous.cancel(Status::invalid(format!(
                "Request with seq_no {seq_no} was replaced by a retry"
            )));
        }

        self.schedule_requests();
    }

    fn schedule_requests(&mut self) {
        self.mark_resolved();
        self.reject_stale();
        self.release_in_order();
        self.released.retain(|r| !r.is_started());
        self.check_reorder_timeout();
    }

    fn task_queue_empty(&self) -> bool {
        self.buffered() == 0
    }

    fn cancel_task_if_found(&mut self, task_id: TaskId) -> bool {
        let buffered = self.pending.iter().find_map(|(seq_no, entry)| match entry {
            Pending::Waiting { request, .. } if request.task_id() == task_id => Some(*seq_no),
            _ => None,
        });

        if let Some(seq_no) = buffered {
            if let Some(Pending::Waiting { request, .. }) =
                self.pending.insert(seq_no, Pending::Cancelled)
            {
                request.cancel(task_cancelled_status());
            }
            self.schedule_requests();
            return true;
        }

        cancel_released(&mut self.released, task_id, task_cancelled_status())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.waiting_since = None;
        for (_, entry) in std::mem::take(&mut self.pending) {
            if let Pending::Waiting { request, .. } = entry {
                request.cancel(queue_stopped_status());
            }
        }
        self.executors.stop();
    }
}
