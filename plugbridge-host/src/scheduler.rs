//! Schedule-and-redeliver for asynchronous host work.
//!
//! Sandboxes never wait. A capability that needs async work parks the
//! plugin's callback under a ticket, hands the work to [`Scheduler::spawn`],
//! and returns. When the work finishes, a [`Completion`] is queued on the
//! channel; the plugin manager drains it and invokes the parked callback as
//! a fresh, independent call.

use crate::host::FetchFuture;
use plugbridge_types::Surface;
use std::cell::Cell;
use std::rc::Rc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Which runtime a completion belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTarget {
    pub plugin_id: String,
    /// Instance id of the plugin context that scheduled the work.
    pub instance: Uuid,
    pub surface: Surface,
}

/// Outcome of one piece of async host work, waiting for redelivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub target: CompletionTarget,
    pub ticket: u64,
    pub result: Result<String, String>,
    /// Where to memoize a successful result before redelivery.
    pub cache_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Completion>,
    next_ticket: Rc<Cell<u64>>,
}

impl Scheduler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            next_ticket: Rc::new(Cell::new(1)),
        };
        (scheduler, rx)
    }

    pub fn next_ticket(&self) -> u64 {
        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket + 1);
        ticket
    }

    /// Queues a result that is already known (cache hit, early failure).
    pub fn complete_now(
        &self,
        target: CompletionTarget,
        ticket: u64,
        result: Result<String, String>,
        cache_key: Option<String>,
    ) {
        let completion = Completion {
            target,
            ticket,
            result,
            cache_key,
        };
        if self.tx.send(completion).is_err() {
            debug!(ticket, "Completion channel closed, result discarded");
        }
    }

    /// Runs `work` on the ambient tokio runtime.
    ///
    /// Without a runtime the work is never polled and the ticket completes
    /// immediately with an error.
    pub fn spawn(
        &self,
        target: CompletionTarget,
        ticket: u64,
        work: FetchFuture,
        cache_key: Option<String>,
    ) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.complete_now(
                    target,
                    ticket,
                    Err("no async runtime available".to_string()),
                    None,
                );
                return;
            }
        };

        let tx = self.tx.clone();
        handle.spawn(async move {
            let result = work.await;
            let plugin_id = target.plugin_id.clone();
            let completion = Completion {
                target,
                ticket,
                result,
                cache_key,
            };
            if tx.send(completion).is_err() {
                debug!(plugin_id = %plugin_id, ticket, "Host shut down before completion");
            }
        });
    }
}
