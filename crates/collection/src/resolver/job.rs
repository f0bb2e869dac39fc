//! Cancellable jobs, tickets, and the control-thread handoff
//!
//! Every per-item check runs as a job: spawned on the I/O runtime,
//! cancelled through a token, reporting exactly one terminal outcome as a
//! value over a channel. The receiving side (the resolver's reconcile loop)
//! is the only consumer, so delivery is a single-consumer queue back to the
//! control thread.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::item::ItemId;
use crate::resolver::candidate::ItemCheckResult;

/// Monotonically increasing token distinguishing successive resolution
/// attempts for the same item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

/// Issues tickets and remembers the latest one per item, so results from a
/// superseded attempt can be discarded on arrival.
#[derive(Debug, Default)]
pub struct TicketLedger {
    counter: AtomicU64,
    latest: Mutex<HashMap<ItemId, u64>>,
}

impl TicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh ticket for an item, superseding any earlier one
    pub fn issue(&self, item: &ItemId) -> Ticket {
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(item.clone(), ticket);
        Ticket(ticket)
    }

    /// Whether a ticket is still the latest issued for its item
    pub fn is_current(&self, item: &ItemId, ticket: Ticket) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(item)
            .is_some_and(|latest| *latest == ticket.0)
    }
}

/// Job lifecycle; no re-entry after a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobState {
    fn from_u8(v: u8) -> JobState {
        match v {
            0 => JobState::Created,
            1 => JobState::Running,
            2 => JobState::Succeeded,
            3 => JobState::Failed,
            _ => JobState::Aborted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Aborted)
    }
}

/// Terminal result of a job; exactly one per job. The payload is the full
/// per-item check result (versions fetched, best match picked, dependencies
/// resolved).
#[derive(Debug)]
pub enum JobResult {
    Succeeded(ItemCheckResult),
    Failed { reason: String, status: Option<u16> },
    Aborted,
}

/// The value delivered over the handoff channel when a job terminates
#[derive(Debug)]
pub struct JobOutcome {
    pub ticket: Ticket,
    /// The item the job was checking, for reconciliation
    pub item: ItemId,
    pub result: JobResult,
}

pub type OutcomeSender = mpsc::UnboundedSender<JobOutcome>;
pub type OutcomeReceiver = mpsc::UnboundedReceiver<JobOutcome>;

/// Create the handoff channel between the I/O context and the control loop
pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    mpsc::unbounded_channel()
}

/// Weak-style handle to a spawned job: enough to abort it and inspect its
/// state, without owning its resources or extending their lifetime.
#[derive(Debug, Clone)]
pub struct JobHandle {
    ticket: Ticket,
    state: Arc<AtomicU8>,
    token: CancellationToken,
}

impl JobHandle {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Request cancellation. A no-op once the job is terminal.
    pub fn abort(&self) {
        if !self.state().is_terminal() {
            self.token.cancel();
        }
    }
}

/// Spawn a job onto the runtime.
///
/// The handle starts in `Created` and moves to `Running` when the runtime
/// picks the task up. The work future runs under a child token of `parent`;
/// whichever of cancellation or completion happens first decides the single
/// terminal outcome, which is sent once and never again. Dropping the
/// returned handle does not keep anything alive.
pub fn spawn_job<F>(
    ticket: Ticket,
    item: ItemId,
    parent: &CancellationToken,
    tx: OutcomeSender,
    work: F,
) -> JobHandle
where
    F: Future<Output = Result<ItemCheckResult, EngineError>> + Send + 'static,
{
    let token = parent.child_token();
    let state = Arc::new(AtomicU8::new(JobState::Created as u8));

    let handle = JobHandle {
        ticket,
        state: state.clone(),
        token: token.clone(),
    };

    tokio::spawn(async move {
        state.store(JobState::Running as u8, Ordering::Release);
        let result = tokio::select! {
            _ = token.cancelled() => JobResult::Aborted,
            output = work => match output {
                Ok(payload) => JobResult::Succeeded(payload),
                Err(e) if e.is_abort() => JobResult::Aborted,
                Err(e) => JobResult::Failed {
                    status: e.status(),
                    reason: e.to_string(),
                },
            },
        };

        let terminal = match &result {
            JobResult::Succeeded(_) => JobState::Succeeded,
            JobResult::Failed { .. } => JobState::Failed,
            JobResult::Aborted => JobState::Aborted,
        };
        state.store(terminal as u8, Ordering::Release);

        // Receiver may be gone when the whole batch was dropped
        let _ = tx.send(JobOutcome { ticket, item, result });
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::candidate::CheckOutcome;
    use std::time::Duration;

    fn checked(item: &str) -> ItemCheckResult {
        ItemCheckResult {
            item: ItemId::from(item),
            outcome: CheckOutcome::UpToDate,
            update: None,
            pending: Vec::new(),
        }
    }

    #[tokio::test]
    async fn job_is_created_until_the_runtime_picks_it_up() {
        let (tx, mut rx) = outcome_channel();
        let token = CancellationToken::new();
        let ledger = TicketLedger::new();
        let ticket = ledger.issue(&ItemId::from("a"));

        let handle = spawn_job(ticket, ItemId::from("a"), &token, tx, async {
            Ok(checked("a"))
        });

        // Current-thread test runtime: the task cannot have run yet
        assert_eq!(handle.state(), JobState::Created);
        assert!(!handle.state().is_terminal());

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, JobResult::Succeeded(_)));
        assert_eq!(handle.state(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn job_delivers_exactly_one_terminal_outcome() {
        let (tx, mut rx) = outcome_channel();
        let token = CancellationToken::new();
        let ledger = TicketLedger::new();
        let ticket = ledger.issue(&ItemId::from("a"));

        let handle = spawn_job(ticket, ItemId::from("a"), &token, tx, async {
            Ok(checked("a"))
        });

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, JobResult::Succeeded(_)));
        assert_eq!(outcome.ticket, ticket);
        assert_eq!(handle.state(), JobState::Succeeded);

        // Sender dropped with the task; no second outcome can arrive
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn abort_terminates_job_without_success_or_failure() {
        let (tx, mut rx) = outcome_channel();
        let token = CancellationToken::new();
        let ledger = TicketLedger::new();
        let ticket = ledger.issue(&ItemId::from("a"));

        let handle = spawn_job(ticket, ItemId::from("a"), &token, tx, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(checked("a"))
        });

        handle.abort();
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, JobResult::Aborted));
        assert_eq!(handle.state(), JobState::Aborted);

        // Abort of an already-terminal job is a no-op
        handle.abort();
        assert_eq!(handle.state(), JobState::Aborted);
    }

    #[tokio::test]
    async fn parent_token_cancels_every_child_job() {
        let (tx, mut rx) = outcome_channel();
        let token = CancellationToken::new();
        let ledger = TicketLedger::new();

        for id in ["a", "b", "c"] {
            let ticket = ledger.issue(&ItemId::from(id));
            spawn_job(
                ticket,
                ItemId::from(id),
                &token,
                tx.clone(),
                async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(checked(id))
                },
            );
        }
        drop(tx);

        token.cancel();
        let mut aborted = 0;
        while let Some(outcome) = rx.recv().await {
            assert!(matches!(outcome.result, JobResult::Aborted));
            aborted += 1;
        }
        assert_eq!(aborted, 3);
    }

    #[tokio::test]
    async fn superseded_ticket_is_no_longer_current() {
        let ledger = TicketLedger::new();
        let item = ItemId::from("a");

        let first = ledger.issue(&item);
        assert!(ledger.is_current(&item, first));

        let second = ledger.issue(&item);
        assert!(!ledger.is_current(&item, first));
        assert!(ledger.is_current(&item, second));
    }

    #[tokio::test]
    async fn engine_abort_error_maps_to_aborted_result() {
        let (tx, mut rx) = outcome_channel();
        let token = CancellationToken::new();
        let ledger = TicketLedger::new();
        let ticket = ledger.issue(&ItemId::from("a"));

        spawn_job(ticket, ItemId::from("a"), &token, tx, async {
            Err(EngineError::Aborted)
        });

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, JobResult::Aborted));
    }
}
