//! Deduplicated model installation with progress fan-out.
//!
//! At most one installation operation is live per model. Callers asking for
//! a model that is already being installed join the live operation: they
//! first receive every progress line logged so far, then the remaining lines
//! as they arrive, then the same terminal outcome as everyone else.
//!
//! ```text
//!   install(m) ──┐                       ┌──> observer 1 (unbounded queue)
//!   install(m) ──┼─> table[m].live ──────┼──> observer 2
//!   install(m) ──┘     │                 └──> observer 3
//!                      └─ driver task <── engine.pull(m) via bounded channel
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use ollaweb_engine::InferenceEngine;

use crate::error::CoordinatorError;
use crate::lock;
use crate::model::{InstallState, ModelName};

/// Reason reported when an operation is cancelled.
pub const CANCELLED_REASON: &str = "installation cancelled";

/// Terminal result every observer of one operation sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Failed(String),
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Installed)
    }

    pub fn into_result(self) -> Result<(), CoordinatorError> {
        match self {
            InstallOutcome::Installed => Ok(()),
            InstallOutcome::Failed(reason) => Err(CoordinatorError::InstallFailure(reason)),
        }
    }
}

/// What an observer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Progress(String),
    /// Always the last event.
    Finished(InstallOutcome),
}

/// One live installation.
struct Operation {
    log: Vec<String>,
    observers: Vec<mpsc::UnboundedSender<InstallEvent>>,
    cancel: watch::Sender<bool>,
}

impl Operation {
    fn publish(&mut self, line: String) {
        self.observers
            .retain(|observer| observer.send(InstallEvent::Progress(line.clone())).is_ok());
        self.log.push(line);
    }
}

#[derive(Default)]
struct ModelEntry {
    state: InstallState,
    live: Option<Arc<Mutex<Operation>>>,
    /// Bumped each time an operation completes.
    completions: u64,
}

/// Taken when a listing query starts; stale once an install completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CheckTicket(u64);

struct Inner {
    engine: Arc<dyn InferenceEngine>,
    table: Mutex<HashMap<ModelName, ModelEntry>>,
    progress_capacity: usize,
}

/// Owner of every model's install state and live operation.
#[derive(Clone)]
pub struct Installer {
    inner: Arc<Inner>,
}

impl Installer {
    pub fn new(engine: Arc<dyn InferenceEngine>, progress_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                table: Mutex::new(HashMap::new()),
                progress_capacity: progress_capacity.max(1),
            }),
        }
    }

    /// Install a model, joining the live operation if there is one.
    ///
    /// Must be called from within a tokio runtime. The underlying pull runs
    /// on its own task, so it completes (and updates state) even if every
    /// observer goes away.
    pub fn install(&self, model: &ModelName) -> InstallStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = InstallStream {
            model: model.clone(),
            rx,
            finished: false,
        };

        let mut table = lock(&self.inner.table);
        let entry = table.entry(model.clone()).or_default();

        if let Some(live) = &entry.live {
            let mut op = lock(live);
            for line in &op.log {
                let _ = tx.send(InstallEvent::Progress(line.clone()));
            }
            op.observers.push(tx);
            debug!(
                "Joined live installation of {} ({} observers)",
                model,
                op.observers.len()
            );
            return stream;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let op = Arc::new(Mutex::new(Operation {
            log: Vec::new(),
            observers: vec![tx],
            cancel,
        }));
        entry.live = Some(op.clone());
        entry.state = InstallState::Installing;
        drop(table);

        info!("Installing model {}...", model);
        tokio::spawn(drive(self.inner.clone(), model.clone(), op, cancel_rx));
        stream
    }

    /// Request cancellation of the live operation for `model`.
    ///
    /// Returns `false` when nothing is being installed.
    pub fn cancel(&self, model: &ModelName) -> bool {
        let table = lock(&self.inner.table);
        match table.get(model).and_then(|entry| entry.live.as_ref()) {
            Some(live) => {
                lock(live).cancel.send_replace(true);
                info!("Cancelling installation of {}", model);
                true
            }
            None => false,
        }
    }

    /// Cached state for `model`; `Unknown` if never seen.
    pub fn state(&self, model: &ModelName) -> InstallState {
        lock(&self.inner.table)
            .get(model)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    /// Whether an operation for `model` is in flight.
    pub fn is_live(&self, model: &ModelName) -> bool {
        lock(&self.inner.table)
            .get(model)
            .is_some_and(|entry| entry.live.is_some())
    }

    /// Record the start of a listing query, unless an install owns the state.
    pub(crate) fn mark_checking(&self, model: &ModelName) -> CheckTicket {
        let mut table = lock(&self.inner.table);
        let entry = table.entry(model.clone()).or_default();
        if entry.live.is_none() {
            entry.state = InstallState::Checking;
        }
        CheckTicket(entry.completions)
    }

    /// Record a listing result.
    ///
    /// Dropped while an install is live, and when one completed after the
    /// query started: the listing predates the install's outcome.
    pub(crate) fn record_check(&self, model: &ModelName, ticket: CheckTicket, installed: bool) {
        let mut table = lock(&self.inner.table);
        let entry = table.entry(model.clone()).or_default();
        if entry.completions != ticket.0 {
            debug!("Discarding stale listing result for {}", model);
            return;
        }
        if entry.live.is_none() {
            entry.state = if installed {
                InstallState::Installed
            } else {
                InstallState::NotInstalled
            };
        }
    }
}

impl Inner {
    /// Finish an operation: update state, notify, and retire it.
    ///
    /// The table lock is held throughout so a concurrent `install` either
    /// joins before the outcome is sent or starts a fresh operation after.
    fn complete(&self, model: &ModelName, op: &Arc<Mutex<Operation>>, outcome: InstallOutcome) {
        let mut table = lock(&self.table);
        if let Some(entry) = table.get_mut(model) {
            entry.state = match &outcome {
                InstallOutcome::Installed => InstallState::Installed,
                InstallOutcome::Failed(reason) => InstallState::Failed(reason.clone()),
            };
            if entry.live.as_ref().is_some_and(|live| Arc::ptr_eq(live, op)) {
                entry.live = None;
            }
            entry.completions += 1;
        }

        let mut op = lock(op);
        for observer in op.observers.drain(..) {
            let _ = observer.send(InstallEvent::Finished(outcome.clone()));
        }
    }
}

/// Run one pull to completion and fan its progress out.
async fn drive(
    inner: Arc<Inner>,
    model: ModelName,
    op: Arc<Mutex<Operation>>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let (progress_tx, mut progress_rx) = mpsc::channel(inner.progress_capacity);
    let engine = inner.engine.clone();
    let target = model.as_str().to_string();
    let pull = tokio::spawn(async move { engine.pull(&target, progress_tx).await });

    let mut cancelled = false;
    let mut cancel_open = true;
    loop {
        tokio::select! {
            line = progress_rx.recv() => match line {
                Some(line) => {
                    lock(&op).publish(line);
                }
                None => break,
            },
            changed = cancel_rx.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                    continue;
                }
                let requested = *cancel_rx.borrow();
                if requested {
                    cancelled = true;
                    pull.abort();
                    break;
                }
            }
        }
    }

    // Aborting a pull that already finished is a no-op, so its own result
    // still decides the outcome.
    let outcome = match pull.await {
        Ok(Ok(())) => InstallOutcome::Installed,
        Ok(Err(e)) => InstallOutcome::Failed(e.to_string()),
        Err(e) if e.is_cancelled() => InstallOutcome::Failed(CANCELLED_REASON.to_string()),
        Err(e) => InstallOutcome::Failed(format!("install task failed: {}", e)),
    };
    if cancelled && outcome.is_success() {
        debug!("Cancel for {} arrived after the pull finished", model);
    }

    match &outcome {
        InstallOutcome::Installed => info!("Model {} installed", model),
        InstallOutcome::Failed(reason) => warn!("Failed to install model {}: {}", model, reason),
    }
    inner.complete(&model, &op, outcome);
}

/// One observer's view of an installation.
///
/// Yields progress lines in the operation's order, then exactly one
/// [`InstallEvent::Finished`], then ends.
pub struct InstallStream {
    model: ModelName,
    rx: mpsc::UnboundedReceiver<InstallEvent>,
    finished: bool,
}

impl InstallStream {
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    /// Next event, or `None` after the terminal one.
    pub async fn next_event(&mut self) -> Option<InstallEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        self.observe(event)
    }

    /// Drain the remaining progress and return the outcome.
    pub async fn outcome(mut self) -> InstallOutcome {
        while let Some(event) = self.next_event().await {
            if let InstallEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        InstallOutcome::Failed("installation aborted".to_string())
    }

    fn observe(&mut self, event: Option<InstallEvent>) -> Option<InstallEvent> {
        match event {
            Some(InstallEvent::Finished(outcome)) => {
                self.finished = true;
                Some(InstallEvent::Finished(outcome))
            }
            Some(progress) => Some(progress),
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl Stream for InstallStream {
    type Item = InstallEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(event) => Poll::Ready(self.observe(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}
