//! BuildRun - the event stream of a single build
//!
//! Workers never touch the Repo. They report [`UnitMessage`]s over a channel
//! and the run, as the only consumer, expands each message into events and
//! records every `file` event into the Repo as it is yielded.

use futures::Stream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::{BuildEvent, BuildSummary};
use crate::domain::{OVERVIEW_FILE, Plan, Repo, unit_path};
use crate::generation::{UnitMessage, UnitOutcome};

/// A finite, non-restartable stream of [`BuildEvent`]s
///
/// Dropping the run cancels any generation still in flight. Hand the run
/// back to [`Builder::finish`](super::Builder::finish) to complete the
/// session's transition; a run dropped unfinished is noticed by the builder
/// through [`liveness`](Self::liveness) and its Plan becomes buildable again.
pub struct BuildRun {
    seq: u64,
    rx: mpsc::Receiver<UnitMessage>,
    pending: VecDeque<BuildEvent>,
    repo: Repo,
    summary: BuildSummary,
    cancel: CancellationToken,
    _guard: DropGuard,
    alive: Arc<()>,
    closed: bool,
}

impl BuildRun {
    pub(crate) fn new(seq: u64, plan: &Plan, rx: mpsc::Receiver<UnitMessage>, cancel: CancellationToken) -> Self {
        debug!(seq, units = plan.len(), "BuildRun::new: called");
        let mut pending = VecDeque::new();
        pending.push_back(BuildEvent::log(format!("Generated root {}", OVERVIEW_FILE)));
        pending.push_back(BuildEvent::file(OVERVIEW_FILE, plan.overview_markdown()));

        Self {
            seq,
            rx,
            pending,
            repo: Repo::new(),
            summary: BuildSummary {
                units: plan.len(),
                ..BuildSummary::default()
            },
            _guard: cancel.clone().drop_guard(),
            cancel,
            alive: Arc::new(()),
            closed: false,
        }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Upgrades only while this run exists
    pub(crate) fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Handle that cancels this run when triggered
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching units and abandon in-flight ones
    pub fn cancel(&self) {
        info!(seq = self.seq, "Build cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once every event has been yielded
    pub fn is_finished(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    /// Files recorded so far
    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    /// Consume the remaining events without yielding them
    pub(crate) async fn drain(&mut self) {
        let mut skipped = 0usize;
        while self.next().await.is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            debug!(skipped, "BuildRun::drain: consumed unread events");
        }
    }

    pub(crate) fn into_parts(self) -> (Repo, BuildSummary) {
        (self.repo, self.summary)
    }

    /// Apply an event to the Repo on its way out
    fn record(&mut self, event: BuildEvent) -> BuildEvent {
        let BuildEvent::File { path, content } = event else {
            return event;
        };
        match self.repo.insert(path.clone(), content.clone()) {
            Ok(()) => {
                self.summary.files += 1;
                BuildEvent::File { path, content }
            }
            Err(e) => {
                warn!(%path, "Dropping file event for a path already written");
                // Root-level files belong to no unit
                let unit_id = path
                    .split_once('/')
                    .map(|(unit, _)| unit.to_string())
                    .unwrap_or_default();
                BuildEvent::error(unit_id, e.to_string())
            }
        }
    }

    /// Turn a worker message into events and update the summary
    fn expand(&mut self, message: UnitMessage) {
        match message {
            UnitMessage::Started {
                index,
                total,
                unit_name,
                ..
            } => {
                self.pending.push_back(BuildEvent::log(format!(
                    "[{}/{}] designing task: {}...",
                    index + 1,
                    total,
                    unit_name
                )));
            }
            UnitMessage::Finished {
                index,
                total,
                unit_name,
                outcome,
            } => {
                let generating = BuildEvent::log(format!(
                    "[{}/{}] generating code for: {}...",
                    index + 1,
                    total,
                    unit_name
                ));
                match outcome {
                    UnitOutcome::Complete(unit) => {
                        self.summary.complete += 1;
                        self.pending.push_back(BuildEvent::file(unit.narrative_path(), unit.narrative));
                        self.pending.push_back(generating);
                        for (filename, content) in unit.files {
                            self.pending
                                .push_back(BuildEvent::file(unit_path(&unit.unit_id, &filename), content));
                        }
                    }
                    UnitOutcome::Degraded { unit, error } => {
                        if error.is_cancellation() {
                            self.summary.cancelled += 1;
                        } else {
                            self.summary.degraded += 1;
                        }
                        self.pending.push_back(BuildEvent::file(unit.narrative_path(), unit.narrative));
                        self.pending.push_back(generating);
                        self.pending.push_back(BuildEvent::error(unit.unit_id, error.to_string()));
                    }
                    UnitOutcome::Failed { unit_id, error } => {
                        if error.is_cancellation() {
                            self.summary.cancelled += 1;
                        } else {
                            self.summary.failed += 1;
                        }
                        self.pending.push_back(BuildEvent::error(unit_id, error.to_string()));
                    }
                }
            }
        }
    }

    fn closing_log(&self) -> BuildEvent {
        let s = &self.summary;
        let mut message = format!(
            "Build finished: {} complete, {} degraded, {} failed",
            s.complete, s.degraded, s.failed
        );
        if s.cancelled > 0 {
            message.push_str(&format!(", {} cancelled", s.cancelled));
        }
        BuildEvent::log(message)
    }
}

impl Stream for BuildRun {
    type Item = BuildEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(this.record(event)));
            }
            if this.closed {
                return Poll::Ready(None);
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(message)) => this.expand(message),
                Poll::Ready(None) => {
                    this.closed = true;
                    info!(seq = this.seq, summary = ?this.summary, "Build run complete");
                    let closing = this.closing_log();
                    this.pending.push_back(closing);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
