//! Bounded concurrent generation of every unit in a plan

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{UnitError, UnitGenerator, UnitMessage, UnitOutcome};
use crate::domain::{Profile, Unit};

const CHANNEL_CAPACITY: usize = 64;

struct Running {
    index: usize,
    unit_id: String,
    unit_name: String,
    handle: JoinHandle<()>,
}

/// Generate `units` with at most `max_concurrent` in flight
///
/// Returns immediately; progress arrives on the receiver, which closes once
/// every unit has reported a `Finished` message. Each unit's `Started`
/// precedes its `Finished`; messages from different units interleave in
/// completion order. After `cancel` fires no further unit is dispatched and
/// the undispatched ones finish with [`UnitError::NotStarted`].
///
/// Must be called from within a tokio runtime.
pub fn generate_units(
    generator: Arc<UnitGenerator>,
    units: Vec<Unit>,
    profile: Arc<Profile>,
    max_concurrent: usize,
    cancel: CancellationToken,
) -> mpsc::Receiver<UnitMessage> {
    debug!(units = units.len(), max_concurrent, "generate_units: called");
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(dispatch(generator, units, profile, max_concurrent.max(1), cancel, tx));
    rx
}

async fn dispatch(
    generator: Arc<UnitGenerator>,
    units: Vec<Unit>,
    profile: Arc<Profile>,
    max_concurrent: usize,
    cancel: CancellationToken,
    tx: mpsc::Sender<UnitMessage>,
) {
    let total = units.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut running = Vec::with_capacity(total);
    let mut queue = units.into_iter().enumerate();

    while let Some((index, unit)) = queue.next() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            info!(remaining = total - index, "Build cancelled, skipping remaining units");
            not_started(&tx, index, total, &unit).await;
            for (index, unit) in queue.by_ref() {
                not_started(&tx, index, total, &unit).await;
            }
            break;
        };

        let unit_id = unit.id.clone();
        let unit_name = unit.name.clone();
        let generator = generator.clone();
        let profile = profile.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let _ = tx
                .send(UnitMessage::Started {
                    index,
                    total,
                    unit_id: unit.id.clone(),
                    unit_name: unit.name.clone(),
                })
                .await;

            let outcome = generator.generate(&unit, &profile, &cancel).await;

            let _ = tx
                .send(UnitMessage::Finished {
                    index,
                    total,
                    unit_name: unit.name,
                    outcome,
                })
                .await;
        });

        running.push(Running {
            index,
            unit_id,
            unit_name,
            handle,
        });
    }

    // A worker that panicked never sent its Finished message
    for worker in running {
        if let Err(e) = worker.handle.await {
            error!(unit_id = %worker.unit_id, error = %e, "Generation task panicked");
            let _ = tx
                .send(UnitMessage::Finished {
                    index: worker.index,
                    total,
                    unit_name: worker.unit_name,
                    outcome: UnitOutcome::Failed {
                        unit_id: worker.unit_id,
                        error: UnitError::Panicked(e.to_string()),
                    },
                })
                .await;
        }
    }
    debug!("dispatch: all units reported");
}

async fn not_started(tx: &mpsc::Sender<UnitMessage>, index: usize, total: usize, unit: &Unit) {
    let _ = tx
        .send(UnitMessage::Finished {
            index,
            total,
            unit_name: unit.name.clone(),
            outcome: UnitOutcome::Failed {
                unit_id: unit.id.clone(),
                error: UnitError::NotStarted,
            },
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Reasoner};
    use crate::prompts::PromptLoader;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers by request kind and tracks peak concurrency
    struct SlowClient {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowClient {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(match request.tool_choice {
                Some(tool) => CompletionResponse::tool_call(
                    tool,
                    serde_json::json!({"files": [{"filename": "main.py", "content": "pass"}]}),
                ),
                None => CompletionResponse::text("# Narrative"),
            })
        }
    }

    fn units(n: usize) -> Vec<Unit> {
        (1..=n)
            .map(|i| Unit {
                id: format!("task_{}", i),
                name: format!("Task {}", i),
                description: String::new(),
                target_files: vec![],
            })
            .collect()
    }

    fn generator(client: Arc<SlowClient>) -> Arc<UnitGenerator> {
        let reasoner = Arc::new(Reasoner::new(client, 1024));
        Arc::new(UnitGenerator::new(
            reasoner,
            Arc::new(PromptLoader::embedded_only()),
            Duration::from_secs(5),
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<UnitMessage>) -> Vec<UnitMessage> {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_every_unit_finishes_once() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(5)));
        let rx = generate_units(
            generator(client),
            units(4),
            Arc::new(Profile::new("Dev")),
            2,
            CancellationToken::new(),
        );

        let messages = collect(rx).await;
        let mut finished: HashMap<String, usize> = HashMap::new();
        for message in &messages {
            if let UnitMessage::Finished { outcome, .. } = message {
                assert!(matches!(outcome, UnitOutcome::Complete(_)));
                *finished.entry(outcome.unit_id().to_string()).or_default() += 1;
            }
        }
        assert_eq!(finished.len(), 4);
        assert!(finished.values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn test_started_precedes_finished_per_unit() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(2)));
        let rx = generate_units(
            generator(client),
            units(3),
            Arc::new(Profile::new("Dev")),
            3,
            CancellationToken::new(),
        );

        let messages = collect(rx).await;
        for unit in units(3) {
            let started = messages
                .iter()
                .position(|m| matches!(m, UnitMessage::Started { unit_id, .. } if *unit_id == unit.id));
            let finished = messages
                .iter()
                .position(|m| matches!(m, UnitMessage::Finished { outcome, .. } if outcome.unit_id() == unit.id));
            assert!(started.unwrap() < finished.unwrap());
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(20)));
        let rx = generate_units(
            generator(client.clone()),
            units(6),
            Arc::new(Profile::new("Dev")),
            2,
            CancellationToken::new(),
        );
        collect(rx).await;

        // Each unit makes sequential calls, so in-flight calls track in-flight units
        assert!(client.peak.load(Ordering::SeqCst) <= 2);
        assert!(client.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch_reports_not_started() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let rx = generate_units(generator(client), units(3), Arc::new(Profile::new("Dev")), 2, cancel);
        let messages = collect(rx).await;

        assert_eq!(messages.len(), 3);
        for message in messages {
            let UnitMessage::Finished { outcome, .. } = message else {
                panic!("no unit should start after cancellation");
            };
            assert_eq!(outcome.error(), Some(&UnitError::NotStarted));
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_build() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(200)));
        let cancel = CancellationToken::new();
        let rx = generate_units(generator(client), units(4), Arc::new(Profile::new("Dev")), 1, cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let messages = collect(rx).await;
        let outcomes: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                UnitMessage::Finished { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.error().is_some_and(UnitError::is_cancellation)));
    }
}
