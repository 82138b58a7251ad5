//! Polling scheduler
//!
//! The scheduler owns the receive loop for one handler. It moves through two
//! states:
//!
//! - **Running**: receive a batch, dispatch it, emit `heartbeat`, sleep for
//!   the poll interval, repeat
//! - **Draining**: entered on shutdown; polling stops and in-flight
//!   executions run to completion
//!
//! Dispatch depends on the queue type. On a FIFO queue the batch is split by
//! `MessageGroupId`; each group runs one message at a time while groups run
//! side by side, and the cycle waits for every group. On a standard queue each
//! message is handed to the pool as soon as a slot is free.
//!
//! Executions get `max_workers` slots. The scheduler loop itself runs on its
//! own task and never competes with them for a slot.

use crate::client::{QueueClient, ReceiveRequest};
use crate::config::{ConfigOverrides, WorkerKind};
use crate::descriptor::HandlerDescriptor;
use crate::error::WorkerError;
use crate::event::{HeartbeatEvent, ReadyEvent, ShutdownEvent};
use crate::executor::Executor;
use crate::message::{Message, group_by_message_group};
use crate::metrics::ConsumerMetrics;
use crate::outcome::ExecuteResult;
use crate::registry::HandlerRegistry;
use crate::session::SessionProvider;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::signal::SignalBus;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 30;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Draining,
}

/// Receive loop for one registered handler
pub struct PollingScheduler {
    descriptor: Arc<HandlerDescriptor>,
    session: Arc<SessionProvider>,
    signals: Arc<SignalBus>,
    state: watch::Sender<SchedulerState>,
}

impl PollingScheduler {
    pub fn new(
        descriptor: HandlerDescriptor,
        session: Arc<SessionProvider>,
        signals: Arc<SignalBus>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Running);
        Self {
            descriptor: Arc::new(descriptor),
            session,
            signals,
            state,
        }
    }

    /// Scheduler for the handler registered as `name`, with `overrides` applied
    pub fn from_registry(
        registry: &HandlerRegistry,
        name: &str,
        overrides: ConfigOverrides,
        session: Arc<SessionProvider>,
        signals: Arc<SignalBus>,
    ) -> Result<Self, WorkerError> {
        let descriptor = registry.resolve(name, overrides)?;
        Ok(Self::new(descriptor, session, signals))
    }

    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run until SIGHUP, SIGTERM or SIGINT, then drain
    pub async fn run_until_signal(&self) -> Result<(), WorkerError> {
        let coordinator = ShutdownCoordinator::new();
        let shutdown = coordinator.subscribe();

        let listener = coordinator.clone();
        let signals = tokio::spawn(async move { listener.wait_for_signal().await });

        let result = self.run(shutdown).await;
        signals.abort();
        result
    }

    /// Run until `shutdown` carries a reason, then drain
    ///
    /// Startup failures (client construction, queue resolution, a failing
    /// `ready` subscriber) are returned before any message is received. A
    /// failing `heartbeat` subscriber starts the drain and is returned once
    /// every in-flight execution has finished.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<Option<ShutdownReason>>,
    ) -> Result<(), WorkerError> {
        let descriptor = &self.descriptor;
        let config = descriptor.config();

        let client = self.session.client(&config.connection).await?;
        let queue_url = descriptor.resolve(client.as_ref()).await?.to_string();
        let dead_letter_queue_url = descriptor
            .resolve_dead_letter(client.as_ref())
            .await?
            .map(str::to_string);
        let fifo = descriptor.is_fifo();

        let metrics = ConsumerMetrics::new(descriptor.name(), &queue_url);
        let executor = Executor::new(descriptor.clone(), client.clone(), self.signals.clone());
        let mut pool = WorkerPool::new(config.max_workers, config.worker_kind);

        info!(
            handler = %descriptor.name(),
            queue_url = %queue_url,
            dlq_url = ?dead_letter_queue_url,
            fifo = fifo,
            max_workers = config.max_workers,
            worker_kind = ?config.worker_kind,
            batch_size = config.max_messages,
            visibility_timeout = config.visibility_timeout,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Starting SQS consumer"
        );

        self.state.send_replace(SchedulerState::Running);
        self.signals
            .ready
            .send(&ReadyEvent {
                handler: descriptor.name().to_string(),
                queue_url: queue_url.clone(),
                dead_letter_queue_url,
                fifo,
                max_workers: config.max_workers,
                at: Utc::now(),
            })
            .inspect_err(|e| {
                metrics.subscriber_failed("ready");
                error!(error = %e, "ready subscriber failed, not starting");
            })?;

        let request = ReceiveRequest {
            queue_url: queue_url.clone(),
            visibility_timeout: config.visibility_timeout,
            max_messages: config.max_messages,
            wait_time_seconds: config.wait_time_seconds,
        };

        let mut tick: u64 = 0;
        let mut consecutive_errors: u32 = 0;
        let mut failure: Option<WorkerError> = None;

        let reason = loop {
            let received = tokio::select! {
                reason = wait_for_shutdown(&mut shutdown) => break reason,
                received = client.receive(&request) => received,
            };

            let messages = match received {
                Ok(messages) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Receive recovered");
                        consecutive_errors = 0;
                    }
                    messages
                }
                Err(e) => {
                    consecutive_errors += 1;
                    metrics.receive_failed();
                    let backoff = backoff_delay(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs = backoff.as_secs(),
                        "Receive failed, backing off"
                    );
                    tokio::select! {
                        reason = wait_for_shutdown(&mut shutdown) => break reason,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
            };

            tick += 1;
            let received = messages.len();
            if received > 0 {
                metrics.messages_received(received);
                debug!(count = received, tick, "Dispatching batch");
                if fifo {
                    pool.dispatch_fifo(&executor, messages).await;
                } else {
                    pool.dispatch(&executor, messages).await;
                }
            }

            pool.reap();
            metrics.in_flight(pool.in_flight());

            let heartbeat = HeartbeatEvent {
                handler: descriptor.name().to_string(),
                tick,
                received,
                in_flight: pool.in_flight(),
                at: Utc::now(),
            };
            if let Err(e) = self.signals.heartbeat.send(&heartbeat) {
                metrics.subscriber_failed("heartbeat");
                error!(error = %e, "heartbeat subscriber failed, draining");
                let reason = ShutdownReason::SubscriberFailure(e.to_string());
                failure = Some(e.into());
                break reason;
            }

            tokio::select! {
                reason = wait_for_shutdown(&mut shutdown) => break reason,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        };

        self.state.send_replace(SchedulerState::Draining);
        info!(
            handler = %descriptor.name(),
            reason = %reason,
            in_flight = pool.in_flight(),
            "Draining SQS consumer"
        );

        let event = ShutdownEvent {
            handler: descriptor.name().to_string(),
            reason,
            in_flight: pool.in_flight(),
            at: Utc::now(),
        };
        if let Err(e) = self.signals.shutdown.send(&event) {
            metrics.subscriber_failed("shutdown");
            warn!(error = %e, "shutdown subscriber failed");
            failure.get_or_insert(e.into());
        }

        pool.drain().await;
        metrics.in_flight(0);
        info!(handler = %descriptor.name(), "SQS consumer stopped");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resolve once a shutdown reason is published; a closed channel counts as a request
async fn wait_for_shutdown(rx: &mut watch::Receiver<Option<ShutdownReason>>) -> ShutdownReason {
    loop {
        if let Some(reason) = rx.borrow_and_update().clone() {
            return reason;
        }
        if rx.changed().await.is_err() {
            return ShutdownReason::Requested;
        }
    }
}

fn backoff_delay(consecutive_errors: u32) -> Duration {
    Duration::from_secs(2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS))
}

/// Bounded set of execution slots
struct WorkerPool {
    slots: Slots,
    tasks: JoinSet<()>,
}

#[derive(Clone)]
struct Slots {
    permits: Arc<Semaphore>,
    size: usize,
    kind: WorkerKind,
}

impl WorkerPool {
    fn new(size: usize, kind: WorkerKind) -> Self {
        let size = size.max(1);
        Self {
            slots: Slots {
                permits: Arc::new(Semaphore::new(size)),
                size,
                kind,
            },
            tasks: JoinSet::new(),
        }
    }

    fn in_flight(&self) -> usize {
        self.slots.size - self.slots.permits.available_permits()
    }

    /// Hand each message to a free slot without waiting for it to finish
    async fn dispatch(&mut self, executor: &Executor, messages: Vec<Message>) {
        for message in messages {
            let Some(permit) = self.slots.acquire().await else {
                return;
            };
            let kind = self.slots.kind;
            self.tasks
                .spawn(run_in_slot(kind, permit, executor.clone(), message));
        }
    }

    /// Run each FIFO group sequentially, groups concurrently, and wait for all
    async fn dispatch_fifo(&mut self, executor: &Executor, messages: Vec<Message>) {
        let mut groups = JoinSet::new();
        for (group_id, members) in group_by_message_group(messages) {
            let slots = self.slots.clone();
            let executor = executor.clone();
            groups.spawn(async move {
                debug!(group_id = ?group_id, size = members.len(), "Running message group");
                for message in members {
                    let Some(permit) = slots.acquire().await else {
                        return;
                    };
                    run_in_slot(slots.kind, permit, executor.clone(), message).await;
                }
            });
        }

        while let Some(joined) = groups.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Message group task failed");
            }
        }
    }

    /// Collect finished executions
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
    }

    /// Wait for every in-flight execution
    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

impl Slots {
    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }
}

/// Execute one message while holding `permit`
async fn run_in_slot(
    kind: WorkerKind,
    permit: OwnedSemaphorePermit,
    executor: Executor,
    message: Message,
) {
    let message_id = message.id().to_string();

    let outcome = match kind {
        WorkerKind::Task => executor.execute(message).await,
        WorkerKind::Blocking => {
            let handle = Handle::current();
            tokio::task::spawn_blocking(move || handle.block_on(executor.execute(message)))
                .await
                .unwrap_or_else(|e| Err(WorkerError::Internal(format!("worker thread failed: {e}"))))
        }
    };
    drop(permit);

    log_outcome(&message_id, outcome);
}

fn log_outcome(message_id: &str, outcome: Result<ExecuteResult, WorkerError>) {
    match outcome {
        Ok(result) => debug!(message_id = %message_id, result = %result, "Execution complete"),
        Err(e) => warn!(
            message_id = %message_id,
            error = %e,
            scope = ?e.scope(),
            "Execution did not finalize cleanly"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(50), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let (tx, mut rx) = watch::channel(None);
        tx.send_replace(Some(ShutdownReason::Requested));
        assert_eq!(wait_for_shutdown(&mut rx).await, ShutdownReason::Requested);

        let (tx, mut rx) = watch::channel::<Option<ShutdownReason>>(None);
        drop(tx);
        assert_eq!(wait_for_shutdown(&mut rx).await, ShutdownReason::Requested);
    }

    #[test]
    fn test_pool_never_empty() {
        let pool = WorkerPool::new(0, WorkerKind::Task);
        assert_eq!(pool.slots.size, 1);
        assert_eq!(pool.in_flight(), 0);
    }
}
