//! Source contract and the bounded-concurrency dispatch discipline every
//! source uses to hand work to the sink. A source repeatedly pulls a unit of
//! raw data, wraps it as messages, and submits it through a [Dispatcher]
//! whose semaphore caps simultaneous in-flight deliveries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::error;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::sink::WriteResult;

/// A channel-fed builtin source for internal use and tests.
pub mod in_memory;

/// Set of items to be implemented to become a streambridge source.
#[trait_variant::make(Source: Send)]
pub trait LocalSource {
    /// Read data until stopped or fatally failed, delivering via `callbacks`.
    async fn read(&self, callbacks: SourceCallbacks) -> Result<()>;

    /// Signal the read loop to exit after in-flight deliveries drain. Safe to
    /// call from another task, idempotent. Cooperative only: a source with no
    /// natural cancellation point (e.g. a blocking protocol read) needs an
    /// external timeout to force closure.
    fn stop(&self);

    /// Identifier for this source, used in logs.
    fn id(&self) -> String;
}

type DeliveryFuture = Pin<Box<dyn Future<Output = Result<WriteResult>> + Send + 'static>>;

/// The callbacks a source needs to hand newly-read messages to the delivery
/// path (transformation + write + classification). An `Err` from
/// `write_to_sink` means the batch was not durably handled.
#[derive(Clone)]
pub struct SourceCallbacks {
    write_to_sink: Arc<dyn Fn(Vec<Message>) -> DeliveryFuture + Send + Sync>,
}

impl SourceCallbacks {
    pub fn new(
        write_to_sink: impl Fn(Vec<Message>) -> DeliveryFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            write_to_sink: Arc::new(write_to_sink),
        }
    }

    pub async fn write_to_sink(&self, messages: Vec<Message>) -> Result<WriteResult> {
        (self.write_to_sink)(messages).await
    }
}

/// What a delivery error does to the source's read loop.
///
/// Sources whose protocol cannot make progress until a checkpoint succeeds
/// must escalate: retrying locally could deadlock the consumer group, so the
/// error is surfaced as [Error::Fatal] for the hosting process to act on.
/// Other sources log and continue, relying on upstream redelivery of the
/// un-acked messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    Escalate,
    LogAndContinue,
}

/// Semaphore-bounded set of concurrent delivery tasks. One dispatcher per
/// source instance; the permit pool and join barrier are never shared.
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    error_tx: mpsc::Sender<Error>,
    error_rx: mpsc::Receiver<Error>,
    fatal_policy: FatalPolicy,
}

impl Dispatcher {
    /// `concurrent_writes` is the permit count: the maximum number of
    /// simultaneous in-flight deliveries.
    pub fn new(concurrent_writes: usize, fatal_policy: FatalPolicy) -> Self {
        let (error_tx, error_rx) = mpsc::channel(concurrent_writes.max(1));
        Self {
            semaphore: Arc::new(Semaphore::new(concurrent_writes.max(1))),
            tasks: JoinSet::new(),
            error_tx,
            error_rx,
            fatal_policy,
        }
    }

    /// Wait for a permit, then run `delivery` as a new task. The permit is
    /// released when the delivery finishes, successfully or not.
    pub async fn dispatch<F>(&mut self, delivery: F) -> Result<()>
    where
        F: Future<Output = Result<WriteResult>> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| Error::Source(e.to_string()))?;

        let error_tx = self.error_tx.clone();
        let fatal_policy = self.fatal_policy;
        self.tasks.spawn(async move {
            let result = delivery.await;
            drop(permit);
            if let Err(e) = result {
                match fatal_policy {
                    FatalPolicy::Escalate => {
                        let _ = error_tx.try_send(Error::Fatal(e.to_string()));
                    }
                    FatalPolicy::LogAndContinue => {
                        error!(%e, "Delivery failed, messages left un-acked for redelivery");
                    }
                }
            }
        });

        // reap any deliveries that already finished
        while self.tasks.try_join_next().is_some() {}

        Ok(())
    }

    /// First escalated delivery error, if one occurred since the last call.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error_rx.try_recv().ok()
    }

    /// Join barrier: wait for every outstanding delivery task.
    pub async fn drain(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
