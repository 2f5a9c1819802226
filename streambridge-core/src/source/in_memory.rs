use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;
use crate::message::{AckOnce, Message};
use crate::source::{Dispatcher, FatalPolicy, Source, SourceCallbacks};

/// InMemorySource reads batches of payloads from a channel. Each payload
/// becomes a message whose ack appends it to a delivered ledger, the
/// in-memory analogue of a queue deletion or checkpoint advance.
pub struct InMemorySource {
    feed: tokio::sync::Mutex<mpsc::Receiver<Vec<Bytes>>>,
    delivered: Arc<Mutex<Vec<Bytes>>>,
    concurrent_writes: usize,
    fatal_policy: FatalPolicy,
    cancel: CancellationToken,
}

impl InMemorySource {
    /// Returns the source and the sender used to feed it. The source's read
    /// loop also exits when the sender is dropped.
    pub fn new(
        concurrent_writes: usize,
        fatal_policy: FatalPolicy,
    ) -> (Self, mpsc::Sender<Vec<Bytes>>) {
        // feed buffer is independent of the write concurrency cap
        let (tx, rx) = mpsc::channel(64);
        let source = Self {
            feed: tokio::sync::Mutex::new(rx),
            delivered: Arc::new(Mutex::new(Vec::new())),
            concurrent_writes,
            fatal_policy,
            cancel: CancellationToken::new(),
        };
        (source, tx)
    }

    /// Payloads acked so far, in ack order.
    pub fn delivered(&self) -> Vec<Bytes> {
        self.delivered.lock().clone()
    }

    fn wrap(&self, payloads: Vec<Bytes>) -> Vec<Message> {
        let now = Utc::now();
        payloads
            .into_iter()
            .map(|payload| {
                let ledger = Arc::clone(&self.delivered);
                let acked = payload.clone();
                Message {
                    data: payload.clone(),
                    original_data: payload,
                    partition_key: Uuid::new_v4().to_string(),
                    time_created: Some(now),
                    time_pulled: Some(now),
                    ack: Some(AckOnce::new(move || {
                        ledger.lock().push(acked.clone());
                    })),
                    ..Default::default()
                }
            })
            .collect()
    }
}

impl Source for InMemorySource {
    async fn read(&self, callbacks: SourceCallbacks) -> Result<()> {
        info!(source = %self.id(), "Reading messages from in-memory buffer");

        let mut feed = self.feed.lock().await;
        let mut dispatcher = Dispatcher::new(self.concurrent_writes, self.fatal_policy);

        let result = loop {
            if let Some(err) = dispatcher.take_error() {
                break Err(err);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                batch = feed.recv() => match batch {
                    Some(payloads) => {
                        let messages = self.wrap(payloads);
                        let callbacks = callbacks.clone();
                        dispatcher
                            .dispatch(async move { callbacks.write_to_sink(messages).await })
                            .await?;
                    }
                    None => break Ok(()),
                },
            }
        };

        dispatcher.drain().await;
        info!(source = %self.id(), "Done with processing");

        // an escalated error may have landed between the last loop check and
        // the feed closing
        match result {
            Ok(()) => dispatcher.take_error().map_or(Ok(()), Err),
            err => err,
        }
    }

    fn stop(&self) {
        warn!(source = %self.id(), "Stopping in-memory source");
        self.cancel.cancel();
    }

    fn id(&self) -> String {
        "in_memory".to_string()
    }
}
