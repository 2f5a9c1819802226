//! Forwarder is the delivery path between a source and a sink: transform the
//! batch, write it, let the sink ack what it sent, hand terminal failures to
//! the failure router, and surface an error for anything left failed so the
//! source can trigger redelivery.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chunk::chunk_messages;
use crate::error::{Error, Result};
use crate::failure::FailureRouter;
use crate::health::HealthState;
use crate::message::Message;
use crate::sink::{Sink, WriteResult};
use crate::source::SourceCallbacks;
use crate::transform::{BatchTransform, TransformPipeline};

/// Owns the transformation pipeline, the primary sink, and the failure
/// router, and produces the [SourceCallbacks] a source delivers through.
pub struct Forwarder<S, F> {
    pipeline: TransformPipeline,
    sink: Arc<S>,
    failure: Arc<FailureRouter<F>>,
    health: HealthState,
    /// sink-mandated steps that run before and after the configured pipeline
    sink_pre: Vec<BatchTransform>,
    sink_post: Vec<BatchTransform>,
    /// (max messages, max combined bytes) per sink write, if chunking
    chunking: Option<(usize, usize)>,
}

impl<S, F> Clone for Forwarder<S, F> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            sink: Arc::clone(&self.sink),
            failure: Arc::clone(&self.failure),
            health: self.health.clone(),
            sink_pre: self.sink_pre.clone(),
            sink_post: self.sink_post.clone(),
            chunking: self.chunking,
        }
    }
}

impl<S, F> Forwarder<S, F>
where
    S: Sink + Send + Sync + 'static,
    F: Sink + Send + Sync + 'static,
{
    pub fn new(pipeline: TransformPipeline, sink: S, failure: FailureRouter<F>) -> Self {
        Self {
            pipeline,
            sink: Arc::new(sink),
            failure: Arc::new(failure),
            health: HealthState::new(),
            sink_pre: Vec::new(),
            sink_post: Vec::new(),
            chunking: None,
        }
    }

    /// Split each batch into chunks of at most `max_count` messages and
    /// `max_chunk_bytes` combined payload bytes before writing. Without this
    /// the whole batch goes to the sink as one write.
    pub fn with_chunking(mut self, max_count: usize, max_chunk_bytes: usize) -> Self {
        self.chunking = Some((max_count, max_chunk_bytes));
        self
    }

    /// Install steps the sink requires around the configured pipeline, e.g.
    /// batching by a dynamic key before template rendering.
    pub fn with_sink_transforms(
        mut self,
        pre: Vec<BatchTransform>,
        post: Vec<BatchTransform>,
    ) -> Self {
        self.sink_pre = pre;
        self.sink_post = post;
        self
    }

    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// Open the primary and failure sinks and mark the pipeline healthy.
    pub async fn open(&self) -> Result<()> {
        self.sink.open().await?;
        self.failure.open().await?;
        self.health.set(true);
        info!(sink = %self.sink.id(), "Forwarder ready");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.health.set(false);
        self.sink.close().await?;
        self.failure.close().await
    }

    /// Run one batch through transform, write, and failure routing.
    ///
    /// Returns `Err` iff some messages were not durably handled: a call-level
    /// sink error, a failure-routing error, or a non-empty `failed` category.
    /// In every error case the unhandled messages are un-acked and eligible
    /// for upstream redelivery.
    pub async fn deliver(&self, messages: Vec<Message>) -> Result<WriteResult> {
        let transformed = self
            .pipeline
            .apply(messages, &self.sink_pre, &self.sink_post);

        let to_write: Vec<Message> = transformed
            .success
            .into_iter()
            .flat_map(|batch| batch.messages)
            .collect();

        let mut chunk_oversized = Vec::new();
        let chunks = match self.chunking {
            Some((max_count, max_chunk_bytes)) => {
                let chunked = chunk_messages(
                    to_write,
                    max_count,
                    self.sink.max_message_size_bytes(),
                    max_chunk_bytes,
                );
                chunk_oversized = chunked.oversized;
                chunked.chunks
            }
            None => vec![to_write],
        };

        let mut write_result = WriteResult::default();
        for chunk in chunks {
            match self.sink.write(chunk).await {
                Ok(result) => write_result = write_result.append(result),
                Err(e) => {
                    // a sink defect: nothing was classified and nothing was
                    // acked, so the whole batch is left for redelivery
                    self.health.set(false);
                    return Err(e);
                }
            }
        }

        let mut oversized = transformed.oversized;
        oversized.extend(chunk_oversized);
        oversized.extend(write_result.oversized);
        let mut invalid = transformed.invalid;
        invalid.extend(write_result.invalid);

        if !oversized.is_empty() {
            let routed = self
                .failure
                .write_oversized(self.sink.max_message_size_bytes(), oversized)
                .await?;
            if routed.failed_count > 0 {
                return Err(Error::Failure(format!(
                    "{} oversized messages could not be dead-lettered",
                    routed.failed_count
                )));
            }
        }

        if !invalid.is_empty() {
            let routed = self.failure.write_invalid(invalid).await?;
            if routed.failed_count > 0 {
                return Err(Error::Failure(format!(
                    "{} invalid messages could not be dead-lettered",
                    routed.failed_count
                )));
            }
        }

        if write_result.failed_count > 0 {
            warn!(
                sink = %self.sink.id(),
                failed = write_result.failed_count,
                "Messages failed to write, leaving them for redelivery"
            );
            return Err(Error::Sink(format!(
                "{} messages failed to be written to {}",
                write_result.failed_count,
                self.sink.id()
            )));
        }

        Ok(WriteResult {
            oversized: vec![],
            invalid: vec![],
            ..write_result
        })
    }

    /// The delivery callback handed to a source's read loop.
    pub fn callbacks(&self) -> SourceCallbacks {
        let forwarder = self.clone();
        SourceCallbacks::new(move |messages| {
            let forwarder = forwarder.clone();
            Box::pin(async move { forwarder.deliver(messages).await })
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;
    use std::sync::Arc as StdArc;

    use super::*;
    use crate::message::{MessageBatch, MessageError, TransformationErrorCode};
    use crate::sink::test_utils::{BrokenSink, CaptureSink};
    use crate::source::{FatalPolicy, Source};
    use crate::source::in_memory::InMemorySource;
    use crate::transform::TransformStep;

    fn messages(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                let data = Bytes::from(format!("payload-{i}"));
                Message {
                    data: data.clone(),
                    original_data: data,
                    partition_key: format!("pk-{i}"),
                    ..Default::default()
                }
            })
            .collect()
    }

    fn forwarder_with(
        pipeline: TransformPipeline,
        sink: CaptureSink,
        failure_sink: CaptureSink,
    ) -> Forwarder<CaptureSink, CaptureSink> {
        Forwarder::new(
            pipeline,
            sink,
            FailureRouter::new(failure_sink, "streambridge", "0.1.0"),
        )
    }

    #[tokio::test]
    async fn test_deliver_writes_everything_sent() {
        let sink = CaptureSink::new();
        let forwarder = forwarder_with(TransformPipeline::default(), sink.clone(), CaptureSink::new());

        let result = forwarder.deliver(messages(5)).await.unwrap();

        assert_eq!(result.sent_count, 5);
        assert_eq!(sink.written().len(), 5);
    }

    #[tokio::test]
    async fn test_transform_invalid_routed_to_failure_sink() {
        let reject_first: BatchTransform = StdArc::new(|batches: Vec<MessageBatch>| {
            let mut invalid = Vec::new();
            let success = batches
                .into_iter()
                .map(|mut batch| {
                    if !batch.messages.is_empty() {
                        let mut msg = batch.messages.remove(0);
                        msg.set_error(MessageError::Transformation {
                            code: TransformationErrorCode::Generic,
                            message: "rejected".to_string(),
                        });
                        invalid.push(msg);
                    }
                    batch
                })
                .collect();
            TransformStep {
                success,
                invalid,
                ..Default::default()
            }
        });

        let failure_sink = CaptureSink::new();
        let forwarder = forwarder_with(
            TransformPipeline::new(vec![reject_first]),
            CaptureSink::new(),
            failure_sink.clone(),
        );

        let result = forwarder.deliver(messages(3)).await.unwrap();

        assert_eq!(result.sent_count, 2);
        let rows = failure_sink.written();
        assert_eq!(rows.len(), 1);
        let doc: Value = serde_json::from_slice(&rows[0]).unwrap();
        assert_eq!(doc["data"]["errorMessage"], "rejected");
    }

    #[tokio::test]
    async fn test_oversized_routed_with_sink_limit() {
        // 9-byte limit: "payload-0" fits exactly, a longer payload does not
        let sink = CaptureSink::with_max_message_size_bytes(9);
        let failure_sink = CaptureSink::new();
        let forwarder =
            forwarder_with(TransformPipeline::default(), sink.clone(), failure_sink.clone());

        let mut batch = messages(1);
        batch.push(Message {
            data: Bytes::from_static(b"way-too-long-payload"),
            original_data: Bytes::from_static(b"way-too-long-payload"),
            partition_key: "pk-big".to_string(),
            ..Default::default()
        });

        let result = forwarder.deliver(batch).await.unwrap();

        assert_eq!(result.sent_count, 1);
        let rows = failure_sink.written();
        assert_eq!(rows.len(), 1);
        let doc: Value = serde_json::from_slice(&rows[0]).unwrap();
        assert_eq!(doc["data"]["failure"]["maximumAllowedSizeBytes"], 9);
        assert_eq!(doc["data"]["failure"]["actualSizeBytes"], 20);
    }

    #[tokio::test]
    async fn test_chunked_delivery_folds_results() {
        let settings = crate::config::Settings {
            chunk_max_count: 3,
            max_chunk_bytes: 1024,
            ..Default::default()
        };
        let sink = CaptureSink::new();
        let forwarder =
            forwarder_with(TransformPipeline::default(), sink.clone(), CaptureSink::new())
                .with_chunking(settings.chunk_max_count, settings.max_chunk_bytes);

        let result = forwarder.deliver(messages(10)).await.unwrap();

        // 10 messages over 4 chunk writes, folded into one result
        assert_eq!(result.sent_count, 10);
        assert_eq!(sink.written().len(), 10);
        assert_eq!(sink.written()[0], Bytes::from_static(b"payload-0"));
        assert_eq!(sink.written()[9], Bytes::from_static(b"payload-9"));
    }

    #[tokio::test]
    async fn test_chunking_routes_oversized_before_write() {
        let sink = CaptureSink::with_max_message_size_bytes(9);
        let failure_sink = CaptureSink::new();
        let forwarder =
            forwarder_with(TransformPipeline::default(), sink.clone(), failure_sink.clone())
                .with_chunking(500, 5 * 1024 * 1024);

        let mut batch = messages(2);
        batch.push(Message {
            data: Bytes::from_static(b"definitely-too-long"),
            original_data: Bytes::from_static(b"definitely-too-long"),
            partition_key: "pk-big".to_string(),
            ..Default::default()
        });

        let result = forwarder.deliver(batch).await.unwrap();

        assert_eq!(result.sent_count, 2);
        assert_eq!(failure_sink.written().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_writes_surface_as_error() {
        let sink = CaptureSink::new();
        sink.set_fail_all(true);
        let forwarder = forwarder_with(TransformPipeline::default(), sink, CaptureSink::new());

        let err = forwarder.deliver(messages(4)).await.expect_err("all failed");
        assert!(matches!(err, Error::Sink(_)));
        assert!(err.to_string().contains('4'));
    }

    #[tokio::test]
    async fn test_call_level_sink_error_flips_health() {
        let forwarder = Forwarder::new(
            TransformPipeline::default(),
            BrokenSink,
            FailureRouter::new(CaptureSink::new(), "streambridge", "0.1.0"),
        );
        forwarder.health().set(true);

        let err = forwarder.deliver(messages(1)).await.expect_err("broken sink");
        assert!(matches!(err, Error::Sink(_)));
        assert!(!forwarder.health().get());
    }

    #[tokio::test]
    async fn test_open_marks_healthy() {
        let forwarder =
            forwarder_with(TransformPipeline::default(), CaptureSink::new(), CaptureSink::new());
        assert!(!forwarder.health().get());

        forwarder.open().await.unwrap();
        assert!(forwarder.health().get());

        forwarder.close().await.unwrap();
        assert!(!forwarder.health().get());
    }

    #[tokio::test]
    async fn test_single_writer_acks_in_feed_order() {
        let (source, tx) = InMemorySource::new(1, FatalPolicy::LogAndContinue);
        let source = StdArc::new(source);
        let sink = CaptureSink::new();
        let forwarder =
            forwarder_with(TransformPipeline::default(), sink.clone(), CaptureSink::new());
        forwarder.open().await.unwrap();

        let reader = {
            let source = StdArc::clone(&source);
            let callbacks = forwarder.callbacks();
            tokio::spawn(async move { source.read(callbacks).await })
        };

        let payloads: Vec<Bytes> = (0..100).map(|i| Bytes::from(format!("record-{i:03}"))).collect();
        for payload in &payloads {
            tx.send(vec![payload.clone()]).await.unwrap();
        }
        drop(tx);
        reader.await.unwrap().unwrap();

        // with one permit, deliveries cannot overlap, so the ack ledger
        // preserves feed order end to end
        assert_eq!(source.delivered(), payloads);
        assert_eq!(sink.written(), payloads);
    }
}
