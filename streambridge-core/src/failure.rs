//! Dead-letter routing: invalid and oversized messages are rendered as bad
//! row diagnostic records and written to a dedicated failure sink. The router
//! wraps any [Sink]; bad rows go through the sink's normal write path, so the
//! failure sink's own oversized/invalid handling never recurses back here.

use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use crate::Result;
use crate::message::Message;
use crate::sink::{Sink, WriteResult};

pub mod badrow;

use badrow::{ForwardingErrorInput, GenericErrorInput, SizeViolationInput};

const OVERSIZED_EXPECTATION: &str = "Expected payload to fit into requested target";

/// Routes terminally-failed messages to a wrapped failure sink as bad rows.
///
/// The bad row message keeps the original's ack, so routing a message to the
/// dead letter path still advances the source checkpoint once the diagnostic
/// record is durably written.
pub struct FailureRouter<S> {
    sink: S,
    processor_artifact: String,
    processor_version: String,
}

impl<S: Sink> FailureRouter<S> {
    pub fn new(sink: S, processor_artifact: &str, processor_version: &str) -> Self {
        Self {
            sink,
            processor_artifact: processor_artifact.to_string(),
            processor_version: processor_version.to_string(),
        }
    }

    /// Render each invalid message as a bad row and write the rows to the
    /// failure sink. Messages with a typed error get a forwarding-error row
    /// carrying the machine-readable type/code and the latest payload state;
    /// the rest get a generic-error row.
    pub async fn write_invalid(&self, messages: Vec<Message>) -> Result<WriteResult> {
        let now = Utc::now();
        let limit = self.sink.max_message_size_bytes();

        let mut rows = Vec::with_capacity(messages.len());
        for msg in messages {
            let failure_timestamp = msg.time_pulled.unwrap_or(now);
            let row = match &msg.error {
                // the forwarding-error row keeps the payload as first
                // observed; the current state goes in latestState
                Some(err) => badrow::forwarding_error(
                    &ForwardingErrorInput {
                        processor_artifact: &self.processor_artifact,
                        processor_version: &self.processor_version,
                        payload: &msg.original_data,
                        failure_timestamp,
                        error_type: err.error_type(),
                        error_code: &err.code(),
                        error_message: err.sanitised(),
                        latest_state: &msg.data,
                    },
                    limit,
                )?,
                None => badrow::generic_error(
                    &GenericErrorInput {
                        processor_artifact: &self.processor_artifact,
                        processor_version: &self.processor_version,
                        payload: &msg.data,
                        failure_timestamp,
                        failure_errors: vec![
                            "message was classified invalid with no attached error".to_string(),
                        ],
                    },
                    limit,
                )?,
            };
            rows.push(into_bad_row_message(msg, row));
        }

        info!(sink = %self.sink.id(), count = rows.len(), "Writing invalid messages to failure sink");
        self.sink.write(rows).await
    }

    /// Render each oversized message as a size-violation bad row and write
    /// the rows to the failure sink. `max_allowed_bytes` is the limit of the
    /// sink that rejected the messages, not this router's sink.
    pub async fn write_oversized(
        &self,
        max_allowed_bytes: usize,
        messages: Vec<Message>,
    ) -> Result<WriteResult> {
        let now = Utc::now();
        let limit = self.sink.max_message_size_bytes();

        let mut rows = Vec::with_capacity(messages.len());
        for msg in messages {
            // the current payload is what violated the limit, so the size
            // metadata and embedded payload come from it
            let row = badrow::size_violation(
                &SizeViolationInput {
                    processor_artifact: &self.processor_artifact,
                    processor_version: &self.processor_version,
                    payload: &msg.data,
                    failure_timestamp: msg.time_pulled.unwrap_or(now),
                    maximum_allowed_size_bytes: max_allowed_bytes,
                    expectation: OVERSIZED_EXPECTATION,
                },
                limit,
            )?;
            rows.push(into_bad_row_message(msg, row));
        }

        info!(sink = %self.sink.id(), count = rows.len(), "Writing oversized messages to failure sink");
        self.sink.write(rows).await
    }

    pub async fn open(&self) -> Result<()> {
        self.sink.open().await
    }

    pub async fn close(&self) -> Result<()> {
        self.sink.close().await
    }

    pub fn id(&self) -> String {
        format!("failure:{}", self.sink.id())
    }
}

/// Replace the payload with the rendered bad row, keeping the original's ack
/// and partition key so the failure sink's classification still drives the
/// source checkpoint.
fn into_bad_row_message(msg: Message, row: String) -> Message {
    Message {
        data: Bytes::from(row),
        ..msg
    }
}
