use tracing::info;

use crate::Result;
use crate::chunk::filter_oversized;
use crate::message::Message;
use crate::sink::{Sink, WriteResult};

// Technically no limit but we put one in to avoid printing huge payloads.
const MAX_MESSAGE_SIZE_BYTES: usize = 10_485_760;

/// StdoutSink prints the read messages on to stdout via `tracing`.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    async fn write(&self, messages: Vec<Message>) -> Result<WriteResult> {
        let (safe, oversized) = filter_oversized(messages, self.max_message_size_bytes());

        let mut sent = Vec::with_capacity(safe.len());
        for msg in safe {
            info!(
                partition_key = %msg.partition_key,
                payload = %String::from_utf8_lossy(&msg.data),
                "message"
            );
            msg.ack();
            sent.push(msg);
        }

        Ok(WriteResult::new(sent, vec![], oversized, vec![]))
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn max_message_size_bytes(&self) -> usize {
        MAX_MESSAGE_SIZE_BYTES
    }

    fn id(&self) -> String {
        "stdout".to_string()
    }
}
