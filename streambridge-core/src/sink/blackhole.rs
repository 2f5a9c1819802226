use crate::Result;
use crate::message::Message;
use crate::sink::{Sink, WriteResult};

/// BlackholeSink reads but never writes to anywhere, semantic equivalent of
/// `/dev/null`. Everything is acked and reported sent.
#[derive(Debug, Default)]
pub struct BlackholeSink;

impl Sink for BlackholeSink {
    async fn write(&self, messages: Vec<Message>) -> Result<WriteResult> {
        for msg in &messages {
            msg.ack();
        }
        Ok(WriteResult::new(messages, vec![], vec![], vec![]))
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn max_message_size_bytes(&self) -> usize {
        usize::MAX
    }

    fn id(&self) -> String {
        "blackhole".to_string()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_everything_is_sent() {
        let sink = BlackholeSink;
        let messages = vec![
            Message {
                data: Bytes::from_static(b"Hello, World!"),
                ..Default::default()
            },
            Message {
                data: Bytes::from(vec![b'x'; 50_000_000]),
                ..Default::default()
            },
        ];

        let result = sink.write(messages).await.unwrap();

        assert_eq!(result.sent_count, 2);
        assert_eq!(result.total(), 2);
        assert!(result.failed.is_empty());
        assert!(result.oversized.is_empty());
    }
}
