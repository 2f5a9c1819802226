//! A capture sink for tests: records every payload it accepts, with knobs to
//! force failures and to shrink the per-message size limit.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::Result;
use crate::chunk::filter_oversized;
use crate::error::Error;
use crate::message::Message;
use crate::sink::{Sink, WriteResult};

#[derive(Clone, Default)]
pub(crate) struct CaptureSink {
    written: Arc<Mutex<Vec<Bytes>>>,
    fail_all: Arc<Mutex<bool>>,
    max_message_size_bytes: Option<usize>,
}

impl CaptureSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_max_message_size_bytes(max: usize) -> Self {
        Self {
            max_message_size_bytes: Some(max),
            ..Self::default()
        }
    }

    pub(crate) fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock() = fail;
    }

    pub(crate) fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }
}

impl Sink for CaptureSink {
    async fn write(&self, messages: Vec<Message>) -> Result<WriteResult> {
        if *self.fail_all.lock() {
            return Ok(WriteResult::new(vec![], messages, vec![], vec![]));
        }

        let (safe, oversized) = filter_oversized(messages, self.max_message_size_bytes());

        let mut written = self.written.lock();
        for msg in &safe {
            written.push(msg.data.clone());
            msg.ack();
        }
        drop(written);

        Ok(WriteResult::new(safe, vec![], oversized, vec![]))
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn max_message_size_bytes(&self) -> usize {
        self.max_message_size_bytes.unwrap_or(1_048_576)
    }

    fn id(&self) -> String {
        "capture".to_string()
    }
}

/// A sink that errors instead of classifying, violating the write contract
/// on purpose to exercise the defensive call-level path.
pub(crate) struct BrokenSink;

impl Sink for BrokenSink {
    async fn write(&self, _messages: Vec<Message>) -> Result<WriteResult> {
        Err(Error::Sink("connection refused".to_string()))
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn max_message_size_bytes(&self) -> usize {
        1_048_576
    }

    fn id(&self) -> String {
        "broken".to_string()
    }
}
