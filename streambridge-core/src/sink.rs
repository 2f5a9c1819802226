//! Sink contract and the four-way write classification every sink must
//! produce. A sink write never throws per-message failures past this
//! boundary: the outcome of every submitted message is expressed as data in
//! the [WriteResult] categories, and the call-level error is reserved for
//! "could not attempt the write at all".

use crate::Result;
use crate::message::Message;

/// A log-style sink that prints each payload via `tracing` and acks it.
pub mod stdout;

/// A sink to emulate `/dev/null`: acks everything, writes nowhere.
pub mod blackhole;

#[cfg(test)]
pub(crate) mod test_utils;

/// Set of items to be implemented to become a streambridge sink.
///
/// Methods take `&self` because deliveries within one source run
/// concurrently; implementations hold their protocol clients behind
/// interior mutability or use clients that are themselves `Sync`.
#[trait_variant::make(Sink: Send)]
pub trait LocalSink {
    /// Write the messages to the sink, classifying every input message into
    /// exactly one [WriteResult] category. A message must be acked if and
    /// only if it lands in `sent`.
    ///
    /// A write that cannot be attempted (connection refused, session gone)
    /// classifies the whole batch as `failed` and returns `Ok`; the delivery
    /// path derives its error from the failed count, so an error surfaces at
    /// that boundary iff `failed` is non-empty. When a transport reports any
    /// failure inside a chunk it is acceptable to classify the whole chunk
    /// as failed; retried duplicates are covered by the at-least-once
    /// delivery contract.
    ///
    /// `Err` escapes only when classification itself is impossible, i.e. an
    /// implementation defect; callers treat it as a fully failed batch with
    /// nothing acked.
    async fn write(&self, messages: Vec<Message>) -> Result<WriteResult>;

    /// Open any connection/session required before writes.
    async fn open(&self) -> Result<()>;

    /// Release the connection/session. Writes after close are a defect.
    async fn close(&self) -> Result<()>;

    /// Max number of bytes that can be sent per message for this sink.
    fn max_message_size_bytes(&self) -> usize;

    /// Identifier for this sink, used in logs and diagnostics.
    fn id(&self) -> String;
}

/// Outcome of one write attempt. The four category lists are disjoint and
/// together contain every message submitted to the call.
#[derive(Debug, Default)]
pub struct WriteResult {
    /// successfully sent to the sink, and acked
    pub sent: Vec<Message>,
    /// could not be sent; eligible for upstream redelivery (never acked)
    pub failed: Vec<Message>,
    /// too big for the sink; to be handled by the failure router
    pub oversized: Vec<Message>,
    /// structurally unacceptable; to be handled by the failure router
    pub invalid: Vec<Message>,

    pub sent_count: u64,
    pub failed_count: u64,
}

impl WriteResult {
    pub fn new(
        sent: Vec<Message>,
        failed: Vec<Message>,
        oversized: Vec<Message>,
        invalid: Vec<Message>,
    ) -> Self {
        let sent_count = sent.len() as u64;
        let failed_count = failed.len() as u64;
        Self {
            sent,
            failed,
            oversized,
            invalid,
            sent_count,
            failed_count,
        }
    }

    /// Merge another write result into this one, concatenating each category
    /// in order. Used to fold per-chunk results into one request-level
    /// result; associative with respect to category contents.
    pub fn append(mut self, other: WriteResult) -> Self {
        self.sent.extend(other.sent);
        self.failed.extend(other.failed);
        self.oversized.extend(other.oversized);
        self.invalid.extend(other.invalid);
        self.sent_count += other.sent_count;
        self.failed_count += other.failed_count;
        self
    }

    /// Total number of messages across all four categories.
    pub fn total(&self) -> u64 {
        (self.sent.len() + self.failed.len() + self.oversized.len() + self.invalid.len()) as u64
    }
}
