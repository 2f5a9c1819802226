//! Batch transformation pipeline: composes an ordered list of batch-level
//! transformation functions into a single application step. Sinks can force
//! their own steps to run first or last (e.g. batching by a dynamic key)
//! regardless of user configuration, via the `pre`/`post` arguments.

use std::sync::Arc;

use chrono::Utc;

use crate::message::{Message, MessageBatch};

/// A batch-level transformation. Consumes the current list of batches and
/// produces a new list plus newly-invalid and newly-oversized messages.
///
/// Functions must be side-effect-free with respect to the batch list so the
/// pipeline stays replay-safe for retries; payload changes happen by
/// replacing a message's `data`, never by mutating shared buffers.
pub type BatchTransform = Arc<dyn Fn(Vec<MessageBatch>) -> TransformStep + Send + Sync>;

/// Output of one transformation function.
#[derive(Debug, Default)]
pub struct TransformStep {
    pub success: Vec<MessageBatch>,
    pub invalid: Vec<Message>,
    pub oversized: Vec<Message>,
}

/// Result of running a full pipeline over a message set. Invalid and
/// oversized accumulate across all steps; once excluded, a message does not
/// re-enter `success`.
#[derive(Debug, Default)]
pub struct TransformResult {
    pub success: Vec<MessageBatch>,
    pub invalid: Vec<Message>,
    pub oversized: Vec<Message>,
}

/// An ordered list of configured transformation functions, applied between
/// any sink-mandated `pre` and `post` steps.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<BatchTransform>,
}

impl TransformPipeline {
    pub fn new(transforms: Vec<BatchTransform>) -> Self {
        Self { transforms }
    }

    /// Fold `messages`, starting as a single batch, through
    /// `pre ++ configured ++ post`. With nothing to run, returns the
    /// identity result without invoking anything.
    pub fn apply(
        &self,
        messages: Vec<Message>,
        pre: &[BatchTransform],
        post: &[BatchTransform],
    ) -> TransformResult {
        let mut success = vec![MessageBatch::new(messages)];

        if pre.is_empty() && self.transforms.is_empty() && post.is_empty() {
            return TransformResult {
                success,
                ..Default::default()
            };
        }

        let mut invalid = Vec::new();
        let mut oversized = Vec::new();

        let steps = pre.iter().chain(self.transforms.iter()).chain(post.iter());
        for step in steps {
            let out = step(success);
            success = out.success;
            invalid.extend(out.invalid);
            oversized.extend(out.oversized);
        }

        let now = Utc::now();
        for batch in &mut success {
            for msg in &mut batch.messages {
                msg.time_transformed = Some(now);
            }
        }

        TransformResult {
            success,
            invalid,
            oversized,
        }
    }
}
