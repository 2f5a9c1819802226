//! Message is the unit of work read from a source and passed around until it is
//! written to the sink or handed to the failure router. The source wraps each raw
//! record with an [AckOnce] callback; the sink fires it only when the message is
//! classified as sent, which lets the source advance its own checkpoint/deletion.
//! A message that never reaches a terminal classification stays un-acked and is
//! redelivered by the upstream system.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The message that is passed from the source to the sink.
/// NOTE: It is cheap to clone.
#[derive(Clone, Default)]
pub struct Message {
    /// current payload, replaced (never mutated in place) by transformations
    pub data: Bytes,
    /// payload as first observed at the source, retained for diagnostics
    pub original_data: Bytes,
    /// routing/ordering hint for sinks that support partitioning
    pub partition_key: String,
    /// when the message was created at the origin system
    pub time_created: Option<DateTime<Utc>>,
    /// when the message was pulled from the source
    pub time_pulled: Option<DateTime<Utc>>,
    /// when the message completed its last successful transformation
    pub time_transformed: Option<DateTime<Utc>>,
    /// invoked at most once, after the message is durably accepted by a sink
    pub ack: Option<AckOnce>,
    /// set when the message is classified invalid, consumed by diagnostics
    pub error: Option<MessageError>,
}

impl Message {
    /// Current payload size, the unit the chunking engine packs by.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Fire the ack callback. Safe to call on messages without one, and safe
    /// to call twice - the second call is a no-op.
    pub fn ack(&self) {
        if let Some(ack) = &self.ack {
            ack.fire();
        }
    }

    pub fn set_error(&mut self, error: MessageError) {
        self.error = Some(error);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("partition_key", &self.partition_key)
            .field("data", &String::from_utf8_lossy(&self.data))
            .field("time_created", &self.time_created)
            .field("time_pulled", &self.time_pulled)
            .field("error", &self.error)
            .finish()
    }
}

/// A single-invocation acknowledgement capability. The at-most-once contract is
/// enforced with an internal once-flag rather than left as a convention, so a
/// sink defect cannot double-advance a source checkpoint.
#[derive(Clone)]
pub struct AckOnce {
    inner: Arc<AckOnceInner>,
}

struct AckOnceInner {
    fired: AtomicBool,
    callback: Box<dyn Fn() + Send + Sync>,
}

impl AckOnce {
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(AckOnceInner {
                fired: AtomicBool::new(false),
                callback: Box::new(callback),
            }),
        }
    }

    /// Invoke the callback if it has not fired yet.
    pub fn fire(&self) {
        if !self.inner.fired.swap(true, Ordering::AcqRel) {
            (self.inner.callback)();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

impl fmt::Debug for AckOnce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckOnce")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Typed error attached to a message when it is classified invalid. Each kind
/// carries a machine-readable type/code pair used by the failure router's
/// diagnostic records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("{message}")]
    Transformation {
        code: TransformationErrorCode,
        message: String,
    },

    #[error("{message}")]
    Templating { message: String },

    #[error("HTTP Status Code: {status_code} Body: {message}")]
    Api {
        status_code: String,
        message: String,
    },

    #[error("{message}")]
    Setup { message: String },
}

impl MessageError {
    /// Machine-readable error type identifier for diagnostic records.
    pub fn error_type(&self) -> &'static str {
        match self {
            MessageError::Transformation { .. } => "transformation",
            MessageError::Templating { .. } => "template",
            MessageError::Api { .. } => "api",
            MessageError::Setup { .. } => "setup",
        }
    }

    /// Machine-readable error code for diagnostic records.
    pub fn code(&self) -> String {
        match self {
            MessageError::Transformation { code, .. } => code.as_str().to_string(),
            MessageError::Templating { .. } => String::new(),
            MessageError::Api { status_code, .. } => status_code.clone(),
            MessageError::Setup { .. } => String::new(),
        }
    }

    /// Human-readable message that is safe to embed in a diagnostic record.
    pub fn sanitised(&self) -> &str {
        match self {
            MessageError::Transformation { message, .. }
            | MessageError::Templating { message }
            | MessageError::Api { message, .. }
            | MessageError::Setup { message } => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationErrorCode {
    Generic,
    Type,
    Syntax,
    Reference,
}

impl TransformationErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformationErrorCode::Generic => "GenericError",
            TransformationErrorCode::Type => "TypeError",
            TransformationErrorCode::Syntax => "SyntaxError",
            TransformationErrorCode::Reference => "ReferenceError",
        }
    }
}

/// An ordered grouping of messages treated as one unit through a pipeline
/// stage, used when a sink must batch by a dynamic key (e.g. template
/// rendering). Holds its members by value but payloads are refcounted
/// [Bytes], so regrouping never copies payload data.
#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    pub messages: Vec<Message>,
    /// rendered request body, where a batch-level transformation produces one
    pub batch_data: Option<Bytes>,
}

impl MessageBatch {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            batch_data: None,
        }
    }
}
