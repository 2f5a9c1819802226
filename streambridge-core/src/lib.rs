//! Streambridge moves messages from a source to a sink with at-least-once
//! delivery. The delivery loop per batch:
//! - Read messages from the source
//! - Apply the batch transformation pipeline
//! - Chunk and write the batch to the sink, which classifies every message
//!   as sent, failed, oversized or invalid
//! - Route oversized/invalid messages to the failure sink as bad rows
//! - Ack what was sent (and what was dead-lettered); leave failed messages
//!   un-acked for upstream redelivery

pub use crate::error::{Error, Result};

mod error;

pub mod chunk;
pub mod config;
pub mod failure;
pub mod forwarder;
pub mod health;
pub mod message;
pub mod registry;
pub mod sink;
pub mod source;
pub mod transform;

pub use crate::failure::FailureRouter;
pub use crate::forwarder::Forwarder;
pub use crate::message::{Message, MessageBatch};
pub use crate::sink::{Sink, WriteResult};
pub use crate::source::Source;
