//! Chunking engine: partitions an arbitrary-size message set into sub-batches
//! that satisfy a sink's per-request constraints. Sinks that send one message
//! per call use [filter_oversized] for the size screen alone.

use crate::message::Message;

/// Result of [chunk_messages]. Concatenating `chunks` then `oversized`, in
/// order, yields a permutation of the input where only the oversized messages
/// have been moved; relative order within each list equals input order.
#[derive(Debug, Default)]
pub struct Chunked {
    pub chunks: Vec<Vec<Message>>,
    pub oversized: Vec<Message>,
}

/// Greedily packs `messages`, in input order, into chunks constrained by three
/// variables:
///
/// 1. how many messages can be in a chunk (`max_count`)
/// 2. how big any individual message can be in bytes (`max_message_bytes`)
/// 3. how many bytes can be in a chunk (`max_chunk_bytes`)
///
/// Messages over `max_message_bytes` never occupy a chunk; they are returned
/// in `oversized`. Degenerate inputs (empty, all oversized) yield no chunks.
pub fn chunk_messages(
    messages: Vec<Message>,
    max_count: usize,
    max_message_bytes: usize,
    max_chunk_bytes: usize,
) -> Chunked {
    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut oversized: Vec<Message> = Vec::new();

    let mut buffer: Vec<Message> = Vec::new();
    let mut buffer_bytes: usize = 0;

    for msg in messages {
        let msg_bytes = msg.byte_size();

        if msg_bytes > max_message_bytes {
            oversized.push(msg);
        } else if buffer.len() == max_count
            || (buffer_bytes > 0 && buffer_bytes + msg_bytes > max_chunk_bytes)
        {
            chunks.push(std::mem::take(&mut buffer));
            buffer_bytes = msg_bytes;
            buffer.push(msg);
        } else {
            buffer_bytes += msg_bytes;
            buffer.push(msg);
        }
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    Chunked { chunks, oversized }
}

/// Splits `messages` into those at or under `max_bytes` and those over it,
/// preserving input order in both lists.
pub fn filter_oversized(messages: Vec<Message>, max_bytes: usize) -> (Vec<Message>, Vec<Message>) {
    let mut safe = Vec::with_capacity(messages.len());
    let mut oversized = Vec::new();

    for msg in messages {
        if msg.byte_size() > max_bytes {
            oversized.push(msg);
        } else {
            safe.push(msg);
        }
    }

    (safe, oversized)
}
