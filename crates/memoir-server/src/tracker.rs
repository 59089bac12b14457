// crates/memoir-server/src/tracker.rs
// In-memory, per-session buffer of streaming messages and parts
//
// Nothing here is persisted. The host re-emits messages as they grow, so
// both messages and parts upsert by id while keeping first-insert order.
// Finalization drains a session's buffer into a chunk.

use memoir_types::{ChunkMessage, MessagePart, MessageRole};
use std::collections::HashMap;
use std::sync::Mutex;

/// A buffered message. Parts carry a transient per-part id used only for
/// streaming upserts; it is not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMessage {
    pub id: String,
    pub role: MessageRole,
    pub parts: Vec<TrackedPart>,
    pub timestamp: i64,
}

impl TrackedMessage {
    /// Shell with no parts yet (part events may arrive before the
    /// message-metadata event).
    pub fn shell(id: &str, role: MessageRole, timestamp: i64) -> Self {
        Self {
            id: id.to_string(),
            role,
            parts: Vec::new(),
            timestamp,
        }
    }

    /// Strip transient part ids for persistence.
    pub fn into_chunk_message(self) -> ChunkMessage {
        ChunkMessage {
            id: self.id,
            role: self.role,
            parts: self.parts.into_iter().map(|p| p.part).collect(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPart {
    pub id: String,
    pub part: MessagePart,
}

#[derive(Debug, Default)]
struct SessionBuffer {
    messages: Vec<TrackedMessage>,
    current_chunk_id: Option<String>,
}

/// Per-process message tracker keyed by session id.
///
/// Callers must not interleave finalize/clear on the same session from
/// competing tasks.
#[derive(Debug, Default)]
pub struct MessageTracker {
    sessions: Mutex<HashMap<String, SessionBuffer>>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buffer<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionBuffer) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        f(sessions.entry(session_id.to_string()).or_default())
    }

    /// Upsert a message by id: replace in place preserving position, or
    /// append. Absorbs streaming re-emissions that only grow content.
    pub fn track_message(&self, session_id: &str, message: TrackedMessage) {
        self.with_buffer(session_id, |buffer| {
            match buffer.messages.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => buffer.messages.push(message),
            }
        });
    }

    /// Create an empty-parts shell if absent. When the message already
    /// exists with a different role, correct the role in place.
    pub fn ensure_message(&self, session_id: &str, message_id: &str, role: MessageRole, timestamp: i64) {
        self.with_buffer(session_id, |buffer| {
            match buffer.messages.iter_mut().find(|m| m.id == message_id) {
                Some(existing) => {
                    if existing.role != role {
                        existing.role = role;
                    }
                }
                None => buffer
                    .messages
                    .push(TrackedMessage::shell(message_id, role, timestamp)),
            }
        });
    }

    /// Upsert a part by id within the owning message's part list,
    /// preserving position. Creates a default user shell when the message
    /// is unknown. Part ids are scoped to their message, never
    /// deduplicated across messages.
    pub fn add_part(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: &str,
        part: MessagePart,
        timestamp: i64,
    ) {
        self.with_buffer(session_id, |buffer| {
            let position = match buffer.messages.iter().position(|m| m.id == message_id) {
                Some(position) => position,
                None => {
                    buffer
                        .messages
                        .push(TrackedMessage::shell(message_id, MessageRole::User, timestamp));
                    buffer.messages.len() - 1
                }
            };
            let message = &mut buffer.messages[position];

            let tracked = TrackedPart {
                id: part_id.to_string(),
                part,
            };
            match message.parts.iter_mut().find(|p| p.id == part_id) {
                Some(existing) => *existing = tracked,
                None => message.parts.push(tracked),
            }
        });
    }

    /// Snapshot of a session's messages in first-insert order.
    pub fn get_messages(&self, session_id: &str) -> Vec<TrackedMessage> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|b| b.messages.clone())
            .unwrap_or_default()
    }

    pub fn message_count(&self, session_id: &str) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).map_or(0, |b| b.messages.len())
    }

    pub fn has_messages(&self, session_id: &str) -> bool {
        self.message_count(session_id) > 0
    }

    /// Drop all state for a session (messages and current chunk id).
    pub fn clear_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    pub fn get_current_chunk_id(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .and_then(|b| b.current_chunk_id.clone())
    }

    pub fn set_current_chunk_id(&self, session_id: &str, chunk_id: &str) {
        self.with_buffer(session_id, |buffer| {
            buffer.current_chunk_id = Some(chunk_id.to_string());
        });
    }
}
