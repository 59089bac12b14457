// crates/memoir-types/src/lib.rs

//! Shared data contracts between the Memoir server and its clients.
//!
//! This crate provides the core domain model for:
//! - **Memories**: curated facts, preferences, patterns, and gotchas about a repository
//! - **Chunks**: persisted session-history segments arranged in a compactable tree
//! - **Messages**: the conversation records embedded in a chunk's content envelope
//!
//! The JSON shapes here are a persistence contract: chunk `content`,
//! `tags`, and `child_refs` columns store exactly these serializations.

use serde::{Deserialize, Serialize};
use std::fmt;

// ===================================================
// MEMORIES
// ===================================================

/// Category of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Preference,
    Pattern,
    Gotcha,
    Fact,
    Learned,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Preference,
        MemoryType::Pattern,
        MemoryType::Gotcha,
        MemoryType::Fact,
        MemoryType::Learned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Preference => "preference",
            MemoryType::Pattern => "pattern",
            MemoryType::Gotcha => "gotcha",
            MemoryType::Fact => "fact",
            MemoryType::Learned => "learned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preference" => Some(MemoryType::Preference),
            "pattern" => Some(MemoryType::Pattern),
            "gotcha" => Some(MemoryType::Gotcha),
            "fact" => Some(MemoryType::Fact),
            "learned" => Some(MemoryType::Learned),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a memory came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    #[default]
    User,
    Compaction,
    Auto,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::User => "user",
            MemorySource::Compaction => "compaction",
            MemorySource::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MemorySource::User),
            "compaction" => Some(MemorySource::Compaction),
            "auto" => Some(MemorySource::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single curated memory stored for a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Prefixed identifier (`mem_` + 12 base62 characters).
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Optional ordered labels; persisted as a JSON array.
    pub tags: Option<Vec<String>>,
    pub source: MemorySource,
    /// Seconds since epoch, set on insert.
    pub created_at: i64,
    /// Seconds since epoch, set on any mutation; `None` when never mutated.
    pub updated_at: Option<i64>,
}

// ===================================================
// CHUNKS
// ===================================================

/// Lifecycle state of a chunk. `active → compacted` happens exactly once;
/// `archived` is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Active,
    Compacted,
    Archived,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Active => "active",
            ChunkStatus::Compacted => "compacted",
            ChunkStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ChunkStatus::Active),
            "compacted" => Some(ChunkStatus::Compacted),
            "archived" => Some(ChunkStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// One piece of a conversation message.
///
/// Persisted as `{"type": ..., ...}` with per-variant payloads; the `output`
/// field of tool parts is omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Tool {
        /// Tool name, e.g. `bash`.
        tool: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    File {
        text: String,
    },
    Reasoning {
        text: String,
    },
}

/// A conversation message embedded in a chunk's content envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub id: String,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    /// Seconds since epoch.
    pub timestamp: i64,
}

/// Metadata derived from a chunk's messages at finalization time.
/// Fields are omitted from the persisted JSON when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// The JSON envelope stored in a chunk's `content` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkContent {
    #[serde(default)]
    pub messages: Vec<ChunkMessage>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// A persisted segment of a session, arranged in a tree via `parent_id`.
///
/// Leaves have `depth` 0; a compaction summary's depth is one greater than
/// its deepest child, and its `child_refs` list the exact ids it absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Prefixed identifier (`ch_` + 12 base62 characters).
    pub id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub depth: i64,
    pub child_refs: Option<Vec<String>>,
    pub content: ChunkContent,
    pub summary: Option<String>,
    pub status: ChunkStatus,
    pub created_at: i64,
    pub finalized_at: Option<i64>,
    pub compacted_at: Option<i64>,
}

/// Outcome of compacting a set of active chunks under a new summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactResult {
    pub summary: Chunk,
    /// The absorbed chunks, reloaded after the status flip.
    pub children: Vec<Chunk>,
}
