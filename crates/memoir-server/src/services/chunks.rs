// crates/memoir-server/src/services/chunks.rs
// Chunk facade: finalization, compaction, expansion, search

use crate::config::MemoirConfig;
use crate::db::pool::DatabasePool;
use crate::db::{
    ChunkPatch, NewChunk, chunk_descendants_sync, compact_chunks_sync, compile_match_query,
    create_chunk_sync, delete_chunk_sync, delete_session_chunks_sync, get_active_chunks_sync,
    get_chunk_sync, recent_summaries_sync, search_chunks_sync, update_chunk_sync,
};
use crate::error::{MemoirError, Result};
use crate::tracker::MessageTracker;
use crate::utils::now_epoch;
use memoir_types::{Chunk, ChunkContent, ChunkMessage, ChunkMetadata, CompactResult, MessagePart};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ChunkService {
    pool: Arc<DatabasePool>,
    tracker: Arc<MessageTracker>,
    config: Arc<MemoirConfig>,
}

impl ChunkService {
    pub fn new(
        pool: Arc<DatabasePool>,
        tracker: Arc<MessageTracker>,
        config: Arc<MemoirConfig>,
    ) -> Self {
        Self {
            pool,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<MessageTracker> {
        &self.tracker
    }

    /// Store a leaf chunk directly.
    pub async fn create(&self, session_id: &str, content: ChunkContent) -> Result<Chunk> {
        let session_id = session_id.to_string();
        self.pool
            .run(move |conn| create_chunk_sync(conn, NewChunk::leaf(&session_id, &content)))
            .await
    }

    /// Drain the tracker's buffered messages for a session into a new
    /// active leaf chunk. Returns None when nothing is buffered.
    ///
    /// Metadata is derived from the parts: tools_used from tool names,
    /// files_modified from file-part texts, either omitted when empty.
    /// Afterwards the tracker is cleared and pointed at the new chunk.
    pub async fn finalize(&self, session_id: &str) -> Result<Option<Chunk>> {
        let tracked = self.tracker.get_messages(session_id);
        if tracked.is_empty() {
            return Ok(None);
        }

        let messages: Vec<ChunkMessage> = tracked
            .into_iter()
            .map(|message| message.into_chunk_message())
            .collect();
        let metadata = derive_metadata(&messages);
        let content = ChunkContent { messages, metadata };

        let session = session_id.to_string();
        let finalized_at = now_epoch();
        let chunk = self
            .pool
            .run(move |conn| {
                let created = create_chunk_sync(conn, NewChunk::leaf(&session, &content))?;
                update_chunk_sync(
                    conn,
                    &created.id,
                    ChunkPatch {
                        finalized_at: Some(finalized_at),
                        ..Default::default()
                    },
                )?
                .ok_or_else(|| {
                    MemoirError::Other(format!("chunk {} vanished during finalize", created.id))
                })
            })
            .await?;

        self.tracker.clear_session(session_id);
        self.tracker.set_current_chunk_id(session_id, &chunk.id);

        Ok(Some(chunk))
    }

    /// Compact every active chunk of a session, in chronological order,
    /// under a caller-supplied summary. Returns None when the session has
    /// no active chunks.
    pub async fn compact(&self, session_id: &str, summary: &str) -> Result<Option<CompactResult>> {
        let session = session_id.to_string();
        let summary = summary.to_string();
        let result = self
            .pool
            .run(move |conn| {
                let active = get_active_chunks_sync(conn, &session)?;
                if active.is_empty() {
                    return Ok::<_, crate::error::MemoirError>(None);
                }
                let ids: Vec<String> = active.into_iter().map(|chunk| chunk.id).collect();
                compact_chunks_sync(conn, &session, &ids, &summary).map(Some)
            })
            .await?;
        Ok(result)
    }

    /// A chunk by itself, or with its whole subtree when include_children
    /// is set (subtree in level order, levels stripped). None when the id
    /// is unknown.
    pub async fn expand(&self, id: &str, include_children: bool) -> Result<Option<Vec<Chunk>>> {
        let id = id.to_string();
        self.pool
            .run(move |conn| {
                if include_children {
                    let descendants = chunk_descendants_sync(conn, &id)?;
                    if descendants.is_empty() {
                        return Ok::<_, crate::error::MemoirError>(None);
                    }
                    Ok(Some(
                        descendants.into_iter().map(|leveled| leveled.chunk).collect(),
                    ))
                } else {
                    Ok(get_chunk_sync(conn, &id)?.map(|chunk| vec![chunk]))
                }
            })
            .await
    }

    /// Ranked full-text search over chunk content and summaries.
    /// `min_depth` is inclusive; use 1 to restrict to summaries.
    pub async fn search(
        &self,
        query: &str,
        session_id: Option<&str>,
        min_depth: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<(Chunk, f64)>> {
        let Some(match_expr) = compile_match_query(query) else {
            return Ok(Vec::new());
        };
        let session = session_id.map(|s| s.to_string());
        let limit = limit.unwrap_or(self.config.memory.max_search_results);
        self.pool
            .run(move |conn| {
                search_chunks_sync(conn, &match_expr, session.as_deref(), min_depth, limit)
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let id = id.to_string();
        self.pool.run(move |conn| get_chunk_sync(conn, &id)).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.pool.run(move |conn| delete_chunk_sync(conn, &id)).await
    }

    /// Remove every chunk of a session and the tracker state that goes
    /// with it. Returns the number of chunks deleted.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let session = session_id.to_string();
        let deleted = self
            .pool
            .run(move |conn| delete_session_chunks_sync(conn, &session))
            .await?;
        self.tracker.clear_session(session_id);
        Ok(deleted)
    }

    /// Most recent compaction summaries across sessions; defaults to 5.
    pub async fn recent_summary_chunks(&self, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let limit = limit.unwrap_or(5);
        self.pool
            .run(move |conn| recent_summaries_sync(conn, limit))
            .await
    }
}

/// Union tool names and file-part texts across messages, preserving
/// first-seen order; empty unions are omitted from the envelope.
fn derive_metadata(messages: &[ChunkMessage]) -> ChunkMetadata {
    let mut tools_used: Vec<String> = Vec::new();
    let mut files_modified: Vec<String> = Vec::new();

    for message in messages {
        for part in &message.parts {
            match part {
                MessagePart::Tool { tool, .. } => {
                    if !tools_used.iter().any(|t| t == tool) {
                        tools_used.push(tool.clone());
                    }
                }
                MessagePart::File { text } => {
                    if !files_modified.iter().any(|f| f == text) {
                        files_modified.push(text.clone());
                    }
                }
                MessagePart::Text { .. } | MessagePart::Reasoning { .. } => {}
            }
        }
    }

    ChunkMetadata {
        tools_used: (!tools_used.is_empty()).then_some(tools_used),
        files_modified: (!files_modified.is_empty()).then_some(files_modified),
        outcome: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackedMessage;
    use memoir_types::{ChunkStatus, MessageRole};

    async fn service() -> ChunkService {
        let pool = Arc::new(DatabasePool::open_in_memory().await.expect("pool"));
        ChunkService::new(
            pool,
            Arc::new(MessageTracker::new()),
            Arc::new(MemoirConfig::default()),
        )
    }

    #[test]
    fn test_derive_metadata_unions_and_omits() {
        let messages = vec![
            ChunkMessage {
                id: "m1".to_string(),
                role: MessageRole::Assistant,
                parts: vec![
                    MessagePart::Tool {
                        tool: "bash".to_string(),
                        input: serde_json::json!({}),
                        output: None,
                    },
                    MessagePart::File {
                        text: "src/a.rs".to_string(),
                    },
                ],
                timestamp: 1,
            },
            ChunkMessage {
                id: "m2".to_string(),
                role: MessageRole::Assistant,
                parts: vec![
                    MessagePart::Tool {
                        tool: "bash".to_string(),
                        input: serde_json::json!({}),
                        output: Some("done".to_string()),
                    },
                    MessagePart::Tool {
                        tool: "edit".to_string(),
                        input: serde_json::json!({}),
                        output: None,
                    },
                    MessagePart::File {
                        text: "src/a.rs".to_string(),
                    },
                ],
                timestamp: 2,
            },
        ];

        let metadata = derive_metadata(&messages);
        assert_eq!(
            metadata.tools_used,
            Some(vec!["bash".to_string(), "edit".to_string()])
        );
        assert_eq!(metadata.files_modified, Some(vec!["src/a.rs".to_string()]));
    }

    #[test]
    fn test_derive_metadata_empty_is_omitted() {
        let messages = vec![ChunkMessage {
            id: "m1".to_string(),
            role: MessageRole::User,
            parts: vec![MessagePart::Text {
                text: "just chatting".to_string(),
            }],
            timestamp: 1,
        }];
        let metadata = derive_metadata(&messages);
        assert_eq!(metadata.tools_used, None);
        assert_eq!(metadata.files_modified, None);
    }

    #[tokio::test]
    async fn test_finalize_empty_session_is_none() {
        let service = service().await;
        assert!(service.finalize("nothing-here").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finalize_pipeline() {
        let service = service().await;
        let tracker = service.tracker();

        tracker.track_message(
            "S",
            TrackedMessage {
                id: "m1".to_string(),
                role: MessageRole::User,
                parts: vec![crate::tracker::TrackedPart {
                    id: "p1".to_string(),
                    part: MessagePart::Text {
                        text: "Hello".to_string(),
                    },
                }],
                timestamp: 1,
            },
        );
        tracker.ensure_message("S", "m2", MessageRole::Assistant, 2);
        tracker.add_part(
            "S",
            "m2",
            "p1",
            MessagePart::Tool {
                tool: "bash".to_string(),
                input: serde_json::json!({"command": "ls"}),
                output: None,
            },
            2,
        );
        tracker.add_part(
            "S",
            "m2",
            "p2",
            MessagePart::File {
                text: "src/x.ts".to_string(),
            },
            2,
        );

        let chunk = service.finalize("S").await.unwrap().expect("chunk");

        let ids: Vec<&str> = chunk
            .content
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(
            chunk.content.metadata.tools_used,
            Some(vec!["bash".to_string()])
        );
        assert_eq!(
            chunk.content.metadata.files_modified,
            Some(vec!["src/x.ts".to_string()])
        );
        assert!(chunk.finalized_at.is_some());
        assert_eq!(chunk.status, ChunkStatus::Active);

        assert!(!tracker.has_messages("S"));
        assert_eq!(tracker.get_current_chunk_id("S").as_deref(), Some(chunk.id.as_str()));
    }

    #[tokio::test]
    async fn test_compact_without_active_chunks_is_none() {
        let service = service().await;
        assert!(service.compact("S", "nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compact_absorbs_active_chunks() {
        let service = service().await;
        let a = service.create("S", ChunkContent::default()).await.unwrap();
        let b = service.create("S", ChunkContent::default()).await.unwrap();

        let result = service
            .compact("S", "two chunks of work")
            .await
            .unwrap()
            .expect("compacted");

        assert_eq!(result.summary.depth, 1);
        assert_eq!(
            result.summary.child_refs,
            Some(vec![a.id.clone(), b.id.clone()])
        );
        for child in &result.children {
            assert_eq!(child.status, ChunkStatus::Compacted);
        }

        // A second compaction sees only the new summary as active
        let again = service
            .compact("S", "summary of summaries")
            .await
            .unwrap()
            .expect("compacted again");
        assert_eq!(again.summary.depth, 2);
        assert_eq!(again.summary.child_refs, Some(vec![result.summary.id]));
    }

    #[tokio::test]
    async fn test_expand_single_and_subtree() {
        let service = service().await;
        let a = service.create("S", ChunkContent::default()).await.unwrap();
        service.create("S", ChunkContent::default()).await.unwrap();
        let result = service.compact("S", "sum").await.unwrap().expect("compact");

        let single = service
            .expand(&result.summary.id, false)
            .await
            .unwrap()
            .expect("chunk");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].id, result.summary.id);

        let subtree = service
            .expand(&result.summary.id, true)
            .await
            .unwrap()
            .expect("subtree");
        assert_eq!(subtree.len(), 3);
        assert_eq!(subtree[0].id, result.summary.id);
        assert!(subtree.iter().any(|c| c.id == a.id));

        assert!(service.expand("ch_000000000000", false).await.unwrap().is_none());
        assert!(service.expand("ch_000000000000", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_session_clears_tracker() {
        let service = service().await;
        service.create("S", ChunkContent::default()).await.unwrap();
        service.create("S", ChunkContent::default()).await.unwrap();
        service.tracker().ensure_message("S", "m1", MessageRole::User, 1);

        let deleted = service.delete_session("S").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(!service.tracker().has_messages("S"));
        assert_eq!(service.delete_session("S").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_defaults_and_filters() {
        let service = service().await;
        let content = ChunkContent {
            messages: vec![ChunkMessage {
                id: "m1".to_string(),
                role: MessageRole::User,
                parts: vec![MessagePart::Text {
                    text: "debugging the scheduler".to_string(),
                }],
                timestamp: 1,
            }],
            metadata: Default::default(),
        };
        service.create("S1", content.clone()).await.unwrap();
        service.create("S2", content).await.unwrap();

        let hits = service.search("scheduler", None, None, None).await.unwrap();
        assert_eq!(hits.len(), 2);

        let scoped = service
            .search("scheduler", Some("S1"), None, None)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);

        assert!(service.search("", None, None, None).await.unwrap().is_empty());
    }
}
