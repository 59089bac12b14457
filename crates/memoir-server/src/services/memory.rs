// crates/memoir-server/src/services/memory.rs
// Memory facade: CRUD, ranked search, relevance injection, keyword gate

use crate::config::MemoirConfig;
use crate::db::pool::DatabasePool;
use crate::db::{
    MemoryListOptions, MemoryPatch, NewMemory, compile_match_query, count_memories_sync,
    create_memory_sync, delete_memory_sync, get_memory_sync, list_memories_sync,
    search_memories_sync, update_memory_sync,
};
use crate::error::Result;
use crate::keyword::KeywordDetector;
use memoir_types::{Memory, MemorySource, MemoryType};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct MemoryService {
    pool: Arc<DatabasePool>,
    config: Arc<MemoirConfig>,
    detector: Arc<KeywordDetector>,
}

impl MemoryService {
    pub fn new(pool: Arc<DatabasePool>, config: Arc<MemoirConfig>) -> Self {
        let detector = Arc::new(KeywordDetector::new(&config.memory.custom_keywords));
        Self {
            pool,
            config,
            detector,
        }
    }

    /// Store a new memory.
    pub async fn add(
        &self,
        content: String,
        memory_type: MemoryType,
        tags: Option<Vec<String>>,
        source: Option<MemorySource>,
    ) -> Result<Memory> {
        self.pool
            .run(move |conn| {
                create_memory_sync(
                    conn,
                    NewMemory {
                        content,
                        memory_type,
                        tags,
                        source,
                    },
                )
            })
            .await
    }

    /// Ranked full-text search. Lower rank is more relevant. Hostile input
    /// is compiled to a safe match expression; input that compiles to
    /// nothing returns an empty set without querying.
    pub async fn search(
        &self,
        query: &str,
        memory_type: Option<MemoryType>,
        limit: Option<usize>,
    ) -> Result<Vec<(Memory, f64)>> {
        let Some(match_expr) = compile_match_query(query) else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(self.config.memory.max_search_results);
        self.pool
            .run(move |conn| search_memories_sync(conn, &match_expr, memory_type, limit))
            .await
    }

    /// Memories worth injecting as context for a fresh conversation.
    /// Queries shorter than 2 trimmed characters yield nothing.
    pub async fn search_relevant(&self, query: &str) -> Result<Vec<Memory>> {
        if query.trim().chars().count() < 2 {
            return Ok(Vec::new());
        }
        let results = self
            .search(query, None, Some(self.config.memory.max_inject))
            .await?;
        Ok(results.into_iter().map(|(memory, _rank)| memory).collect())
    }

    pub async fn list(&self, opts: MemoryListOptions) -> Result<Vec<Memory>> {
        self.pool
            .run(move |conn| list_memories_sync(conn, opts))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let id = id.to_string();
        self.pool.run(move |conn| get_memory_sync(conn, &id)).await
    }

    pub async fn update(&self, id: &str, patch: MemoryPatch) -> Result<Option<Memory>> {
        let id = id.to_string();
        self.pool
            .run(move |conn| update_memory_sync(conn, &id, patch))
            .await
    }

    /// Delete a memory. False when it was already gone.
    pub async fn forget(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.pool
            .run(move |conn| delete_memory_sync(conn, &id))
            .await
    }

    pub async fn count(&self, memory_type: Option<MemoryType>) -> Result<i64> {
        self.pool
            .run(move |conn| count_memories_sync(conn, memory_type))
            .await
    }

    /// Trigger-phrase check, honoring the config master switch.
    pub fn detect_keyword(&self, text: &str) -> bool {
        if !self.config.memory.keyword_detection {
            return false;
        }
        self.detector.detect(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> MemoryService {
        let pool = Arc::new(DatabasePool::open_in_memory().await.expect("pool"));
        MemoryService::new(pool, Arc::new(MemoirConfig::default()))
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let service = service().await;
        let memory = service
            .add("prefer rebase over merge".to_string(), MemoryType::Preference, None, None)
            .await
            .unwrap();

        let fetched = service.get(&memory.id).await.unwrap().unwrap();
        assert_eq!(fetched, memory);
    }

    #[tokio::test]
    async fn test_search_empty_query_returns_nothing() {
        let service = service().await;
        service
            .add("something searchable".to_string(), MemoryType::Fact, None, None)
            .await
            .unwrap();

        assert!(service.search("", None, None).await.unwrap().is_empty());
        assert!(service.search("   ", None, None).await.unwrap().is_empty());
        assert!(service.search("()*", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_relevant_short_query_guard() {
        let service = service().await;
        service
            .add("a memory about x".to_string(), MemoryType::Fact, None, None)
            .await
            .unwrap();

        assert!(service.search_relevant("x").await.unwrap().is_empty());
        assert!(service.search_relevant("  x  ").await.unwrap().is_empty());
        assert!(!service.search_relevant("memory").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_relevant_caps_at_max_inject() {
        let pool = Arc::new(DatabasePool::open_in_memory().await.expect("pool"));
        let mut config = MemoirConfig::default();
        config.memory.max_inject = 2;
        let service = MemoryService::new(pool, Arc::new(config));

        for i in 0..5 {
            service
                .add(format!("shared topic {i}"), MemoryType::Fact, None, None)
                .await
                .unwrap();
        }

        let relevant = service.search_relevant("shared topic").await.unwrap();
        assert_eq!(relevant.len(), 2);
    }

    #[tokio::test]
    async fn test_forget() {
        let service = service().await;
        let memory = service
            .add("ephemeral".to_string(), MemoryType::Fact, None, None)
            .await
            .unwrap();

        assert!(service.forget(&memory.id).await.unwrap());
        assert!(!service.forget(&memory.id).await.unwrap());
        assert!(service.get(&memory.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detect_keyword_respects_config_switch() {
        let pool = Arc::new(DatabasePool::open_in_memory().await.expect("pool"));
        let mut config = MemoirConfig::default();
        config.memory.keyword_detection = false;
        let service = MemoryService::new(pool, Arc::new(config));

        assert!(!service.detect_keyword("remember this"));

        let enabled = self::service().await;
        assert!(enabled.detect_keyword("remember this"));
    }

    #[tokio::test]
    async fn test_detect_keyword_uses_custom_keywords() {
        let pool = Arc::new(DatabasePool::open_in_memory().await.expect("pool"));
        let mut config = MemoirConfig::default();
        config.memory.custom_keywords = vec!["pin this".to_string()];
        let service = MemoryService::new(pool, Arc::new(config));

        assert!(service.detect_keyword("pin this somewhere"));
    }
}
