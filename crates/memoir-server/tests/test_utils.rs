//! Test utilities for Memoir integration tests

use memoir::config::MemoirConfig;
use memoir::runtime::Runtime;
use std::sync::Arc;

/// Integration-test context backed by an in-memory database.
pub struct TestContext {
    pub runtime: Arc<Runtime>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(MemoirConfig::default()).await
    }

    pub async fn with_config(config: MemoirConfig) -> Self {
        let runtime = Runtime::init_in_memory(config)
            .await
            .expect("Failed to create in-memory runtime");
        Self { runtime }
    }
}
