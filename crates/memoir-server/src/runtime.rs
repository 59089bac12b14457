// crates/memoir-server/src/runtime.rs
// Process-wide runtime context: one pool, tracker, and service set per
// process, created at plugin start and torn down at shutdown.
//
// Call sites may thread the Arc<Runtime> explicitly; the global
// init/try/reset functions exist for adapters that enter the process
// without one. try_runtime() before init_runtime() is a distinct failure,
// never a silent default.

use crate::config::MemoirConfig;
use crate::db::pool::{DatabasePool, MigrationScope};
use crate::error::{MemoirError, Result};
use crate::services::{ChunkService, MemoryService};
use crate::tracker::MessageTracker;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct Runtime {
    pub pool: Arc<DatabasePool>,
    pub tracker: Arc<MessageTracker>,
    pub config: Arc<MemoirConfig>,
    pub memories: MemoryService,
    pub chunks: ChunkService,
}

impl Runtime {
    /// Open the store at the given path and wire up the services.
    pub async fn init(db_path: &Path, config: MemoirConfig) -> Result<Arc<Self>> {
        let pool = Arc::new(
            DatabasePool::open(db_path, MigrationScope::All)
                .await
                .map_err(MemoirError::Anyhow)?,
        );
        Ok(Self::assemble(pool, config))
    }

    /// In-memory runtime for tests.
    pub async fn init_in_memory(config: MemoirConfig) -> Result<Arc<Self>> {
        let pool = Arc::new(
            DatabasePool::open_in_memory()
                .await
                .map_err(MemoirError::Anyhow)?,
        );
        Ok(Self::assemble(pool, config))
    }

    fn assemble(pool: Arc<DatabasePool>, config: MemoirConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let tracker = Arc::new(MessageTracker::new());
        let memories = MemoryService::new(pool.clone(), config.clone());
        let chunks = ChunkService::new(pool.clone(), tracker.clone(), config.clone());
        Arc::new(Self {
            pool,
            tracker,
            config,
            memories,
            chunks,
        })
    }
}

static RUNTIME: Mutex<Option<Arc<Runtime>>> = Mutex::new(None);

/// Install the process-wide runtime. Replaces any previous one.
pub fn init_runtime(runtime: Arc<Runtime>) {
    let mut slot = RUNTIME.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(runtime);
}

/// The installed runtime, or RuntimeNotInitialized before init_runtime().
pub fn try_runtime() -> Result<Arc<Runtime>> {
    let slot = RUNTIME.lock().unwrap_or_else(|e| e.into_inner());
    slot.clone().ok_or(MemoirError::RuntimeNotInitialized)
}

/// Drop the process-wide runtime (shutdown and tests).
pub fn reset_runtime() {
    let mut slot = RUNTIME.lock().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}
