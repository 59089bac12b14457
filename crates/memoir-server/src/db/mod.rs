// crates/memoir-server/src/db/mod.rs
// Persistence layer: repositories, tree engine, search, migrations, pool

mod chunks;
mod memory;
pub mod migrations;
pub mod pool;
mod search;
mod tree;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunks::{
    ChunkPatch, NewChunk, count_chunks_sync, create_chunk_sync, delete_chunk_sync,
    delete_session_chunks_sync, get_active_chunks_sync, get_child_chunks_sync, get_chunk_sync,
    get_session_chunks_sync, parse_chunk_row, recent_summaries_sync, update_chunk_sync,
};
pub use memory::{
    MemoryListOptions, MemoryPatch, NewMemory, count_memories_sync, create_memory_sync,
    delete_memory_sync, get_memory_sync, list_memories_sync, parse_memory_row, update_memory_sync,
};
pub use search::{
    compile_match_query, memories_by_type_sync, recent_memories_sync, search_chunks_sync,
    search_memories_sync,
};
pub use tree::{
    LeveledChunk, chunk_ancestors_sync, chunk_descendants_sync, chunk_path_sync,
    compact_chunks_sync,
};
