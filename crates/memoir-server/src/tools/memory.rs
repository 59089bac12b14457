//! Memory tools (add, search, list, forget)

use crate::db::MemoryListOptions;
use crate::runtime::Runtime;
use crate::utils::truncate;
use memoir_types::{Memory, MemorySource, MemoryType};

fn parse_type(value: &serde_json::Value, field: &str) -> Result<Option<MemoryType>, String> {
    match value.get(field).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(raw) => MemoryType::parse(raw).map(Some).ok_or_else(|| {
            format!(
                "Invalid memory type '{raw}'. Must be one of: preference, pattern, gotcha, fact, learned"
            )
        }),
    }
}

fn parse_tags(value: &serde_json::Value) -> Option<Vec<String>> {
    value.get("tags").and_then(|v| v.as_array()).map(|tags| {
        tags.iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect()
    })
}

fn format_memory_line(memory: &Memory) -> String {
    let tags = memory
        .tags
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| format!(" [{}]", t.join(", ")))
        .unwrap_or_default();
    format!(
        "{} ({}){}: {}",
        memory.id,
        memory.memory_type,
        tags,
        truncate(&memory.content, 200)
    )
}

/// Store a memory
pub async fn add(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let content = args
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or("Missing required field: content")?;
    let memory_type =
        parse_type(args, "type")?.ok_or("Missing required field: type")?;
    let tags = parse_tags(args);
    let source = args
        .get("source")
        .and_then(|v| v.as_str())
        .map(|raw| {
            MemorySource::parse(raw).ok_or_else(|| {
                format!("Invalid source '{raw}'. Must be one of: user, compaction, auto")
            })
        })
        .transpose()?;

    let memory = runtime
        .memories
        .add(content.to_string(), memory_type, tags, source)
        .await
        .map_err(|e| e.to_string())?;

    Ok(format!(
        "Stored {} memory {}: {}",
        memory.memory_type,
        memory.id,
        truncate(&memory.content, 100)
    ))
}

/// Ranked full-text search over memories
pub async fn search(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or("Missing required field: query")?;
    let memory_type = parse_type(args, "type")?;
    let limit = args
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize);

    let results = runtime
        .memories
        .search(query, memory_type, limit)
        .await
        .map_err(|e| e.to_string())?;

    if results.is_empty() {
        return Ok(format!("No memories match '{query}'"));
    }

    let mut output = format!("Found {} memories:\n", results.len());
    for (memory, rank) in &results {
        output.push_str(&format!("{} (rank {rank:.2})\n", format_memory_line(memory)));
    }
    Ok(output.trim_end().to_string())
}

/// List memories, optionally filtered by type
pub async fn list(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let memory_type = parse_type(args, "type")?;
    let limit = args
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(100);
    let offset = args
        .get("offset")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(0);

    let memories = runtime
        .memories
        .list(MemoryListOptions {
            limit,
            offset,
            memory_type,
        })
        .await
        .map_err(|e| e.to_string())?;
    let total = runtime
        .memories
        .count(memory_type)
        .await
        .map_err(|e| e.to_string())?;

    if memories.is_empty() {
        return Ok("No memories stored yet".to_string());
    }

    let mut output = format!("{} of {} memories:\n", memories.len(), total);
    for memory in &memories {
        output.push_str(&format_memory_line(memory));
        output.push('\n');
    }
    Ok(output.trim_end().to_string())
}

/// Delete a memory by id
pub async fn forget(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let id = args
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or("Missing required field: id")?;

    let deleted = runtime
        .memories
        .forget(id)
        .await
        .map_err(|e| e.to_string())?;

    if deleted {
        Ok(format!("Forgot memory {id}"))
    } else {
        Ok(format!("No memory found with id {id}"))
    }
}
