//! Session-history tools (expand, history)

use crate::runtime::Runtime;
use crate::utils::truncate;
use memoir_types::{Chunk, MessagePart};

fn chunk_header(chunk: &Chunk) -> String {
    let summary = chunk
        .summary
        .as_deref()
        .map(|s| format!(" — {}", truncate(s, 120)))
        .unwrap_or_default();
    format!(
        "{} (session {}, depth {}, {}, {} messages){}",
        chunk.id,
        chunk.session_id,
        chunk.depth,
        chunk.status,
        chunk.content.messages.len(),
        summary
    )
}

fn render_chunk(chunk: &Chunk) -> String {
    let mut output = chunk_header(chunk);
    for message in &chunk.content.messages {
        output.push_str(&format!("\n  [{}]", message.role.as_str()));
        for part in &message.parts {
            let line = match part {
                MessagePart::Text { text } => truncate(text, 200),
                MessagePart::Tool { tool, .. } => format!("<tool: {tool}>"),
                MessagePart::File { text } => format!("<file: {text}>"),
                MessagePart::Reasoning { .. } => "<reasoning>".to_string(),
            };
            output.push_str(&format!(" {line}"));
        }
    }
    output
}

/// Show a chunk, optionally with its whole subtree: the drill-down from
/// a summary to the original messages.
pub async fn expand(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let id = args
        .get("chunk_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing required field: chunk_id")?;
    let include_children = args
        .get("include_children")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let chunks = runtime
        .chunks
        .expand(id, include_children)
        .await
        .map_err(|e| e.to_string())?;

    match chunks {
        None => Ok(format!("No chunk found with id {id}")),
        Some(chunks) => {
            let rendered: Vec<String> = chunks.iter().map(render_chunk).collect();
            Ok(rendered.join("\n\n"))
        }
    }
}

/// Ranked search over session history, optionally scoped to one session.
pub async fn history(runtime: &Runtime, args: &serde_json::Value) -> Result<String, String> {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or("Missing required field: query")?;
    let session = args.get("session").and_then(|v| v.as_str());
    let depth = args.get("depth").and_then(|v| v.as_i64());
    let limit = args
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize);

    let results = runtime
        .chunks
        .search(query, session, depth, limit)
        .await
        .map_err(|e| e.to_string())?;

    if results.is_empty() {
        return Ok(format!("No history matches '{query}'"));
    }

    let mut output = format!("Found {} chunks:\n", results.len());
    for (chunk, rank) in &results {
        output.push_str(&format!("{} (rank {rank:.2})\n", chunk_header(chunk)));
    }
    output.push_str("\nUse expand(chunk_id) to read a chunk's messages.");
    Ok(output)
}
