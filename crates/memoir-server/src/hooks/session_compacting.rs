// crates/memoir-server/src/hooks/session_compacting.rs
// Session-compacting hook: finalize buffered messages, then bind every
// active chunk of the session under the host-supplied summary.
//
// Input: { session_id, summary }
// Output: { finalized_chunk?, summary_chunk?, compacted }

use anyhow::Result;

pub async fn run() -> Result<()> {
    let input = super::read_hook_input()?;

    let Some(session_id) = input.get("session_id").and_then(|v| v.as_str()) else {
        super::write_hook_output(&serde_json::json!({
            "error": "missing required field: session_id"
        }));
        return Ok(());
    };
    let Some(summary) = input.get("summary").and_then(|v| v.as_str()) else {
        super::write_hook_output(&serde_json::json!({
            "error": "missing required field: summary"
        }));
        return Ok(());
    };

    let runtime = super::hook_runtime().await?;

    // Buffered messages become a leaf first so they are part of this round
    let finalized = runtime.chunks.finalize(session_id).await?;
    if let Some(chunk) = &finalized {
        tracing::debug!("finalized {} buffered messages into {}", chunk.content.messages.len(), chunk.id);
    }

    let compacted = runtime.chunks.compact(session_id, summary).await?;

    let response = match compacted {
        Some(result) => serde_json::json!({
            "finalized_chunk": finalized.map(|c| c.id),
            "summary_chunk": result.summary.id,
            "compacted": result.children.len(),
        }),
        None => serde_json::json!({
            "finalized_chunk": serde_json::Value::Null,
            "summary_chunk": serde_json::Value::Null,
            "compacted": 0,
        }),
    };
    super::write_hook_output(&response);
    Ok(())
}
