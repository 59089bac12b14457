// crates/memoir-server/src/hooks/chat_message.rs
// Chat-message hook: buffer streamed message parts, run keyword detection,
// and inject relevant memories on a session's first message.
//
// Input: { session_id, message: { id, role, parts: [{id?, type, ...}] } }
// Output: { keyword_detected, context? }

use crate::utils::now_epoch;
use anyhow::Result;
use memoir_types::{MessagePart, MessageRole};

pub async fn run() -> Result<()> {
    let input = super::read_hook_input()?;

    let Some(session_id) = input.get("session_id").and_then(|v| v.as_str()) else {
        super::write_hook_output(&serde_json::json!({
            "error": "missing required field: session_id"
        }));
        return Ok(());
    };
    let Some(message) = input.get("message") else {
        super::write_hook_output(&serde_json::json!({
            "error": "missing required field: message"
        }));
        return Ok(());
    };

    let message_id = message
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let role = message
        .get("role")
        .and_then(|v| v.as_str())
        .and_then(MessageRole::parse)
        .unwrap_or(MessageRole::User);

    let runtime = super::hook_runtime().await?;
    let timestamp = now_epoch();

    runtime
        .tracker
        .ensure_message(session_id, message_id, role, timestamp);

    let mut user_text = String::new();
    if let Some(parts) = message.get("parts").and_then(|v| v.as_array()) {
        for (index, raw) in parts.iter().enumerate() {
            let Ok(part) = serde_json::from_value::<MessagePart>(raw.clone()) else {
                tracing::debug!("skipping unparseable part {index} in message {message_id}");
                continue;
            };
            if role == MessageRole::User
                && let MessagePart::Text { text } = &part
            {
                if !user_text.is_empty() {
                    user_text.push('\n');
                }
                user_text.push_str(text);
            }

            let part_id = raw
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("part-{index}"));
            runtime
                .tracker
                .add_part(session_id, message_id, &part_id, part, timestamp);
        }
    }

    let mut response = serde_json::json!({ "keyword_detected": false });

    if role == MessageRole::User && !user_text.is_empty() {
        if runtime.memories.detect_keyword(&user_text) {
            response["keyword_detected"] = serde_json::json!(true);
        }

        // First message of the session: offer stored context
        let is_first = runtime.tracker.message_count(session_id) == 1
            && runtime.tracker.get_current_chunk_id(session_id).is_none();
        if is_first {
            match runtime.memories.search_relevant(&user_text).await {
                Ok(memories) if !memories.is_empty() => {
                    response["context"] = serde_json::json!(format_context(&memories));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("context lookup failed: {e}"),
            }
        }
    }

    super::write_hook_output(&response);
    Ok(())
}

/// Render matched memories as a context block for the host to prepend.
fn format_context(memories: &[memoir_types::Memory]) -> String {
    let mut block = String::from("<memoir-context>\n");
    for memory in memories {
        block.push_str(&format!("- [{}] {}\n", memory.memory_type, memory.content));
    }
    block.push_str("</memoir-context>");
    block
}
