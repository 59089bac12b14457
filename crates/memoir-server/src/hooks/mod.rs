// crates/memoir-server/src/hooks/mod.rs
// Host hook handlers
//
// Hooks are short-lived processes: they read one JSON event from stdin,
// translate it into service calls, and write one JSON response to stdout.
// They log to stderr and must never fail the host; the binary's hook
// runner maps every error to an empty response and a zero exit code.

pub mod chat_message;
pub mod session_compacting;

use crate::config::MemoirConfig;
use crate::error::Result;
use crate::runtime::{Runtime, init_runtime, try_runtime};
use anyhow::Context;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Get the Memoir database path (~/.memoir/memoir.db)
pub fn get_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| {
        tracing::warn!(
            "HOME directory not set — using current directory for Memoir data. \
             This may cause data to be created in your project directory."
        );
        PathBuf::from(".")
    });
    home.join(".memoir/memoir.db")
}

/// Read the hook event JSON from stdin. Empty input becomes `{}`.
pub fn read_hook_input() -> anyhow::Result<serde_json::Value> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read hook input")?;
    if buffer.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(&buffer).context("hook input is not valid JSON")
}

/// Write the hook response JSON to stdout.
pub fn write_hook_output(value: &serde_json::Value) {
    println!("{value}");
}

/// The process runtime, opening the store on first use.
///
/// Hooks run as their own processes, so each one opens its own pool
/// against the shared database file.
pub async fn hook_runtime() -> Result<Arc<Runtime>> {
    if let Ok(runtime) = try_runtime() {
        return Ok(runtime);
    }
    let runtime = Runtime::init(&get_db_path(), MemoirConfig::load()).await?;
    init_runtime(runtime.clone());
    Ok(runtime)
}
