// crates/memoir-server/src/tools/mod.rs
// Tool dispatch: translate host tool invocations into service calls and
// format the results as user-facing text. Validation failures come back
// as structured Err strings; the core never formats errors itself.

mod history;
mod memory;

use crate::runtime::Runtime;

pub use history::{expand, history};
pub use memory::{add, forget, list, search};

/// Run a named tool with JSON arguments.
pub async fn dispatch(
    runtime: &Runtime,
    name: &str,
    args: &serde_json::Value,
) -> Result<String, String> {
    match name {
        "add" => memory::add(runtime, args).await,
        "search" => memory::search(runtime, args).await,
        "list" => memory::list(runtime, args).await,
        "forget" => memory::forget(runtime, args).await,
        "expand" => history::expand(runtime, args).await,
        "history" => history::history(runtime, args).await,
        other => Err(format!(
            "Unknown tool '{other}'. Available: add, search, list, forget, expand, history"
        )),
    }
}
