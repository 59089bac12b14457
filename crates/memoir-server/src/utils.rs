//! crates/memoir-server/src/utils.rs
//! Shared utility functions used across the codebase

/// Truncate a string to max length with ellipsis.
///
/// If the string is longer than `max_len` characters, it will be truncated
/// on a character boundary and "..." will be appended.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len).collect();
        format!("{cut}...")
    }
}

/// Current wall-clock time as seconds since epoch.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
