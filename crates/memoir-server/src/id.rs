// crates/memoir-server/src/id.rs
// Prefixed base62 identifier minting

use rand::Rng;

/// The 62-symbol identifier alphabet, in ASCII order.
const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random characters per identifier.
const ID_LEN: usize = 12;

pub const MEMORY_PREFIX: &str = "mem";
pub const CHUNK_PREFIX: &str = "ch";

/// Mint a `"{prefix}_" + 12` base62-character identifier.
///
/// Bytes come from the thread-local CSPRNG, reduced modulo 62. Collisions
/// are not checked here; a duplicate surfaces as a primary-key violation
/// on insert.
pub fn mint_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(prefix.len() + 1 + ID_LEN);
    id.push_str(prefix);
    id.push('_');
    for _ in 0..ID_LEN {
        let byte: u8 = rng.random();
        id.push(ALPHABET[(byte % 62) as usize] as char);
    }
    id
}

pub fn mint_memory_id() -> String {
    mint_id(MEMORY_PREFIX)
}

pub fn mint_chunk_id() -> String {
    mint_id(CHUNK_PREFIX)
}
