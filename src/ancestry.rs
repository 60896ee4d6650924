//! Decoding of the `ancestor_list` column.
//!
//! Snapshot files record a lineage's parent as a bracketed list holding at
//! most one id. The accepted grammar is
//!
//! ```text
//! ancestors := '[' body ']' | body
//! body      := ws* (id | "NONE")? ws*
//! id        := [0-9]+
//! ```
//!
//! An empty body or the `NONE` sentinel decodes to [`ROOT_PARENT`].

use crate::error::{AggError, Result};

/// Parent id given to lineages without an ancestor.
pub const ROOT_PARENT: u64 = 0;

/// Token used upstream to mark "no parent".
pub const NONE_SENTINEL: &str = "NONE";

pub fn decode_ancestor_list(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix('[').map(|rest| rest.strip_suffix(']')) {
        Some(Some(inner)) => inner,
        None if !trimmed.ends_with(']') => trimmed,
        _ => {
            return Err(AggError::Input(format!(
                "unbalanced brackets in ancestor list '{raw}'"
            )));
        }
    };
    let body = body.trim();

    if body.is_empty() || body == NONE_SENTINEL {
        return Ok(ROOT_PARENT);
    }
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AggError::Input(format!(
            "ancestor list '{raw}' does not hold a single integer id"
        )));
    }
    body.parse::<u64>()
        .map_err(|e| AggError::Input(format!("ancestor list '{raw}': {e}")))
}
