//! Query tags: short correlation ids of the form `cdesk_xxxxxxxx`.
//!
//! A tag is attached to each client query so client-side events can be
//! joined to warehouse-side query history. Pure functions, no state.

use uuid::Uuid;

/// Prefix carried by every valid tag.
pub const TAG_PREFIX: &str = "cdesk_";

const SUFFIX_LEN: usize = 8;

/// Generate a fresh tag: `cdesk_` plus the first 8 hex characters of a
/// random UUID.
pub fn generate() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{TAG_PREFIX}{}", &id[..SUFFIX_LEN])
}

/// The 8-hex suffix of a valid tag, or `None` if the input is not a tag.
pub fn extract(tag: &str) -> Option<&str> {
    let suffix = tag.strip_prefix(TAG_PREFIX)?;
    if suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    {
        Some(suffix)
    } else {
        None
    }
}

/// Whether the input matches `^cdesk_[0-9a-f]{8}$`.
pub fn is_valid(tag: &str) -> bool {
    extract(tag).is_some()
}
