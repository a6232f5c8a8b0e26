//! Blob key layout.
//!
//! Every stored object lives at `{session_id}/{file_id}`. The reaper deletes
//! a whole chest by listing `{session_id}/`. No reserved suffixes.

use uuid::Uuid;

/// Object key for a file blob.
pub fn object_key(session_id: Uuid, file_id: Uuid) -> String {
    format!("{}/{}", session_id, file_id)
}

/// Listing prefix covering every blob of a chest.
pub fn session_prefix(session_id: Uuid) -> String {
    format!("{}/", session_id)
}
