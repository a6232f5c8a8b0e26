//! Shared constants for the chest lifecycle.

/// Lifetime of an upload token: one day to fill a chest.
pub const UPLOAD_TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Lifetime of a multipart token. Also the age at which an unsealed chest is
/// considered abandoned: once the last possible multipart token has expired,
/// no live uploader can still reach the chest.
pub const MULTIPART_TOKEN_TTL_SECS: i64 = 48 * 3600;

/// Chest tokens for permanent chests expire after a year.
pub const PERMANENT_CHEST_TOKEN_TTL_DAYS: i64 = 365;

/// Accepted `validityDays` values besides [`PERMANENT_VALIDITY_DAYS`].
pub const VALIDITY_DAY_OPTIONS: [i32; 4] = [1, 3, 7, 15];

/// `validityDays` sentinel for a chest that never expires.
pub const PERMANENT_VALIDITY_DAYS: i32 = -1;

/// Length of a retrieval code.
pub const RETRIEVAL_CODE_LEN: usize = 6;

/// Alphabet retrieval codes are drawn from.
pub const RETRIEVAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many fresh codes the seal operation tries before giving up with a
/// conflict.
pub const SEAL_CODE_ATTEMPTS: u32 = 5;

/// Inclusive part-number range for chunked uploads (S3 limits).
pub const MIN_PART_NUMBER: i32 = 1;
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Fallback filename for file parts that carry none.
pub const DEFAULT_UPLOAD_FILENAME: &str = "unnamed-file";

/// Fallback content type for file parts that carry none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
