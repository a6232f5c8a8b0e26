//! TOTP admission gate for chest creation (RFC 6238).
//!
//! HMAC-SHA-1, 30-second step, 6 digits, one step of clock tolerance either
//! way. Secrets come from the `TOTP_SECRETS` configuration as base32; the
//! names are opaque labels used only for logging. Any matching secret admits.
//! The gate only guards `createChest`; once a chest exists its bearer tokens
//! are the sole credential.

use chestdrop_core::config::TotpSecret;
use chestdrop_core::AppError;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

const TOTP_STEP_SECS: u64 = 30;
const TOTP_DIGITS: u32 = 6;
const TOTP_STEP_TOLERANCE: i64 = 1;

struct NamedKey {
    name: String,
    key: Vec<u8>,
}

/// Verifies TOTP codes against the configured secret set.
pub struct TotpGate {
    keys: Vec<NamedKey>,
}

impl TotpGate {
    /// Decode the configured secrets. Fails fast on malformed base32 so a
    /// deployment with a broken gate never starts.
    pub fn from_secrets(secrets: &[TotpSecret]) -> Result<Self, AppError> {
        let mut keys = Vec::with_capacity(secrets.len());
        for secret in secrets {
            let normalized = secret
                .base32_secret
                .trim()
                .trim_end_matches('=')
                .to_uppercase();
            let key = BASE32_NOPAD.decode(normalized.as_bytes()).map_err(|e| {
                AppError::Internal(format!(
                    "Invalid base32 TOTP secret for '{}': {}",
                    secret.name, e
                ))
            })?;
            keys.push(NamedKey {
                name: secret.name.clone(),
                key,
            });
        }
        Ok(TotpGate { keys })
    }

    /// Check a submitted code at `now_unix`, with ±1 step tolerance. Returns
    /// the label of the matching secret.
    pub fn verify(&self, code: &str, now_unix: u64) -> Option<&str> {
        if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let counter = (now_unix / TOTP_STEP_SECS) as i64;
        for named in &self.keys {
            for offset in -TOTP_STEP_TOLERANCE..=TOTP_STEP_TOLERANCE {
                let candidate = counter + offset;
                if candidate < 0 {
                    continue;
                }
                let expected = hotp_sha1(&named.key, candidate as u64);
                if secure_compare(code, &expected) {
                    return Some(&named.name);
                }
            }
        }
        None
    }
}

/// RFC 4226 HOTP with dynamic truncation, rendered to 6 digits.
fn hotp_sha1(key: &[u8], counter: u64) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    format!("{:0width$}", binary % 10u32.pow(TOTP_DIGITS), width = TOTP_DIGITS as usize)
}

fn secure_compare(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
