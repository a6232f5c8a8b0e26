//! HS256 bearer tokens for the three chest capabilities.
//!
//! Upload tokens fill a chest (24 h), multipart tokens drive one resumable
//! upload and carry its whole in-flight state — `uploadId`, filename, mime
//! type, size — so the server keeps no pending-upload record (48 h), and chest
//! tokens download from a sealed chest until it expires (365 d for permanent
//! chests). The `type` claim is the discriminant; a well-signed token of the
//! wrong type is rejected distinctly from an expired or forged one.

use chrono::{DateTime, Duration, Utc};
use chestdrop_core::constants::{
    MULTIPART_TOKEN_TTL_SECS, PERMANENT_CHEST_TOKEN_TTL_DAYS, UPLOAD_TOKEN_TTL_SECS,
};
use chestdrop_core::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant carried in every token's `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Upload,
    Chest,
    Multipart,
}

impl TokenType {
    fn as_str(self) -> &'static str {
        match self {
            TokenType::Upload => "upload",
            TokenType::Chest => "chest",
            TokenType::Multipart => "multipart",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token has expired")]
    Expired,

    #[error("Wrong token type: expected a {expected} token")]
    WrongType { expected: &'static str },
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Claims of an upload token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadClaims {
    pub session_id: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a chest (download) token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChestClaims {
    pub session_id: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a multipart token. The token *is* the upload session: `upload_id`
/// is the blob store's opaque handle, and the file metadata here is what the
/// completion step writes to the files table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartClaims {
    pub session_id: Uuid,
    pub file_id: Uuid,
    pub upload_id: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Minimal claim shape used to check the discriminant before deserializing the
/// full typed claims, so a mis-typed token fails as `WrongType` rather than as
/// a structural mismatch.
#[derive(Debug, Deserialize)]
struct BaseClaims {
    #[serde(rename = "type")]
    token_type: TokenType,
    #[allow(dead_code)]
    exp: i64,
}

/// Mints and verifies the three token flavors against a process-wide HMAC key.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn mint_upload(&self, session_id: Uuid) -> Result<String, AppError> {
        let iat = Utc::now().timestamp();
        self.sign(&UploadClaims {
            session_id,
            token_type: TokenType::Upload,
            iat,
            exp: iat + UPLOAD_TOKEN_TTL_SECS,
        })
    }

    /// Chest tokens die with the chest: `exp` equals the chest's expiry, or
    /// one year out for permanent chests.
    pub fn mint_chest(
        &self,
        session_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = expires_at
            .unwrap_or(now + Duration::days(PERMANENT_CHEST_TOKEN_TTL_DAYS))
            .timestamp();
        self.sign(&ChestClaims {
            session_id,
            token_type: TokenType::Chest,
            iat: now.timestamp(),
            exp,
        })
    }

    pub fn mint_multipart(
        &self,
        session_id: Uuid,
        file_id: Uuid,
        upload_id: String,
        filename: String,
        mime_type: String,
        file_size: i64,
    ) -> Result<String, AppError> {
        let iat = Utc::now().timestamp();
        self.sign(&MultipartClaims {
            session_id,
            file_id,
            upload_id,
            filename,
            mime_type,
            file_size,
            token_type: TokenType::Multipart,
            iat,
            exp: iat + MULTIPART_TOKEN_TTL_SECS,
        })
    }

    pub fn verify_upload(&self, token: &str) -> Result<UploadClaims, TokenError> {
        self.verify(token, TokenType::Upload)
    }

    pub fn verify_chest(&self, token: &str) -> Result<ChestClaims, TokenError> {
        self.verify(token, TokenType::Chest)
    }

    pub fn verify_multipart(&self, token: &str) -> Result<MultipartClaims, TokenError> {
        self.verify(token, TokenType::Multipart)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<C, TokenError> {
        // Signature and expiry first, against the minimal shape.
        let base = decode::<BaseClaims>(token, &self.decoding_key, &self.validation)
            .map_err(map_jwt_error)?;

        if base.claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected: expected.as_str(),
            });
        }

        let data =
            decode::<C>(token, &self.decoding_key, &self.validation).map_err(map_jwt_error)?;
        Ok(data.claims)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}
