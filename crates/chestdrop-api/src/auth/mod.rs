//! Bearer-token service and TOTP admission gate.

pub mod extract;
pub mod tokens;
pub mod totp;

pub use tokens::{ChestClaims, MultipartClaims, TokenError, TokenService, TokenType, UploadClaims};
pub use totp::TotpGate;
