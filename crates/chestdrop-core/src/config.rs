//! Configuration module
//!
//! Environment-driven configuration for the API server, storage backends, and
//! the reaper. Call [`load_dotenv`] before [`Config::from_env`] so a local
//! `.env` file is honored.

use std::env;

const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 3600;
const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024 * 1024;
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./data";

/// Load `.env` if present. Safe to call multiple times.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Which blob store backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl StorageBackend {
    fn parse(s: &str) -> Result<Self, anyhow::Error> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!(
                "Invalid STORAGE_BACKEND '{}': expected s3, local, or memory",
                other
            )),
        }
    }
}

/// A named TOTP secret from `TOTP_SECRETS`. Names are opaque labels used only
/// for logging; any matching secret admits.
#[derive(Debug, Clone)]
pub struct TotpSecret {
    pub name: String,
    pub base32_secret: String,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    /// HMAC key for all bearer tokens. Rotated by redeployment.
    pub jwt_secret: String,

    pub require_totp: bool,
    pub totp_secrets: Vec<TotpSecret>,

    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: String,

    pub reaper_enabled: bool,
    pub reaper_interval_secs: u64,

    pub max_body_bytes: usize,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = Config {
            server_port: parse_env("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            db_timeout_seconds: parse_env("DB_TIMEOUT_SECONDS", DEFAULT_DB_TIMEOUT_SECS)?,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            require_totp: parse_bool_env("REQUIRE_TOTP", false)?,
            totp_secrets: parse_totp_secrets(env::var("TOTP_SECRETS").ok().as_deref())?,
            storage_backend: StorageBackend::parse(
                &env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string()),
            )?,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| DEFAULT_LOCAL_STORAGE_PATH.to_string()),
            reaper_enabled: parse_bool_env("REAPER_ENABLED", true)?,
            reaper_interval_secs: parse_env("REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS)?,
            max_body_bytes: parse_env("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation. Fails fast at startup rather than at first use.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt_secret.trim().is_empty() {
            return Err(anyhow::anyhow!("JWT_SECRET must not be empty"));
        }
        if self.require_totp && self.totp_secrets.is_empty() {
            return Err(anyhow::anyhow!(
                "TOTP_SECRETS must be set when REQUIRE_TOTP=true"
            ));
        }
        if self.storage_backend == StorageBackend::S3 {
            if self.s3_bucket.as_deref().unwrap_or("").is_empty() {
                return Err(anyhow::anyhow!("S3_BUCKET must be set for STORAGE_BACKEND=s3"));
            }
            if self.s3_region.as_deref().unwrap_or("").is_empty() {
                return Err(anyhow::anyhow!("S3_REGION must be set for STORAGE_BACKEND=s3"));
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, anyhow::Error>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool, anyhow::Error> {
    match env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(anyhow::anyhow!(
                "Invalid {}: expected true or false, got '{}'",
                name,
                other
            )),
        },
        Err(_) => Ok(default),
    }
}

/// Parse `"name1:SECRET1,name2:SECRET2"` into named secrets. Whitespace around
/// entries is ignored; empty entries are rejected.
pub fn parse_totp_secrets(raw: Option<&str>) -> Result<Vec<TotpSecret>, anyhow::Error> {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(Vec::new()),
    };

    let mut secrets = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, secret) = entry.split_once(':').ok_or_else(|| {
            anyhow::anyhow!("Invalid TOTP_SECRETS entry '{}': expected name:SECRET", entry)
        })?;
        if name.trim().is_empty() || secret.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Invalid TOTP_SECRETS entry '{}': name and secret must be non-empty",
                entry
            ));
        }
        secrets.push(TotpSecret {
            name: name.trim().to_string(),
            base32_secret: secret.trim().to_string(),
        });
    }
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost/chestdrop".to_string(),
            db_max_connections: 5,
            db_timeout_seconds: 30,
            jwt_secret: "test-secret".to_string(),
            require_totp: false,
            totp_secrets: Vec::new(),
            storage_backend: StorageBackend::Memory,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: "./data".to_string(),
            reaper_enabled: true,
            reaper_interval_secs: 3600,
            max_body_bytes: 1024,
            environment: "test".to_string(),
        }
    }

    #[test]
    fn test_parse_totp_secrets_multiple() {
        let secrets =
            parse_totp_secrets(Some("alice:JBSWY3DPEHPK3PXP, bob:KRSXG5CTMVRXEZLU")).unwrap();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].name, "alice");
        assert_eq!(secrets[0].base32_secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(secrets[1].name, "bob");
    }

    #[test]
    fn test_parse_totp_secrets_empty() {
        assert!(parse_totp_secrets(None).unwrap().is_empty());
        assert!(parse_totp_secrets(Some("")).unwrap().is_empty());
        assert!(parse_totp_secrets(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_totp_secrets_malformed() {
        assert!(parse_totp_secrets(Some("no-colon-here")).is_err());
        assert!(parse_totp_secrets(Some(":SECRETONLY")).is_err());
        assert!(parse_totp_secrets(Some("name:")).is_err());
    }

    #[test]
    fn test_validate_requires_totp_secrets_when_gated() {
        let mut config = base_config();
        config.require_totp = true;
        assert!(config.validate().is_err());

        config.totp_secrets = parse_totp_secrets(Some("ops:JBSWY3DPEHPK3PXP")).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_jwt_secret() {
        let mut config = base_config();
        config.jwt_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_s3_backend_needs_bucket_and_region() {
        let mut config = base_config();
        config.storage_backend = StorageBackend::S3;
        assert!(config.validate().is_err());

        config.s3_bucket = Some("chestdrop".to_string());
        assert!(config.validate().is_err());

        config.s3_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(StorageBackend::parse("s3").unwrap(), StorageBackend::S3);
        assert_eq!(StorageBackend::parse("LOCAL").unwrap(), StorageBackend::Local);
        assert_eq!(StorageBackend::parse("memory").unwrap(), StorageBackend::Memory);
        assert!(StorageBackend::parse("gcs").is_err());
    }

    #[test]
    fn test_is_production() {
        let mut config = base_config();
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
        config.environment = "prod".to_string();
        assert!(config.is_production());
    }
}
