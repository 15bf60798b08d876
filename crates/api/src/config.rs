//! Runtime configuration read once from the environment

use mediadesk_core::{AllocatorConfig, FolderDefaults, UploadPolicy};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "mediadesk-development-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local { path: PathBuf },
    S3 { bucket: String },
    Drive { service_account_file: PathBuf },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub storage: StorageConfig,
    pub folders: FolderDefaults,
    pub upload_policy: UploadPolicy,
    pub allocator: AllocatorConfig,
    pub request_number_prefix_lock: bool,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub login_rate_per_minute: u32,
    pub cors_allowed_origins: Vec<String>,
    pub admin_credentials: Option<(String, String)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "production".to_string());
        let is_development = environment == "development";

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if is_development => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let storage = match get("STORAGE_TYPE").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                path: PathBuf::from(get("LOCAL_STORAGE_PATH").unwrap_or_else(|| "uploads".to_string())),
            },
            "s3" => StorageConfig::S3 {
                bucket: get("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?,
            },
            "drive" | "gdrive" => StorageConfig::Drive {
                service_account_file: PathBuf::from(
                    get("GDRIVE_SERVICE_ACCOUNT_FILE").ok_or(ConfigError::Missing("GDRIVE_SERVICE_ACCOUNT_FILE"))?,
                ),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_TYPE",
                    value: other.to_string(),
                    reason: "expected local, s3 or drive".to_string(),
                })
            }
        };

        let upload_policy = match get("UPLOAD_POLICY") {
            Some(raw) => raw.parse::<UploadPolicy>().map_err(|reason| ConfigError::Invalid {
                key: "UPLOAD_POLICY",
                value: raw,
                reason,
            })?,
            None => UploadPolicy::default(),
        };

        let admin_credentials = match (get("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD").filter(|p| !p.is_empty())) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: parse_or(&get, "PORT", 3000)?,
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 20)?,
            db_min_connections: parse_or(&get, "DB_MIN_CONNECTIONS", 2)?,
            db_acquire_timeout_secs: parse_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 3)?,
            jwt_secret,
            jwt_ttl_hours: parse_or(&get, "JWT_TTL_HOURS", 24)?,
            storage,
            folders: FolderDefaults {
                profile: get("GDRIVE_PROFILE_FOLDER_ID"),
                reference: get("GDRIVE_REFERENCE_FOLDER_ID"),
                data: get("GDRIVE_DATA_FOLDER_ID"),
            },
            upload_policy,
            allocator: AllocatorConfig {
                max_attempts: parse_or(&get, "REQUEST_NUMBER_MAX_ATTEMPTS", mediadesk_core::request_number::DEFAULT_MAX_ATTEMPTS)?,
            },
            request_number_prefix_lock: parse_bool_or(&get, "REQUEST_NUMBER_PREFIX_LOCK", true)?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", 60)?,
            max_concurrent_requests: parse_or(&get, "MAX_CONCURRENT_REQUESTS", 512)?,
            login_rate_per_minute: parse_or(&get, "LOGIN_RATE_LIMIT_PER_MINUTE", 10)?,
            cors_allowed_origins,
            admin_credentials,
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn parse_bool_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/mediadesk"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_max_connections, 20);
        assert_eq!(cfg.db_acquire_timeout_secs, 3);
        assert_eq!(cfg.jwt_ttl_hours, 24);
        assert_eq!(cfg.storage, StorageConfig::Local { path: PathBuf::from("uploads") });
        assert_eq!(cfg.upload_policy, UploadPolicy::BestEffort);
        assert_eq!(cfg.allocator.max_attempts, 5);
        assert!(cfg.request_number_prefix_lock);
        assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
        assert!(cfg.admin_credentials.is_none());
        assert!(cfg.cors_allowed_origins.is_empty());
    }

    #[test]
    fn test_database_url_required() {
        assert_eq!(config(&[("JWT_SECRET", "s")]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_jwt_secret_required_outside_development() {
        let err = config(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));

        let cfg = config(&[("DATABASE_URL", "postgres://x"), ("ENVIRONMENT", "development")]).unwrap();
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert!(cfg.is_development());
    }

    #[test]
    fn test_storage_selection() {
        let base = [("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")];

        let mut vars = base.to_vec();
        vars.push(("STORAGE_TYPE", "drive"));
        assert_eq!(config(&vars).unwrap_err(), ConfigError::Missing("GDRIVE_SERVICE_ACCOUNT_FILE"));
        vars.push(("GDRIVE_SERVICE_ACCOUNT_FILE", "/etc/mediadesk/sa.json"));
        assert_eq!(
            config(&vars).unwrap().storage,
            StorageConfig::Drive { service_account_file: PathBuf::from("/etc/mediadesk/sa.json") }
        );

        let mut vars = base.to_vec();
        vars.push(("STORAGE_TYPE", "ftp"));
        assert!(matches!(config(&vars), Err(ConfigError::Invalid { key: "STORAGE_TYPE", .. })));
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_allocation_and_upload_settings() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("UPLOAD_POLICY", "required"),
            ("REQUEST_NUMBER_MAX_ATTEMPTS", "8"),
            ("REQUEST_NUMBER_PREFIX_LOCK", "false"),
            ("GDRIVE_REFERENCE_FOLDER_ID", "1ReferenceFolder"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD", "change me please"),
        ])
        .unwrap();
        assert_eq!(cfg.upload_policy, UploadPolicy::Required);
        assert_eq!(cfg.allocator.max_attempts, 8);
        assert!(!cfg.request_number_prefix_lock);
        assert_eq!(cfg.folders.reference.as_deref(), Some("1ReferenceFolder"));
        assert_eq!(cfg.folders.profile, None);
        assert_eq!(cfg.cors_allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.admin_credentials, Some(("admin".to_string(), "change me please".to_string())));
    }

    #[test]
    fn test_invalid_upload_policy() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s"), ("UPLOAD_POLICY", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "UPLOAD_POLICY", .. }));
    }
}
