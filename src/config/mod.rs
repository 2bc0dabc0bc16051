//! Configuration module - environment variable parsing and storage mode selection

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default pool acquisition timeout in milliseconds
pub const DEFAULT_DB_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// PostgreSQL connection string; `None` leaves the `/api` routes unconfigured
    pub database_url: Option<String>,
    /// `PGSSLMODE=disable` turns TLS off, everything else requires it
    pub database_ssl: bool,
    /// Pool acquisition timeout
    pub db_connect_timeout: Duration,

    /// Base URL the relational API client talks to
    pub api_base_url: String,
    /// Which backend family serves each entity
    pub storage: StorageFlags,
    /// Firestore / Firebase Auth parameters, when provided
    pub firebase: Option<FirebaseConfig>,

    /// Directory for the local JSON store; `None` makes local storage unavailable
    pub local_store_dir: Option<PathBuf>,
}

/// Firestore and Firebase Auth connection parameters
#[derive(Clone, Debug)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    /// `host:port` of a Firestore emulator
    pub firestore_emulator_host: Option<String>,
    /// `host:port` of a Firebase Auth emulator
    pub auth_emulator_host: Option<String>,
}

/// Backend family chosen for an entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    RelationalApi,
    Firestore,
}

impl BackendKind {
    pub fn is_remote(self) -> bool {
        !matches!(self, BackendKind::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::RelationalApi => "relational-api",
            BackendKind::Firestore => "firestore",
        }
    }
}

/// Storage toggles, one per backend family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageFlags {
    pub use_api: bool,
    pub use_firebase: bool,
}

impl StorageFlags {
    /// Backend for supplies and visits: document store, then relational API, then local
    pub fn records_backend(&self) -> BackendKind {
        if self.use_firebase {
            BackendKind::Firestore
        } else if self.use_api {
            BackendKind::RelationalApi
        } else {
            BackendKind::Local
        }
    }

    /// Backend for accounts; the relational schema has no accounts table
    pub fn accounts_backend(&self) -> BackendKind {
        if self.use_firebase {
            BackendKind::Firestore
        } else {
            BackendKind::Local
        }
    }
}

/// Read a boolean toggle. Anything other than `true`/`1` counts as disabled.
pub fn parse_flag(value: Option<&str>) -> bool {
    value
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        // PORT wins over SERVER_ADDR, mirroring hosted platforms
        let server_addr = if let Some(port) = non_empty("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            non_empty("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
        };
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress)?;

        let db_connect_timeout_ms = match non_empty("DB_CONNECT_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("DB_CONNECT_TIMEOUT_MS"))?,
            None => DEFAULT_DB_CONNECT_TIMEOUT_MS,
        };

        let database_ssl = !var("PGSSLMODE")
            .map(|mode| mode.trim().eq_ignore_ascii_case("disable"))
            .unwrap_or(false);

        let firebase = match (non_empty("FIREBASE_API_KEY"), non_empty("FIREBASE_PROJECT_ID")) {
            (Some(api_key), Some(project_id)) => Some(FirebaseConfig {
                api_key,
                project_id,
                firestore_emulator_host: non_empty("FIRESTORE_EMULATOR_HOST"),
                auth_emulator_host: non_empty("FIREBASE_AUTH_EMULATOR_HOST"),
            }),
            _ => None,
        };

        // The document store only counts as enabled once it can actually be reached
        let storage = StorageFlags {
            use_api: parse_flag(var("USE_API").as_deref()),
            use_firebase: parse_flag(var("USE_FIREBASE").as_deref()) && firebase.is_some(),
        };

        let api_base_url = non_empty("API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| loopback_url(server_addr));

        let local_store_dir = match non_empty("LOCAL_STORE_DIR") {
            Some(dir) if dir.eq_ignore_ascii_case("none") => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from("./data")),
        };

        Ok(Self {
            server_addr,
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: non_empty("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            database_url: non_empty("DATABASE_URL"),
            database_ssl,
            db_connect_timeout: Duration::from_millis(db_connect_timeout_ms),
            api_base_url,
            storage,
            firebase,
            local_store_dir,
        })
    }
}

/// URL reaching this server's own `/api` routes
fn loopback_url(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://127.0.0.1:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
