//! Configuration management
//!
//! Everything is read from the environment once, at startup, and handed to
//! constructors explicitly. Nothing below the binary entry point reads the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthPolicy;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/cifp";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Processing Constants
// ============================================================================

/// FAA endpoint describing the current CIFP edition.
pub const DEFAULT_FEED_URL: &str = "https://soa.smext.faa.gov/apra/cifp/chart?edition=current";

/// Google endpoint used to verify identity tokens.
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Base filename used for archived objects.
pub const DEFAULT_BASE_FILENAME: &str = "FAACIFP18";

/// Name suffix of the data file inside the upstream zip archive.
pub const DEFAULT_MEMBER_NAME: &str = "FAACIFP18";

/// Bounded buffer used while streaming the archive download.
pub const DEFAULT_COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Deadline for one fetch-transform-archive run.
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 120;

/// Deadline for the cycle listing.
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 5;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub process: ProcessSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Who may trigger processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Email of the only principal allowed to trigger processing
    pub allowed_principal: Option<String>,
    /// Skip credential checks entirely (`CIFP_DISABLE_AUTH`)
    pub disable_auth: bool,
    pub tokeninfo_url: String,
}

/// Settings for the process pipeline and its HTTP deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSettings {
    pub feed_url: String,
    pub base_filename: String,
    pub member_name: String,
    /// Scratch directory; the system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    pub copy_buffer_bytes: usize,
    pub process_timeout_secs: u64,
    pub list_timeout_secs: u64,
    pub remove_duplicate_localizers: bool,
}

impl ProcessSettings {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl AuthConfig {
    /// Resolve the authorization policy, refusing to start without an allowed
    /// principal unless auth is explicitly disabled.
    pub fn policy(&self) -> anyhow::Result<AuthPolicy> {
        if self.disable_auth {
            return Ok(AuthPolicy::Disabled);
        }

        match self.allowed_principal.as_deref().map(str::trim) {
            Some(principal) if !principal.is_empty() => {
                Ok(AuthPolicy::RequirePrincipal(principal.to_string()))
            },
            _ => anyhow::bail!(
                "SERVICE_ACCOUNT must name the principal allowed to trigger processing \
                 (or set CIFP_DISABLE_AUTH=true)"
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port = std::env::var("CIFP_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);

        let config = Config {
            server: ServerConfig {
                host: env_string("CIFP_HOST", DEFAULT_SERVER_HOST),
                port,
                shutdown_timeout_secs: env_or(
                    "CIFP_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            auth: AuthConfig {
                allowed_principal: std::env::var("SERVICE_ACCOUNT").ok(),
                disable_auth: env_or("CIFP_DISABLE_AUTH", false),
                tokeninfo_url: env_string("TOKENINFO_URL", DEFAULT_TOKENINFO_URL),
            },
            process: ProcessSettings {
                feed_url: env_string("CIFP_FEED_URL", DEFAULT_FEED_URL),
                base_filename: env_string("CIFP_BASE_FILENAME", DEFAULT_BASE_FILENAME),
                member_name: env_string("CIFP_MEMBER_NAME", DEFAULT_MEMBER_NAME),
                scratch_dir: std::env::var("CIFP_SCRATCH_DIR").ok().map(PathBuf::from),
                copy_buffer_bytes: env_or("CIFP_COPY_BUFFER_BYTES", DEFAULT_COPY_BUFFER_BYTES),
                process_timeout_secs: env_or("CIFP_PROCESS_TIMEOUT", DEFAULT_PROCESS_TIMEOUT_SECS),
                list_timeout_secs: env_or("CIFP_LIST_TIMEOUT", DEFAULT_LIST_TIMEOUT_SECS),
                remove_duplicate_localizers: env_or("CIFP_REMOVE_DUPLICATE_LOCALIZERS", true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.auth.policy()?;

        if self.process.feed_url.is_empty() {
            anyhow::bail!("CIFP_FEED_URL cannot be empty");
        }

        if self.process.base_filename.is_empty() || self.process.member_name.is_empty() {
            anyhow::bail!("CIFP_BASE_FILENAME and CIFP_MEMBER_NAME cannot be empty");
        }

        if self.process.copy_buffer_bytes == 0 {
            anyhow::bail!("CIFP_COPY_BUFFER_BYTES must be greater than 0");
        }

        if self.process.process_timeout_secs == 0 || self.process.list_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be greater than 0 seconds");
        }

        if self.auth.disable_auth {
            tracing::warn!("CIFP_DISABLE_AUTH is set - processing requests will not be authenticated");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            auth: AuthConfig {
                allowed_principal: None,
                disable_auth: false,
                tokeninfo_url: DEFAULT_TOKENINFO_URL.to_string(),
            },
            process: ProcessSettings::default(),
        }
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            base_filename: DEFAULT_BASE_FILENAME.to_string(),
            member_name: DEFAULT_MEMBER_NAME.to_string(),
            scratch_dir: None,
            copy_buffer_bytes: DEFAULT_COPY_BUFFER_BYTES,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            list_timeout_secs: DEFAULT_LIST_TIMEOUT_SECS,
            remove_duplicate_localizers: true,
        }
    }
}
