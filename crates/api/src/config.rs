//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server and pipeline configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL URL; in-memory storage when unset
/// - `WORKER_CONCURRENCY` — saga worker count (default: `4`)
/// - `JOB_MAX_ATTEMPTS` — deliveries before dead-lettering (default: `5`)
/// - `JOB_STALL_SECONDS` — lease age before reclaim (default: `60`)
/// - `METADATA_BASE_URL` — base URL for token metadata
/// - `FALLBACK_CONTRACT_ADDRESS` — contract used when a variant has none
/// - `MINT_RPC_URL`, `MINT_PRIVATE_KEY` — chain credentials; minting is
///   unconfigured unless both are present
/// - `SMS_FROM` — sender number; notifications are unconfigured without it
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub worker_concurrency: usize,
    pub job_max_attempts: u32,
    pub job_stall_timeout: Duration,
    pub metadata_base_url: String,
    pub fallback_contract_address: Option<String>,
    pub minting_configured: bool,
    pub notifications_configured: bool,
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: env_non_empty("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: env_non_empty("DATABASE_URL"),
            worker_concurrency: env_non_empty("WORKER_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            job_max_attempts: env_non_empty("JOB_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            job_stall_timeout: Duration::from_secs(
                env_non_empty("JOB_STALL_SECONDS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            metadata_base_url: env_non_empty("METADATA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            fallback_contract_address: env_non_empty("FALLBACK_CONTRACT_ADDRESS"),
            minting_configured: env_non_empty("MINT_RPC_URL").is_some()
                && env_non_empty("MINT_PRIVATE_KEY").is_some(),
            notifications_configured: env_non_empty("SMS_FROM").is_some(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            worker_concurrency: 4,
            job_max_attempts: 5,
            job_stall_timeout: Duration::from_secs(60),
            metadata_base_url: "http://localhost:3000".to_string(),
            fallback_contract_address: None,
            minting_configured: false,
            notifications_configured: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "HOST",
            "PORT",
            "DATABASE_URL",
            "WORKER_CONCURRENCY",
            "JOB_MAX_ATTEMPTS",
            "JOB_STALL_SECONDS",
            "METADATA_BASE_URL",
            "FALLBACK_CONTRACT_ADDRESS",
            "MINT_RPC_URL",
            "MINT_PRIVATE_KEY",
            "SMS_FROM",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.job_max_attempts, 5);
        assert!(!config.minting_configured);
        assert!(!config.notifications_configured);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_match_default() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert_eq!(config.job_stall_timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_minting_requires_both_credentials() {
        clear_env();
        unsafe { std::env::set_var("MINT_RPC_URL", "https://rpc.example.com") };
        assert!(!Config::from_env().minting_configured);
        unsafe { std::env::set_var("MINT_PRIVATE_KEY", "0xsecret") };
        assert!(Config::from_env().minting_configured);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_pipeline_tuning_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("WORKER_CONCURRENCY", "8");
            std::env::set_var("JOB_MAX_ATTEMPTS", "3");
            std::env::set_var("JOB_STALL_SECONDS", "120");
        }
        let config = Config::from_env();
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.job_max_attempts, 3);
        assert_eq!(config.job_stall_timeout, Duration::from_secs(120));
        clear_env();
    }
}
