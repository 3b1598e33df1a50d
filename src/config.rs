//! Layered configuration via `figment`.
//!
//! Precedence, highest to lowest:
//! 1. Environment variables, prefix `CORE_`, `__`-free fields split on `_`
//! 2. `./config.toml`
//! 3. XDG config directory: `~/.config/coreplane-service/{service_name}/config.toml`
//! 4. `/etc/coreplane-service/{service_name}/config.toml`
//! 5. [`Config::default`]
//!
//! One flat, non-generic struct: there is no domain extension point to
//! carry, so a generic `Config<T>` shape would add indirection nothing
//! here needs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Grace period for in-flight requests/jobs to finish after SIGTERM/
    /// SIGINT before the process exits (§4.6, default 30s).
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ServiceConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HS256-only JWT configuration (§4.4: algorithm confusion defense —
/// multi-algorithm support is deliberately narrowed to one algorithm).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Shared secret, required to be at least 32 bytes (checked at
    /// startup by [`JwtConfig::validate`], not by serde).
    pub secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// Clock-skew tolerance applied to `exp`/`nbf` checks.
    #[serde(default = "default_jwt_leeway_secs")]
    pub leeway_secs: u64,
}

impl JwtConfig {
    pub const MIN_SECRET_BYTES: usize = 32;

    pub fn validate(&self) -> Result<()> {
        if self.secret.as_bytes().len() < Self::MIN_SECRET_BYTES {
            return Err(crate::error::Error::Internal(format!(
                "jwt secret must be at least {} bytes",
                Self::MIN_SECRET_BYTES
            )));
        }
        Ok(())
    }
}

/// A single configured API key's identity, looked up by the raw key
/// value (§4.4: "looks the key up in a configured mapping").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyPrincipal {
    pub service_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub keys: std::collections::HashMap<String, ApiKeyPrincipal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_subject_rpm")]
    pub per_subject_rpm: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// `"memory"` or `"external"` (§4.5).
    #[serde(default = "default_rate_limit_backend")]
    pub backend: String,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_circuit_breaker_recovery_secs")]
    pub circuit_breaker_recovery_secs: u64,
    /// When the external backend's circuit is open: `true` lets requests
    /// through unchecked, `false` falls back to the in-memory limiter
    /// (§4.5 fail-open/fallback).
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl RateLimitConfig {
    pub fn circuit_breaker_recovery(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_recovery_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
    #[serde(default = "default_true")]
    pub compression: bool,
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    /// Trust `X-Forwarded-For`/`X-Real-IP` (request-id inbound header, and
    /// rate-limit client-IP extraction) rather than only the socket peer
    /// address. Off by default: a service sitting directly on the
    /// internet must not let callers spoof their own identity (§4.3 step
    /// 2, step 5).
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            body_limit_mb: default_body_limit_mb(),
            compression: true,
            cors_mode: default_cors_mode(),
            request_id_header: default_request_id_header(),
            trust_proxy_headers: false,
        }
    }
}

/// Worker runtime configuration (§4.8): queue weights and concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_critical_weight")]
    pub critical_weight: u32,
    #[serde(default = "default_default_weight")]
    pub default_weight: u32,
    #[serde(default = "default_low_weight")]
    pub low_weight: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            critical_weight: default_critical_weight(),
            default_weight: default_default_weight(),
            low_weight: default_low_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_idempotency_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_true")]
    pub fail_open: bool,
    #[serde(default = "default_idempotency_prefix")]
    pub key_prefix: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_secs: default_idempotency_ttl_secs(), fail_open: true, key_prefix: default_idempotency_prefix() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_latency_buckets_ms")]
    pub latency_buckets_ms: Vec<f64>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { otlp_endpoint: None, metrics_enabled: true, latency_buckets_ms: default_latency_buckets_ms() }
    }
}

impl ObservabilityConfig {
    pub fn latency_buckets(&self) -> Vec<Duration> {
        self.latency_buckets_ms.iter().map(|&ms| Duration::from_millis(ms as u64)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
}

fn default_port() -> u16 { 8080 }
fn default_log_level() -> String { "info".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_environment() -> String { "dev".to_string() }
fn default_shutdown_grace_secs() -> u64 { 30 }
fn default_jwt_leeway_secs() -> u64 { 0 }
fn default_per_subject_rpm() -> u32 { 200 }
fn default_window_secs() -> u64 { 60 }
fn default_rate_limit_backend() -> String { "memory".to_string() }
fn default_circuit_breaker_threshold() -> u32 { 5 }
fn default_circuit_breaker_recovery_secs() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_body_limit_mb() -> usize { 10 }
fn default_cors_mode() -> String { "permissive".to_string() }
fn default_request_id_header() -> String { "x-request-id".to_string() }
fn default_worker_concurrency() -> usize { 10 }
fn default_critical_weight() -> u32 { 6 }
fn default_default_weight() -> u32 { 3 }
fn default_low_weight() -> u32 { 1 }
fn default_idempotency_ttl_secs() -> u64 { 86_400 }
fn default_idempotency_prefix() -> String { "idempotency:".to_string() }
fn default_latency_buckets_ms() -> Vec<f64> {
    vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
}
fn default_redis_max_connections() -> usize { 20 }

impl Config {
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "coreplane-service".to_string());
        Self::load_for_service(&service_name)
    }

    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in Self::find_config_paths(service_name).iter().rev() {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading configuration file");
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("CORE_").split("_"));
        let config: Config = figment.extract()?;
        config.jwt.validate()?;
        Ok(config)
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("coreplane-service");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/coreplane-service").join(service_name).join("config.toml"));
        paths
    }

    pub fn recommended_path(service_name: &str) -> PathBuf {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("coreplane-service");
        let config_file_path = Path::new(service_name).join("config.toml");
        xdg_dirs.place_config_file(&config_file_path).unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| String::from("~")))
                .join(".config/coreplane-service")
                .join(service_name)
                .join("config.toml")
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "coreplane-service".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
                shutdown_grace_secs: default_shutdown_grace_secs(),
            },
            jwt: JwtConfig {
                secret: "development-only-secret-change-me-32b".to_string(),
                issuer: None,
                audience: None,
                leeway_secs: default_jwt_leeway_secs(),
            },
            api_keys: ApiKeysConfig::default(),
            rate_limit: RateLimitConfig {
                per_subject_rpm: default_per_subject_rpm(),
                window_secs: default_window_secs(),
                backend: default_rate_limit_backend(),
                circuit_breaker_threshold: default_circuit_breaker_threshold(),
                circuit_breaker_recovery_secs: default_circuit_breaker_recovery_secs(),
                fail_open: true,
            },
            middleware: MiddlewareConfig::default(),
            worker: WorkerConfig::default(),
            idempotency: IdempotencyConfig::default(),
            observability: ObservabilityConfig::default(),
            redis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.rate_limit.per_subject_rpm, 200);
        assert_eq!(config.worker.critical_weight, 6);
        assert_eq!(config.worker.default_weight, 3);
        assert_eq!(config.worker.low_weight, 1);
    }

    #[test]
    fn jwt_secret_shorter_than_32_bytes_is_rejected() {
        let mut config = Config::default();
        config.jwt.secret = "too-short".to_string();
        assert!(config.jwt.validate().is_err());
    }

    #[test]
    fn jwt_secret_of_32_bytes_is_accepted() {
        let mut config = Config::default();
        config.jwt.secret = "a".repeat(32);
        assert!(config.jwt.validate().is_ok());
    }
}
