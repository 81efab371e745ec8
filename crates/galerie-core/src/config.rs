//! Configuration module
//!
//! Pipeline settings are read once at startup from the environment (with
//! `.env` support) and validated before anything is constructed from them.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{VariantSet, DEFAULT_VARIANTS};
use crate::retry::RetryConfig;
use crate::storage_types::StorageBackend;

const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const DERIVATIVE_MAX_CONCURRENT: usize = 2;
const ROTATION_LEASE_TTL_SECS: u64 = 300;
const JPEG_QUALITY: u8 = 85;
const WEBP_QUALITY: u8 = 80;

/// What a rotation does when the asset's variants are still being derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationInFlightPolicy {
    /// Rotate whatever exists now; variants not yet written are skipped.
    #[default]
    Skip,
    /// Refuse with `DerivationInProgress` while status is pending or processing.
    Reject,
}

impl FromStr for RotationInFlightPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(RotationInFlightPolicy::Skip),
            "reject" => Ok(RotationInFlightPolicy::Reject),
            _ => Err(anyhow::anyhow!("Invalid rotation in-flight policy: {}", s)),
        }
    }
}

impl Display for RotationInFlightPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RotationInFlightPolicy::Skip => write!(f, "skip"),
            RotationInFlightPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Derivative pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub environment: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    pub s3_endpoint: Option<String>,
    // Database configuration
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Pipeline
    pub variants: VariantSet,
    pub derivative_max_concurrent: usize,
    pub storage_retry: RetryConfig,
    pub database_retry: RetryConfig,
    pub rotation_lease_ttl: Duration,
    pub rotation_in_flight_policy: RotationInFlightPolicy,
    pub jpeg_quality: u8,
    pub webp_quality: u8,
}

impl PipelineConfig {
    /// Load `.env` (if present) and read settings from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Local,
        };

        let variants = VariantSet::parse(
            var("IMAGE_VARIANTS")
                .as_deref()
                .unwrap_or(DEFAULT_VARIANTS),
        )
        .map_err(|e| anyhow::anyhow!("IMAGE_VARIANTS is invalid: {}", e))?;

        let rotation_in_flight_policy = match var("ROTATION_IN_FLIGHT_POLICY") {
            Some(value) => value.parse()?,
            None => RotationInFlightPolicy::default(),
        };

        let config = PipelineConfig {
            environment,
            storage_backend,
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL"),
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            db_timeout_seconds: parse_or(&var, "DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS)?,
            variants,
            derivative_max_concurrent: parse_or(
                &var,
                "DERIVATIVE_MAX_CONCURRENT",
                DERIVATIVE_MAX_CONCURRENT,
            )?,
            storage_retry: retry_from(&var, "STORAGE_RETRY", RetryConfig::storage())?,
            database_retry: retry_from(&var, "DB_RETRY", RetryConfig::database())?,
            rotation_lease_ttl: Duration::from_secs(parse_or(
                &var,
                "ROTATION_LEASE_TTL_SECS",
                ROTATION_LEASE_TTL_SECS,
            )?),
            rotation_in_flight_policy,
            jpeg_quality: parse_or(&var, "JPEG_QUALITY", JPEG_QUALITY)?,
            webp_quality: parse_or(&var, "WEBP_QUALITY", WEBP_QUALITY)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the pipeline is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.derivative_max_concurrent == 0 {
            return Err(anyhow::anyhow!(
                "DERIVATIVE_MAX_CONCURRENT must be at least 1"
            ));
        }

        if self.variants.is_empty() {
            return Err(anyhow::anyhow!("IMAGE_VARIANTS must name at least one variant"));
        }

        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.rotation_lease_ttl.is_zero() {
            return Err(anyhow::anyhow!("ROTATION_LEASE_TTL_SECS must be at least 1"));
        }

        for (name, quality) in [("JPEG_QUALITY", self.jpeg_quality), ("WEBP_QUALITY", self.webp_quality)] {
            if quality == 0 || quality > 100 {
                return Err(anyhow::anyhow!("{} must be between 1 and 100", name));
            }
        }

        self.storage_retry
            .validate()
            .map_err(|e| anyhow::anyhow!("STORAGE_RETRY_*: {}", e))?;
        self.database_retry
            .validate()
            .map_err(|e| anyhow::anyhow!("DB_RETRY_*: {}", e))?;

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_or<T, V>(var: &V, name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, value)),
        None => Ok(default),
    }
}

fn retry_from<V>(var: &V, prefix: &str, defaults: RetryConfig) -> Result<RetryConfig, anyhow::Error>
where
    V: Fn(&str) -> Option<String>,
{
    let initial_ms = parse_or(
        var,
        &format!("{}_INITIAL_DELAY_MS", prefix),
        defaults.initial_delay.as_millis() as u64,
    )?;
    let max_ms = parse_or(
        var,
        &format!("{}_MAX_DELAY_MS", prefix),
        defaults.max_delay.as_millis() as u64,
    )?;

    Ok(RetryConfig {
        max_attempts: parse_or(var, &format!("{}_MAX_ATTEMPTS", prefix), defaults.max_attempts)?,
        initial_delay: Duration::from_millis(initial_ms),
        backoff_multiplier: parse_or(
            var,
            &format!("{}_BACKOFF_MULTIPLIER", prefix),
            defaults.backoff_multiplier,
        )?,
        max_delay: Duration::from_millis(max_ms),
    })
}
