use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the ingestion worker
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Key prefixes used inside the bucket
    #[serde(default)]
    pub layout: LayoutConfig,
    /// PDF rendering configuration
    #[serde(default)]
    pub render: RenderConfig,
    /// Upstream transport bounds
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding uploads, raw outputs and task records
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Prefixes partitioning the bucket into areas
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LayoutConfig {
    /// Where new documents arrive
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    /// Where originals and rendered pages are kept
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
    /// Where the labeling tool picks up tasks and images
    #[serde(default = "default_ingest_prefix")]
    pub ingest_prefix: String,
}

/// PDF rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Multiplier applied to each page's native size
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Explicit path to the PDFium shared library
    pub pdfium_library_path: Option<String>,
}

/// Bounds imposed by the queue and hosting runtime
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Queue visibility timeout in seconds
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    /// Largest batch the transport is expected to deliver
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Wall-clock ceiling of one invocation in seconds
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "docingest-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_upload_prefix() -> String {
    "upload/".to_string()
}

fn default_raw_prefix() -> String {
    "raw/".to_string()
}

fn default_ingest_prefix() -> String {
    "ingest/".to_string()
}

fn default_scale() -> f32 {
    2.0
}

fn default_visibility_timeout_secs() -> u64 {
    900
}

fn default_max_batch_size() -> usize {
    10
}

fn default_invocation_timeout_secs() -> u64 {
    900
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(config::File::with_name("config/worker").required(false))
            .add_source(config::File::with_name("/etc/docingest/worker").required(false))
            // INGEST__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("s3.bucket".to_string()));
        }

        let prefixes = [
            ("layout.upload_prefix", &self.layout.upload_prefix),
            ("layout.raw_prefix", &self.layout.raw_prefix),
            ("layout.ingest_prefix", &self.layout.ingest_prefix),
        ];
        for (field, prefix) in prefixes {
            if prefix.is_empty() || !prefix.ends_with('/') {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.to_string(),
                    message: format!("prefix must be non-empty and end with '/': {prefix:?}"),
                });
            }
        }
        for (i, (field, a)) in prefixes.iter().enumerate() {
            for (_, b) in prefixes.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(ConfigValidationError::InvalidValue {
                        field: field.to_string(),
                        message: format!("prefixes {a:?} and {b:?} overlap"),
                    });
                }
            }
        }

        if !self.render.scale.is_finite() || self.render.scale <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "render.scale".to_string(),
                message: format!("must be a positive number, got {}", self.render.scale),
            });
        }

        Ok(())
    }

    /// Get invocation ceiling as Duration
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.invocation_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            upload_prefix: default_upload_prefix(),
            raw_prefix: default_raw_prefix(),
            ingest_prefix: default_ingest_prefix(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            pdfium_library_path: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_batch_size: default_max_batch_size(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            s3: S3Config {
                bucket: "test-bucket".to_string(),
                region: default_region(),
                endpoint_url: None,
                force_path_style: false,
            },
            layout: LayoutConfig::default(),
            render: RenderConfig::default(),
            transport: TransportConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.upload_prefix, "upload/");
        assert_eq!(layout.raw_prefix, "raw/");
        assert_eq!(layout.ingest_prefix, "ingest/");
        assert_eq!(default_scale(), 2.0);
        assert_eq!(default_max_batch_size(), 10);
    }

    #[test]
    fn test_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_bucket() {
        let mut config = create_test_config();
        config.s3.bucket = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_prefix_without_slash() {
        let mut config = create_test_config();
        config.layout.raw_prefix = "raw".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_overlapping_prefixes() {
        let mut config = create_test_config();
        config.layout.ingest_prefix = "raw/ingest/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_scale() {
        let mut config = create_test_config();
        config.render.scale = 0.0;
        assert!(config.validate().is_err());
        config.render.scale = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{ "s3": { "bucket": "brij-v1-bucket" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.s3.bucket, "brij-v1-bucket");
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.service.log_format, "json");
        assert_eq!(config.transport.visibility_timeout_secs, 900);
    }
}
