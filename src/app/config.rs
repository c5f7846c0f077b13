use crate::core::scheduler::ScheduleConfig;
use config::{Config, Environment, File};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_API_PATH: &str = "https://api.pingone.com/v1";
const DEFAULT_AUTH_PATH: &str = "https://auth.pingone.com";
const DEFAULT_QUERY_SIZE: u32 = 100;

/// Prefix for environment overrides, e.g. `ORG_SYNC__LOGGING__LEVEL=debug`
const ENV_PREFIX: &str = "ORG_SYNC";

const REDACTED: &str = "<redacted>";

/// One PingOne environment to sync users and groups from
#[derive(Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct PingIdentityProviderConfig {
    /// Unique name of this provider, taken from its key under `providers`
    #[serde(skip)]
    #[builder(default)]
    pub id: String,
    pub env_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_api_path")]
    #[builder(default = "default_api_path()")]
    pub api_path: Url,
    #[serde(default = "default_auth_path")]
    #[builder(default = "default_auth_path()")]
    pub auth_path: Url,
    /// Page size when listing users
    #[serde(default = "default_query_size")]
    #[builder(default = "DEFAULT_QUERY_SIZE")]
    pub user_query_size: u32,
    /// Page size when listing groups
    #[serde(default = "default_query_size")]
    #[builder(default = "DEFAULT_QUERY_SIZE")]
    pub group_query_size: u32,
    #[serde(default)]
    #[builder(default)]
    pub schedule: Option<ScheduleConfig>,
}

impl fmt::Debug for PingIdentityProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingIdentityProviderConfig")
            .field("id", &self.id)
            .field("env_id", &self.env_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("api_path", &self.api_path.as_str())
            .field("auth_path", &self.auth_path.as_str())
            .field("user_query_size", &self.user_query_size)
            .field("group_query_size", &self.group_query_size)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl PingIdentityProviderConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.id.trim().is_empty() {
            anyhow::bail!("PingIdentity provider id must not be empty");
        }

        for (field, value) in [
            ("env_id", &self.env_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("PingIdentity provider {}: {} must be set", self.id, field);
            }
        }

        if self.user_query_size == 0 || self.group_query_size == 0 {
            anyhow::bail!(
                "PingIdentity provider {}: user_query_size and group_query_size must be > 0",
                self.id
            );
        }

        if let Some(schedule) = &self.schedule {
            schedule.validate().map_err(|reason| {
                anyhow::anyhow!("PingIdentity provider {}: invalid schedule, {}", self.id, reason)
            })?;
        }

        Ok(())
    }
}

fn default_api_path() -> Url {
    Url::parse(DEFAULT_API_PATH).expect("default api path is a valid url")
}

fn default_auth_path() -> Url {
    Url::parse(DEFAULT_AUTH_PATH).expect("default auth path is a valid url")
}

fn default_query_size() -> u32 {
    DEFAULT_QUERY_SIZE
}

/// Where full mutations are delivered
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// Keep the catalog in process, mostly for dry runs
    Memory,
    Http {
        url: Url,
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_catalog_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogConfig::Memory => f.write_str("Memory"),
            CatalogConfig::Http {
                url,
                token,
                timeout,
            } => f
                .debug_struct("Http")
                .field("url", &url.as_str())
                .field("token", &token.as_ref().map(|_| REDACTED))
                .field("timeout", timeout)
                .finish(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig::Memory
    }
}

fn default_catalog_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Strategy for providers that carry no schedule of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultSchedule {
    /// Read once at startup, after that only on demand
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct SchedulerConfig {
    /// When false, per provider schedules are ignored and
    /// `default_schedule` applies to every provider
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
pub struct SyncConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub default_schedule: Option<DefaultSchedule>,
    /// Provider configs keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, PingIdentityProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtelProto {
    Http,
    Grpc,
}

impl Default for OtelProto {
    fn default() -> Self {
        OtelProto::Grpc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for FileRotation {
    fn default() -> Self {
        FileRotation::Daily
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSink {
    #[serde(flatten)]
    pub dest: LogType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogType {
    Stdout {
        #[serde(default = "default_true")]
        color: bool,
        #[serde(default)]
        json: bool,
        #[serde(default = "default_true")]
        spans: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
        #[serde(default)]
        max_files: usize,
        #[serde(default = "default_true")]
        spans: bool,
    },
    Otel {
        endpoint: String,
        #[serde(default)]
        proto: OtelProto,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl fmt::Debug for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Stdout { color, json, spans } => f
                .debug_struct("Stdout")
                .field("color", color)
                .field("json", json)
                .field("spans", spans)
                .finish(),
            LogType::File {
                path,
                json,
                rotation,
                max_files,
                spans,
            } => f
                .debug_struct("File")
                .field("path", path)
                .field("json", json)
                .field("rotation", rotation)
                .field("max_files", max_files)
                .field("spans", spans)
                .finish(),
            // header values often carry collector credentials
            LogType::Otel {
                endpoint,
                proto,
                headers,
            } => f
                .debug_struct("Otel")
                .field("endpoint", endpoint)
                .field("proto", proto)
                .field(
                    "headers",
                    &headers
                        .keys()
                        .map(|k| (k.as_str(), REDACTED))
                        .collect::<BTreeMap<_, _>>(),
                )
                .finish(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_sample_rate")]
    pub span_sample_rate: f32,
    #[serde(default = "default_sinks")]
    pub sinks: Vec<LogSink>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f32 {
    1.0
}

fn default_sinks() -> Vec<LogSink> {
    vec![LogSink {
        dest: LogType::Stdout {
            color: true,
            json: false,
            spans: true,
        },
    }]
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            span_sample_rate: default_sample_rate(),
            sinks: default_sinks(),
        }
    }
}

impl LoggingConfig {
    /// Validates the logging configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            anyhow::bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        if !(0.0..=1.0).contains(&self.span_sample_rate) {
            anyhow::bail!(
                "span_sample_rate must be between 0.0 and 1.0, got {}",
                self.span_sample_rate
            );
        }

        Ok(())
    }
}

impl SyncConfig {
    /// Loads the yaml config at `path`, with `ORG_SYNC__*` environment
    /// variables layered on top
    pub fn load(path: &PathBuf) -> Result<SyncConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let mut sync_cfg: SyncConfig = cfg.try_deserialize()?;
        sync_cfg.assign_provider_ids();
        sync_cfg.validate()?;

        Ok(sync_cfg)
    }

    /// Parses a yaml document without touching the filesystem or env
    pub fn from_yaml(yaml: &str) -> Result<SyncConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        let mut sync_cfg: SyncConfig = cfg.try_deserialize()?;
        sync_cfg.assign_provider_ids();
        sync_cfg.validate()?;

        Ok(sync_cfg)
    }

    fn assign_provider_ids(&mut self) {
        for (id, provider) in self.providers.iter_mut() {
            provider.id = id.clone();
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.logging.validate()?;

        for provider in self.providers.values() {
            provider.validate()?;
        }

        Ok(())
    }

    /// Provider configs in stable id order
    pub fn provider_configs(&self) -> Vec<PingIdentityProviderConfig> {
        self.providers.values().cloned().collect()
    }
}
