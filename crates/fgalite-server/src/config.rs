use serde::Deserialize;
use std::path::Path;

use crate::service::TupleLimits;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub engine: EngineConfigValues,
    pub model_limits: ModelLimitsConfig,
    pub tuples: TuplesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfigValues {
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelLimitsConfig {
    pub max_types: usize,
    pub max_relations_per_type: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuplesConfig {
    pub max_tuples_per_write: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Fail duplicate writes and missing deletes unless a request says otherwise.
    pub strict_writes: bool,
    /// Transactions a snapshot stays readable for before deleted tuples are pruned.
    pub snapshot_retention: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for EngineConfigValues {
    fn default() -> Self {
        Self { max_depth: 25 }
    }
}

impl Default for ModelLimitsConfig {
    fn default() -> Self {
        Self {
            max_types: 50,
            max_relations_per_type: 30,
        }
    }
}

impl Default for TuplesConfig {
    fn default() -> Self {
        Self {
            max_tuples_per_write: 100,
            default_page_size: 50,
            max_page_size: 100,
            strict_writes: false,
            snapshot_retention: 1000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FGALITE_HTTP_HOST") {
            self.http.host = v;
        }
        if let Ok(v) = std::env::var("FGALITE_HTTP_PORT")
            && let Ok(port) = v.parse()
        {
            self.http.port = port;
        }
        if let Ok(v) = std::env::var("FGALITE_ENGINE_MAX_DEPTH")
            && let Ok(n) = v.parse()
        {
            self.engine.max_depth = n;
        }
        if let Ok(v) = std::env::var("FGALITE_MAX_TUPLES_PER_WRITE")
            && let Ok(n) = v.parse()
        {
            self.tuples.max_tuples_per_write = n;
        }
        if let Ok(v) = std::env::var("FGALITE_STRICT_WRITES")
            && let Ok(b) = v.parse()
        {
            self.tuples.strict_writes = b;
        }
        if let Ok(v) = std::env::var("FGALITE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("FGALITE_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("http.port", self.http.port as usize),
            ("engine.max_depth", self.engine.max_depth),
            ("model_limits.max_types", self.model_limits.max_types),
            (
                "model_limits.max_relations_per_type",
                self.model_limits.max_relations_per_type,
            ),
            (
                "tuples.max_tuples_per_write",
                self.tuples.max_tuples_per_write,
            ),
            ("tuples.default_page_size", self.tuples.default_page_size),
            ("tuples.max_page_size", self.tuples.max_page_size),
            ("tuples.snapshot_retention", self.tuples.snapshot_retention),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!("{name} must be non-zero")));
        }
        if self.tuples.default_page_size > self.tuples.max_page_size {
            return Err(ConfigError::Validation(
                "tuples.default_page_size must not exceed tuples.max_page_size".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_engine_config(&self) -> fgalite_core::engine::EngineConfig {
        fgalite_core::engine::EngineConfig {
            max_depth: self.engine.max_depth,
        }
    }

    pub fn to_model_limits(&self) -> fgalite_core::model::ModelLimits {
        fgalite_core::model::ModelLimits {
            max_types: self.model_limits.max_types,
            max_relations_per_type: self.model_limits.max_relations_per_type,
        }
    }

    pub fn to_tuple_limits(&self) -> TupleLimits {
        TupleLimits {
            max_tuples_per_write: self.tuples.max_tuples_per_write,
            default_page_size: self.tuples.default_page_size,
            max_page_size: self.tuples.max_page_size,
            strict_writes: self.tuples.strict_writes,
            snapshot_retention: self.tuples.snapshot_retention,
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}
