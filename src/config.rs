use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub order_processing: OrderProcessingConfig,
    #[serde(default)]
    pub dex: DexConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `production` hides internal error messages from API responses
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Worker pool and job-level retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs processed simultaneously
    pub concurrency: usize,
    /// Jobs started per `interval_ms` window
    pub max_jobs_per_interval: usize,
    pub interval_ms: u64,
    /// Whole-job attempts before the job is dead
    pub attempts: u32,
    /// Base delay of the job-level exponential backoff
    pub backoff_ms: u64,
    /// Idle poll interval when the queue is empty
    pub poll_interval_ms: u64,
    /// Active jobs locked longer than this are redelivered
    pub stalled_after_ms: u64,
    pub remove_completed_after_secs: u64,
    pub remove_failed_after_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_jobs_per_interval: 100,
            interval_ms: 60_000,
            attempts: 3,
            backoff_ms: 1000,
            poll_interval_ms: 250,
            stalled_after_ms: 120_000,
            remove_completed_after_secs: 3600,
            remove_failed_after_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderProcessingConfig {
    /// Attempts per venue call (quote fetch, swap execution)
    pub max_retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Simulated transaction assembly latency
    pub build_delay_ms: u64,
    /// Deadline for the quote and execute steps, retries included
    pub step_timeout_ms: u64,
}

impl Default for OrderProcessingConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_backoff_ms: 1000,
            build_delay_ms: 500,
            step_timeout_ms: 30_000,
        }
    }
}

impl OrderProcessingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

/// Simulated venue latencies
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DexConfig {
    pub raydium_network_delay_ms: u64,
    pub meteora_network_delay_ms: u64,
    pub swap_execution_delay_ms: u64,
    /// Upper bound of the random extra execution latency
    pub swap_execution_jitter_ms: u64,
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            raydium_network_delay_ms: 200,
            meteora_network_delay_ms: 200,
            swap_execution_delay_ms: 2000,
            swap_execution_jitter_ms: 1000,
        }
    }
}

/// Ingress throttling per client address
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rotated log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("server.environment", default_environment())?
            .set_default("database.url", "postgres://localhost/swapflow")?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SWAPFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SWAPFLOW__QUEUE__CONCURRENCY, etc.)
            .add_source(
                Environment::with_prefix("SWAPFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            // Conventional platform variables win over everything else
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option(
                "server.port",
                std::env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .map(i64::from),
            )?;

        builder.build()?.try_deserialize()
    }

    /// Configuration for local runs and tests: no simulated latency beyond
    /// what is needed to exercise the pipeline.
    pub fn local() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                environment: "test".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/swapflow".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            queue: QueueConfig {
                poll_interval_ms: 10,
                backoff_ms: 10,
                ..QueueConfig::default()
            },
            order_processing: OrderProcessingConfig {
                retry_backoff_ms: 5,
                build_delay_ms: 0,
                ..OrderProcessingConfig::default()
            },
            dex: DexConfig {
                raydium_network_delay_ms: 0,
                meteora_network_delay_ms: 0,
                swap_execution_delay_ms: 0,
                swap_execution_jitter_ms: 0,
            },
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.queue.concurrency == 0 {
            errors.push("queue.concurrency must be at least 1".to_string());
        }

        if self.queue.max_jobs_per_interval == 0 || self.queue.interval_ms == 0 {
            errors.push(
                "queue.max_jobs_per_interval and queue.interval_ms must be positive".to_string(),
            );
        }

        if self.queue.attempts == 0 {
            errors.push("queue.attempts must be at least 1".to_string());
        }

        if self.order_processing.max_retry_attempts == 0 {
            errors.push("order_processing.max_retry_attempts must be at least 1".to_string());
        }

        if self.order_processing.step_timeout_ms == 0 {
            errors.push("order_processing.step_timeout_ms must be positive".to_string());
        }

        // Routing and execution each run under step_timeout_ms
        let longest_job = self
            .order_processing
            .step_timeout_ms
            .saturating_mul(2)
            .saturating_add(self.order_processing.build_delay_ms);
        if self.queue.stalled_after_ms <= longest_job {
            errors.push(format!(
                "queue.stalled_after_ms ({}) must exceed two step timeouts plus the build delay ({})",
                self.queue.stalled_after_ms, longest_job
            ));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            errors.push("rate_limit.max_requests and rate_limit.window_secs must be positive".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
