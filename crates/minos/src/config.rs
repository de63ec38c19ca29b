//! Configuration for the judgment worker.

use std::env;
use std::path::PathBuf;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (development, staging, production)
    pub environment: String,

    /// Redis connection URL, backing both the task stream and the job store.
    pub redis_url: String,

    /// Worker ID for the stream consumer group.
    pub worker_id: String,

    /// Consumer group name.
    pub consumer_group: String,

    /// Stream name jobs are delivered on.
    pub stream_name: String,

    /// Block timeout for XREADGROUP (milliseconds).
    pub block_timeout_ms: usize,

    /// Maximum retries before sending to the dead-letter queue.
    pub max_retries: u32,

    /// Prometheus metrics port.
    pub metrics_port: u16,

    /// TTL (seconds) applied to job records in the external store.
    pub job_ttl_seconds: u64,

    pub limits: LimitsConfig,
    pub sandbox: SandboxConfig,
    pub webhook: WebhookConfig,
}

/// Where the Limits Catalog (C1) loads its static mappings from.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Directory containing `test_cases.json`, `time_limits.json`,
    /// `memory_limits.json`, `language_bonuses.json`.
    pub data_dir: PathBuf,
}

/// Sandbox Command Builder (C2) parameters that are deployment-specific
/// rather than per-job.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Path to the directory holding per-language runner scripts, each
    /// named `run.sh` under a language subdirectory.
    pub runners_dir: PathBuf,

    /// Seccomp profile applied to every sandbox container.
    pub seccomp_profile: PathBuf,

    /// Fraction of a CPU core granted to the sandbox (`--cpus`).
    pub cpu_fraction: f64,

    /// Container image used to run the sandbox.
    pub image: String,
}

/// The three webhook endpoints the Webhook Dispatcher (C4) posts to.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub verdict_endpoint: String,
    pub submission_result_endpoint: String,
    pub error_endpoint: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            worker_id: env::var("WORKER_ID").unwrap_or_else(|_| {
                format!("minos_worker_{}", uuid::Uuid::new_v4().to_string().split('-').next().unwrap())
            }),
            consumer_group: env::var("CONSUMER_GROUP").unwrap_or_else(|_| "minos_group".to_string()),
            stream_name: env::var("STREAM_NAME").unwrap_or_else(|_| "run_queue".to_string()),
            block_timeout_ms: env::var("BLOCK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9091),
            job_ttl_seconds: env::var("JOB_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            limits: LimitsConfig {
                data_dir: PathBuf::from(
                    env::var("LIMITS_DATA_DIR").unwrap_or_else(|_| "/etc/minos/limits".to_string()),
                ),
            },
            sandbox: SandboxConfig {
                runners_dir: PathBuf::from(
                    env::var("RUNNERS_DIR").unwrap_or_else(|_| "/opt/minos/runners".to_string()),
                ),
                seccomp_profile: PathBuf::from(
                    env::var("SECCOMP_PROFILE")
                        .unwrap_or_else(|_| "/etc/minos/seccomp.json".to_string()),
                ),
                cpu_fraction: env::var("SANDBOX_CPU_FRACTION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.5),
                image: env::var("SANDBOX_IMAGE")
                    .unwrap_or_else(|_| "olympus/minos-sandbox:latest".to_string()),
            },
            webhook: WebhookConfig {
                verdict_endpoint: env::var("WEBHOOK_VERDICT_ENDPOINT")
                    .expect("WEBHOOK_VERDICT_ENDPOINT must be set"),
                submission_result_endpoint: env::var("WEBHOOK_SUBMISSION_RESULT_ENDPOINT")
                    .expect("WEBHOOK_SUBMISSION_RESULT_ENDPOINT must be set"),
                error_endpoint: env::var("WEBHOOK_ERROR_ENDPOINT")
                    .expect("WEBHOOK_ERROR_ENDPOINT must be set"),
            },
        }
    }
}
