//! Redis Stream consumer: pulls jobs off the queue and drives them through
//! the [`JudgmentSupervisor`] (spec §6.1 inbound transport).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use deadpool_redis::redis;

use crate::config::Config;
use crate::job::Job;
use crate::supervisor::JudgmentSupervisor;

/// Idle time after which a pending message is considered abandoned and
/// reclaimed by this consumer.
const RECLAIM_IDLE_MS: usize = 60_000;

pub struct JudgeConsumer {
    config: Config,
    redis_pool: deadpool_redis::Pool,
    shutdown: Arc<AtomicBool>,
    supervisor: Arc<JudgmentSupervisor>,
}

impl JudgeConsumer {
    pub fn new(
        config: Config,
        redis_pool: deadpool_redis::Pool,
        shutdown: Arc<AtomicBool>,
        supervisor: Arc<JudgmentSupervisor>,
    ) -> Self {
        Self {
            config,
            redis_pool,
            shutdown,
            supervisor,
        }
    }

    /// Creates the consumer group if it doesn't already exist.
    pub async fn initialize(&self) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    group = %self.config.consumer_group,
                    stream = %self.config.stream_name,
                    "created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                tracing::debug!("consumer group already exists");
            }
            Err(e) => return Err(anyhow!("failed to create consumer group: {e}")),
        }

        Ok(())
    }

    /// Drives the consumer loop until the shutdown flag is set.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            worker = %self.config.worker_id,
            group = %self.config.consumer_group,
            "starting judge consumer"
        );

        self.claim_pending_messages().await?;

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "error processing job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::info!("judge consumer shutting down");
        Ok(())
    }

    /// Reclaims messages abandoned by dead consumers (idle beyond
    /// [`RECLAIM_IDLE_MS`]).
    async fn claim_pending_messages(&self) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;

        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(10)
            .query_async(&mut *conn)
            .await
            .unwrap_or_default();

        for (message_id, _consumer, idle_time, _delivery_count) in pending {
            if idle_time as usize > RECLAIM_IDLE_MS {
                tracing::info!(%message_id, "claiming abandoned message");
                let _: Result<(), _> = redis::cmd("XCLAIM")
                    .arg(&self.config.stream_name)
                    .arg(&self.config.consumer_group)
                    .arg(&self.config.worker_id)
                    .arg(RECLAIM_IDLE_MS)
                    .arg(&message_id)
                    .query_async(&mut *conn)
                    .await;
            }
        }

        Ok(())
    }

    /// Reads and processes one message, returning `false` if none was
    /// available within the block timeout.
    async fn process_next_job(&self) -> Result<bool> {
        let mut conn = self.redis_pool.get().await?;

        let result: Vec<redis::Value> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.worker_id)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut *conn)
            .await?;

        if result.is_empty() {
            return Ok(false);
        }

        let (message_id, retry_count, job) = parse_stream_message(&result)?;

        tracing::info!(%message_id, job_id = %job.job_id, "processing job");

        match self.supervisor.run(job.clone()).await {
            Ok(()) => {
                self.ack_message(&message_id).await?;
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "judgment failed");
                if retry_count < self.config.max_retries {
                    self.retry_job(&job, retry_count, &e.to_string()).await?;
                } else {
                    self.send_to_dead_letter(&job, retry_count, &e.to_string())
                        .await?;
                }
                self.ack_message(&message_id).await?;
            }
        }

        Ok(true)
    }

    async fn ack_message(&self, message_id: &str) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<i64>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn retry_job(&self, job: &Job, retry_count: u32, error: &str) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;
        tracing::warn!(
            job_id = %job.job_id,
            attempt = retry_count + 1,
            max_retries = self.config.max_retries,
            %error,
            "retrying job"
        );

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(payload)
            .arg("retryCount")
            .arg((retry_count + 1).to_string())
            .query_async::<String>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn send_to_dead_letter(&self, job: &Job, retry_count: u32, error: &str) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;
        tracing::error!(job_id = %job.job_id, %error, "sending job to dead letter queue");

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg("run_queue_dlq")
            .arg("*")
            .arg("job")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("retryCount")
            .arg(retry_count.to_string())
            .arg("failedAt")
            .arg(chrono::Utc::now().to_rfc3339())
            .query_async::<String>(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Parses a single `XREADGROUP` reply of shape
/// `[[stream, [[id, [field, value, ...]]]]]` into `(message_id, retry_count, Job)`.
fn parse_stream_message(result: &[redis::Value]) -> Result<(String, u32, Job)> {
    let stream_data = match result.first() {
        Some(redis::Value::Array(data)) => data,
        _ => return Err(anyhow!("invalid stream response format")),
    };
    let messages = match stream_data.get(1) {
        Some(redis::Value::Array(msgs)) => msgs,
        _ => return Err(anyhow!("no messages in response")),
    };
    let message = match messages.first() {
        Some(redis::Value::Array(msg)) => msg,
        _ => return Err(anyhow!("no message data")),
    };
    let message_id = match message.first() {
        Some(redis::Value::BulkString(id)) => String::from_utf8_lossy(id).to_string(),
        _ => return Err(anyhow!("invalid message id")),
    };
    let fields = match message.get(1) {
        Some(redis::Value::Array(f)) => f,
        _ => return Err(anyhow!("no message fields")),
    };

    let mut field_map = std::collections::HashMap::new();
    for chunk in fields.chunks(2) {
        if let [redis::Value::BulkString(key), redis::Value::BulkString(value)] = chunk {
            field_map.insert(
                String::from_utf8_lossy(key).to_string(),
                String::from_utf8_lossy(value).to_string(),
            );
        }
    }

    let job_payload = field_map
        .get("job")
        .ok_or_else(|| anyhow!("missing job field"))?;
    let job: Job = serde_json::from_str(job_payload)?;
    let retry_count = field_map
        .get("retryCount")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Ok((message_id, retry_count, job))
}
