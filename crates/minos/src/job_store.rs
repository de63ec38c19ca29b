//! Job Store Gateway (C5): a thin, retrying accessor over the external TTL
//! key-value store, keyed `{userId}:{jobId}` (spec §4.5, §6.4).

use std::future::Future;
use std::time::Duration;

use deadpool_redis::{redis, Pool};
use olympus_common::{JobId, UserId};
use redis::AsyncCommands;

use crate::error::{SupervisorError, SupervisorResult};
use crate::job::Job;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Retries `f` up to [`MAX_ATTEMPTS`] times with a 0.5s→1.0s doubling
/// backoff, mirroring the original store repository's retry wrapper.
async fn with_retry<F, Fut, T>(mut f: F) -> SupervisorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SupervisorResult<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "job store operation failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns within MAX_ATTEMPTS iterations")
}

fn store_key(user_id: UserId, job_id: JobId) -> String {
    format!("{user_id}:{job_id}")
}

/// Accessor over the external Redis-backed TTL store. Initialized once at
/// worker startup and passed around as an injected dependency (spec §9).
pub struct JobStoreGateway {
    pool: Pool,
}

impl JobStoreGateway {
    pub fn new(pool: Pool) -> Self {
        JobStoreGateway { pool }
    }

    async fn connection(&self) -> SupervisorResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| SupervisorError::StoreError(e.to_string()))
    }

    /// Scans for `*:{jobId}` and returns the matching job, if any.
    pub async fn find_by_job_id(&self, job_id: JobId) -> SupervisorResult<Option<Job>> {
        with_retry(|| async {
            let mut conn = self.connection().await?;
            let pattern = format!("*:{job_id}");
            let mut iter: redis::AsyncIter<'_, String> = conn
                .scan_match(&pattern)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            let key = iter.next_item().await;
            drop(iter);
            match key {
                Some(key) => {
                    let raw: Option<String> = conn
                        .get(&key)
                        .await
                        .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
                    decode_job(raw)
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn find_by_user_and_job(
        &self,
        user_id: UserId,
        job_id: JobId,
    ) -> SupervisorResult<Option<Job>> {
        with_retry(|| async {
            let mut conn = self.connection().await?;
            let key = store_key(user_id, job_id);
            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            decode_job(raw)
        })
        .await
    }

    /// `SETEX` the job under `{userId}:{jobId}`. Returns `true` on success.
    pub async fn save(&self, user_id: UserId, job: &Job, ttl_seconds: u64) -> SupervisorResult<bool> {
        with_retry(|| async {
            let mut conn = self.connection().await?;
            let key = store_key(user_id, job.job_id);
            let encoded = serde_json::to_string(job)
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            let _: () = conn
                .set_ex(&key, encoded, ttl_seconds)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            Ok(true)
        })
        .await
    }

    /// Reads the current TTL, applies `patch`, and writes the job back
    /// preserving that TTL. Returns `-1` if the job no longer exists.
    pub async fn update(
        &self,
        user_id: UserId,
        job_id: JobId,
        patch: impl Fn(&mut Job) + Send + Sync,
    ) -> SupervisorResult<i64> {
        with_retry(|| async {
            let mut conn = self.connection().await?;
            let key = store_key(user_id, job_id);

            let ttl: i64 = redis::cmd("TTL")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            if ttl == -2 {
                return Ok(-1);
            }
            if ttl == -1 {
                // A job key with no TTL should never happen; treat it as
                // corrupt and drop it rather than updating it forever.
                let _: i64 = conn
                    .del(&key)
                    .await
                    .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
                return Ok(-1);
            }
            let ttl = ttl as u64;

            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            let Some(mut job) = decode_job(raw)? else {
                return Ok(-1);
            };
            patch(&mut job);

            let encoded = serde_json::to_string(&job)
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            let _: () = conn
                .set_ex(&key, encoded, ttl)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            Ok(1)
        })
        .await
    }

    /// Deletes the job, idempotently: deleting a non-existent record is a
    /// no-op that returns `0` (spec §6.1).
    pub async fn delete(&self, user_id: UserId, job_id: JobId) -> SupervisorResult<i64> {
        with_retry(|| async {
            let mut conn = self.connection().await?;
            let key = store_key(user_id, job_id);
            let count: i64 = conn
                .del(&key)
                .await
                .map_err(|e| SupervisorError::StoreError(e.to_string()))?;
            Ok(count)
        })
        .await
    }
}

fn decode_job(raw: Option<String>) -> SupervisorResult<Option<Job>> {
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| SupervisorError::StoreError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olympus_common::CodeLanguage;

    fn sample_job() -> Job {
        Job {
            job_id: JobId::nil(),
            user_id: 7,
            challenge_id: 1,
            code_language: CodeLanguage::Python3,
            code: "cHJpbnQoMSk=".to_string(),
            submitted_at: "2026-01-01T00:00:00".to_string(),
            total_test_cases: 2,
            stop_flag: false,
            last_test_case_index: None,
            verdicts: vec![],
        }
    }

    #[test]
    fn store_key_is_user_colon_job() {
        let job = sample_job();
        assert_eq!(store_key(7, job.job_id), format!("7:{}", job.job_id));
    }

    #[test]
    fn decode_job_handles_missing_key() {
        assert!(decode_job(None).unwrap().is_none());
    }

    #[test]
    fn decode_job_parses_json() {
        let job = sample_job();
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded = decode_job(Some(encoded)).unwrap().unwrap();
        assert_eq!(decoded.job_id, job.job_id);
    }
}
