//! Webhook Dispatcher (C4): a long-lived HTTP client posting typed events
//! to endpoints chosen by event kind.

use olympus_common::{JobId, UserId};
use serde::Serialize;

use crate::config::WebhookConfig;
use crate::verdict::{PassedJudgment, UnpassedJudgment, Verdict};

/// Per-case result posted to the verdict endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResultEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Sent to the error endpoint on any system failure (spec §7).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub job_id: JobId,
    pub detail: String,
}

/// Sent to the error endpoint when a job is respected as cancelled at
/// supervisor start (spec §9 open-question resolution: no mid-stream poll).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCancellationEvent {
    pub job_id: JobId,
    pub user_id: UserId,
}

/// The five event kinds the supervisor may push, each routed by variant to
/// one of the three configured endpoints (spec §4.4).
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    TestCaseResult(TestCaseResultEvent),
    PassedJudgment(PassedJudgment),
    UnpassedJudgment(UnpassedJudgment),
    Error(ErrorEvent),
    JobCancellation(JobCancellationEvent),
}

impl ErrorEvent {
    pub fn new(job_id: JobId, detail: impl Into<String>) -> Self {
        ErrorEvent {
            job_id,
            detail: detail.into(),
        }
    }
}

/// Long-lived HTTP client dispatching webhook callbacks. One instance per
/// worker, shared across jobs (spec §5: "one per job invocation" refers to
/// the supervisor's logical session; the underlying connection pool is the
/// reused resource).
pub struct WebhookDispatcher {
    client: reqwest::Client,
    verdict_endpoint: String,
    submission_result_endpoint: String,
    error_endpoint: String,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(WebhookDispatcher {
            client,
            verdict_endpoint: config.verdict_endpoint.clone(),
            submission_result_endpoint: config.submission_result_endpoint.clone(),
            error_endpoint: config.error_endpoint.clone(),
        })
    }

    fn endpoint_for(&self, event: &WebhookEvent) -> &str {
        match event {
            WebhookEvent::TestCaseResult(_) => &self.verdict_endpoint,
            WebhookEvent::PassedJudgment(_) | WebhookEvent::UnpassedJudgment(_) => {
                &self.submission_result_endpoint
            }
            WebhookEvent::Error(_) | WebhookEvent::JobCancellation(_) => &self.error_endpoint,
        }
    }

    /// POST the event's JSON body to its endpoint. Returns the HTTP status
    /// code on 2xx, or the status code on a non-2xx response, or `500` if
    /// the transport itself failed. Never retries — the supervisor decides
    /// what a non-200 means.
    pub async fn dispatch_webhook_callback(&self, event: &WebhookEvent) -> u16 {
        let url = self.endpoint_for(event);
        let body_result = match event {
            WebhookEvent::TestCaseResult(e) => serde_json::to_value(e),
            WebhookEvent::PassedJudgment(e) => serde_json::to_value(e),
            WebhookEvent::UnpassedJudgment(e) => serde_json::to_value(e),
            WebhookEvent::Error(e) => serde_json::to_value(e),
            WebhookEvent::JobCancellation(e) => serde_json::to_value(e),
        };
        let body = match body_result {
            Ok(b) => b,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize webhook event");
                return 500;
            }
        };

        let status = match self.client.post(url).json(&body).send().await {
            Ok(response) => response.status().as_u16(),
            Err(err) => {
                tracing::warn!(error = %err, url, "webhook dispatch failed");
                err.status().map(|s| s.as_u16()).unwrap_or(500)
            }
        };
        crate::metrics::record_webhook_dispatch(status);
        status
    }

    /// Releases the underlying connection pool. Called at worker shutdown
    /// once the dispatcher's last `Arc` owner is gone (spec §4.6 cleanup:
    /// "close the webhook session").
    pub fn shutdown(self) {
        drop(self.client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WebhookConfig {
        WebhookConfig {
            verdict_endpoint: "http://localhost:9/verdict".to_string(),
            submission_result_endpoint: "http://localhost:9/submission-result".to_string(),
            error_endpoint: "http://localhost:9/error".to_string(),
        }
    }

    #[test]
    fn endpoint_selection_matches_event_kind() {
        let dispatcher = WebhookDispatcher::new(&config()).unwrap();
        let job_id = JobId::nil();

        let tc = WebhookEvent::TestCaseResult(TestCaseResultEvent {
            job_id,
            verdict: Verdict::pass(1, 10, 1.0),
        });
        assert_eq!(dispatcher.endpoint_for(&tc), "http://localhost:9/verdict");

        let err = WebhookEvent::Error(ErrorEvent::new(job_id, "Internal server error"));
        assert_eq!(dispatcher.endpoint_for(&err), "http://localhost:9/error");

        let cancel = WebhookEvent::JobCancellation(JobCancellationEvent { job_id, user_id: 1 });
        assert_eq!(dispatcher.endpoint_for(&cancel), "http://localhost:9/error");
    }

    #[tokio::test]
    async fn dispatch_to_unreachable_host_returns_500() {
        let dispatcher = WebhookDispatcher::new(&config()).unwrap();
        let event = WebhookEvent::Error(ErrorEvent::new(JobId::nil(), "Internal server error"));
        let status = dispatcher.dispatch_webhook_callback(&event).await;
        assert_eq!(status, 500);
    }
}
