//! System-failure taxonomy for the judgment supervisor (spec §7).
//!
//! These are distinct from [`olympus_common::AppError`]: that type models
//! generic service errors (cache, validation, I/O); `SupervisorError`
//! classifies exactly the failures that cause a job to be torn down with an
//! `Error` webhook instead of completing with a final Judgment.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The sandbox emitted output that doesn't fit the line protocol.
    #[error("unexpected sandbox output: {0}")]
    UnexpectedOutput(String),

    /// The runner reported `status: "systemError"`.
    #[error("sandbox system error: {0}")]
    SandboxSystemError(String),

    /// A webhook call returned non-200, or failed at the transport level.
    #[error("webhook dispatch failed with status {0}")]
    WebhookFailed(u16),

    /// The job record vanished from the store mid-run.
    #[error("job {0} missing from store")]
    JobMissing(olympus_common::JobId),

    /// A Limits Catalog lookup had no entry for the requested key.
    #[error("config missing: {0}")]
    ConfigMissing(String),

    /// The job store transport failed after exhausting its retry budget.
    #[error("job store error: {0}")]
    StoreError(String),

    /// A pass-marked verdict lacked `memoryUsedMb`/`elapsedTimeMs`.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Sandbox process could not be spawned or interacted with.
    #[error("sandbox process error: {0}")]
    SandboxProcess(#[from] std::io::Error),
}

impl SupervisorError {
    /// Opaque detail string sent in the `Error` webhook event. Internal
    /// detail is preserved for logging but never echoed to the receiver
    /// beyond this fixed message (spec §7: default `"Internal server error"`).
    pub fn webhook_detail(&self) -> &'static str {
        "Internal server error"
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
