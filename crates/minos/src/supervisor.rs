//! Judgment Supervisor (C6): the orchestrator that drives one job from
//! queue delivery to final judgment (spec §4.6).

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use olympus_common::{JobId, UserId};
use rand::seq::SliceRandom;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::config::{Config, SandboxConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::job::{Job, TestCase};
use crate::job_store::JobStoreGateway;
use crate::limits::LimitsCatalog;
use crate::sandbox::{self, SandboxRequest};
use crate::verdict::{FailureCause, Judgment, JudgmentIdentity, LineOutcome, StreamParser, Verdict};
use crate::webhook::{
    ErrorEvent, JobCancellationEvent, TestCaseResultEvent, WebhookDispatcher, WebhookEvent,
};

/// Orchestrates one job's sandbox lifecycle end to end. One instance is
/// shared across all concurrently running jobs in this worker; its
/// collaborators (C1, C4, C5) are injected dependencies, not globals
/// (spec §9).
pub struct JudgmentSupervisor {
    limits: Arc<LimitsCatalog>,
    store: Arc<JobStoreGateway>,
    webhook: Arc<WebhookDispatcher>,
    sandbox_config: SandboxConfig,
}

impl JudgmentSupervisor {
    pub fn new(
        config: &Config,
        limits: Arc<LimitsCatalog>,
        store: Arc<JobStoreGateway>,
        webhook: Arc<WebhookDispatcher>,
    ) -> Self {
        JudgmentSupervisor {
            limits,
            store,
            webhook,
            sandbox_config: config.sandbox.clone(),
        }
    }

    /// Runs one job to completion. Never leaves the scratch directory or
    /// the sandbox process behind, and always either deletes the job
    /// record or returns an error indicating the queue should retry.
    pub async fn run(&self, job: Job) -> SupervisorResult<()> {
        let user_id = job.user_id;
        let job_id = job.job_id;

        if job.stop_flag {
            tracing::info!(%job_id, "job carries stop_flag at start, treating as cancelled");
            let event = WebhookEvent::JobCancellation(JobCancellationEvent { job_id, user_id });
            self.webhook.dispatch_webhook_callback(&event).await;
            self.store.delete(user_id, job_id).await.ok();
            return Ok(());
        }

        crate::metrics::ACTIVE_JOBS.inc();
        let result = self.run_inner(&job).await;
        crate::metrics::ACTIVE_JOBS.dec();

        match result {
            Ok(()) => {
                crate::metrics::JOBS_JUDGED.inc();
                Ok(())
            }
            Err(err) => {
                tracing::error!(%job_id, error = %err, "judgment supervisor aborted");
                crate::metrics::JOBS_ABORTED.inc();
                let event = WebhookEvent::Error(ErrorEvent::new(job_id, err.webhook_detail()));
                self.webhook.dispatch_webhook_callback(&event).await;
                self.store.delete(user_id, job_id).await.ok();
                Err(err)
            }
        }
    }

    async fn run_inner(&self, job: &Job) -> SupervisorResult<()> {
        let user_id = job.user_id;
        let job_id = job.job_id;

        let (code_text, code_byte_size) = job
            .decode_code()
            .map_err(|e| SupervisorError::ContractViolation(format!("bad code payload: {e}")))?;

        let base_test_cases = self.limits.get_test_cases(job.challenge_id)?;
        let mut test_cases: Vec<TestCase> = base_test_cases.to_vec();
        test_cases.shuffle(&mut rand::rng());

        let time_limit_sec = self
            .limits
            .get_time_limit(job.challenge_id, job.code_language)?;
        let memory_limit_mb = self
            .limits
            .get_memory_limit(job.challenge_id, job.code_language)?;

        let scratch = tempfile::tempdir().map_err(SupervisorError::SandboxProcess)?;
        let code_path = scratch.path().join(job.code_language.source_filename());
        tokio::fs::write(&code_path, &code_text)
            .await
            .map_err(SupervisorError::SandboxProcess)?;

        let invocation = sandbox::build_invocation(
            &self.sandbox_config,
            &SandboxRequest {
                scratch_dir: scratch.path(),
                code_file_path: &code_path,
                language: job.code_language,
                test_cases: &test_cases,
                time_limit_sec,
                memory_limit_mb,
            },
        )
        .map_err(|e| SupervisorError::ContractViolation(e.to_string()))?;

        let compile_bonus = if job.code_language.is_compiled() { 5.0 } else { 0.0 };
        let deadline =
            Duration::from_secs_f64(test_cases.len() as f64 * time_limit_sec + compile_bonus + 3.0);

        let sandbox_started = std::time::Instant::now();
        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::SandboxProcess)?;

        let stdout = child.stdout.take().expect("sandbox stdout is piped");
        let stderr = child.stderr.take().expect("sandbox stderr is piped");

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<LineOutcome>();
        let stdout_task = tokio::spawn(async move {
            let mut parser = StreamParser::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(outcome) = parser.feed_stdout(&line) {
                    let terminal = matches!(outcome, LineOutcome::SystemError(_));
                    if outcome_tx.send(outcome).is_err() || terminal {
                        break;
                    }
                }
            }
            parser.finish()
        });

        let stderr_unexpected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let stderr_unexpected_writer = stderr_unexpected.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    stderr_unexpected_writer.lock().await.push(line);
                }
            }
        });

        let cleanup = Arc::new(AtomicBool::new(false));
        let mut verdicts: Vec<Verdict> = Vec::new();
        let mut system_error: Option<String> = None;
        let mut dispatch_handles = Vec::new();

        let drain = tokio::time::timeout(deadline, async {
            while let Some(outcome) = outcome_rx.recv().await {
                match outcome {
                    LineOutcome::Verdict(v) => {
                        if let Some(memory_used_mb) = v.memory_used_mb {
                            crate::metrics::CASE_MEMORY_USED_MB
                                .with_label_values(&[&job.code_language.to_string()])
                                .observe(memory_used_mb);
                        }
                        verdicts.push(v.clone());
                        let event = WebhookEvent::TestCaseResult(TestCaseResultEvent {
                            job_id,
                            verdict: v,
                        });
                        let webhook = self.webhook.clone();
                        let cleanup_flag = cleanup.clone();
                        dispatch_handles.push(tokio::spawn(async move {
                            let status = webhook.dispatch_webhook_callback(&event).await;
                            if status != 200 {
                                cleanup_flag.store(true, Ordering::SeqCst);
                            }
                        }));
                    }
                    LineOutcome::SystemError(e) => {
                        system_error = Some(e);
                        break;
                    }
                }
                if cleanup.load(Ordering::SeqCst) {
                    break;
                }
            }
        })
        .await;

        let timed_out = drain.is_err();

        // Whatever happened, the sandbox must not outlive this job.
        let _ = child.start_kill();
        let exit_status = child.wait().await.ok();
        crate::metrics::record_sandbox_duration(
            &job.code_language.to_string(),
            sandbox_started.elapsed().as_secs_f64(),
        );
        stdout_task.abort();
        stderr_task.abort();
        let unexpected_from_stdout = stdout_task.await.ok().flatten();
        let stderr_lines = stderr_unexpected.lock().await.clone();

        for handle in dispatch_handles {
            let _ = handle.await;
        }

        if let Some(error) = system_error {
            tracing::warn!(%job_id, %error, "sandbox reported systemError");
            return Err(SupervisorError::SandboxSystemError(error));
        }
        if cleanup.load(Ordering::SeqCst) {
            return Err(SupervisorError::WebhookFailed(0));
        }
        let mut unexpected_lines = stderr_lines;
        if let Some(extra) = unexpected_from_stdout {
            unexpected_lines.push(extra);
        }
        if !unexpected_lines.is_empty() {
            return Err(SupervisorError::UnexpectedOutput(unexpected_lines.join("\n")));
        }

        self.classify_termination(&mut verdicts, timed_out, exit_status, job_id)
            .await?;

        let identity = JudgmentIdentity {
            user_id,
            job_id,
            challenge_id: job.challenge_id,
            code_language: job.code_language,
            code: job.code.clone(),
            code_byte_size,
            submitted_at: job.submitted_at.clone(),
        };
        // N=0 test cases: the sandbox produces no verdicts at all. That's
        // a pass with zero maxima, not a contract violation (spec §8).
        let judgment = match Judgment::aggregate(identity.clone(), &verdicts) {
            Some(j) => j,
            None if verdicts.is_empty() => Judgment::Passed(crate::verdict::PassedJudgment {
                identity,
                max_memory_used_mb: 0.0,
                max_elapsed_time_ms: 0,
            }),
            None => unreachable!("aggregate only returns None for empty verdicts"),
        };

        crate::metrics::record_verdict(match &judgment {
            Judgment::Passed(_) => "PASSED",
            Judgment::Unpassed(u) => match u.failure_cause {
                FailureCause::CompileError => "COMPILE_ERROR",
                FailureCause::CompileTimeout => "COMPILE_TIMEOUT",
                FailureCause::CompileOutOfMemory => "COMPILE_OUT_OF_MEMORY",
                FailureCause::RuntimeError => "RUNTIME_ERROR",
                FailureCause::RuntimeTimeout => "RUNTIME_TIMEOUT",
                FailureCause::RuntimeOutOfMemory => "RUNTIME_OUT_OF_MEMORY",
                FailureCause::WrongAnswer => "WRONG_ANSWER",
                FailureCause::SandboxTimeout => "SANDBOX_TIMEOUT",
                FailureCause::SandboxOutOfMemory => "SANDBOX_OUT_OF_MEMORY",
            },
        });

        let event = match &judgment {
            Judgment::Passed(p) => WebhookEvent::PassedJudgment(p.clone()),
            Judgment::Unpassed(u) => WebhookEvent::UnpassedJudgment(u.clone()),
        };
        self.webhook.dispatch_webhook_callback(&event).await;
        self.store.delete(user_id, job_id).await.ok();

        Ok(())
    }

    /// Implements the termination-classification rules of spec §4.6: a
    /// pre-existing non-pass always wins; otherwise a timeout or OOM exit
    /// is appended and dispatched as its own `TestCaseResult`.
    async fn classify_termination(
        &self,
        verdicts: &mut Vec<Verdict>,
        timed_out: bool,
        exit_status: Option<std::process::ExitStatus>,
        job_id: JobId,
    ) -> SupervisorResult<()> {
        if verdicts.iter().any(|v| !v.passed) {
            return Ok(());
        }

        let synthetic = if timed_out {
            Some(Verdict::fail(FailureCause::SandboxTimeout, None, None))
        } else if exit_status.and_then(|s| s.code()) == Some(137) {
            Some(Verdict::fail(FailureCause::SandboxOutOfMemory, None, None))
        } else {
            None
        };

        if let Some(verdict) = synthetic {
            let event = WebhookEvent::TestCaseResult(TestCaseResultEvent {
                job_id,
                verdict: verdict.clone(),
            });
            self.webhook.dispatch_webhook_callback(&event).await;
            verdicts.push(verdict);
        }

        Ok(())
    }

    /// Cleans up this job's record without running a judgment — used when
    /// an upstream caller already knows the job should be abandoned.
    pub async fn abandon(&self, user_id: UserId, job_id: JobId) {
        self.store.delete(user_id, job_id).await.ok();
    }
}
