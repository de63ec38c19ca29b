//! Verdict / Judgment data model and the line-oriented stream parser (C3).

use olympus_common::{ChallengeId, CodeLanguage, JobId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reason a Verdict or Judgment is not a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    CompileError,
    CompileTimeout,
    CompileOutOfMemory,
    RuntimeError,
    RuntimeTimeout,
    RuntimeOutOfMemory,
    WrongAnswer,
    SandboxTimeout,
    SandboxOutOfMemory,
}

/// Outcome of one test case, or of one terminal sandbox-level failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub test_case_index: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memory_used_mb: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub elapsed_time_ms: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_cause: Option<FailureCause>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_detail: Option<String>,
}

impl Verdict {
    pub fn pass(test_case_index: u32, elapsed_time_ms: i64, memory_used_mb: f64) -> Self {
        Verdict {
            passed: true,
            test_case_index: Some(test_case_index),
            memory_used_mb: Some(memory_used_mb),
            elapsed_time_ms: Some(elapsed_time_ms),
            failure_cause: None,
            failure_detail: None,
        }
    }

    pub fn fail(
        failure_cause: FailureCause,
        test_case_index: Option<u32>,
        failure_detail: Option<String>,
    ) -> Self {
        Verdict {
            passed: false,
            test_case_index,
            memory_used_mb: None,
            elapsed_time_ms: None,
            failure_cause: Some(failure_cause),
            failure_detail,
        }
    }
}

/// Identifying fields common to both Judgment variants (spec §3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgmentIdentity {
    pub user_id: UserId,
    pub job_id: JobId,
    pub challenge_id: ChallengeId,
    pub code_language: CodeLanguage,
    pub code: String,
    pub code_byte_size: usize,
    pub submitted_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassedJudgment {
    #[serde(flatten)]
    pub identity: JudgmentIdentity,
    pub max_memory_used_mb: f64,
    pub max_elapsed_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpassedJudgment {
    #[serde(flatten)]
    pub identity: JudgmentIdentity,
    pub failure_cause: FailureCause,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

/// The aggregated final outcome of a job.
#[derive(Debug, Clone)]
pub enum Judgment {
    Passed(PassedJudgment),
    Unpassed(UnpassedJudgment),
}

impl Judgment {
    /// Build the final Judgment from the accumulated verdict sequence
    /// (spec §4.6 Aggregation). `verdicts` must be non-empty.
    pub fn aggregate(identity: JudgmentIdentity, verdicts: &[Verdict]) -> Option<Self> {
        if verdicts.is_empty() {
            return None;
        }
        if let Some(first_failure) = verdicts.iter().find(|v| !v.passed) {
            return Some(Judgment::Unpassed(UnpassedJudgment {
                identity,
                failure_cause: first_failure
                    .failure_cause
                    .expect("non-passing verdict always carries a failure cause"),
                failure_detail: first_failure.failure_detail.clone(),
            }));
        }
        let max_elapsed_time_ms = verdicts.iter().filter_map(|v| v.elapsed_time_ms).max()?;
        let max_memory_used_mb = verdicts
            .iter()
            .filter_map(|v| v.memory_used_mb)
            .fold(f64::MIN, f64::max);
        Some(Judgment::Passed(PassedJudgment {
            identity,
            max_memory_used_mb,
            max_elapsed_time_ms,
        }))
    }
}

/// Result of feeding one non-empty stdout line to the parser.
#[derive(Debug, Clone)]
pub enum LineOutcome {
    Verdict(Verdict),
    /// Terminal: the runner reported an unrecoverable internal error.
    SystemError(String),
}

/// Parses the in-sandbox runner's line-oriented stdout protocol (spec §4.3,
/// §6.2) and accumulates anything that doesn't fit it as unexpected output.
#[derive(Debug, Default)]
pub struct StreamParser {
    unexpected: Vec<String>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a non-empty line captured from the sandbox's stdout.
    pub fn feed_stdout(&mut self, line: &str) -> Option<LineOutcome> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                self.unexpected.push(line.to_string());
                return None;
            }
        };
        let Value::Object(map) = value else {
            self.unexpected.push(line.to_string());
            return None;
        };

        if let Some(status) = map.get("status").and_then(Value::as_str) {
            return self.handle_status(status, &map, line);
        }

        if let Some(passed) = map.get("passed").and_then(Value::as_bool) {
            return self.handle_passed(passed, &map, line);
        }

        self.unexpected.push(line.to_string());
        None
    }

    fn handle_status(
        &mut self,
        status: &str,
        map: &serde_json::Map<String, Value>,
        raw: &str,
    ) -> Option<LineOutcome> {
        match status {
            "systemError" => {
                let error = map
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown system error")
                    .to_string();
                Some(LineOutcome::SystemError(error))
            }
            "compileError" | "runtimeError" => {
                let Some(exit_code) = map.get("exitCode").and_then(Value::as_i64) else {
                    self.unexpected.push(raw.to_string());
                    return None;
                };
                let test_case_index = map
                    .get("testCaseIndex")
                    .and_then(Value::as_u64)
                    .map(|i| i as u32);
                let detail = map.get("error").and_then(Value::as_str).map(str::to_string);
                let cause = exit_code_to_failure_cause(status, exit_code);
                Some(LineOutcome::Verdict(Verdict::fail(
                    cause,
                    test_case_index,
                    detail,
                )))
            }
            _ => {
                self.unexpected.push(raw.to_string());
                None
            }
        }
    }

    fn handle_passed(
        &mut self,
        passed: bool,
        map: &serde_json::Map<String, Value>,
        raw: &str,
    ) -> Option<LineOutcome> {
        let Some(test_case_index) = map.get("testCaseIndex").and_then(Value::as_u64) else {
            self.unexpected.push(raw.to_string());
            return None;
        };
        let test_case_index = test_case_index as u32;

        if !passed {
            return Some(LineOutcome::Verdict(Verdict::fail(
                FailureCause::WrongAnswer,
                Some(test_case_index),
                None,
            )));
        }

        let (Some(elapsed_time_ms), Some(memory_used_mb)) = (
            map.get("elapsedTimeMs").and_then(Value::as_i64),
            map.get("memoryUsageMb").and_then(Value::as_f64),
        ) else {
            self.unexpected.push(raw.to_string());
            return None;
        };
        Some(LineOutcome::Verdict(Verdict::pass(
            test_case_index,
            elapsed_time_ms,
            memory_used_mb,
        )))
    }

    /// A line captured on stderr is never valid protocol output.
    pub fn feed_stderr(&mut self, line: &str) {
        self.unexpected.push(line.to_string());
    }

    /// Call once both streams are drained. Returns the joined unexpected
    /// output if anything accumulated (spec: raise `UNEXPECTED_OUTPUT`).
    pub fn finish(self) -> Option<String> {
        if self.unexpected.is_empty() {
            None
        } else {
            Some(self.unexpected.join("\n"))
        }
    }
}

fn exit_code_to_failure_cause(status: &str, exit_code: i64) -> FailureCause {
    match (status, exit_code) {
        ("compileError", 0) => FailureCause::CompileError,
        ("compileError", 124) => FailureCause::CompileTimeout,
        ("compileError", 137) => FailureCause::CompileOutOfMemory,
        ("compileError", _) => FailureCause::CompileError,
        ("runtimeError", 0) => FailureCause::RuntimeError,
        ("runtimeError", 124) => FailureCause::RuntimeTimeout,
        ("runtimeError", 137) => FailureCause::RuntimeOutOfMemory,
        ("runtimeError", _) => FailureCause::RuntimeError,
        _ => unreachable!("caller only dispatches compileError/runtimeError here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> JudgmentIdentity {
        JudgmentIdentity {
            user_id: 1,
            job_id: JobId::nil(),
            challenge_id: 1,
            code_language: CodeLanguage::Python3,
            code: "cHJpbnQoMSk=".to_string(),
            code_byte_size: 8,
            submitted_at: "2026-01-01T00:00:00".to_string(),
        }
    }

    #[test]
    fn happy_path_two_passes() {
        let mut parser = StreamParser::new();
        let a = parser
            .feed_stdout(r#"{"passed":true,"testCaseIndex":1,"elapsedTimeMs":50,"memoryUsageMb":1.5}"#)
            .unwrap();
        let b = parser
            .feed_stdout(r#"{"passed":true,"testCaseIndex":2,"elapsedTimeMs":60,"memoryUsageMb":2.0}"#)
            .unwrap();
        assert!(parser.finish().is_none());

        let verdicts: Vec<Verdict> = [a, b]
            .into_iter()
            .map(|o| match o {
                LineOutcome::Verdict(v) => v,
                _ => panic!("expected verdict"),
            })
            .collect();
        let judgment = Judgment::aggregate(identity(), &verdicts).unwrap();
        match judgment {
            Judgment::Passed(p) => {
                assert_eq!(p.max_elapsed_time_ms, 60);
                assert_eq!(p.max_memory_used_mb, 2.0);
            }
            Judgment::Unpassed(_) => panic!("expected Passed"),
        }
    }

    #[test]
    fn compile_error_maps_exit_code_zero() {
        let mut parser = StreamParser::new();
        let outcome = parser
            .feed_stdout(r#"{"status":"compileError","exitCode":0,"error":"syntax error"}"#)
            .unwrap();
        let verdict = match outcome {
            LineOutcome::Verdict(v) => v,
            _ => panic!("expected verdict"),
        };
        assert_eq!(verdict.failure_cause, Some(FailureCause::CompileError));
        let judgment = Judgment::aggregate(identity(), &[verdict]).unwrap();
        match judgment {
            Judgment::Unpassed(u) => {
                assert_eq!(u.failure_cause, FailureCause::CompileError);
                assert_eq!(u.failure_detail.as_deref(), Some("syntax error"));
            }
            Judgment::Passed(_) => panic!("expected Unpassed"),
        }
    }

    #[test]
    fn first_non_pass_wins_over_later_failures() {
        let pass = Verdict::pass(1, 10, 1.0);
        let first_fail = Verdict::fail(FailureCause::RuntimeError, Some(2), Some("boom".into()));
        let second_fail = Verdict::fail(FailureCause::SandboxOutOfMemory, None, None);
        let judgment = Judgment::aggregate(identity(), &[pass, first_fail, second_fail]).unwrap();
        match judgment {
            Judgment::Unpassed(u) => assert_eq!(u.failure_cause, FailureCause::RuntimeError),
            Judgment::Passed(_) => panic!("expected Unpassed"),
        }
    }

    #[test]
    fn system_error_is_terminal() {
        let mut parser = StreamParser::new();
        let outcome = parser
            .feed_stdout(r#"{"status":"systemError","error":"disk full"}"#)
            .unwrap();
        assert!(matches!(outcome, LineOutcome::SystemError(ref e) if e == "disk full"));
    }

    #[test]
    fn garbage_line_accumulates_as_unexpected() {
        let mut parser = StreamParser::new();
        assert!(parser.feed_stdout("not json at all").is_none());
        parser.feed_stderr("stack trace line");
        let joined = parser.finish().unwrap();
        assert!(joined.contains("not json at all"));
        assert!(joined.contains("stack trace line"));
    }

    #[test]
    fn verdict_json_round_trips() {
        let v = Verdict::pass(1, 10, 2.5);
        let json = serde_json::to_string(&v).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn zero_test_cases_yields_no_judgment() {
        assert!(Judgment::aggregate(identity(), &[]).is_none());
    }
}
