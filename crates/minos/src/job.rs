//! Job data model (spec §3) and the queue-delivered task payload.
//!
//! `Job` accepts both snake_case and camelCase keys on the way in (the
//! upstream queue payload and the external store both carry whichever
//! casing the producer used), but is always written back out in camelCase —
//! the key-case normalizer lives at this single boundary, not threaded
//! through the rest of the crate.

use olympus_common::{ChallengeId, CodeLanguage, JobId, UserId};
use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;

/// A single hidden test case: ordered input lines plus the expected output.
/// Owned by the Limits Catalog (C1), read-only at judgment time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input_lines: Vec<String>,
    pub expected_output: String,
}

/// The unit of work delivered by the queue and mirrored in the external
/// TTL store under key `{userId}:{jobId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(alias = "job_id")]
    pub job_id: JobId,

    #[serde(alias = "user_id")]
    pub user_id: UserId,

    #[serde(alias = "challenge_id")]
    pub challenge_id: ChallengeId,

    #[serde(alias = "code_language")]
    pub code_language: CodeLanguage,

    /// Base64-encoded source.
    pub code: String,

    /// ISO-8601 local timestamp, opaque to this worker beyond pass-through.
    #[serde(alias = "submitted_at")]
    pub submitted_at: String,

    #[serde(alias = "total_test_cases")]
    pub total_test_cases: i32,

    /// Cancellation hint. Consulted only when the supervisor starts
    /// (spec §9 open question — no mid-stream polling).
    #[serde(alias = "stop_flag", default)]
    pub stop_flag: bool,

    #[serde(alias = "last_test_case_index", default)]
    pub last_test_case_index: Option<i32>,

    #[serde(default)]
    pub verdicts: Vec<Verdict>,
}

impl Job {
    /// Decode the base64 source, returning the decoded byte count alongside
    /// the UTF-8 source text (Judgment needs `codeByteSize`, §3).
    pub fn decode_code(&self) -> anyhow::Result<(String, usize)> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.code)?;
        let size = bytes.len();
        let text = String::from_utf8(bytes)?;
        Ok((text, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_key_casings() {
        let camel = serde_json::json!({
            "jobId": "9f3c9b8e-8e9a-4f9b-9c3b-000000000001",
            "userId": 7,
            "challengeId": 42,
            "codeLanguage": "python3",
            "code": "cHJpbnQoMSk=",
            "submittedAt": "2026-01-01T00:00:00",
            "totalTestCases": 2,
            "stopFlag": false,
            "verdicts": []
        });
        let snake = serde_json::json!({
            "job_id": "9f3c9b8e-8e9a-4f9b-9c3b-000000000001",
            "user_id": 7,
            "challenge_id": 42,
            "code_language": "python3",
            "code": "cHJpbnQoMSk=",
            "submitted_at": "2026-01-01T00:00:00",
            "total_test_cases": 2,
            "stop_flag": false,
            "verdicts": []
        });

        let from_camel: Job = serde_json::from_value(camel).unwrap();
        let from_snake: Job = serde_json::from_value(snake).unwrap();
        assert_eq!(from_camel.job_id, from_snake.job_id);
        assert_eq!(from_camel.code_language, CodeLanguage::Python3);
    }

    #[test]
    fn decode_code_reports_byte_size() {
        let job = Job {
            job_id: JobId::nil(),
            user_id: 1,
            challenge_id: 1,
            code_language: CodeLanguage::Python3,
            code: "cHJpbnQoMSk=".to_string(), // "print(1)"
            submitted_at: "2026-01-01T00:00:00".to_string(),
            total_test_cases: 0,
            stop_flag: false,
            last_test_case_index: None,
            verdicts: vec![],
        };
        let (text, size) = job.decode_code().unwrap();
        assert_eq!(text, "print(1)");
        assert_eq!(size, 8);
    }
}
