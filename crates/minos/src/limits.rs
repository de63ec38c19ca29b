//! Limits Catalog (C1): per-challenge test cases, time/memory limits, and
//! per-language bonuses, loaded once at startup.

use std::collections::HashMap;
use std::fs;

use olympus_common::{ChallengeId, CodeLanguage};
use serde::Deserialize;

use crate::config::LimitsConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::job::TestCase;

#[derive(Debug, Deserialize)]
struct LanguageBonus {
    time_bonus: f64,
    memory_bonus: i64,
}

/// Static mappings used to resolve a job's test cases and resource caps.
pub struct LimitsCatalog {
    test_cases: HashMap<ChallengeId, Vec<TestCase>>,
    time_limits: HashMap<ChallengeId, f64>,
    memory_limits: HashMap<ChallengeId, i64>,
    time_bonus: HashMap<CodeLanguage, f64>,
    memory_bonus: HashMap<CodeLanguage, i64>,
}

impl LimitsCatalog {
    /// Load the four static mappings from `config.data_dir`.
    pub fn load(config: &LimitsConfig) -> SupervisorResult<Self> {
        let test_cases = load_indexed_json::<Vec<TestCase>>(&config.data_dir, "test_cases.json")?;
        let time_limits = load_indexed_json::<f64>(&config.data_dir, "time_limits.json")?;
        let memory_limits = load_indexed_json::<i64>(&config.data_dir, "memory_limits.json")?;

        let bonuses_path = config.data_dir.join("language_bonuses.json");
        let raw = fs::read_to_string(&bonuses_path).map_err(|e| {
            SupervisorError::ConfigMissing(format!("{}: {e}", bonuses_path.display()))
        })?;
        let by_language: HashMap<CodeLanguage, LanguageBonus> = serde_json::from_str(&raw)
            .map_err(|e| SupervisorError::ConfigMissing(format!("{}: {e}", bonuses_path.display())))?;

        let mut time_bonus = HashMap::new();
        let mut memory_bonus = HashMap::new();
        for (lang, bonus) in by_language {
            time_bonus.insert(lang, bonus.time_bonus);
            memory_bonus.insert(lang, bonus.memory_bonus);
        }

        Ok(LimitsCatalog {
            test_cases,
            time_limits,
            memory_limits,
            time_bonus,
            memory_bonus,
        })
    }

    pub fn get_test_cases(&self, challenge_id: ChallengeId) -> SupervisorResult<&[TestCase]> {
        self.test_cases
            .get(&challenge_id)
            .map(Vec::as_slice)
            .ok_or_else(|| SupervisorError::ConfigMissing(format!("testCases[{challenge_id}]")))
    }

    /// `base + bonus`, in seconds.
    pub fn get_time_limit(
        &self,
        challenge_id: ChallengeId,
        lang: CodeLanguage,
    ) -> SupervisorResult<f64> {
        let base = self
            .time_limits
            .get(&challenge_id)
            .ok_or_else(|| SupervisorError::ConfigMissing(format!("timeLimits[{challenge_id}]")))?;
        let bonus = self
            .time_bonus
            .get(&lang)
            .ok_or_else(|| SupervisorError::ConfigMissing(format!("timeBonus[{lang}]")))?;
        Ok(base + bonus)
    }

    /// `base + bonus`, in MB.
    pub fn get_memory_limit(
        &self,
        challenge_id: ChallengeId,
        lang: CodeLanguage,
    ) -> SupervisorResult<i64> {
        let base = self
            .memory_limits
            .get(&challenge_id)
            .ok_or_else(|| SupervisorError::ConfigMissing(format!("memoryLimits[{challenge_id}]")))?;
        let bonus = self
            .memory_bonus
            .get(&lang)
            .ok_or_else(|| SupervisorError::ConfigMissing(format!("memoryBonus[{lang}]")))?;
        Ok(base + bonus)
    }
}

/// Loads a JSON object keyed by stringified challenge ID into a typed map.
fn load_indexed_json<T: for<'de> Deserialize<'de>>(
    data_dir: &std::path::Path,
    filename: &str,
) -> SupervisorResult<HashMap<ChallengeId, T>> {
    let path = data_dir.join(filename);
    let raw = fs::read_to_string(&path)
        .map_err(|e| SupervisorError::ConfigMissing(format!("{}: {e}", path.display())))?;
    let by_string_key: HashMap<String, T> = serde_json::from_str(&raw)
        .map_err(|e| SupervisorError::ConfigMissing(format!("{}: {e}", path.display())))?;

    by_string_key
        .into_iter()
        .map(|(k, v)| {
            k.parse::<ChallengeId>()
                .map(|id| (id, v))
                .map_err(|e| SupervisorError::ConfigMissing(format!("bad challengeId key {k}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &std::path::Path) {
        let test_cases = serde_json::json!({
            "1": [
                {"inputLines": ["2 3"], "expectedOutput": "5"},
                {"inputLines": ["10 20"], "expectedOutput": "30"}
            ]
        });
        let time_limits = serde_json::json!({"1": 1.0});
        let memory_limits = serde_json::json!({"1": 256});
        let bonuses = serde_json::json!({
            "python3": {"time_bonus": 5.0, "memory_bonus": 64}
        });

        for (name, value) in [
            ("test_cases.json", test_cases),
            ("time_limits.json", time_limits),
            ("memory_limits.json", memory_limits),
            ("language_bonuses.json", bonuses),
        ] {
            let mut f = fs::File::create(dir.join(name)).unwrap();
            write!(f, "{}", value).unwrap();
        }
    }

    #[test]
    fn loads_and_applies_bonus() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path());
        let config = LimitsConfig {
            data_dir: tmp.path().to_path_buf(),
        };
        let catalog = LimitsCatalog::load(&config).unwrap();

        assert_eq!(catalog.get_test_cases(1).unwrap().len(), 2);
        assert_eq!(catalog.get_time_limit(1, CodeLanguage::Python3).unwrap(), 6.0);
        assert_eq!(catalog.get_memory_limit(1, CodeLanguage::Python3).unwrap(), 320);
    }

    #[test]
    fn missing_challenge_reports_config_missing() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path());
        let config = LimitsConfig {
            data_dir: tmp.path().to_path_buf(),
        };
        let catalog = LimitsCatalog::load(&config).unwrap();
        let err = catalog.get_test_cases(999).unwrap_err();
        assert!(matches!(err, SupervisorError::ConfigMissing(_)));
    }
}
