//! Common types used across Olympus services.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// Opaque job identifier, unique per judgment request.
pub type JobId = Uuid;

/// Challenge (problem) identifier.
pub type ChallengeId = i64;

/// Supported submission languages.
///
/// Serializes in the lowercase form the sandbox runners and upstream API
/// already speak (`java17`, `nodejs20`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Java17,
    Nodejs20,
    #[serde(rename = "nodejs20esm")]
    Nodejs20Esm,
    Python3,
    C11,
    Cpp17,
}

impl CodeLanguage {
    /// Well-known filename the source is bind-mounted under inside the sandbox.
    pub fn source_filename(&self) -> &'static str {
        match self {
            CodeLanguage::Java17 => "Main.java",
            CodeLanguage::Nodejs20 => "main.js",
            CodeLanguage::Nodejs20Esm => "main.mjs",
            CodeLanguage::Python3 => "main.py",
            CodeLanguage::C11 => "main.c",
            CodeLanguage::Cpp17 => "main.cpp",
        }
    }

    /// Whether this language requires a separate compile phase, which earns
    /// it the sandbox deadline's compile bonus.
    pub fn is_compiled(&self) -> bool {
        matches!(
            self,
            CodeLanguage::Java17 | CodeLanguage::Python3 | CodeLanguage::C11 | CodeLanguage::Cpp17
        )
    }
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CodeLanguage::Java17 => "java17",
            CodeLanguage::Nodejs20 => "nodejs20",
            CodeLanguage::Nodejs20Esm => "nodejs20esm",
            CodeLanguage::Python3 => "python3",
            CodeLanguage::C11 => "c11",
            CodeLanguage::Cpp17 => "cpp17",
        };
        write!(f, "{s}")
    }
}
