//! Language keys used to route requests to engines.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

// Language or locale tag: `en`, `ar`, `pt-BR`, `zh_Hant`.
static RE_LANGUAGE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,8}(?:[-_][A-Za-z0-9]{1,8})*$").unwrap());

/// Key under which the single engine of a multilingual registry is stored.
pub const MULTI_KEY: &str = "multi";

/// Language used when a job does not name one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Opaque identifier selecting which engine serves a request.
///
/// Compared by exact string equality; no case folding or locale fallback
/// happens here, `en-US` and `en` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageKey(String);

impl LanguageKey {
    /// Parse and validate a key. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, WorkerError> {
        let trimmed = raw.trim();
        if RE_LANGUAGE_KEY.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(WorkerError::UnsupportedLanguage(raw.to_string()))
        }
    }

    /// The sentinel key of a multilingual registry.
    pub fn multi() -> Self {
        Self(MULTI_KEY.to_string())
    }

    pub fn is_multi(&self) -> bool {
        self.0 == MULTI_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageKey {
    fn default() -> Self {
        Self(DEFAULT_LANGUAGE.to_string())
    }
}

impl fmt::Display for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LanguageKey {
    type Error = WorkerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageKey> for String {
    fn from(key: LanguageKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for LanguageKey {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
