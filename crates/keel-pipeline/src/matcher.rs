//! Pattern matching strategies used by rulesets.

use globset::GlobBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// How a rule pattern is compared against a datum.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum Matcher {
    /// Shell-style glob where `*` never crosses a `/`.
    #[default]
    Filepath,
    /// Unanchored regular expression search.
    Regex,
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        match value {
            "regex" | "regexp" => Matcher::Regex,
            _ => Matcher::Filepath,
        }
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::from(value.as_str())
    }
}

impl Matcher {
    /// Name used in serialized pipelines and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Matcher::Filepath => "filepath",
            Matcher::Regex => "regex",
        }
    }

    /// Compare one pattern against one datum.
    ///
    /// Invalid patterns are errors rather than non-matches.
    pub fn matches(&self, datum: &str, pattern: &str) -> Result<bool> {
        match self {
            Matcher::Regex => {
                let re = Regex::new(pattern).map_err(|e| PipelineError::Pattern {
                    kind: "regex",
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(re.is_match(datum))
            }
            Matcher::Filepath => {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .backslash_escape(true)
                    .build()
                    .map_err(|e| PipelineError::Pattern {
                        kind: "filepath",
                        pattern: pattern.to_string(),
                        reason: e.kind().to_string(),
                    })?;
                Ok(glob.compile_matcher().is_match(datum))
            }
        }
    }
}
