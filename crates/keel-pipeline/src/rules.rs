//! Rulesets deciding which pipeline elements participate in a build.
//!
//! A [`Ruleset`] combines an `if` block, an `unless` block and an optional
//! `eval` expression. Each block is a set of per-attribute pattern lists
//! ([`Rules`]) compared against the build's [`RuleData`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expr::{Evaluator, ExprEvaluator};
use crate::matcher::Matcher;

/// Environment variables visible to a container or expression.
pub type Environment = BTreeMap<String, String>;

/// Snapshot of the event attributes a ruleset is evaluated against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuleData {
    pub branch: String,
    pub comment: String,
    pub event: String,
    pub path: Vec<String>,
    pub repo: String,
    pub sender: String,
    /// Build status; empty before the build has a status.
    pub status: String,
    pub tag: String,
    pub target: String,
    pub label: Vec<String>,
    pub instance: String,
    /// Build-level environment, used where no container environment applies.
    pub env: Environment,
}

/// How per-attribute results are combined.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl From<&str> for Operator {
    fn from(value: &str) -> Self {
        match value {
            "or" => Operator::Or,
            _ => Operator::And,
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        Operator::from(value.as_str())
    }
}

/// A list of patterns for one attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Ruletype(pub Vec<String>);

impl Ruletype {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An empty list passes under `and` and fails under `or`.
    fn vacuous(operator: Operator) -> bool {
        operator == Operator::And
    }

    /// Returns true when any pattern matches `datum`.
    ///
    /// The operator only decides the result for an empty pattern list; within
    /// one list the patterns are always alternatives.
    pub fn match_single(&self, datum: &str, matcher: Matcher, operator: Operator) -> Result<bool> {
        if self.is_empty() {
            return Ok(Self::vacuous(operator));
        }

        for pattern in &self.0 {
            if matcher.matches(datum, pattern)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns true when any pattern matches any element of `data`.
    pub fn match_multiple(
        &self,
        data: &[String],
        matcher: Matcher,
        operator: Operator,
    ) -> Result<bool> {
        if self.is_empty() {
            return Ok(Self::vacuous(operator));
        }

        for datum in data {
            if self.match_single(datum, matcher, operator)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<S: Into<String>> FromIterator<S> for Ruletype {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Ruletype(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-attribute pattern lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Rules {
    pub branch: Ruletype,
    pub comment: Ruletype,
    pub event: Ruletype,
    pub path: Ruletype,
    pub repo: Ruletype,
    pub sender: Ruletype,
    pub status: Ruletype,
    pub tag: Ruletype,
    pub target: Ruletype,
    pub label: Ruletype,
    pub instance: Ruletype,
}

impl Rules {
    /// True when no attribute carries a pattern.
    pub fn is_empty(&self) -> bool {
        self.branch.is_empty()
            && self.comment.is_empty()
            && self.event.is_empty()
            && self.path.is_empty()
            && self.repo.is_empty()
            && self.sender.is_empty()
            && self.status.is_empty()
            && self.tag.is_empty()
            && self.target.is_empty()
            && self.label.is_empty()
            && self.instance.is_empty()
    }

    fn only_status(&self) -> bool {
        !self.status.is_empty()
            && self.branch.is_empty()
            && self.comment.is_empty()
            && self.event.is_empty()
            && self.path.is_empty()
            && self.repo.is_empty()
            && self.sender.is_empty()
            && self.tag.is_empty()
            && self.target.is_empty()
            && self.label.is_empty()
            && self.instance.is_empty()
    }

    /// Evaluate every attribute against `data` and combine with `operator`.
    ///
    /// While the build has no status, status patterns always match so rules
    /// can be resolved before a build has finished. Without status patterns
    /// the attribute stays vacuous.
    pub fn matches(&self, data: &RuleData, matcher: Matcher, operator: Operator) -> Result<bool> {
        let status = if data.status.is_empty() {
            !self.status.is_empty() || Ruletype::vacuous(operator)
        } else {
            self.status.match_single(&data.status, matcher, operator)?
        };

        let results = [
            status,
            self.branch.match_single(&data.branch, matcher, operator)?,
            self.comment.match_single(&data.comment, matcher, operator)?,
            self.event.match_single(&data.event, matcher, operator)?,
            self.path.match_multiple(&data.path, matcher, operator)?,
            self.repo.match_single(&data.repo, matcher, operator)?,
            self.sender.match_single(&data.sender, matcher, operator)?,
            self.tag.match_single(&data.tag, matcher, operator)?,
            self.target.match_single(&data.target, matcher, operator)?,
            self.label.match_multiple(&data.label, matcher, operator)?,
            self.instance.match_single(&data.instance, matcher, operator)?,
        ];

        Ok(match operator {
            Operator::Or => results.iter().any(|r| *r),
            Operator::And => results.iter().all(|r| *r),
        })
    }
}

/// Conditions deciding whether a container runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ruleset {
    #[serde(rename = "if")]
    pub if_: Rules,
    pub unless: Rules,
    pub matcher: Matcher,
    pub operator: Operator,
    /// Keep running subsequent steps when this one fails.
    #[serde(rename = "continue")]
    pub continue_on_failure: bool,
    /// Boolean expression evaluated against the container environment.
    pub eval: String,
}

impl Ruleset {
    /// True when the ruleset places no constraint at all.
    pub fn is_empty(&self) -> bool {
        self.if_.is_empty() && self.unless.is_empty() && self.eval.is_empty()
    }

    /// True when neither block constrains the build status.
    pub fn no_status(&self) -> bool {
        self.if_.status.is_empty() && self.unless.status.is_empty()
    }

    /// Evaluate with the built-in expression engine.
    pub fn matches(&self, data: &RuleData, env: &Environment) -> Result<bool> {
        self.matches_with(data, env, &ExprEvaluator)
    }

    /// Evaluate the ruleset for one container.
    ///
    /// `env` is the environment of the container being evaluated; it is only
    /// consulted by the `eval` expression.
    pub fn matches_with(
        &self,
        data: &RuleData,
        env: &Environment,
        evaluator: &dyn Evaluator,
    ) -> Result<bool> {
        if self.is_empty() {
            return Ok(true);
        }

        // unless vetoes regardless of if; a status-only unless waits for a status
        let unless_decidable = !self.unless.is_empty()
            && !(data.status.is_empty() && self.unless.only_status());
        if unless_decidable && self.unless.matches(data, self.matcher, self.operator)? {
            return Ok(false);
        }

        if self.if_.is_empty() && self.eval.is_empty() {
            return Ok(true);
        }

        if !self.if_.is_empty() && !self.if_.matches(data, self.matcher, self.operator)? {
            return Ok(false);
        }

        if self.eval.is_empty() {
            return Ok(true);
        }

        evaluator.evaluate(&self.eval, env)
    }
}
