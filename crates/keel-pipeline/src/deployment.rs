//! Deployment targets and typed parameters.
//!
//! Deployment configuration never filters the pipeline; it only validates a
//! deployment request before a build is created for it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Value type of a deployment parameter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    String,
    Integer,
    Boolean,
}

/// A parameter accepted by a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Parameter {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub required: bool,
    /// Allowed values; empty means any value.
    pub options: Vec<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Deployment configuration of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Deployment {
    pub targets: Vec<String>,
    pub parameters: BTreeMap<String, Parameter>,
}

impl Deployment {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.parameters.is_empty()
    }

    /// Check a deployment request against the configuration.
    pub fn validate(&self, target: &str, inputs: &BTreeMap<String, String>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        if !self.targets.is_empty() && !self.targets.iter().any(|t| t == target) {
            return Err(PipelineError::Deployment(format!(
                "target {target} not found in deployment targets"
            )));
        }

        if let Some(unknown) = inputs.keys().find(|k| !self.parameters.contains_key(*k)) {
            return Err(PipelineError::Deployment(format!(
                "parameter {unknown} is not allowed"
            )));
        }

        for (name, param) in &self.parameters {
            match inputs.get(name) {
                Some(value) => param.check(name, value)?,
                None if param.required => {
                    return Err(PipelineError::Deployment(format!(
                        "parameter {name} is required"
                    )))
                }
                None => {}
            }
        }

        Ok(())
    }
}

impl Parameter {
    fn check(&self, name: &str, value: &str) -> Result<()> {
        let invalid = |reason: String| PipelineError::Deployment(format!("parameter {name} {reason}"));

        if !self.options.is_empty() && !self.options.iter().any(|o| o == value) {
            return Err(invalid(format!(
                "value {value} is not one of [{}]",
                self.options.join(", ")
            )));
        }

        match self.kind {
            ParameterType::String => Ok(()),
            ParameterType::Boolean => value
                .parse::<bool>()
                .map(|_| ())
                .map_err(|_| invalid(format!("value {value} is not a boolean"))),
            ParameterType::Integer => {
                let n = value
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("value {value} is not an integer")))?;
                if let Some(min) = self.min {
                    if n < min {
                        return Err(invalid(format!("value {n} is below minimum {min}")));
                    }
                }
                if let Some(max) = self.max {
                    if n > max {
                        return Err(invalid(format!("value {n} is above maximum {max}")));
                    }
                }
                Ok(())
            }
        }
    }
}
