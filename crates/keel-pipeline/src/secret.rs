//! Pipeline secrets and the plugins that fetch them.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::Container;
use crate::driver::Driver;
use crate::error::{PipelineError, Result};
use crate::expr::Evaluator;
use crate::rules::RuleData;

/// Scope a secret is stored under.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    #[default]
    Repo,
    Org,
    Shared,
}

/// Fully-qualified location of a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPath {
    Repo {
        org: String,
        repo: String,
        name: String,
    },
    Org {
        org: String,
        name: String,
    },
    Shared {
        org: String,
        team: String,
        name: String,
    },
}

/// A secret referenced by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Secret {
    pub name: String,
    pub key: String,
    pub engine: String,
    #[serde(rename = "type")]
    pub kind: SecretType,
    /// Plugin container that fetches the secret; empty for stored secrets.
    pub origin: Container,
}

impl Secret {
    /// Resolve the secret key against the organization and repository of the
    /// build it belongs to.
    pub fn parse_key(&self, org: &str, repo: &str) -> Result<SecretPath> {
        let invalid = |reason: String| PipelineError::SecretKey {
            key: self.key.clone(),
            reason,
        };

        let parts: Vec<&str> = self.key.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("key contains an empty segment".to_string()));
        }

        match (self.kind, parts.as_slice()) {
            (SecretType::Repo, [name]) => Ok(SecretPath::Repo {
                org: org.to_string(),
                repo: repo.to_string(),
                name: name.to_string(),
            }),
            (SecretType::Repo, [o, r, name]) => {
                if *o != org || *r != repo {
                    return Err(invalid(format!("repo secret must belong to {org}/{repo}")));
                }
                Ok(SecretPath::Repo {
                    org: org.to_string(),
                    repo: repo.to_string(),
                    name: name.to_string(),
                })
            }
            (SecretType::Org, [o, name]) => {
                if *o != org {
                    return Err(invalid(format!("org secret must belong to {org}")));
                }
                Ok(SecretPath::Org {
                    org: org.to_string(),
                    name: name.to_string(),
                })
            }
            (SecretType::Shared, [o, team, name]) => Ok(SecretPath::Shared {
                org: o.to_string(),
                team: team.to_string(),
                name: name.to_string(),
            }),
            (SecretType::Repo, _) => Err(invalid("expected <org>/<repo>/<name> or <name>".to_string())),
            (SecretType::Org, _) => Err(invalid("expected <org>/<name>".to_string())),
            (SecretType::Shared, _) => Err(invalid("expected <org>/<team>/<name>".to_string())),
        }
    }
}

/// Secrets referenced by a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SecretSlice(pub Vec<Secret>);

impl SecretSlice {
    /// Drop plugin secrets whose origin ruleset does not match.
    ///
    /// Stored secrets always pass through unnumbered. Origins are evaluated
    /// against the build-level environment and numbered with their own
    /// counter.
    pub fn purge(self, data: &RuleData, evaluator: &dyn Evaluator) -> Result<Self> {
        let mut counter = 1;
        let mut kept = Vec::with_capacity(self.0.len());

        for mut secret in self.0 {
            if secret.origin.is_empty() {
                kept.push(secret);
                continue;
            }

            let matched = secret
                .origin
                .ruleset
                .matches_with(data, &data.env, evaluator)
                .map_err(|e| e.in_ruleset("secret", &secret.origin.name))?;

            if matched {
                secret.origin.number = counter;
                counter += 1;
                kept.push(secret);
            } else {
                debug!(secret = %secret.name, origin = %secret.origin.name, "purged");
            }
        }

        Ok(SecretSlice(kept))
    }

    /// Sanitize the ids of plugin origins.
    pub fn sanitize(self, driver: Driver) -> Self {
        self.0
            .into_iter()
            .map(|mut secret| {
                if !secret.origin.is_empty() {
                    secret.origin = secret.origin.sanitize(driver);
                }
                secret
            })
            .collect()
    }
}

impl Deref for SecretSlice {
    type Target = Vec<Secret>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SecretSlice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<Secret> for SecretSlice {
    fn from_iter<I: IntoIterator<Item = Secret>>(iter: I) -> Self {
        SecretSlice(iter.into_iter().collect())
    }
}

impl From<Vec<Secret>> for SecretSlice {
    fn from(secrets: Vec<Secret>) -> Self {
        SecretSlice(secrets)
    }
}
