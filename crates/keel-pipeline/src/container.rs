//! Containers: the steps, services and secret plugins of a pipeline.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::Driver;
use crate::error::Result;
use crate::expr::Evaluator;
use crate::rules::{Environment, RuleData, Ruleset, Ruletype};

/// When the runtime pulls a container image.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    Always,
    #[default]
    NotPresent,
    OnStart,
    Never,
}

/// A resource limit applied to a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// A host path mounted into a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Volume {
    pub source: String,
    pub destination: String,
    pub access_mode: String,
}

/// The atomic unit of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub directory: String,
    pub commands: Vec<String>,
    pub entrypoint: Vec<String>,
    pub environment: Environment,
    pub detach: bool,
    pub needs: Vec<String>,
    /// 1-based position among the surviving containers of its slice.
    pub number: usize,
    pub ports: Vec<String>,
    pub privileged: bool,
    pub pull: PullPolicy,
    pub ruleset: Ruleset,
    pub ulimits: Vec<Ulimit>,
    pub volumes: Vec<Volume>,
    pub user: String,
}

impl Container {
    /// True when the container has no identity at all.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_empty() && self.image.is_empty()
    }

    /// Add variables from a parent environment that the container does not
    /// already define.
    pub fn merge_env(&mut self, parent: &Environment) {
        for (key, value) in parent {
            self.environment
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Decide at runtime whether the container should run given the current
    /// build status.
    ///
    /// Path rules were settled when the pipeline was purged and are ignored
    /// here. After a failure only containers whose ruleset mentions a status
    /// are considered.
    pub fn execute(&self, data: &RuleData) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let mut ruleset = self.ruleset.clone();
        ruleset.if_.path = Ruletype::default();
        ruleset.unless.path = Ruletype::default();

        let mut data = data.clone();
        match data.status.to_ascii_lowercase().as_str() {
            "running" => data.status = "success".to_string(),
            "failure" | "error" => {
                if ruleset.no_status() {
                    return Ok(false);
                }
                data.status = "failure".to_string();
            }
            _ => {}
        }

        ruleset.matches(&data, &self.environment)
    }

    /// Rewrite the container id for `driver`.
    pub fn sanitize(mut self, driver: Driver) -> Self {
        self.id = driver.sanitize_id(&self.id);
        self
    }
}

/// An ordered list of containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ContainerSlice(pub Vec<Container>);

impl ContainerSlice {
    /// Drop containers whose ruleset does not match and renumber the rest
    /// from 1.
    pub fn purge(self, data: &RuleData, evaluator: &dyn Evaluator) -> Result<Self> {
        let mut counter = 1;
        self.purge_counted(data, evaluator, "step", &mut counter)
    }

    /// Purge continuing the numbering from `counter`.
    ///
    /// Each container's ruleset sees that container's own environment.
    pub(crate) fn purge_counted(
        self,
        data: &RuleData,
        evaluator: &dyn Evaluator,
        kind: &'static str,
        counter: &mut usize,
    ) -> Result<Self> {
        let mut kept = Vec::with_capacity(self.0.len());

        for mut container in self.0 {
            let matched = container
                .ruleset
                .matches_with(data, &container.environment, evaluator)
                .map_err(|e| e.in_ruleset(kind, &container.name))?;

            if matched {
                container.number = *counter;
                *counter += 1;
                kept.push(container);
            } else {
                debug!(kind, name = %container.name, "purged");
            }
        }

        Ok(ContainerSlice(kept))
    }

    pub fn sanitize(self, driver: Driver) -> Self {
        self.0.into_iter().map(|c| c.sanitize(driver)).collect()
    }
}

impl Deref for ContainerSlice {
    type Target = Vec<Container>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ContainerSlice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<Container> for ContainerSlice {
    fn from_iter<I: IntoIterator<Item = Container>>(iter: I) -> Self {
        ContainerSlice(iter.into_iter().collect())
    }
}

impl From<Vec<Container>> for ContainerSlice {
    fn from(containers: Vec<Container>) -> Self {
        ContainerSlice(containers)
    }
}

impl IntoIterator for ContainerSlice {
    type Item = Container;
    type IntoIter = std::vec::IntoIter<Container>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprEvaluator;
    use crate::rules::Rules;

    fn step(name: &str, events: &[&str]) -> Container {
        Container {
            id: format!("step_{name}"),
            name: name.to_string(),
            image: "alpine:latest".to_string(),
            ruleset: Ruleset {
                if_: Rules {
                    event: events.iter().copied().collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn push() -> RuleData {
        RuleData {
            event: "push".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_purge_filters_and_renumbers() {
        let slice = ContainerSlice(vec![
            step("a", &["push"]),
            step("b", &["pull_request"]),
            step("c", &["push"]),
        ]);

        let purged = slice.purge(&push(), &ExprEvaluator).unwrap();
        let names: Vec<_> = purged.iter().map(|c| c.name.as_str()).collect();
        let numbers: Vec<_> = purged.iter().map(|c| c.number).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_purge_uses_container_environment() {
        let mut deploy = step("deploy", &[]);
        deploy.ruleset.eval = r#"TARGET == "prod""#.to_string();
        deploy
            .environment
            .insert("TARGET".to_string(), "prod".to_string());

        let mut skip = deploy.clone();
        skip.name = "skip".to_string();
        skip.environment
            .insert("TARGET".to_string(), "dev".to_string());

        let purged = ContainerSlice(vec![skip, deploy])
            .purge(&RuleData::default(), &ExprEvaluator)
            .unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].name, "deploy");
        assert_eq!(purged[0].number, 1);
    }

    #[test]
    fn test_purge_error_names_container() {
        let mut bad = step("lint", &["push"]);
        bad.ruleset.matcher = crate::matcher::Matcher::Regex;
        bad.ruleset.if_.branch = ["(unclosed"].into_iter().collect();

        let err = ContainerSlice(vec![bad])
            .purge(&push(), &ExprEvaluator)
            .unwrap_err();
        assert!(err.to_string().contains("step lint"));
    }

    #[test]
    fn test_merge_env_keeps_container_values() {
        let mut c = step("a", &[]);
        c.environment.insert("A".to_string(), "mine".to_string());

        let mut parent = Environment::new();
        parent.insert("A".to_string(), "parent".to_string());
        parent.insert("B".to_string(), "parent".to_string());
        c.merge_env(&parent);

        assert_eq!(c.environment["A"], "mine");
        assert_eq!(c.environment["B"], "parent");
    }

    #[test]
    fn test_execute_empty_container_never_runs() {
        assert!(!Container::default().execute(&push()).unwrap());
    }

    #[test]
    fn test_execute_running_treated_as_success() {
        let mut c = step("notify", &[]);
        c.ruleset.if_.status = ["success"].into_iter().collect();
        let data = RuleData {
            status: "running".to_string(),
            ..Default::default()
        };
        assert!(c.execute(&data).unwrap());
    }

    #[test]
    fn test_execute_after_failure_requires_status_rule() {
        let plain = step("test", &[]);
        let mut on_failure = step("alert", &[]);
        on_failure.ruleset.if_.status = ["failure"].into_iter().collect();

        for status in ["failure", "error"] {
            let data = RuleData {
                status: status.to_string(),
                ..Default::default()
            };
            assert!(!plain.execute(&data).unwrap());
            assert!(on_failure.execute(&data).unwrap());
        }
    }

    #[test]
    fn test_execute_ignores_path_rules() {
        let mut c = step("docs", &[]);
        c.ruleset.if_.path = ["docs/*"].into_iter().collect();
        let data = RuleData {
            status: "success".to_string(),
            ..Default::default()
        };
        assert!(c.execute(&data).unwrap());
    }

    #[test]
    fn test_sanitize_docker_id() {
        let c = Container {
            id: "github octocat._1_init/init".to_string(),
            ..Default::default()
        };
        assert_eq!(c.sanitize(Driver::Docker).id, "github-octocat._1_init-init");
    }
}
