//! The compiled pipeline tree and its purge and sanitize passes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::ContainerSlice;
use crate::deployment::Deployment;
use crate::driver::Driver;
use crate::error::{PipelineError, Result};
use crate::expr::{Evaluator, ExprEvaluator};
use crate::rules::{Environment, RuleData};
use crate::secret::SecretSlice;
use crate::stage::StageSlice;

/// Pipeline-level settings carried through compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metadata {
    pub template: bool,
    pub clone: bool,
    /// Which containers receive the platform environment.
    pub environment: Vec<String>,
}

/// Worker selection constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Worker {
    pub flavor: String,
    pub platform: String,
}

/// Root of the pipeline tree.
///
/// A build holds either `stages` or `steps`, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub id: String,
    pub version: String,
    pub metadata: Metadata,
    pub environment: Environment,
    pub worker: Worker,
    pub deployment: Deployment,
    pub secrets: SecretSlice,
    pub services: ContainerSlice,
    pub stages: StageSlice,
    pub steps: ContainerSlice,
}

impl Build {
    fn check_shape(&self) -> Result<()> {
        if !self.stages.is_empty() && !self.steps.is_empty() {
            return Err(PipelineError::AmbiguousShape);
        }
        Ok(())
    }

    /// Remove every element whose ruleset does not match `data` and renumber
    /// the survivors.
    pub fn purge(self, data: &RuleData) -> Result<Self> {
        self.purge_with(data, &ExprEvaluator)
    }

    /// Purge with a caller-supplied expression engine.
    ///
    /// Stage steps share one counter, services and secret origins each get
    /// their own. On error the build is consumed and nothing is returned.
    #[tracing::instrument(level = "debug", skip_all, fields(build = %self.id))]
    pub fn purge_with(mut self, data: &RuleData, evaluator: &dyn Evaluator) -> Result<Self> {
        self.check_shape()?;

        if !self.stages.is_empty() {
            self.stages = self.stages.purge(data, evaluator)?;
        }

        if !self.steps.is_empty() {
            self.steps = self.steps.purge(data, evaluator)?;
        }

        let mut counter = 1;
        self.services = self
            .services
            .purge_counted(data, evaluator, "service", &mut counter)?;

        self.secrets = self.secrets.purge(data, evaluator)?;

        debug!(
            stages = self.stages.len(),
            steps = self.steps.len(),
            services = self.services.len(),
            secrets = self.secrets.len(),
            "purged pipeline"
        );
        Ok(self)
    }

    /// Rewrite container ids and the build id for `driver`.
    #[tracing::instrument(level = "debug", skip_all, fields(build = %self.id, driver = %driver))]
    pub fn sanitize(mut self, driver: Driver) -> Result<Self> {
        self.check_shape()?;

        self.stages = self.stages.sanitize(driver);
        self.steps = self.steps.sanitize(driver);
        self.services = self.services.sanitize(driver);
        self.secrets = self.secrets.sanitize(driver);
        self.id = driver.sanitize_id(&self.id);

        Ok(self)
    }
}
