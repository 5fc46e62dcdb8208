//! Stages: named groups of sequential steps.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::container::ContainerSlice;
use crate::driver::Driver;
use crate::error::{PipelineError, Result};
use crate::expr::Evaluator;
use crate::rules::{Environment, RuleData};

/// Result posted by the executor when a stage finishes.
pub type StageOutcome = std::result::Result<(), String>;

/// Single-slot, one-shot completion signal for a stage.
///
/// Clones share the slot. The compiler only allocates the signal; the
/// executor posts exactly one outcome and dependents wait on it.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    slot: Arc<watch::Sender<Option<StageOutcome>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Record the stage outcome. Only the first post is accepted.
    pub fn post(&self, stage: &str, outcome: StageOutcome) -> Result<()> {
        let accepted = self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });

        if accepted {
            Ok(())
        } else {
            Err(PipelineError::SignalPosted(stage.to_string()))
        }
    }

    /// Wait until an outcome has been posted.
    pub async fn wait(&self) -> StageOutcome {
        let mut rx = self.slot.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone().unwrap_or(Ok(())),
            // unreachable while `self` holds the sender
            Err(_) => Err("completion signal closed".to_string()),
        };
        outcome
    }

    /// The posted outcome, if any, without waiting.
    pub fn try_outcome(&self) -> Option<StageOutcome> {
        self.slot.borrow().clone()
    }

    /// Whether two handles refer to the same slot.
    pub fn same_slot(&self, other: &CompletionSignal) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A named group of steps executed in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    /// Names of stages that must complete first.
    pub needs: Vec<String>,
    /// Keep running when sibling stages fail.
    pub independent: bool,
    pub environment: Environment,
    pub steps: ContainerSlice,
    #[serde(skip)]
    pub done: CompletionSignal,
}

impl Stage {
    pub fn new(name: impl Into<String>, steps: ContainerSlice) -> Self {
        Self {
            name: name.into(),
            steps,
            ..Default::default()
        }
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageSlice(pub Vec<Stage>);

impl StageSlice {
    /// Purge the steps of every stage, dropping stages left without steps.
    ///
    /// Step numbers run on across stage boundaries, so the surviving steps of
    /// the whole pipeline are numbered 1..N in order.
    pub fn purge(self, data: &RuleData, evaluator: &dyn Evaluator) -> Result<Self> {
        let mut counter = 1;
        let mut kept = Vec::with_capacity(self.0.len());

        for mut stage in self.0 {
            stage.steps = stage
                .steps
                .purge_counted(data, evaluator, "step", &mut counter)?;

            if stage.steps.is_empty() {
                debug!(stage = %stage.name, "purged stage with no remaining steps");
                continue;
            }
            kept.push(stage);
        }

        Ok(StageSlice(kept))
    }

    pub fn sanitize(self, driver: Driver) -> Self {
        self.0
            .into_iter()
            .map(|mut stage| {
                stage.steps = stage.steps.sanitize(driver);
                stage
            })
            .collect()
    }
}

impl Deref for StageSlice {
    type Target = Vec<Stage>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StageSlice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<Stage> for StageSlice {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        StageSlice(iter.into_iter().collect())
    }
}

impl From<Vec<Stage>> for StageSlice {
    fn from(stages: Vec<Stage>) -> Self {
        StageSlice(stages)
    }
}
