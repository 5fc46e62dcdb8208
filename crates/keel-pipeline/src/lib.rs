//! Keel Pipeline - compilation core for build definitions
//!
//! Turns a declarative pipeline tree into a runtime-ready plan:
//! - Evaluates rulesets against the event that triggered a build
//! - Purges non-matching steps, services, stages and secrets, renumbering
//!   the survivors
//! - Sanitizes container identifiers for the selected runtime driver
//!
//! ```
//! use keel_pipeline::{Build, Container, ContainerSlice, Driver, RuleData, Rules, Ruleset};
//!
//! let step = |name: &str, event: &str| Container {
//!     id: format!("step_{name}"),
//!     name: name.to_string(),
//!     image: "alpine".to_string(),
//!     ruleset: Ruleset {
//!         if_: Rules { event: [event].into_iter().collect(), ..Default::default() },
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! let build = Build {
//!     id: "octocat hello".to_string(),
//!     steps: ContainerSlice(vec![step("test", "push"), step("publish", "tag")]),
//!     ..Default::default()
//! };
//! let data = RuleData { event: "push".to_string(), ..Default::default() };
//!
//! let compiled = build.purge(&data)?.sanitize(Driver::Docker)?;
//! assert_eq!(compiled.id, "octocat-hello");
//! assert_eq!(compiled.steps.len(), 1);
//! # Ok::<(), keel_pipeline::PipelineError>(())
//! ```

pub mod build;
pub mod container;
pub mod deployment;
pub mod driver;
pub mod error;
pub mod expr;
pub mod matcher;
pub mod rules;
pub mod secret;
pub mod stage;

// Re-export key types
pub use build::{Build, Metadata, Worker};
pub use container::{Container, ContainerSlice, PullPolicy, Ulimit, Volume};
pub use deployment::{Deployment, Parameter, ParameterType};
pub use driver::Driver;
pub use error::{PipelineError, Result};
pub use expr::{Evaluator, ExprEvaluator};
pub use matcher::Matcher;
pub use rules::{Environment, Operator, RuleData, Rules, Ruleset, Ruletype};
pub use secret::{Secret, SecretPath, SecretSlice, SecretType};
pub use stage::{CompletionSignal, Stage, StageOutcome, StageSlice};
