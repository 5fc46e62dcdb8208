//! Error taxonomy for pipeline compilation.

/// Errors produced while matching, purging or sanitizing a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot have both stages and steps at the top level of pipeline")]
    AmbiguousShape,

    #[error("error in {kind} pattern {pattern}: {reason}")]
    Pattern {
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("error in expression {expr}: {reason}")]
    Expression { expr: String, reason: String },

    #[error("unable to process ruleset for {kind} {name}: {source}")]
    Ruleset {
        kind: &'static str,
        name: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("unsupported runtime driver: {0}")]
    UnsupportedDriver(String),

    #[error("invalid deployment: {0}")]
    Deployment(String),

    #[error("invalid secret key {key}: {reason}")]
    SecretKey { key: String, reason: String },

    #[error("completion already posted for stage {0}")]
    SignalPosted(String),
}

impl PipelineError {
    /// Wrap a matching failure with the name of the pipeline element that
    /// triggered it.
    pub(crate) fn in_ruleset(self, kind: &'static str, name: &str) -> Self {
        PipelineError::Ruleset {
            kind,
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
