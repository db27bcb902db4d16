use std::time::Duration;

/// Failures surfaced by the reconciler and pipeline machinery.
///
/// `Wait` and `Degraded` are the two step outcomes the pipeline engine
/// handles itself; everything else propagates to the controller's error
/// policy for a backoff requeue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes api failure: {0}")]
    Api(#[from] kube::Error),

    #[error("spec missing required field `{0}`")]
    MissingField(&'static str),

    #[error("autoscaler misconfigured: {0}")]
    Scaling(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cluster has not converged yet; run the same step again later.
    #[error("{reason} (retrying in {delay:?})")]
    Wait { delay: Duration, reason: String },

    /// Manual intervention required; the pipeline halts where it stands.
    #[error("{0}")]
    Degraded(String),
}

impl Error {
    pub fn wait(period: u64, reason: impl Into<String>) -> Self {
        Error::Wait {
            delay: Duration::from_secs(period),
            reason: reason.into(),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Error::Degraded(reason.into())
    }
}

/// Structural-merge failures. The left-hand side is left untouched when
/// any of these is returned.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("type mismatch merging `{path}`")]
    TypeMismatch { path: String },

    #[error("no value at `{path}`")]
    MissingPath { path: String },

    #[error("index {index} out of bounds at `{path}`")]
    IndexOutOfBounds { path: String, index: usize },
}

/// Manifest-template failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template `{template}` could not be read: {source}")]
    Io {
        template: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template `{template}` references unknown placeholder `{placeholder}`")]
    UnknownPlaceholder { template: String, placeholder: String },

    #[error("template `{template}` is not valid yaml: {source}")]
    Yaml {
        template: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
