// Error types for the mission library.
//
// Two families with different propagation rules:
//
// - `LoadFailure` is a *handled* report. A missing mission resource or a
//   resource that loads without its top-level group is logged, surfaced as a
//   `LifecycleEventKind::LoadFailed` event, and (for corruption) recovered
//   from by cycling missions. It never reaches the caller as an `Err`.
// - `LifecycleError` is *propagated*. Failures inside external collaborators
//   (game hooks, resource parsing, container bookkeeping) are not caught
//   here; they bubble out of the lifecycle operation to the host.

use thiserror::Error;

use crate::types::ContainerId;

/// Handled load failures. Both variants name the mission path so operators
/// can see which resource is at fault.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("could not find mission {path}")]
    ResourceMissing { path: String },
    #[error("no '{group}' found in mission \"{path}\"")]
    LoadCorruption { path: String, group: String },
}

impl LoadFailure {
    pub fn path(&self) -> &str {
        match self {
            Self::ResourceMissing { path } | Self::LoadCorruption { path, .. } => path,
        }
    }
}

/// Failures from the object container manager.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("container {0:?} does not exist")]
    UnknownContainer(ContainerId),
    #[error("no active container target for new objects")]
    NoActiveTarget,
}

/// Failures reading or instantiating a mission resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("mission resource {path} not found")]
    NotFound { path: String },
    #[error("failed to read mission resource {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse mission resource {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to instantiate mission resource {path}: {source}")]
    Instantiate {
        path: String,
        #[source]
        source: ContainerError,
    },
}

/// A game-level hook reported failure. The controller does not interpret it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{hook} hook failed: {message}")]
pub struct HookError {
    pub hook: &'static str,
    pub message: String,
}

impl HookError {
    pub fn new(hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            hook,
            message: message.into(),
        }
    }
}

/// Failures that escape a lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Failures loading a `LifecycleConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
