#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{DependencyEdge, ModulePin, Reference};

/// Pins returned by one [`PinFetcher::fetch_local`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPins {
    /// `pins[i]` is the pin for the `i`-th requested reference.
    pub pins: Vec<ModulePin>,
    /// Direct declared dependencies of the returned pins.
    pub edges: Vec<DependencyEdge>,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Module {reference} was not found")]
    NotFound { reference: Reference },
    #[error("Ref of {reference} is not a branch, tag, draft or commit: {reason}")]
    InvalidReference { reference: Reference, reason: String },
    #[error("Fetch for remote {expected} was given a reference on remote {found}")]
    RemoteMismatch { expected: String, found: String },
    #[error("Failed to resolve dependency {dependency} declared by {reference}: {source}")]
    Dependency {
        reference: Reference,
        dependency: Reference,
        source: Box<FetchError>,
    },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl FetchError {
    /// The requested reference this error is about, if any.
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            FetchError::NotFound { reference }
            | FetchError::InvalidReference { reference, .. }
            | FetchError::Dependency { reference, .. } => Some(reference),
            FetchError::RemoteMismatch { .. }
            | FetchError::Transport(_) => None,
        }
    }
}

/// Resolves references on a single remote, one hop deep.
///
/// Implementations return every pin they find for a repository and never pick
/// a winner between competing pins of the same repository: that decision is
/// made once, after the whole graph is known.
#[async_trait]
pub trait PinFetcher: Send + Sync {
    /// All `references` must share the same remote.
    async fn fetch_local(&self, references: &[Reference]) -> Result<LocalPins, FetchError>;
}

/// Returns the remote shared by all `references`, or `None` if there are none.
pub fn ensure_single_remote(references: &[Reference]) -> Result<Option<&str>, FetchError> {
    let Some(first) = references.first() else {
        return Ok(None);
    };
    let expected = first.remote();
    match references.iter().find(|r| r.remote() != expected) {
        Some(other) => Err(FetchError::RemoteMismatch {
            expected: expected.to_owned(),
            found: other.remote().to_owned(),
        }),
        None => Ok(Some(expected)),
    }
}
