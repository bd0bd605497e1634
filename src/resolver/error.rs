use std::{fmt::Display, time::Duration};

use thiserror::Error;

use crate::{
    fetcher::FetchError,
    model::{ModulePin, Provenance, Reference, RepositoryKey},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Aborted,
    TimedOut(Duration),
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Aborted => f.write_str("aborted by caller"),
            CancelReason::TimedOut(timeout) => write!(f, "timed out after {timeout:?}"),
        }
    }
}

/// One of the commits competing for the same repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub pin: ModulePin,
    pub requested_by: Vec<Provenance>,
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    let mut description = String::new();
    for conflict in conflicts {
        description.push_str("\n  ");
        description.push_str(&conflict.pin.commit);
        if let Some(branch) = &conflict.pin.branch {
            description.push_str(&format!(" on branch {branch}"));
        }
        let requested_by = conflict
            .requested_by
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        description.push_str(&format!(", {requested_by}"));
    }
    description
}

fn describe_requests(requests: &[Provenance]) -> String {
    requests
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No module references to resolve")]
    NoReferences,
    #[error("Invalid module reference {reference}: {reason}")]
    InvalidReference { reference: Reference, reason: String },
    #[error("Module {reference} was not found")]
    NotFound { reference: Reference },
    #[error("Fetch for remote {expected} was given a reference on remote {found}")]
    RemoteMismatch { expected: String, found: String },
    #[error("No fetcher is configured for remote {remote}")]
    UnknownRemote { remote: String },
    #[error("Malformed response from remote {remote}: {reason}")]
    MalformedResponse { remote: String, reason: String },
    #[error(
        "Conflicting commits required for {repository}, pin one of them explicitly:{}",
        describe_conflicts(.conflicts)
    )]
    ConflictingDependency {
        repository: RepositoryKey,
        conflicts: Vec<Conflict>,
    },
    #[error(
        "{first} and {second} request the same repository with different refs; \
         refs are compared before fetching, so name the repository once"
    )]
    DuplicateReferenceConflict { first: Reference, second: Reference },
    #[error("Resolution cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("{source} (required by {chain})")]
    Transitive {
        chain: Provenance,
        source: Box<ResolveError>,
    },
    #[error(
        "{source} (while fetching from {remote}: {})",
        describe_requests(.requests)
    )]
    BatchFailed {
        remote: String,
        /// Chain of every reference in the failed batch, ending with the reference.
        requests: Vec<Provenance>,
        source: Box<ResolveError>,
    },
    #[error(transparent)]
    Transport(anyhow::Error),
}

impl ResolveError {
    /// The error with any dependency chain annotation removed.
    pub fn root(&self) -> &ResolveError {
        match self {
            ResolveError::Transitive { source, .. } | ResolveError::BatchFailed { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

impl From<FetchError> for ResolveError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::NotFound { reference } => ResolveError::NotFound { reference },
            FetchError::InvalidReference { reference, reason } => {
                ResolveError::InvalidReference { reference, reason }
            }
            FetchError::RemoteMismatch { expected, found } => {
                ResolveError::RemoteMismatch { expected, found }
            }
            FetchError::Dependency {
                reference, source, ..
            } => ResolveError::Transitive {
                chain: Provenance::seed().then(reference),
                source: Box::new((*source).into()),
            },
            FetchError::Transport(error) => ResolveError::Transport(error),
        }
    }
}
