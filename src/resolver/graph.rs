use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    fetcher::{FetchError, LocalPins},
    model::{Candidate, DependencyEdge, ModulePin, PinKey, Provenance, Reference},
};

use super::{CancelReason, CandidateSet, Remotes, ResolveError};

/// Everything learned while traversing the dependency graph of one resolution.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    pub candidates: CandidateSet,
}

impl DependencyGraph {
    fn add_candidate(&mut self, candidate: Candidate) {
        self.candidates
            .entry(candidate.pin.repository.clone())
            .or_default()
            .push(candidate);
    }
}

/// A reference to fetch, with every chain that asked for it.
#[derive(Debug)]
struct Request {
    reference: Reference,
    requested_by: Vec<Provenance>,
}

impl Request {
    fn provenance(&self) -> &Provenance {
        // Every request carries at least one provenance.
        &self.requested_by[0]
    }
}

/// Builds the transitive closure of `seeds`, one breadth-first level at a time.
///
/// Each level is partitioned by remote and every remote is fetched
/// concurrently with a single batched call. The next level starts only once
/// every fetch of the current one is merged. A `(repository, commit)` pair is
/// fetched at most once; later edges pointing at it reuse the fetched pin.
pub(crate) async fn build_graph(
    remotes: &Remotes,
    seeds: &[Reference],
    cancel: &CancellationToken,
) -> Result<DependencyGraph, ResolveError> {
    let mut graph = DependencyGraph::default();
    let mut fetched: HashMap<PinKey, ModulePin> = HashMap::new();
    let mut frontier: Vec<Request> = seeds
        .iter()
        .map(|reference| Request {
            reference: reference.clone(),
            requested_by: vec![Provenance::seed()],
        })
        .collect();
    let mut depth = 0;

    while !frontier.is_empty() {
        let batches = partition_by_remote(frontier);
        debug!(
            "Resolving depth {} across {} remote(s)",
            depth,
            batches.len()
        );
        let mut responses = fetch_level(remotes, &batches, cancel).await?;

        let mut expanded: Vec<(&Request, ModulePin)> = Vec::new();
        let mut edges: HashMap<PinKey, Vec<DependencyEdge>> = HashMap::new();
        for (remote, requests) in &batches {
            let LocalPins { pins, edges: level_edges } =
                responses.remove(remote).unwrap_or_default();
            check_response(remote, requests, &pins, &level_edges)?;

            for edge in level_edges {
                let declared = edges.entry(edge.from.clone()).or_default();
                if !declared.contains(&edge) {
                    declared.push(edge);
                }
            }
            for (request, pin) in requests.iter().zip(pins) {
                for provenance in &request.requested_by {
                    graph.add_candidate(Candidate {
                        pin: pin.clone(),
                        reference: request.reference.clone(),
                        provenance: provenance.clone(),
                    });
                }
                if fetched.contains_key(&pin.pin_key()) {
                    debug!("{} was already fetched", pin);
                } else {
                    fetched.insert(pin.pin_key(), pin.clone());
                    expanded.push((request, pin));
                }
            }
        }

        let mut pending: BTreeMap<PinKey, Request> = BTreeMap::new();
        for (request, pin) in expanded {
            let from = pin.pin_key();
            for edge in edges.remove(&from).unwrap_or_default() {
                let to = edge.to.pin_key();
                let requested_by = request
                    .requested_by
                    .iter()
                    .map(|provenance| provenance.then(request.reference.clone()));
                match fetched.get(&to) {
                    Some(known) => {
                        for provenance in requested_by {
                            graph.candidates.entry(to.repository.clone()).or_default().push(
                                Candidate {
                                    pin: known.clone(),
                                    reference: edge.to.reference(),
                                    provenance,
                                },
                            );
                        }
                    }
                    None => pending
                        .entry(to)
                        .or_insert_with(|| Request {
                            reference: edge.to.reference(),
                            requested_by: Vec::new(),
                        })
                        .requested_by
                        .extend(requested_by),
                }
            }
        }
        frontier = pending.into_values().collect();
        depth += 1;
    }

    info!(
        "Found {} candidate(s) for {} repositories",
        graph.candidates.values().map(Vec::len).sum::<usize>(),
        graph.candidates.len()
    );
    Ok(graph)
}

fn partition_by_remote(requests: Vec<Request>) -> BTreeMap<String, Vec<Request>> {
    let mut batches: BTreeMap<String, Vec<Request>> = BTreeMap::new();
    for request in requests {
        batches
            .entry(request.reference.remote().to_owned())
            .or_default()
            .push(request);
    }
    batches
}

/// Fetches every batch concurrently and waits for all of them.
async fn fetch_level(
    remotes: &Remotes,
    batches: &BTreeMap<String, Vec<Request>>,
    cancel: &CancellationToken,
) -> Result<HashMap<String, LocalPins>, ResolveError> {
    let mut tasks = JoinSet::new();
    for (remote, requests) in batches {
        let fetcher = remotes.fetcher(remote)?;
        let references: Vec<Reference> = requests
            .iter()
            .map(|request| request.reference.clone())
            .collect();
        let remote = remote.clone();
        info!("Fetching {} module(s) from {}", references.len(), remote);
        tasks.spawn(async move {
            let result = fetcher.fetch_local(&references).await;
            (remote, result)
        });
    }

    let mut responses = HashMap::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Err(ResolveError::Cancelled(CancelReason::Aborted));
            }
            next = tasks.join_next() => next,
        };
        match next {
            None => return Ok(responses),
            Some(Ok((remote, Ok(local)))) => {
                responses.insert(remote, local);
            }
            Some(Ok((remote, Err(error)))) => {
                return Err(annotate(error, &remote, &batches[&remote]));
            }
            Some(Err(error)) => {
                return Err(ResolveError::Transport(
                    anyhow::Error::new(error).context("fetch task failed"),
                ))
            }
        }
    }
}

fn check_response(
    remote: &str,
    requests: &[Request],
    pins: &[ModulePin],
    edges: &[DependencyEdge],
) -> Result<(), ResolveError> {
    let malformed = |reason: String| ResolveError::MalformedResponse {
        remote: remote.to_owned(),
        reason,
    };
    if pins.len() != requests.len() {
        return Err(malformed(format!(
            "requested {} module(s) but received {} pin(s)",
            requests.len(),
            pins.len()
        )));
    }
    for (request, pin) in requests.iter().zip(pins) {
        if pin.repository != request.reference.repository {
            return Err(malformed(format!(
                "received {} for {}",
                pin, request.reference
            )));
        }
    }
    for edge in edges {
        if !pins.iter().any(|pin| pin.pin_key() == edge.from) {
            return Err(malformed(format!(
                "declared dependencies for {}, which was not requested",
                edge.from
            )));
        }
    }
    Ok(())
}

/// Attaches the dependency chain to a failure of a transitively discovered
/// reference. Failures of seeds are returned unchanged.
///
/// A failure that names no requested reference is attributed to the whole
/// batch unless the batch holds a single request.
fn annotate(error: FetchError, remote: &str, batch: &[Request]) -> ResolveError {
    let request = match (error.reference(), batch) {
        (Some(reference), _) => batch.iter().find(|r| &r.reference == reference),
        (None, [only]) => Some(only),
        (None, _) => None,
    };
    let Some(request) = request else {
        if batch.iter().all(|request| request.provenance().is_seed()) {
            return error.into();
        }
        return ResolveError::BatchFailed {
            remote: remote.to_owned(),
            requests: batch
                .iter()
                .flat_map(|request| {
                    request
                        .requested_by
                        .iter()
                        .map(|provenance| provenance.then(request.reference.clone()))
                })
                .collect(),
            source: Box::new(error.into()),
        };
    };
    let provenance = request.provenance();

    match error {
        FetchError::Dependency {
            reference, source, ..
        } => ResolveError::Transitive {
            chain: provenance.then(reference),
            source: Box::new((*source).into()),
        },
        error if provenance.is_seed() => error.into(),
        error @ (FetchError::NotFound { .. } | FetchError::InvalidReference { .. }) => {
            ResolveError::Transitive {
                chain: provenance.clone(),
                source: Box::new(error.into()),
            }
        }
        error => ResolveError::Transitive {
            chain: provenance.then(request.reference.clone()),
            source: Box::new(error.into()),
        },
    }
}
