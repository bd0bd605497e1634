use std::collections::BTreeMap;

use log::{debug, info};

use crate::model::{Candidate, ModulePin, Provenance, RepositoryKey};

use super::{CandidateSet, Conflict, ResolveError};

/// Picks one pin per repository. The output is sorted by repository.
pub fn select_winners(candidates: &CandidateSet) -> Result<Vec<ModulePin>, ResolveError> {
    candidates
        .iter()
        .filter(|(_, candidates)| !candidates.is_empty())
        .map(|(repository, candidates)| select_winner(repository, candidates))
        .collect()
}

struct Contender<'a> {
    pin: &'a ModulePin,
    requested_by: Vec<&'a Provenance>,
}

/// Picks the winning pin among `candidates`, all of which are for `repository`.
///
/// Candidates naming the same commit are merged first. Among distinct commits,
/// the winner is the one that supersedes every other; when no commit does,
/// resolution is ambiguous and fails with [`ResolveError::ConflictingDependency`].
fn select_winner(
    repository: &RepositoryKey,
    candidates: &[Candidate],
) -> Result<ModulePin, ResolveError> {
    let mut by_commit: BTreeMap<&str, Contender> = BTreeMap::new();
    for candidate in candidates {
        by_commit
            .entry(candidate.pin.commit.as_str())
            .or_insert_with(|| Contender {
                pin: &candidate.pin,
                requested_by: Vec::new(),
            })
            .requested_by
            .push(&candidate.provenance);
    }
    let contenders: Vec<Contender> = by_commit.into_values().collect();

    if let [only] = contenders.as_slice() {
        debug!("{} resolved to {}", repository, only.pin);
        return Ok(only.pin.clone());
    }

    let mut winners = contenders.iter().filter(|contender| {
        contenders.iter().all(|other| {
            other.pin.commit == contender.pin.commit || supersedes(contender.pin, other.pin)
        })
    });
    if let (Some(winner), None) = (winners.next(), winners.next()) {
        info!(
            "Selected {} for {}, discarding {} other candidate commit(s)",
            winner.pin,
            repository,
            contenders.len() - 1
        );
        return Ok(winner.pin.clone());
    }

    Err(ResolveError::ConflictingDependency {
        repository: repository.clone(),
        conflicts: contenders
            .into_iter()
            .map(|contender| {
                let mut requested_by: Vec<Provenance> =
                    contender.requested_by.into_iter().cloned().collect();
                requested_by.sort();
                requested_by.dedup();
                Conflict {
                    pin: contender.pin.clone(),
                    requested_by,
                }
            })
            .collect(),
    })
}

/// Whether `pin` should win over `other`, a different commit of the same repository.
///
/// Sequence numbers are only comparable on the same branch. Across branches,
/// or when a remote does not number its commits, only reachability from the
/// default branch can break the tie.
fn supersedes(pin: &ModulePin, other: &ModulePin) -> bool {
    match (&pin.branch, &other.branch, pin.sequence, other.sequence) {
        (Some(branch), Some(other_branch), Some(sequence), Some(other_sequence))
            if branch == other_branch =>
        {
            sequence > other_sequence
        }
        _ => pin.on_default_branch && !other.on_default_branch,
    }
}
