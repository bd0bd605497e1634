//! In-memory registry used to drive the resolver in tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::model::{DependencyEdge, ModulePin, Reference, RepositoryKey, Revision};

use super::{ensure_single_remote, FetchError, LocalPins, PinFetcher};

#[derive(Debug, Clone, Default)]
struct MemoryCommit {
    digest: String,
    dependencies: Vec<Reference>,
}

#[derive(Debug, Clone)]
struct MemoryRepository {
    default_branch: String,
    branches: BTreeMap<String, Vec<String>>,
    tags: BTreeMap<String, String>,
    drafts: BTreeMap<String, String>,
    commits: BTreeMap<String, MemoryCommit>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        MemoryRepository {
            default_branch: "main".to_owned(),
            branches: BTreeMap::new(),
            tags: BTreeMap::new(),
            drafts: BTreeMap::new(),
            commits: BTreeMap::new(),
        }
    }
}

/// Repositories of any number of remotes, keyed by repository.
#[derive(Debug, Default)]
pub(crate) struct MemoryRegistry {
    repositories: BTreeMap<RepositoryKey, MemoryRepository>,
}

fn key(url: &str) -> RepositoryKey {
    RepositoryKey::from_url(url).unwrap()
}

fn references(dependencies: &[&str]) -> Vec<Reference> {
    dependencies.iter().map(|d| d.parse().unwrap()).collect()
}

impl MemoryRegistry {
    /// Appends `commit` to `branch` of `repository`.
    pub fn commit(
        &mut self,
        repository: &str,
        branch: &str,
        commit: &str,
        dependencies: &[&str],
    ) -> &mut Self {
        let repo = self.repositories.entry(key(repository)).or_default();
        repo.branches
            .entry(branch.to_owned())
            .or_default()
            .push(commit.to_owned());
        repo.commits.insert(
            commit.to_owned(),
            MemoryCommit {
                digest: format!("digest-{commit}"),
                dependencies: references(dependencies),
            },
        );
        self
    }

    /// Adds a commit that lives on no branch, reachable only through `draft`.
    pub fn draft(
        &mut self,
        repository: &str,
        draft: &str,
        commit: &str,
        dependencies: &[&str],
    ) -> &mut Self {
        let repo = self.repositories.entry(key(repository)).or_default();
        repo.drafts.insert(draft.to_owned(), commit.to_owned());
        repo.commits.insert(
            commit.to_owned(),
            MemoryCommit {
                digest: format!("digest-{commit}"),
                dependencies: references(dependencies),
            },
        );
        self
    }

    pub fn tag(&mut self, repository: &str, tag: &str, commit: &str) -> &mut Self {
        self.repositories
            .entry(key(repository))
            .or_default()
            .tags
            .insert(tag.to_owned(), commit.to_owned());
        self
    }

    pub fn default_branch(&mut self, repository: &str, branch: &str) -> &mut Self {
        self.repositories
            .entry(key(repository))
            .or_default()
            .default_branch = branch.to_owned();
        self
    }

    fn resolve(&self, reference: &Reference) -> Result<(ModulePin, &MemoryCommit), FetchError> {
        let not_found = || FetchError::NotFound {
            reference: reference.clone(),
        };
        let repo = self
            .repositories
            .get(&reference.repository)
            .ok_or_else(not_found)?;

        let (commit, requested_branch) = match &reference.revision {
            Revision::Default => (
                repo.branches
                    .get(&repo.default_branch)
                    .and_then(|commits| commits.last())
                    .ok_or_else(not_found)?,
                Some(repo.default_branch.as_str()),
            ),
            Revision::Named(name) if name.starts_with('-') || name.contains("..") => {
                return Err(FetchError::InvalidReference {
                    reference: reference.clone(),
                    reason: "not a valid ref name".to_owned(),
                })
            }
            Revision::Named(name) => {
                if let Some(commits) = repo.branches.get(name) {
                    (commits.last().ok_or_else(not_found)?, Some(name.as_str()))
                } else if let Some(commit) = repo.tags.get(name).or(repo.drafts.get(name)) {
                    (commit, None)
                } else if let Some((commit, _)) = repo.commits.get_key_value(name) {
                    (commit, None)
                } else {
                    return Err(not_found());
                }
            }
        };

        let on_default_branch = repo
            .branches
            .get(&repo.default_branch)
            .is_some_and(|commits| commits.contains(commit));
        let branch = requested_branch
            .filter(|branch| repo.branches[*branch].contains(commit))
            .or(on_default_branch.then_some(repo.default_branch.as_str()))
            .or_else(|| {
                repo.branches
                    .iter()
                    .find(|(_, commits)| commits.contains(commit))
                    .map(|(name, _)| name.as_str())
            });
        let sequence = branch.and_then(|branch| {
            repo.branches[branch]
                .iter()
                .position(|c| c == commit)
                .map(|index| index as u64 + 1)
        });

        let data = &repo.commits[commit];
        let pin = ModulePin {
            repository: reference.repository.clone(),
            commit: commit.clone(),
            digest: data.digest.clone(),
            branch: branch.map(str::to_owned),
            sequence,
            on_default_branch,
        };
        Ok((pin, data))
    }
}

/// Serves the repositories of one remote out of a shared [`MemoryRegistry`].
pub(crate) struct MemoryRemote {
    remote: String,
    registry: Arc<MemoryRegistry>,
    calls: Mutex<Vec<Vec<Reference>>>,
}

impl MemoryRemote {
    pub fn new(remote: &str, registry: Arc<MemoryRegistry>) -> Self {
        MemoryRemote {
            remote: remote.to_owned(),
            registry,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every batch this remote was asked to resolve, in call order.
    pub fn calls(&self) -> Vec<Vec<Reference>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PinFetcher for MemoryRemote {
    async fn fetch_local(&self, references: &[Reference]) -> Result<LocalPins, FetchError> {
        self.calls.lock().unwrap().push(references.to_vec());

        if let Some(remote) = ensure_single_remote(references)? {
            if remote != self.remote {
                return Err(FetchError::RemoteMismatch {
                    expected: self.remote.clone(),
                    found: remote.to_owned(),
                });
            }
        }

        let mut result = LocalPins::default();
        for reference in references {
            let (pin, commit) = self.registry.resolve(reference)?;
            for dependency in &commit.dependencies {
                let (to, _) =
                    self.registry
                        .resolve(dependency)
                        .map_err(|source| FetchError::Dependency {
                            reference: reference.clone(),
                            dependency: dependency.clone(),
                            source: Box::new(source),
                        })?;
                result.edges.push(DependencyEdge {
                    from: pin.pin_key(),
                    to,
                });
            }
            result.pins.push(pin);
        }
        Ok(result)
    }
}
