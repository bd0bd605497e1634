use std::str::Utf8Error;

use git2::{Direction, ErrorCode, Oid, Reference as GitReference, Repository, Sort};
use log::{debug, trace};
use thiserror::Error;

use crate::model::{
    manifest::{ModuleManifest, MANIFEST_FILE_NAME},
    ModulePin, RepositoryKey, Revision,
};

use super::cache::{CacheError, GitCache};

const REMOTE_BRANCHES: &str = "refs/remotes/origin";
const REMOTE_HEAD: &str = "refs/remotes/origin/HEAD";
const TAGS: &str = "refs/tags";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Revision {revision} was not found in {repository}")]
    RevisionNotFound {
        repository: RepositoryKey,
        revision: String,
    },
    #[error("{revision} is not a valid branch, tag or commit name")]
    InvalidRevision { revision: String },
    #[error("{repository} has no default branch")]
    MissingDefaultBranch { repository: RepositoryKey },
    #[error("Error while decoding utf8 bytes from blob")]
    BlobRead(#[from] Utf8Error),
    #[error("Error while parsing manifest: {0}")]
    Parsing(#[from] crate::model::ParseError),
    #[error("Bad git object kind {kind} found for {commit} (expected blob)")]
    BadObjectKind { kind: String, commit: String },
}

/// A commit a revision resolved to, plus the branch it was requested through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedCommit<'a> {
    pub oid: Oid,
    pub branch: Option<&'a str>,
}

/// A cached bare clone of one repository.
///
/// Remote branches live under `refs/remotes/origin`, the remote's default
/// branch is recorded as the symbolic `refs/remotes/origin/HEAD`.
pub struct ModuleRepository {
    key: RepositoryKey,
    git_repo: Repository,
}

impl ModuleRepository {
    pub fn new(key: RepositoryKey, git_repo: Repository) -> ModuleRepository {
        ModuleRepository { key, git_repo }
    }

    /// Fetches every branch and tag of the remote and records its default branch.
    pub fn update(&self, cache: &GitCache) -> Result<(), CacheError> {
        debug!("Fetching {}", self.key);
        let mut remote = self.git_repo.find_remote("origin")?;

        let default_branch = {
            let connection =
                remote.connect_auth(Direction::Fetch, Some(cache.remote_callbacks()?), None)?;
            let head = connection.default_branch()?;
            head.as_str()
                .and_then(|head| head.strip_prefix("refs/heads/"))
                .map(str::to_owned)
        };

        remote.fetch(
            &[
                "+refs/heads/*:refs/remotes/origin/*",
                "+refs/tags/*:refs/tags/*",
            ],
            Some(&mut cache.fetch_options()?),
            None,
        )?;

        match default_branch {
            Some(branch) => {
                trace!("Default branch of {} is {}", self.key, branch);
                self.git_repo.reference_symbolic(
                    REMOTE_HEAD,
                    &format!("{REMOTE_BRANCHES}/{branch}"),
                    true,
                    "modpin: record default branch",
                )?;
            }
            None => debug!("{} did not advertise a default branch", self.key),
        }
        Ok(())
    }

    /// Resolves `revision` as a branch, then a tag, then a commit id.
    pub(crate) fn resolve<'r>(
        &self,
        revision: &'r Revision,
    ) -> Result<ResolvedCommit<'r>, RepositoryError> {
        let name = match revision {
            Revision::Default => {
                let head = self.default_branch()?;
                return Ok(ResolvedCommit {
                    oid: head.1,
                    branch: None,
                });
            }
            Revision::Named(name) => name.as_str(),
        };

        if name.starts_with('-') || !GitReference::is_valid_name(&format!("{TAGS}/{name}")) {
            return Err(RepositoryError::InvalidRevision {
                revision: name.to_owned(),
            });
        }

        if let Some(oid) = self.peel(&format!("{REMOTE_BRANCHES}/{name}"))? {
            trace!("{} resolved {} as a branch", self.key, name);
            return Ok(ResolvedCommit {
                oid,
                branch: Some(name),
            });
        }
        if let Some(oid) = self.peel(&format!("{TAGS}/{name}"))? {
            trace!("{} resolved {} as a tag", self.key, name);
            return Ok(ResolvedCommit { oid, branch: None });
        }
        if is_commit_id(name) {
            match self.git_repo.revparse_single(name).and_then(|o| o.peel_to_commit()) {
                Ok(commit) => {
                    return Ok(ResolvedCommit {
                        oid: commit.id(),
                        branch: None,
                    })
                }
                Err(error)
                    if matches!(error.code(), ErrorCode::NotFound | ErrorCode::Ambiguous) =>
                {
                    trace!("{} has no commit {}: {}", self.key, name, error)
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(RepositoryError::RevisionNotFound {
            repository: self.key.clone(),
            revision: name.to_owned(),
        })
    }

    /// Name and head of the remote's default branch.
    pub fn default_branch(&self) -> Result<(String, Oid), RepositoryError> {
        let missing = || RepositoryError::MissingDefaultBranch {
            repository: self.key.clone(),
        };
        let head = match self.git_repo.find_reference(REMOTE_HEAD) {
            Ok(head) => head,
            Err(error) if error.code() == ErrorCode::NotFound => return Err(missing()),
            Err(error) => return Err(error.into()),
        };
        let name = head
            .symbolic_target()
            .and_then(|target| target.strip_prefix(REMOTE_BRANCHES))
            .and_then(|target| target.strip_prefix('/'))
            .ok_or_else(missing)?
            .to_owned();
        let oid = head.resolve()?.peel_to_commit()?.id();
        Ok((name, oid))
    }

    /// Resolves `revision` to a pin.
    ///
    /// The pin's branch is the requested branch, or the default branch when
    /// the commit is reachable from it. Its sequence counts the commits
    /// reachable from it, which strictly increases along a branch.
    pub fn pin(&self, revision: &Revision) -> Result<ModulePin, RepositoryError> {
        let resolved = self.resolve(revision)?;
        let default_branch = match self.default_branch() {
            Ok(default_branch) => Some(default_branch),
            Err(RepositoryError::MissingDefaultBranch { .. }) => None,
            Err(error) => return Err(error),
        };

        let on_default_branch = match &default_branch {
            Some((_, head)) => self.is_ancestor(resolved.oid, *head)?,
            None => false,
        };
        let branch = match (resolved.branch, default_branch) {
            (Some(branch), _) => Some(branch.to_owned()),
            (None, Some((name, _))) if on_default_branch => Some(name),
            (None, _) => None,
        };
        let sequence = match branch {
            Some(_) => Some(self.sequence(resolved.oid)?),
            None => None,
        };

        let commit = self.git_repo.find_commit(resolved.oid)?;
        Ok(ModulePin {
            repository: self.key.clone(),
            commit: commit.id().to_string(),
            digest: format!("sha1:{}", commit.tree_id()),
            branch,
            sequence,
            on_default_branch,
        })
    }

    /// Reads the manifest at `commit`. A commit without one has no dependencies.
    pub fn manifest(&self, commit: &str) -> Result<ModuleManifest, RepositoryError> {
        let result = self
            .git_repo
            .revparse_single(&format!("{commit}:{MANIFEST_FILE_NAME}"));

        match result {
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(
                    "Couldn't find a manifest in {}@{}, assuming module has no dependencies",
                    self.key, commit
                );
                Ok(ModuleManifest::default())
            }
            Err(e) => Err(e.into()),
            Ok(obj) => match obj.kind() {
                Some(git2::ObjectType::Blob) => {
                    let blob = obj.peel_to_blob()?;
                    let content = std::str::from_utf8(blob.content())?;
                    Ok(ModuleManifest::from_toml_str(content)?)
                }
                kind => Err(RepositoryError::BadObjectKind {
                    kind: kind.map(|k| k.to_string()).unwrap_or_default(),
                    commit: commit.to_owned(),
                }),
            },
        }
    }

    fn peel(&self, refname: &str) -> Result<Option<Oid>, RepositoryError> {
        match self.git_repo.find_reference(refname) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(error) if error.code() == ErrorCode::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn sequence(&self, oid: Oid) -> Result<u64, RepositoryError> {
        let mut walk = self.git_repo.revwalk()?;
        walk.set_sorting(Sort::NONE)?;
        walk.push(oid)?;
        let mut count = 0;
        for commit in walk {
            commit?;
            count += 1;
        }
        Ok(count)
    }

    // Check if `a` is an ancestor of `b`
    fn is_ancestor(&self, a: Oid, b: Oid) -> Result<bool, RepositoryError> {
        match self.git_repo.merge_base(a, b) {
            Ok(base) => Ok(base == a),
            Err(error) if error.code() == ErrorCode::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

fn is_commit_id(name: &str) -> bool {
    (4..=40).contains(&name.len()) && name.chars().all(|c| c.is_ascii_hexdigit())
}
