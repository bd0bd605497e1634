mod cache;
mod fetcher;
mod repository;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::model::RepositoryKey;

pub use cache::{CacheError, GitCache};
pub use fetcher::GitFetcher;
pub use repository::{ModuleRepository, RepositoryError};

/// How repositories are cloned when the remote is a git forge.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "https")]
    Https,
    #[serde(rename = "ssh")]
    Ssh,
}

impl Protocol {
    pub fn git_url(self, repository: &RepositoryKey) -> String {
        let RepositoryKey {
            remote,
            owner,
            repository,
        } = repository;
        match self {
            Protocol::Https => format!("https://{remote}/{owner}/{repository}"),
            Protocol::Ssh => format!("ssh://git@{remote}/{owner}/{repository}.git"),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Protocol::Https => f.write_str("https"),
            Protocol::Ssh => f.write_str("ssh"),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use git2::{Commit, Oid, Repository, Signature};

    use crate::model::manifest::MANIFEST_FILE_NAME;

    /// Commits a tree holding `manifest` (if any) and updates `refname` to it.
    pub fn commit(
        repo: &Repository,
        refname: &str,
        parent: Option<Oid>,
        manifest: Option<&str>,
        message: &str,
    ) -> Oid {
        let mut builder = repo.treebuilder(None).unwrap();
        if let Some(manifest) = manifest {
            let blob = repo.blob(manifest.as_bytes()).unwrap();
            builder.insert(MANIFEST_FILE_NAME, blob, 0o100644).unwrap();
        }
        let readme = repo.blob(message.as_bytes()).unwrap();
        builder.insert("README", readme, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let signature = Signature::now("modpin", "modpin@example.com").unwrap();
        let parents: Vec<Commit> = parent
            .map(|oid| repo.find_commit(oid).unwrap())
            .into_iter()
            .collect();
        let parents: Vec<&Commit> = parents.iter().collect();
        repo.commit(
            Some(refname),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .unwrap()
    }
}
