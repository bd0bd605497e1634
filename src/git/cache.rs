use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use git2::{
    cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred, CredentialType, FetchOptions,
    RemoteCallbacks, Repository,
};
use log::{debug, info, trace};
use ssh_key::{known_hosts::HostPatterns, KnownHosts};
use thiserror::Error;

use crate::{
    flock::{FileLock, LockError},
    model::RepositoryKey,
};

use super::{repository::ModuleRepository, Protocol, RepositoryError};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";
const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Bare clones of every repository modpin has resolved, one per repository
/// key, laid out as `<location>/<remote>/<owner>/<repository>`.
pub struct GitCache {
    location: PathBuf,
    default_protocol: Protocol,
    /// Serializes access to each clone. The flag records whether the clone
    /// was already fetched by this process.
    sessions: DashMap<RepositoryKey, Arc<Mutex<bool>>>,
    #[cfg(test)]
    mirror: Option<PathBuf>,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Cache location {location} does not exist")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] LockError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl GitCache {
    pub fn new(location: PathBuf, default_protocol: Protocol) -> Result<GitCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock = Self::acquire_lock(&location)?;

        Ok(GitCache {
            location,
            default_protocol,
            sessions: DashMap::new(),
            #[cfg(test)]
            mirror: None,
            _lock: lock,
        })
    }

    /// Serves every repository from `<root>/<remote>/<owner>/<repository>`
    /// instead of the network.
    #[cfg(test)]
    pub(crate) fn with_mirror(mut self, root: PathBuf) -> Self {
        self.mirror = Some(root);
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        if self.location.exists() {
            info!(
                "Clearing modpin repository cache {}.",
                &self.location.display()
            );
            std::fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }

    /// Runs `f` against the clone of `key`, holding the clone's lock.
    ///
    /// The clone is created on first use and fetched from its remote at most
    /// once per cache instance.
    pub fn with_repository<T>(
        &self,
        key: &RepositoryKey,
        f: impl FnOnce(&ModuleRepository) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let session = self.sessions.entry(key.clone()).or_default().value().clone();
        let mut fetched = session.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.location.join(&key.remote).join(&key.owner).join(&key.repository);
        let url = self.url(key);
        let repo = if path.exists() {
            self.open_entry(&path, &url)?
        } else {
            self.create_repo(&path, &url)?
        };
        let repository = ModuleRepository::new(key.clone(), repo);

        if !*fetched {
            repository.update(self)?;
            *fetched = true;
        }
        f(&repository)
    }

    fn url(&self, key: &RepositoryKey) -> String {
        #[cfg(test)]
        if let Some(root) = &self.mirror {
            let path = root.join(&key.remote).join(&key.owner).join(&key.repository);
            return path.display().to_string();
        }
        self.default_protocol.git_url(key)
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(".lock");
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location, LOCK_TIMEOUT)?;
        info!("Acquired a lock on the cache location");
        Ok(lock)
    }

    fn open_entry(&self, path: &Path, url: &str) -> Result<Repository, CacheError> {
        trace!("Opening existing repository at {}", path.display());

        let repo = Repository::open_bare(path)?;

        {
            let remote = repo.find_remote("origin")?;
            if remote.url() != Some(url) {
                // The default protocol changed since the clone was created.
                trace!(
                    "Updating remote existing url {:?} to new url {}",
                    remote.url(),
                    url
                );
                repo.remote_set_url("origin", url)?;
            }
        }

        Ok(repo)
    }

    fn create_repo(&self, path: &Path, url: &str) -> Result<Repository, CacheError> {
        trace!("Creating a new repository at {}", path.display());

        let repo = Repository::init_bare(path)?;
        repo.remote_with_fetch("origin", url, "")?;

        Ok(repo)
    }

    pub(super) fn remote_callbacks(&self) -> Result<RemoteCallbacks<'_>, CacheError> {
        let git_config = Config::open_default()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&git_config, url, username);
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });

        callbacks.certificate_check(|certificate, host| check_certificate(certificate, host));
        Ok(callbacks)
    }

    pub(super) fn fetch_options(&self) -> Result<FetchOptions<'_>, CacheError> {
        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(self.remote_callbacks()?)
            .download_tags(AutotagOption::None);

        Ok(fetch_options)
    }
}

fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    if let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) {
        trace!("Loading {}", GLOBAL_KNOWN_HOSTS);
        match KnownHosts::read_file(GLOBAL_KNOWN_HOSTS) {
            Ok(entries) => {
                for entry in entries {
                    if host_matches_patterns(host, entry.host_patterns()) {
                        trace!(
                            "Found known host entry for {} ({})",
                            host,
                            entry.public_key().algorithm()
                        );
                        if entry.public_key().to_bytes().as_deref() == Ok(hostkey) {
                            trace!("Known host entry matches the host key");
                            return Ok(CertificateCheckStatus::CertificateOk);
                        }
                    }
                }
                trace!("No known host entry matched the host key");
            }
            Err(error) => trace!("Could not load {}: {}", GLOBAL_KNOWN_HOSTS, error),
        }
    }
    Ok(CertificateCheckStatus::CertificatePassthrough)
}

fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    match patterns {
        HostPatterns::Patterns(patterns) => {
            let mut match_found = false;
            for pattern in patterns {
                let pattern = pattern.to_lowercase();
                // Wildcards are not supported.
                if let Some(pattern) = pattern.strip_prefix('!') {
                    if pattern == host {
                        return false;
                    }
                } else {
                    match_found |= pattern == host;
                }
            }
            match_found
        }
        HostPatterns::HashedName { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn negated_host_pattern_wins() {
        let patterns = HostPatterns::Patterns(vec!["github.com".to_owned(), "!github.com".to_owned()]);
        assert!(!host_matches_patterns("github.com", &patterns));

        let patterns = HostPatterns::Patterns(vec!["GitHub.com".to_owned(), "gitlab.com".to_owned()]);
        assert!(host_matches_patterns("github.com", &patterns));
        assert!(!host_matches_patterns("example.com", &patterns));
    }

    #[test]
    fn rejects_file_as_location() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache");
        std::fs::write(&file, "").unwrap();

        let error = GitCache::new(file, Protocol::Https).err().unwrap();
        assert!(matches!(error, CacheError::BadLocation { .. }));
    }

    #[test]
    fn clear_removes_location() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("cache");

        let cache = GitCache::new(location.clone(), Protocol::Ssh).unwrap();
        assert_eq!(cache.location(), location.as_path());
        assert!(location.join(".lock").exists());

        cache.clear().unwrap();
        assert!(!location.exists());
    }
}
