use std::{env, error::Error, path::PathBuf, sync::Arc, time::Duration};

use home::home_dir;

use crate::{
    git::{GitCache, GitFetcher, Protocol},
    model::{lock::LOCK_FILE_NAME, manifest::MANIFEST_FILE_NAME},
    resolver::Resolver,
    Modpin,
};

#[derive(Default)]
pub struct ModpinBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    module_file_name: Option<PathBuf>,
    lock_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    default_protocol: Option<Protocol>,
    timeout: Option<Duration>,
}

impl ModpinBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the module manifest.
    ///
    /// Defaults to `modpin.toml`.
    pub fn module_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_file_name = Some(path.into());
        self
    }

    /// Name of the lock file.
    ///
    /// Defaults to `modpin.lock`.
    pub fn lock_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file_name = Some(path.into());
        self
    }

    /// Location of the git cache directory.
    ///
    /// Defaults to `$HOME/.modpin/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Protocol used to clone repositories. Defaults to https.
    pub fn default_protocol(mut self, protocol: Protocol) -> Self {
        self.default_protocol = Some(protocol);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn try_build(self) -> Result<Modpin, Box<dyn Error>> {
        let Self {
            root,
            module_file_name,
            lock_file_name,
            cache_directory_path,
            default_protocol,
            timeout,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let module_file_name = module_file_name.unwrap_or_else(|| PathBuf::from(MANIFEST_FILE_NAME));

        let lock_file_name = lock_file_name.unwrap_or_else(|| PathBuf::from(LOCK_FILE_NAME));

        let cache_directory = match cache_directory_path {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };

        let cache = Arc::new(GitCache::new(
            cache_directory,
            default_protocol.unwrap_or_default(),
        )?);

        let resolver = Resolver::builder()
            .fallback(Arc::new(GitFetcher::new(cache.clone())))
            .timeout(timeout)
            .build();

        Ok(Modpin {
            cache,
            resolver,
            root,
            module_file_name,
            lock_file_name,
        })
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".modpin/cache");
    Ok(cache_directory)
}
