use std::{
    fmt::{Display, Write},
    str::FromStr,
    sync::OnceLock,
};

use regex_lite::Regex;

use crate::model::ParseError;

/// Identity of a repository: the registry host that owns it plus its owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RepositoryKey {
    pub remote: String,
    pub owner: String,
    pub repository: String,
}

impl RepositoryKey {
    pub fn new(
        remote: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        RepositoryKey {
            remote: remote.into(),
            owner: owner.into(),
            repository: repository.into(),
        }
    }

    /// Parses `remote/owner/repository`, rejecting any ref suffix.
    pub fn from_url(url: &str) -> Result<RepositoryKey, ParseError> {
        let reference = Reference::from_str(url)?;
        match reference.revision {
            Revision::Default => Ok(reference.repository),
            Revision::Named(_) => Err(ParseError::InvalidReference {
                input: url.to_owned(),
                reason: "a repository url cannot carry a ref".to_owned(),
            }),
        }
    }

    pub fn at(&self, revision: Revision) -> Reference {
        Reference {
            repository: self.clone(),
            revision,
        }
    }
}

impl Display for RepositoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.remote, self.owner, self.repository)
    }
}

/// The unresolved ref of a reference. The fetcher decides whether a named ref
/// is a branch, a tag, a commit or a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Revision {
    /// The repository's default branch.
    #[default]
    Default,
    Named(String),
}

impl Revision {
    pub fn named(revision: impl Into<String>) -> Revision {
        Revision::Named(revision.into())
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::Named(name) => f.write_str(name),
            Revision::Default => f.write_char('*'),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Reference {
    pub repository: RepositoryKey,
    pub revision: Revision,
}

impl Reference {
    pub fn new(repository: RepositoryKey, revision: Revision) -> Self {
        Reference {
            repository,
            revision,
        }
    }

    pub fn remote(&self) -> &str {
        &self.repository.remote
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.revision {
            Revision::Default => write!(f, "{}", self.repository),
            Revision::Named(name) => write!(f, "{}:{}", self.repository, name),
        }
    }
}

fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^(?P<remote>[^/]+)/(?P<owner>[^/]+)/(?P<repository>[^/:]+)(?:/|:(?P<revision>.*))?$",
        )
        .expect("reference pattern is valid")
    })
}

fn hostname_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*$",
        )
        .expect("hostname pattern is valid")
    })
}

fn segment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("segment pattern is valid"))
}

impl FromStr for Reference {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ParseError::InvalidReference {
            input: input.to_owned(),
            reason: reason.to_owned(),
        };

        let captures = reference_regex()
            .captures(input)
            .ok_or_else(|| invalid("expected remote/owner/repository[:ref]"))?;

        let remote = &captures["remote"];
        if !hostname_regex().is_match(remote) {
            return Err(invalid("remote is not a valid hostname"));
        }
        let owner = &captures["owner"];
        if !segment_regex().is_match(owner) {
            return Err(invalid("owner contains invalid characters"));
        }
        let repository = &captures["repository"];
        if !segment_regex().is_match(repository) {
            return Err(invalid("repository contains invalid characters"));
        }

        let revision = match captures.name("revision").map(|m| m.as_str()) {
            None => Revision::Default,
            Some("") => return Err(invalid("ref is empty")),
            Some(revision) if revision.chars().any(char::is_whitespace) => {
                return Err(invalid("ref contains whitespace"))
            }
            Some(revision) => Revision::named(revision),
        };

        Ok(Reference {
            repository: RepositoryKey::new(remote, owner, repository),
            revision,
        })
    }
}
