use std::fmt::Display;

use super::{Reference, RepositoryKey, Revision};

/// A fully resolved module: exact commit and content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePin {
    pub repository: RepositoryKey,
    pub commit: String,
    pub digest: String,
    pub branch: Option<String>,
    /// Position of the commit on `branch`, if the remote numbers its commits.
    pub sequence: Option<u64>,
    pub on_default_branch: bool,
}

impl ModulePin {
    pub fn pin_key(&self) -> PinKey {
        PinKey {
            repository: self.repository.clone(),
            commit: self.commit.clone(),
        }
    }

    /// A reference that resolves to exactly this commit.
    pub fn reference(&self) -> Reference {
        self.repository.at(Revision::named(self.commit.clone()))
    }
}

impl Display for ModulePin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.commit)?;
        if let Some(branch) = &self.branch {
            write!(f, " ({branch})")?;
        }
        Ok(())
    }
}

/// Memoization key: one repository at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct PinKey {
    pub repository: RepositoryKey,
    pub commit: String,
}

impl Display for PinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.commit)
    }
}

/// Resolving the manifest of `from` declared a dependency on `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: PinKey,
    pub to: ModulePin,
}

/// The chain of requesting references that led from a seed to a candidate.
/// Empty for seeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Provenance {
    pub chain: Vec<Reference>,
}

impl Provenance {
    pub fn seed() -> Self {
        Provenance::default()
    }

    pub fn is_seed(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Provenance of something requested by `reference`, which was itself
    /// reached through `self`.
    pub fn then(&self, reference: Reference) -> Provenance {
        let mut chain = self.chain.clone();
        chain.push(reference);
        Provenance { chain }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.chain.is_empty() {
            return f.write_str("requested directly");
        }
        for (index, reference) in self.chain.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{reference}")?;
        }
        Ok(())
    }
}

/// An unreduced pin found during graph traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub pin: ModulePin,
    /// The reference that resolved to `pin`.
    pub reference: Reference,
    pub provenance: Provenance,
}

impl Candidate {
    pub fn depth(&self) -> usize {
        self.provenance.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn reference(s: &str) -> Reference {
        s.parse().unwrap()
    }

    #[test]
    fn provenance_display() {
        let provenance = Provenance::seed()
            .then(reference("example.com/acme/a:main"))
            .then(reference("example.com/acme/b:c0ffee"));
        assert_eq!(
            provenance.to_string(),
            "example.com/acme/a:main -> example.com/acme/b:c0ffee"
        );
        assert_eq!(provenance.depth(), 2);
        assert_eq!(Provenance::seed().to_string(), "requested directly");
    }

    #[test]
    fn pin_reference_targets_commit() {
        let pin = ModulePin {
            repository: RepositoryKey::new("example.com", "acme", "a"),
            commit: "c0ffee".to_owned(),
            digest: "sha1:abc".to_owned(),
            branch: Some("main".to_owned()),
            sequence: Some(3),
            on_default_branch: true,
        };
        assert_eq!(pin.reference().to_string(), "example.com/acme/a:c0ffee");
        assert_eq!(pin.to_string(), "example.com/acme/a@c0ffee (main)");
    }
}
