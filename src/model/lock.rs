use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::ParseError;

use super::ModulePin;

pub const LOCK_FILE_NAME: &str = "modpin.lock";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    #[serde(default)]
    pub pins: Vec<LockedPin>,
}

const VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct VersionedLockFile<'a> {
    pub version: i64,
    #[serde(flatten)]
    pub content: &'a LockFile,
}

impl LockFile {
    pub fn from_pins<'a>(pins: impl IntoIterator<Item = &'a ModulePin>) -> LockFile {
        LockFile {
            pins: pins.into_iter().map(LockedPin::from).collect(),
        }
    }

    pub fn from_file(file: &Path) -> Result<LockFile, ParseError> {
        LockFile::from_str(&std::fs::read_to_string(file)?)
    }

    pub fn from_str(s: &str) -> Result<LockFile, ParseError> {
        let mut table = toml::from_str::<toml::Table>(s)?;
        match table.remove("version") {
            Some(toml::Value::Integer(VERSION)) => table.try_into::<LockFile>().map_err(Into::into),
            Some(other) => Err(ParseError::UnsupportedLockFileVersion(other)),
            None => Err(ParseError::MissingLockFileVersion),
        }
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&VersionedLockFile {
            version: VERSION,
            content: self,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPin {
    pub remote: String,
    pub owner: String,
    pub repository: String,
    pub commit: String,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub branch: Option<String>,
}

impl From<&ModulePin> for LockedPin {
    fn from(pin: &ModulePin) -> Self {
        LockedPin {
            remote: pin.repository.remote.clone(),
            owner: pin.repository.owner.clone(),
            repository: pin.repository.repository.clone(),
            commit: pin.commit.clone(),
            digest: pin.digest.clone(),
            branch: pin.branch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use toml::toml;

    use super::*;

    use pretty_assertions::assert_eq;

    use crate::model::RepositoryKey;

    #[test]
    fn load_save_lock_file() {
        let text = toml::to_string_pretty(&toml! {
            version = 1

            [[pins]]
            remote = "example.com"
            owner = "acme"
            repository = "a"
            commit = "hash1"
            digest = "sha1:tree1"
            branch = "main"

            [[pins]]
            remote = "example.com"
            owner = "acme"
            repository = "b"
            commit = "hash2"
            digest = "sha1:tree2"
        })
        .unwrap();
        let data = LockFile {
            pins: vec![
                LockedPin {
                    remote: "example.com".to_owned(),
                    owner: "acme".to_owned(),
                    repository: "a".to_owned(),
                    commit: "hash1".to_owned(),
                    digest: "sha1:tree1".to_owned(),
                    branch: Some("main".to_owned()),
                },
                LockedPin {
                    remote: "example.com".to_owned(),
                    owner: "acme".to_owned(),
                    repository: "b".to_owned(),
                    commit: "hash2".to_owned(),
                    digest: "sha1:tree2".to_owned(),
                    branch: None,
                },
            ],
        };
        let parsed = LockFile::from_str(&text).unwrap();
        let formatted = data.to_string().unwrap();
        assert_eq!(parsed, data);
        assert_eq!(formatted, text);
    }

    #[test]
    fn lock_file_from_pins() {
        let pin = ModulePin {
            repository: RepositoryKey::new("example.com", "acme", "a"),
            commit: "hash1".to_owned(),
            digest: "sha1:tree1".to_owned(),
            branch: None,
            sequence: Some(4),
            on_default_branch: true,
        };
        let lock = LockFile::from_pins([&pin]);
        assert_eq!(lock.pins.len(), 1);
        assert_eq!(
            (lock.pins[0].remote.as_str(), lock.pins[0].repository.as_str()),
            ("example.com", "a")
        );
        assert_eq!(lock.pins[0].branch, None);
    }

    #[test]
    fn load_lock_file_without_version() {
        let text = toml::to_string_pretty(&toml! {
            [[pins]]
            remote = "example.com"
        })
        .unwrap();
        LockFile::from_str(&text).expect_err("should not parse unversioned lock file");
    }

    #[test]
    fn load_lock_file_future_version() {
        let text = toml::to_string_pretty(&toml! {
            version = 7
        })
        .unwrap();
        assert!(matches!(
            LockFile::from_str(&text),
            Err(ParseError::UnsupportedLockFileVersion(_))
        ));
    }
}
