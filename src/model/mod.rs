use thiserror::Error;

pub mod lock;
pub mod manifest;
pub mod pin;
pub mod reference;

pub use pin::{Candidate, DependencyEdge, ModulePin, PinKey, Provenance};
pub use reference::{Reference, RepositoryKey, Revision};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading toml file: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing TOML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Invalid module reference `{input}`: {reason}")]
    InvalidReference { input: String, reason: String },
    #[error("Unsupported lock file version {0}")]
    UnsupportedLockFileVersion(toml::Value),
    #[error("Lock file has no version")]
    MissingLockFileVersion,
}
