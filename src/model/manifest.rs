use std::path::Path;

use log::{debug, error};
use toml::{map::Map, Value};

use super::{ParseError, Reference, RepositoryKey, Revision};

pub const MANIFEST_FILE_NAME: &str = "modpin.toml";

/// A declared dependency of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub reference: Reference,
}

/// Contents of a `modpin.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleManifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<Dependency>,
}

impl ModuleManifest {
    pub fn from_file(path: &Path) -> Result<ModuleManifest, ParseError> {
        debug!("Attempting to read module manifest {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let manifest = ModuleManifest::from_toml_str(&contents);
        if let Err(err) = &manifest {
            error!("Could not parse module manifest {}: {err}", path.display())
        }
        manifest
    }

    pub fn from_toml_str(data: &str) -> Result<ModuleManifest, ParseError> {
        let table = toml::from_str::<Map<String, Value>>(data)?;

        let name = table
            .get("name")
            .map(|v| v.clone().try_into::<String>())
            .transpose()?;

        let description = table
            .get("description")
            .map(|v| v.clone().try_into::<String>())
            .transpose()?;

        let dependencies = table
            .iter()
            .filter(|(key, _)| *key != "name" && *key != "description")
            .map(|(name, value)| parse_dependency(name.clone(), value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ModuleManifest {
            name,
            description,
            dependencies,
        })
    }

    pub fn references(&self) -> Vec<Reference> {
        self.dependencies
            .iter()
            .map(|dependency| dependency.reference.clone())
            .collect()
    }
}

fn parse_dependency(name: String, value: &Value) -> Result<Dependency, ParseError> {
    let repository = value
        .get("url")
        .ok_or_else(|| ParseError::MissingKey(format!("{name}.url")))
        .and_then(|url| url.clone().try_into::<String>().map_err(Into::into))
        .and_then(|url| RepositoryKey::from_url(&url))?;

    let revision = match value.get("revision") {
        None => Revision::Default,
        Some(revision) => {
            let revision = revision.clone().try_into::<String>()?;
            // Manifest refs follow the rules of references.
            format!("{repository}:{revision}")
                .parse::<Reference>()?
                .revision
        }
    };

    Ok(Dependency {
        name,
        reference: Reference::new(repository, revision),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_manifest_with_dependencies() {
        let str = r#"
            name = "weather"
            description = "weather schemas"
            [units]
                url = "github.com/acme/units"
                revision = "v1.0.0"
            [geo]
                url = "buf.example.com/acme/geo"
        "#;
        let expected = ModuleManifest {
            name: Some("weather".to_owned()),
            description: Some("weather schemas".to_owned()),
            dependencies: vec![
                Dependency {
                    name: "units".to_owned(),
                    reference: RepositoryKey::new("github.com", "acme", "units")
                        .at(Revision::named("v1.0.0")),
                },
                Dependency {
                    name: "geo".to_owned(),
                    reference: RepositoryKey::new("buf.example.com", "acme", "geo")
                        .at(Revision::Default),
                },
            ],
        };
        let manifest = ModuleManifest::from_toml_str(str).unwrap();
        assert_eq!(manifest, expected);
    }

    #[test]
    fn load_manifest_no_dependencies() {
        let manifest = ModuleManifest::from_toml_str("name = \"empty\"").unwrap();
        assert_eq!(manifest.dependencies, vec![]);
        assert_eq!(manifest.references(), vec![]);
    }

    #[test]
    fn load_manifest_missing_url() {
        let str = r#"
            [units]
                revision = "v1.0.0"
        "#;
        assert!(matches!(
            ModuleManifest::from_toml_str(str),
            Err(ParseError::MissingKey(key)) if key == "units.url"
        ));
    }

    #[test]
    fn load_manifest_invalid_url() {
        let str = r#"
            [units]
                url = "github.com/acme"
        "#;
        assert!(ModuleManifest::from_toml_str(str).is_err());
    }

    #[test]
    fn load_manifest_invalid_revision() {
        let str = r#"
            [units]
                url = "github.com/acme/units"
                revision = "two words"
        "#;
        assert!(ModuleManifest::from_toml_str(str).is_err());
    }
}
