//! `plugin.yml` manifest parsing and validation.

use serde::Deserialize;

use crate::error::{RegistryError, Result};

/// Manifest file name inside every plugin directory.
pub const MANIFEST_FILE: &str = "plugin.yml";

/// The `plugin.yml` document.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interpreter: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub usage: String,
}

impl PluginManifest {
    /// Parse manifest content, rejecting documents missing any of the
    /// fields required to execute the plugin.
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (value, field) in [
            (&self.name, "name"),
            (&self.interpreter, "interpreter"),
            (&self.entry, "entry"),
        ] {
            if value.trim().is_empty() {
                return Err(RegistryError::InvalidManifest(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_manifest() {
        let manifest = PluginManifest::parse(
            "name: hello\ninterpreter: python\ndescription: says hello\nentry: hello.py\nusage: hello [--name N]\n",
        )
        .unwrap();
        assert_eq!(manifest.name, "hello");
        assert_eq!(manifest.interpreter, "python");
        assert_eq!(manifest.entry, "hello.py");
    }

    #[test]
    fn description_and_usage_are_optional() {
        let manifest =
            PluginManifest::parse("name: hello\ninterpreter: node\nentry: index.js\n").unwrap();
        assert!(manifest.description.is_empty());
        assert!(manifest.usage.is_empty());
    }

    #[test]
    fn rejects_missing_required_fields() {
        for content in [
            "interpreter: python\nentry: hello.py\n",
            "name: hello\nentry: hello.py\n",
            "name: hello\ninterpreter: python\n",
        ] {
            let err = PluginManifest::parse(content).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidManifest(_)), "{content}");
        }
    }
}
