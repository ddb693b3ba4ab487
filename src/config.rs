//! Project configuration (`kc.config.json`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{ComponentRegistry, ENTRY_COMPONENT};
use crate::error::{CompilerError, CompilerWarning};

pub const CONFIG_FILE_NAME: &str = "kc.config.json";

/// Element names a component may not take.
pub const RESERVED_COMPONENT_NAMES: [&str; 3] = ["div", "label", "button"];

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDeclaration {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Entry component source, relative to the config file.
    pub entrance: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub components: Vec<ComponentDeclaration>,
    /// Directory the config was loaded from; source paths resolve against it.
    #[serde(skip)]
    pub root_dir: PathBuf,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let file = path.to_string_lossy();
        let text = fs::read_to_string(path).map_err(|e| {
            CompilerError::config(&format!("cannot read configuration: {}", e), &file)
        })?;

        let mut config = Self::from_json_str(&text).map_err(|e| e.in_file(&file))?;
        config.root_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CompilerError> {
        let config: ProjectConfig = serde_json::from_str(text).map_err(|e| {
            CompilerError::config(&format!("invalid configuration JSON: {}", e), "")
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CompilerError> {
        if self.entrance.trim().is_empty() {
            return Err(CompilerError::config("`entrance` must name the entry source", ""));
        }
        for (index, component) in self.components.iter().enumerate() {
            if component.name.trim().is_empty() || component.path.trim().is_empty() {
                return Err(CompilerError::config(
                    &format!("component #{} needs a non-empty `name` and `path`", index),
                    "",
                ));
            }
            if component.name == ENTRY_COMPONENT {
                return Err(CompilerError::config(
                    &format!("`{}` is reserved for the entry component", ENTRY_COMPONENT),
                    "",
                ));
            }
        }
        Ok(())
    }

    /// Build the registry, warning about duplicate and reserved names. The
    /// first declaration of a name wins.
    pub fn registry(&self, warnings: &mut Vec<CompilerWarning>) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for component in &self.components {
            if !registry.register(&component.name, &component.path) {
                warnings.push(CompilerWarning::DuplicateComponent {
                    name: component.name.clone(),
                });
                continue;
            }
            if RESERVED_COMPONENT_NAMES.contains(&component.name.as_str()) {
                warnings.push(CompilerWarning::ReservedComponentName {
                    name: component.name.clone(),
                });
            }
        }
        registry
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root_dir.join(relative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Where artifacts are written. `None` writes next to the config file.
    pub out_dir: Option<PathBuf>,
    pub write_artifacts: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            out_dir: None,
            write_artifacts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ERR_CONFIG;

    #[test]
    fn test_defaults_and_camel_case() {
        let config = ProjectConfig::from_json_str(
            r#"{ "entrance": "pages/index.html", "components": [{ "name": "Card", "path": "card.html" }] }"#,
        )
        .unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.components[0].name, "Card");
    }

    #[test]
    fn test_invalid_configs() {
        for text in [
            "not json",
            r#"{ "components": [] }"#,
            r#"{ "entrance": "  " }"#,
            r#"{ "entrance": "a.html", "components": [{ "name": "", "path": "x" }] }"#,
            r#"{ "entrance": "a.html", "components": [{ "name": "$enter", "path": "x" }] }"#,
        ] {
            let err = ProjectConfig::from_json_str(text).unwrap_err();
            assert_eq!(err.code, ERR_CONFIG, "{}", text);
        }
    }

    #[test]
    fn test_registry_warnings() {
        let config = ProjectConfig::from_json_str(
            r#"{
                "entrance": "index.html",
                "components": [
                    { "name": "Card", "path": "card.html" },
                    { "name": "Card", "path": "card2.html" },
                    { "name": "button", "path": "button.html" }
                ]
            }"#,
        )
        .unwrap();

        let mut warnings = Vec::new();
        let registry = config.registry(&mut warnings);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.path("Card"), Some("card.html"));
        assert_eq!(
            warnings,
            vec![
                CompilerWarning::DuplicateComponent { name: "Card".into() },
                CompilerWarning::ReservedComponentName { name: "button".into() },
            ]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProjectConfig::load(Path::new("/definitely/not/here/kc.config.json")).unwrap_err();
        assert_eq!(err.code, ERR_CONFIG);
        assert!(err.file.ends_with(CONFIG_FILE_NAME));
    }
}
