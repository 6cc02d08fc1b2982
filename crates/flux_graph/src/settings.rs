// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code generation settings.
//!
//! Stored as RON, e.g.
//!
//! ```ron
//! (
//!     indent: "    ",
//!     var_prefix: "tmp",
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How generated source is laid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenSettings {
    /// Text repeated once per indentation level
    pub indent: String,
    /// Prefix of generated variable names
    pub var_prefix: String,
}

impl Default for CodegenSettings {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            var_prefix: "v".to_string(),
        }
    }
}

impl CodegenSettings {
    /// Parse settings from RON text
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = ron::from_str(text)?;
        if settings.var_prefix.is_empty() {
            return Err(SettingsError::EmptyPrefix);
        }
        Ok(settings)
    }

    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron_str(&content)?;
        tracing::info!("Loaded codegen settings from {:?}", path);
        Ok(settings)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Indentation for a nesting level
    pub fn pad(&self, level: usize) -> String {
        self.indent.repeat(level)
    }
}

/// Error when reading or writing settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Text is not valid settings RON
    #[error("Invalid settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] ron::Error),

    /// Variable names need a non-empty prefix
    #[error("Variable prefix must not be empty")]
    EmptyPrefix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CodegenSettings::default();
        assert_eq!(settings.pad(2), "\t\t");
        assert_eq!(settings.var_prefix, "v");
    }

    #[test]
    fn test_serialization() {
        let settings = CodegenSettings {
            indent: "  ".to_string(),
            var_prefix: "tmp".to_string(),
        };
        let ron_str = settings.to_ron_string().unwrap();
        let loaded = CodegenSettings::from_ron_str(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegen.ron");
        let settings = CodegenSettings {
            indent: "    ".to_string(),
            var_prefix: "tmp".to_string(),
        };

        settings.save(&path).unwrap();
        assert_eq!(CodegenSettings::load(&path).unwrap(), settings);

        let missing = dir.path().join("missing.ron");
        assert!(matches!(
            CodegenSettings::load(&missing),
            Err(SettingsError::Io(_))
        ));
    }

    #[test]
    fn test_partial_and_invalid() {
        let loaded = CodegenSettings::from_ron_str("(indent: \"    \")").unwrap();
        assert_eq!(loaded.indent, "    ");
        assert_eq!(loaded.var_prefix, "v");

        assert!(matches!(
            CodegenSettings::from_ron_str("(var_prefix: \"\")"),
            Err(SettingsError::EmptyPrefix)
        ));
        assert!(matches!(
            CodegenSettings::from_ron_str("(indent: 3)"),
            Err(SettingsError::Parse(_))
        ));
    }
}
