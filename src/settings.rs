//! Persisted per-tool brush settings, one named section per tool.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Float(f32),
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSection {
    values: BTreeMap<String, SettingValue>,
}

impl SettingsSection {
    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        match self.values.get(key) {
            Some(SettingValue::Float(value)) => *value,
            Some(SettingValue::Int(value)) => *value as f32,
            _ => default,
        }
    }

    pub fn set_f32(&mut self, key: &str, value: f32) {
        self.values.insert(key.to_string(), SettingValue::Float(value));
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(SettingValue::Int(value)) => *value,
            _ => default,
        }
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), SettingValue::Int(value));
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(SettingValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), SettingValue::Text(value.into()));
    }
}

#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    sections: BTreeMap<String, SettingsSection>,
}

impl ToolSettings {
    pub fn section(&self, name: &str) -> Option<&SettingsSection> {
        self.sections.get(name)
    }

    pub fn section_mut(&mut self, name: &str) -> &mut SettingsSection {
        self.sections.entry(name.to_string()).or_default()
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tool settings {}", path.display()))?;
        ron::from_str(&contents)
            .with_context(|| format!("failed to parse tool settings {}", path.display()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("failed to serialize tool settings")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write tool settings {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let mut settings = ToolSettings::default();
        let section = settings.section_mut("HeightAddSubTool");
        section.set_f32("brushSize", 0.25);

        assert_eq!(section.get_f32("brushSize", 0.1), 0.25);
        assert_eq!(section.get_f32("strength", 0.1), 0.1);
        assert_eq!(section.get_text("brushTexture"), None);
        assert!(settings.section("HeightSetTool").is_none());
    }

    #[test]
    fn settings_survive_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.ron");

        let mut settings = ToolSettings::default();
        settings
            .section_mut("HeightAverageTool")
            .set_i64("averageMode", 1);
        settings
            .section_mut("HeightAverageTool")
            .set_text("brushTexture", "brushes/round.png");
        settings.save_to_file(&path).unwrap();

        let loaded = ToolSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn loading_a_missing_file_reports_the_path() {
        let err = ToolSettings::load_from_file("does/not/exist.ron").unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.ron"));
    }
}
