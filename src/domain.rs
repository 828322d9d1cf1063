use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CatalogError;

pub const MIN_SECTIONS: u32 = 1;
pub const MAX_SECTIONS: u32 = 100;
pub const BASE_SIZE_GB: f64 = 25.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub thin_section_id: String,
    pub name: String,
    #[serde(default)]
    pub formation: String,
    pub rock_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub minerals: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnails: Vec<String>,
    #[serde(default)]
    pub tiled_preview: String,
    #[serde(default)]
    pub scan_date: String,
    #[serde(default)]
    pub scanner: String,
    #[serde(default)]
    pub analyst: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub analysis_date: String,
    #[serde(default)]
    pub grain_size_mm: f64,
    #[serde(default)]
    pub porosity_percent: f64,
    #[serde(default)]
    pub density_g_cm3: f64,
    #[serde(default)]
    pub permeability_md: f64,
    #[serde(default)]
    pub depth_m: f64,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub citations: String,
    #[serde(default)]
    pub usage_rights: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geological_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_mya: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depositional_environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deformation_features: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived_metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub file_formats: Vec<FileFormat>,
}

impl SpecimenRecord {
    /// Published sample identifier, falling back to the catalog id.
    pub fn sample_id(&self) -> &str {
        let id = self.thin_section_id.trim();
        if id.is_empty() { &self.id } else { id }
    }

    pub fn doi_url(&self) -> Option<String> {
        let doi = self.doi.trim();
        if doi.is_empty() {
            return None;
        }
        let doi = doi
            .strip_prefix("https://doi.org/")
            .or_else(|| doi.strip_prefix("doi:"))
            .unwrap_or(doi);
        Some(format!("https://doi.org/{doi}"))
    }

    pub fn format(&self, name: &str) -> Option<&FileFormat> {
        self.file_formats
            .iter()
            .find(|format| format.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    pub name: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_string_or_number")]
    pub dpi: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum LightMode {
    #[serde(rename = "Plane Light")]
    #[value(name = "plane")]
    PlaneLight,
    #[serde(rename = "Polarized Light")]
    #[value(name = "polarized")]
    PolarizedLight,
    #[default]
    #[serde(rename = "Both")]
    #[value(name = "both")]
    Both,
}

impl LightMode {
    pub fn label(self) -> &'static str {
        match self {
            LightMode::PlaneLight => "Plane Light",
            LightMode::PolarizedLight => "Polarized Light",
            LightMode::Both => "Both",
        }
    }

    pub fn frames_per_section(self) -> u32 {
        match self {
            LightMode::PlaneLight | LightMode::PolarizedLight => 1,
            LightMode::Both => 2,
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LightMode {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "plane" | "plane light" | "pl" => Ok(LightMode::PlaneLight),
            "polarized" | "polarized light" | "xpl" => Ok(LightMode::PolarizedLight),
            "both" => Ok(LightMode::Both),
            _ => Err(CatalogError::InvalidLightMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum Resolution {
    #[default]
    #[serde(rename = "High")]
    #[value(name = "high")]
    High,
    #[serde(rename = "Ultra")]
    #[value(name = "ultra")]
    Ultra,
    #[serde(rename = "Research Grade")]
    #[value(name = "research")]
    ResearchGrade,
}

impl Resolution {
    pub fn label(self) -> &'static str {
        match self {
            Resolution::High => "High",
            Resolution::Ultra => "Ultra",
            Resolution::ResearchGrade => "Research Grade",
        }
    }

    pub fn size_multiplier(self) -> f64 {
        match self {
            Resolution::High => 1.0,
            Resolution::Ultra => 1.5,
            Resolution::ResearchGrade => 2.5,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "high" => Ok(Resolution::High),
            "ultra" => Ok(Resolution::Ultra),
            "research" | "research grade" => Ok(Resolution::ResearchGrade),
            _ => Err(CatalogError::InvalidResolution(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub num_sections: u32,
    #[serde(default)]
    pub light_mode: LightMode,
    #[serde(default)]
    pub resolution: Resolution,
}

impl BatchConfig {
    pub fn clamped(num_sections: i64, light_mode: LightMode, resolution: Resolution) -> Self {
        let num_sections = num_sections.clamp(MIN_SECTIONS as i64, MAX_SECTIONS as i64) as u32;
        Self {
            num_sections,
            light_mode,
            resolution,
        }
    }

    pub fn total_frames(&self) -> u32 {
        self.num_sections * self.light_mode.frames_per_section()
    }

    pub fn total_size_gb(&self) -> f64 {
        BASE_SIZE_GB * self.num_sections as f64 * self.resolution.size_multiplier()
    }

    pub fn estimated_minutes(&self) -> u32 {
        let weighted = self.total_frames() as f64 * self.resolution.size_multiplier();
        (weighted / 2.0).ceil() as u32
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_sections: MIN_SECTIONS,
            light_mode: LightMode::default(),
            resolution: Resolution::default(),
        }
    }
}

fn normalize_label(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl From<TextOrNumber> for String {
    fn from(value: TextOrNumber) -> Self {
        match value {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(number) => number.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    TextOrNumber::deserialize(deserializer).map(String::from)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<TextOrNumber>::deserialize(deserializer).map(|value| value.map(String::from))
}
