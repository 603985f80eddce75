//! Defect models: detections produced by the classifier and the
//! records persisted inside a condition report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of visible defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefectType {
    Scratch,
    Crack,
    Stain,
    Hole,
    WaterDamage,
    Mold,
    #[default]
    Other,
}

impl DefectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectType::Scratch => "scratch",
            DefectType::Crack => "crack",
            DefectType::Stain => "stain",
            DefectType::Hole => "hole",
            DefectType::WaterDamage => "water_damage",
            DefectType::Mold => "mold",
            DefectType::Other => "other",
        }
    }

    /// Lenient parse of a model-provided label.
    ///
    /// Never fails: anything unrecognised is `Other`.
    pub fn parse_lenient(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "scratch" | "scratches" => DefectType::Scratch,
            "crack" | "cracks" => DefectType::Crack,
            // "dstain" shows up because the instruction once carried that typo
            "stain" | "stains" | "dstain" => DefectType::Stain,
            "hole" | "holes" => DefectType::Hole,
            "water_damage" | "waterdamage" => DefectType::WaterDamage,
            "mold" | "mould" => DefectType::Mold,
            _ => DefectType::Other,
        }
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Defect severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minor" => Ok(Severity::Minor),
            "moderate" => Ok(Severity::Moderate),
            "major" => Ok(Severity::Major),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Opaque handle to a durably stored image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One defect instance identified from one frame.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Frame timestamp (seconds)
    pub timestamp: f64,
    /// Frame image kept for asset upload; never serialized
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

impl Detection {
    /// Take the image bytes out of the detection, leaving `None`.
    pub fn take_image(&mut self) -> Option<Vec<u8>> {
        self.image.take()
    }
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detection")
            .field("defect_type", &self.defect_type)
            .field("location", &self.location)
            .field("description", &self.description)
            .field("severity", &self.severity)
            .field("confidence", &self.confidence)
            .field("timestamp", &self.timestamp)
            .field("image_len", &self.image.as_ref().map(Vec::len))
            .finish()
    }
}

/// Persisted form of a [`Detection`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DefectRecord {
    /// Unique within the owning report
    pub key: String,
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp: f64,
    pub confidence: f64,
    /// Present only when the screenshot upload succeeded
    pub asset_ref: Option<AssetRef>,
}

impl DefectRecord {
    /// Build a record from a detection whose image has already been handled.
    pub fn from_detection(key: impl Into<String>, detection: &Detection, asset_ref: Option<AssetRef>) -> Self {
        Self {
            key: key.into(),
            defect_type: detection.defect_type,
            location: detection.location.clone(),
            description: detection.description.clone(),
            severity: detection.severity,
            timestamp: detection.timestamp,
            confidence: detection.confidence,
            asset_ref,
        }
    }
}
