use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable project identifier issued by the project collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Job site identifier; patch assignments are made against sites, not projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSiteId(pub String);

impl fmt::Display for JobSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the person or system account that triggered a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Coarse project size band derived upstream from contract value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[serde(alias = "tier1", alias = "1")]
    Tier1,
    #[serde(alias = "tier2", alias = "2")]
    Tier2,
    #[serde(alias = "tier3", alias = "3")]
    Tier3,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier_1",
            Tier::Tier2 => "tier_2",
            Tier::Tier3 => "tier_3",
        }
    }
}

impl FromStr for Tier {
    type Err = InvalidValue;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "tier_1" | "tier1" | "1" => Ok(Tier::Tier1),
            "tier_2" | "tier2" | "2" => Ok(Tier::Tier2),
            "tier_3" | "tier3" | "3" => Ok(Tier::Tier3),
            _ => Err(InvalidValue {
                field: "tier",
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Organising universe membership of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Active,
    Potential,
    Excluded,
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::Active,
        Classification::Potential,
        Classification::Excluded,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Active => "active",
            Classification::Potential => "potential",
            Classification::Excluded => "excluded",
        }
    }

    /// Parse a caller-supplied value against the closed set of classifications.
    pub fn parse(raw: &str) -> Result<Self, InvalidValue> {
        raw.parse()
    }
}

impl Default for Classification {
    fn default() -> Self {
        Classification::Potential
    }
}

impl FromStr for Classification {
    type Err = InvalidValue;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Classification::ALL
            .into_iter()
            .find(|candidate| candidate.label() == raw.trim())
            .ok_or_else(|| InvalidValue {
                field: "classification",
                value: raw.to_string(),
            })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raised when free-form input does not map onto one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {field}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: String,
}

/// Ownership of the classification field. Automatic and manual writers share the field, so
/// the flags only change through the transitions below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationState {
    pub is_manual: bool,
    pub is_auto: bool,
    pub last_auto_update: Option<DateTime<Utc>>,
    pub change_reason: Option<String>,
}

impl AutomationState {
    pub fn mark_auto(&mut self, at: DateTime<Utc>, reason: String) {
        self.is_auto = true;
        self.last_auto_update = Some(at);
        self.change_reason = Some(reason);
    }

    pub fn pin_manual(&mut self, reason: String) {
        self.is_manual = true;
        self.is_auto = false;
        self.change_reason = Some(reason);
    }

    pub fn release_manual(&mut self, reason: String) {
        self.is_manual = false;
        self.change_reason = Some(reason);
    }

    /// Restored rows are pinned so the next signal change cannot drift them again.
    pub fn freeze_restored(&mut self, reason: String) {
        self.pin_manual(reason);
    }

    pub fn reset(&mut self) {
        *self = AutomationState::default();
    }
}

/// The slice of the project aggregate this engine owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub classification: Classification,
    pub automation: AutomationState,
}

impl Project {
    pub fn new(id: ProjectId, classification: Classification) -> Self {
        Self {
            id,
            classification,
            automation: AutomationState::default(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.automation.is_manual
    }

    pub fn view(&self) -> ProjectClassificationView {
        ProjectClassificationView {
            project_id: self.id.clone(),
            classification: self.classification,
            classification_is_manual: self.automation.is_manual,
            classification_is_auto: self.automation.is_auto,
            last_auto_update: self.automation.last_auto_update,
            change_reason: self.automation.change_reason.clone(),
        }
    }
}

/// Read model exposed to reporting and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectClassificationView {
    pub project_id: ProjectId,
    pub classification: Classification,
    pub classification_is_manual: bool,
    pub classification_is_auto: bool,
    pub last_auto_update: Option<DateTime<Utc>>,
    pub change_reason: Option<String>,
}

/// Creation request; `classification` is only set when the caller supplies one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub id: ProjectId,
    #[serde(default)]
    pub classification: Option<Classification>,
}
