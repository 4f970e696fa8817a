use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoachError;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One node of the coaching workflow. Declaration order is the workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentUnderstanding,
    ProjectUnderstanding,
    ProjectProgress,
    UnderlyingProblem,
    Action,
    Guidance,
    Debrief,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::IntentUnderstanding,
            Stage::ProjectUnderstanding,
            Stage::ProjectProgress,
            Stage::UnderlyingProblem,
            Stage::Action,
            Stage::Guidance,
            Stage::Debrief,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based stage number, as used in prompt headings and prompt page ids.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::IntentUnderstanding => "intent_understanding",
            Stage::ProjectUnderstanding => "project_understanding",
            Stage::ProjectProgress => "project_progress",
            Stage::UnderlyingProblem => "underlying_problem",
            Stage::Action => "action",
            Stage::Guidance => "guidance",
            Stage::Debrief => "debrief",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CoachError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ProjectPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Vision,
    Research,
    Design,
    Test,
    Launch,
    Growth,
}

impl ProjectPhase {
    pub fn all() -> &'static [ProjectPhase] {
        &[
            ProjectPhase::Vision,
            ProjectPhase::Research,
            ProjectPhase::Design,
            ProjectPhase::Test,
            ProjectPhase::Launch,
            ProjectPhase::Growth,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectPhase::Vision => "vision",
            ProjectPhase::Research => "research",
            ProjectPhase::Design => "design",
            ProjectPhase::Test => "test",
            ProjectPhase::Launch => "launch",
            ProjectPhase::Growth => "growth",
        }
    }
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectPhase {
    type Err = CoachError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ProjectPhase::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| CoachError::InvalidPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// IntentCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    NoQuestion,
    PersonalityAssessment,
    ProjectAssessment,
    NextSteps,
    PersonalEfficiency,
    Sell,
    Funding,
    MeetPeople,
    BuildProduct,
    RequestExpertise,
    Ideation,
    Other,
}

const ALL_PHASES: &[ProjectPhase] = &[
    ProjectPhase::Vision,
    ProjectPhase::Research,
    ProjectPhase::Design,
    ProjectPhase::Test,
    ProjectPhase::Launch,
    ProjectPhase::Growth,
];

impl IntentCategory {
    pub fn all() -> &'static [IntentCategory] {
        &[
            IntentCategory::NoQuestion,
            IntentCategory::PersonalityAssessment,
            IntentCategory::ProjectAssessment,
            IntentCategory::NextSteps,
            IntentCategory::PersonalEfficiency,
            IntentCategory::Sell,
            IntentCategory::Funding,
            IntentCategory::MeetPeople,
            IntentCategory::BuildProduct,
            IntentCategory::RequestExpertise,
            IntentCategory::Ideation,
            IntentCategory::Other,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntentCategory::NoQuestion => "no_question",
            IntentCategory::PersonalityAssessment => "personality_assessment",
            IntentCategory::ProjectAssessment => "project_assessment",
            IntentCategory::NextSteps => "next_steps",
            IntentCategory::PersonalEfficiency => "personal_efficiency",
            IntentCategory::Sell => "sell",
            IntentCategory::Funding => "funding",
            IntentCategory::MeetPeople => "meet_people",
            IntentCategory::BuildProduct => "build_product",
            IntentCategory::RequestExpertise => "request_expertise",
            IntentCategory::Ideation => "ideation",
            IntentCategory::Other => "other",
        }
    }

    /// Human label used in the prompts the model reads.
    pub fn label(self) -> &'static str {
        match self {
            IntentCategory::NoQuestion => "No question specified",
            IntentCategory::PersonalityAssessment => "Personality assessment",
            IntentCategory::ProjectAssessment => "Project assessment",
            IntentCategory::NextSteps => "Next steps",
            IntentCategory::PersonalEfficiency => "Personal efficiency",
            IntentCategory::Sell => "Sell",
            IntentCategory::Funding => "Funding",
            IntentCategory::MeetPeople => "Meet people",
            IntentCategory::BuildProduct => "Build the product",
            IntentCategory::RequestExpertise => "Request expertise",
            IntentCategory::Ideation => "Ideation",
            IntentCategory::Other => "Other",
        }
    }

    /// Project phases in which this intent makes sense.
    pub fn compatible_phases(self) -> &'static [ProjectPhase] {
        match self {
            IntentCategory::Sell => &[
                ProjectPhase::Test,
                ProjectPhase::Launch,
                ProjectPhase::Growth,
            ],
            IntentCategory::Funding => &[ProjectPhase::Growth],
            IntentCategory::BuildProduct => &[
                ProjectPhase::Design,
                ProjectPhase::Test,
                ProjectPhase::Launch,
                ProjectPhase::Growth,
            ],
            IntentCategory::Ideation => &[
                ProjectPhase::Vision,
                ProjectPhase::Research,
                ProjectPhase::Design,
            ],
            _ => ALL_PHASES,
        }
    }

    /// Map a model-written category ("Build the product", "no question
    /// specified", "sell") to a category. Unknown labels yield `None`.
    pub fn normalize(raw: &str) -> Option<IntentCategory> {
        let normalized = raw
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        match normalized.as_str() {
            "no_question_specified" | "no_question" => Some(IntentCategory::NoQuestion),
            "build_the_product" | "build_product" => Some(IntentCategory::BuildProduct),
            other => IntentCategory::all()
                .iter()
                .copied()
                .find(|c| c.as_str() == other),
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CapabilityKind / DocumentType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    FlashDiagnostic,
    ActionPlan,
}

impl CapabilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::FlashDiagnostic => "flash_diagnostic",
            CapabilityKind::ActionPlan => "action_plan",
        }
    }

    /// Title used for the challenge document a capability produces.
    pub fn title(self) -> &'static str {
        match self {
            CapabilityKind::FlashDiagnostic => "Flash Diagnostic",
            CapabilityKind::ActionPlan => "Action Plan",
        }
    }

    pub fn document_type(self) -> DocumentType {
        match self {
            CapabilityKind::FlashDiagnostic => DocumentType::FlashDiagnostic,
            CapabilityKind::ActionPlan => DocumentType::ActionPlan,
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CapabilityKind {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flash_diagnostic" => Ok(CapabilityKind::FlashDiagnostic),
            "action_plan" => Ok(CapabilityKind::ActionPlan),
            _ => Err(CoachError::InvalidCapability(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ActionPlan,
    FlashDiagnostic,
    Other,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::ActionPlan => "action_plan",
            DocumentType::FlashDiagnostic => "flash_diagnostic",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action_plan" => Ok(DocumentType::ActionPlan),
            "flash_diagnostic" => Ok(DocumentType::FlashDiagnostic),
            "other" => Ok(DocumentType::Other),
            _ => Err(CoachError::InvalidDocumentType(s.to_string())),
        }
    }
}
