use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::memory::SessionMemory;
use crate::types::{IntentCategory, ProjectPhase, Stage};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCategorization {
    pub category: IntentCategory,
    pub confidence: u32,
    pub generic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differentiator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
}

impl BusinessModel {
    fn slot(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            "name" => Some(&mut self.name),
            "market_category" => Some(&mut self.market_category),
            "client_segment" => Some(&mut self.client_segment),
            "problem" => Some(&mut self.problem),
            "value_proposition" => Some(&mut self.value_proposition),
            "differentiator" => Some(&mut self.differentiator),
            "solution" => Some(&mut self.solution),
            "pitch" => Some(&mut self.pitch),
            _ => None,
        }
    }
}

/// Where one conversation stands in the coaching workflow.
///
/// `current_stage` only ever moves forward through [`Stage::all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationState {
    pub current_stage: Stage,
    pub intents: Vec<IntentCategorization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_model: Option<BusinessModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_phase: Option<ProjectPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_generic_question: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_project_description: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wants_guidance: Option<bool>,
    pub completed_stages: Vec<Stage>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            current_stage: Stage::IntentUnderstanding,
            intents: Vec::new(),
            business_model: None,
            project_phase: None,
            is_generic_question: None,
            has_project_description: None,
            selected_action: None,
            wants_guidance: None,
            completed_stages: Vec::new(),
        }
    }
}

/// Partial state extracted from one assistant reply. `None` leaves the
/// corresponding field of the state unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageExtract {
    pub intents: Option<Vec<IntentCategorization>>,
    pub is_generic_question: Option<bool>,
    pub business_model: Option<BusinessModel>,
    pub has_project_description: Option<bool>,
    pub project_phase: Option<ProjectPhase>,
    pub selected_action: Option<String>,
    pub wants_guidance: Option<bool>,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Whether `stage` is skipped given what is already known.
pub fn should_skip_stage(stage: Stage, state: &ConversationState) -> bool {
    match stage {
        Stage::ProjectUnderstanding => {
            state.is_generic_question == Some(true) || state.has_project_description == Some(true)
        }
        Stage::ProjectProgress => state.project_phase.is_some(),
        Stage::Guidance => state.wants_guidance == Some(false),
        _ => false,
    }
}

/// First non-skipped stage after `current`, or `None` past debrief.
pub fn next_stage(current: Stage, state: &ConversationState) -> Option<Stage> {
    Stage::all()[current.index() + 1..]
        .iter()
        .copied()
        .find(|stage| !should_skip_stage(*stage, state))
}

pub fn is_intent_compatible_with_phase(intent: IntentCategory, phase: ProjectPhase) -> bool {
    intent.compatible_phases().contains(&phase)
}

impl ConversationState {
    /// Carry facts already present in project memory into the skip flags.
    pub fn sync_with_memory(&mut self, memory: &SessionMemory) {
        if memory.has_description() {
            self.has_project_description = Some(true);
        }
        if self.project_phase.is_none() {
            self.project_phase = memory.project.phase;
        }
    }

    pub fn apply(&mut self, extract: StageExtract) {
        if let Some(intents) = extract.intents {
            self.intents = intents;
        }
        if let Some(generic) = extract.is_generic_question {
            self.is_generic_question = Some(generic);
        }
        if let Some(model) = extract.business_model {
            self.business_model = Some(model);
        }
        if let Some(has) = extract.has_project_description {
            self.has_project_description = Some(has);
        }
        if let Some(phase) = extract.project_phase {
            self.project_phase = Some(phase);
        }
        if let Some(action) = extract.selected_action {
            self.selected_action = Some(action);
        }
        if let Some(wants) = extract.wants_guidance {
            self.wants_guidance = Some(wants);
        }
    }

    /// Merge the extract, mark the current stage completed and move to the
    /// next non-skipped stage. Debrief is terminal: the state stays there.
    pub fn advance(&mut self, extract: StageExtract) {
        let current = self.current_stage;
        self.apply(extract);
        if !self.completed_stages.contains(&current) {
            self.completed_stages.push(current);
        }
        if let Some(next) = next_stage(current, self) {
            self.current_stage = next;
        }
    }

    /// Intents whose category does not fit the known project phase.
    pub fn mismatched_intents(&self) -> Vec<IntentCategory> {
        let Some(phase) = self.project_phase else {
            return Vec::new();
        };
        self.intents
            .iter()
            .map(|i| i.category)
            .filter(|c| !is_intent_compatible_with_phase(*c, phase))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

static INTENT_HEADER_RE: OnceLock<Regex> = OnceLock::new();
static BUSINESS_FIELD_RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
static GUIDANCE_RE: OnceLock<Regex> = OnceLock::new();
static GUIDANCE_DECLINED_RE: OnceLock<Regex> = OnceLock::new();

const BUSINESS_FIELDS: &[&str] = &[
    "name",
    "market_category",
    "client_segment",
    "problem",
    "value_proposition",
    "differentiator",
    "solution",
    "pitch",
];

/// Extract whatever the reply tells us for the stage it answered.
pub fn parse_assistant_response(text: &str, stage: Stage) -> StageExtract {
    let mut extract = StageExtract::default();
    match stage {
        Stage::IntentUnderstanding => {
            let intents = parse_intents(text);
            if !intents.is_empty() {
                extract.is_generic_question = Some(intents.iter().any(|i| i.generic));
                extract.intents = Some(intents);
            }
        }
        Stage::ProjectUnderstanding => {
            extract.business_model = parse_business_model(text);
            extract.has_project_description = Some(true);
        }
        Stage::ProjectProgress => {
            extract.project_phase = parse_phase(text);
        }
        Stage::Action => {
            extract.wants_guidance = parse_guidance(text);
        }
        _ => {}
    }
    extract
}

/// Rows of the `intention_categorisation[N]{category,confidence,generic}`
/// table. Only rows above 50% confidence are kept.
pub fn parse_intents(text: &str) -> Vec<IntentCategorization> {
    let re = INTENT_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)intention_categorisation\[\d+\]\{[^}]+\}").unwrap()
    });
    let Some(header) = re.find(text) else {
        return Vec::new();
    };
    let rest = &text[header.end()..];
    let body = rest.split("\n\n").next().unwrap_or("");

    body.trim()
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            let category = IntentCategory::normalize(parts[0])?;
            let confidence = leading_number(parts[1]);
            let generic = parts[2].eq_ignore_ascii_case("yes");
            (confidence > 50).then_some(IntentCategorization {
                category,
                confidence,
                generic,
            })
        })
        .collect()
}

fn leading_number(s: &str) -> u32 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// `field: value` lines for the business model columns.
pub fn parse_business_model(text: &str) -> Option<BusinessModel> {
    let res = BUSINESS_FIELD_RES.get_or_init(|| {
        BUSINESS_FIELDS
            .iter()
            .map(|field| {
                let re = Regex::new(&format!(r"(?i)\b{field}[:\s]+([^\n]+)")).unwrap();
                (*field, re)
            })
            .collect()
    });

    let mut model = BusinessModel::default();
    let mut found = false;
    for (field, re) in res {
        if let Some(caps) = re.captures(text) {
            if let Some(slot) = model.slot(field) {
                *slot = Some(caps[1].trim().to_string());
                found = true;
            }
        }
    }
    found.then_some(model)
}

/// First phase name mentioned in the reply, in workflow order.
pub fn parse_phase(text: &str) -> Option<ProjectPhase> {
    let lower = text.to_lowercase();
    ProjectPhase::all()
        .iter()
        .copied()
        .find(|phase| lower.contains(phase.as_str()))
}

fn parse_guidance(text: &str) -> Option<bool> {
    let declined = GUIDANCE_DECLINED_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(no|without|skip|don't want|do not want)\s+(any\s+)?(guidance|help)\b")
            .unwrap()
    });
    if declined.is_match(text) {
        return Some(false);
    }
    let wants = GUIDANCE_RE.get_or_init(|| Regex::new(r"(?i)guidance|help|guide|support").unwrap());
    wants.is_match(text).then_some(true)
}
