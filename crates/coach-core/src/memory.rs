use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoachError, Result};
use crate::types::{CapabilityKind, ProjectPhase};

const TAG: &str = "memory_update";

// ---------------------------------------------------------------------------
// Memory model
// ---------------------------------------------------------------------------

/// Accumulated facts about one coaching project.
///
/// Array fields behave as ordered sets: entries are never duplicated and are
/// only ever appended to by a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMemory {
    pub project: ProjectMemory,
    pub progress: ProgressMemory,
    pub user: UserMemory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectMemory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ProjectPhase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressMemory {
    pub activities: Vec<String>,
    pub milestones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMemory {
    pub skills: Vec<String>,
    pub assets: Vec<String>,
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geography: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lacking: Vec<String>,
}

// ---------------------------------------------------------------------------
// Typed patch
// ---------------------------------------------------------------------------

/// One writable memory path together with its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryField {
    ProjectName(String),
    ProjectDescription(String),
    ProjectFeatures(Vec<String>),
    ProjectMarketCategory(String),
    ProjectTargetSegment(String),
    ProjectProblem(String),
    ProjectSolution(String),
    ProjectPhase(ProjectPhase),
    ProgressActivities(Vec<String>),
    ProgressMilestones(Vec<String>),
    UserSkills(Vec<String>),
    UserAssets(Vec<String>),
    ConstraintTime(String),
    ConstraintBudget(String),
    ConstraintGeography(String),
    ConstraintLacking(Vec<String>),
}

/// Every path a patch may address, in the order they are documented to the model.
pub const MEMORY_PATHS: &[&str] = &[
    "project.name",
    "project.description",
    "project.features",
    "project.market_category",
    "project.target_segment",
    "project.problem",
    "project.solution",
    "project.phase",
    "progress.activities",
    "progress.milestones",
    "user.skills",
    "user.assets",
    "user.constraints.time",
    "user.constraints.budget",
    "user.constraints.geography",
    "user.constraints.lacking",
];

impl MemoryField {
    pub fn path(&self) -> &'static str {
        match self {
            MemoryField::ProjectName(_) => "project.name",
            MemoryField::ProjectDescription(_) => "project.description",
            MemoryField::ProjectFeatures(_) => "project.features",
            MemoryField::ProjectMarketCategory(_) => "project.market_category",
            MemoryField::ProjectTargetSegment(_) => "project.target_segment",
            MemoryField::ProjectProblem(_) => "project.problem",
            MemoryField::ProjectSolution(_) => "project.solution",
            MemoryField::ProjectPhase(_) => "project.phase",
            MemoryField::ProgressActivities(_) => "progress.activities",
            MemoryField::ProgressMilestones(_) => "progress.milestones",
            MemoryField::UserSkills(_) => "user.skills",
            MemoryField::UserAssets(_) => "user.assets",
            MemoryField::ConstraintTime(_) => "user.constraints.time",
            MemoryField::ConstraintBudget(_) => "user.constraints.budget",
            MemoryField::ConstraintGeography(_) => "user.constraints.geography",
            MemoryField::ConstraintLacking(_) => "user.constraints.lacking",
        }
    }

    /// `Ok(None)` when the value is well-typed but unusable; the reason is
    /// pushed to `skipped` and the rest of the patch still applies.
    fn decode(
        path: &str,
        value: &Value,
        skipped: &mut Vec<String>,
    ) -> Result<Option<MemoryField>> {
        let field = match path {
            "project.name" => MemoryField::ProjectName(text(path, value)?),
            "project.description" => MemoryField::ProjectDescription(text(path, value)?),
            "project.features" => MemoryField::ProjectFeatures(list(path, value)?),
            "project.market_category" => MemoryField::ProjectMarketCategory(text(path, value)?),
            "project.target_segment" => MemoryField::ProjectTargetSegment(text(path, value)?),
            "project.problem" => MemoryField::ProjectProblem(text(path, value)?),
            "project.solution" => MemoryField::ProjectSolution(text(path, value)?),
            "project.phase" => {
                let raw = text(path, value)?;
                match raw.parse::<ProjectPhase>() {
                    Ok(phase) => MemoryField::ProjectPhase(phase),
                    Err(_) => {
                        skipped.push(format!("{path}: unknown phase '{raw}'"));
                        return Ok(None);
                    }
                }
            }
            "progress.activities" => MemoryField::ProgressActivities(list(path, value)?),
            "progress.milestones" => MemoryField::ProgressMilestones(list(path, value)?),
            "user.skills" => MemoryField::UserSkills(list(path, value)?),
            "user.assets" => MemoryField::UserAssets(list(path, value)?),
            "user.constraints.time" => MemoryField::ConstraintTime(text(path, value)?),
            "user.constraints.budget" => MemoryField::ConstraintBudget(text(path, value)?),
            "user.constraints.geography" => MemoryField::ConstraintGeography(text(path, value)?),
            "user.constraints.lacking" => MemoryField::ConstraintLacking(list(path, value)?),
            other => return Err(CoachError::UnknownMemoryPath(other.to_string())),
        };
        Ok(Some(field))
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text(path: &str, value: &Value) -> Result<String> {
    scalar(value).ok_or_else(|| CoachError::malformed(TAG, format!("{path}: expected a string")))
}

fn list(path: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                scalar(item).ok_or_else(|| {
                    CoachError::malformed(TAG, format!("{path}: expected an array of strings"))
                })
            })
            .collect(),
        other => Ok(vec![text(path, other)?]),
    }
}

/// A validated set of memory changes decoded from a `<memory_update>` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPatch {
    pub fields: Vec<MemoryField>,
    /// Fields left out of the patch, e.g. a phase outside the known set.
    pub skipped: Vec<String>,
}

impl MemoryPatch {
    pub fn new(fields: Vec<MemoryField>) -> Self {
        Self {
            fields,
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode a JSON object whose keys are dot paths, nested objects or a mix
    /// of both. `{"user.constraints.time": "5h"}` and
    /// `{"user": {"constraints": {"time": "5h"}}}` produce the same patch.
    ///
    /// Any unknown path or wrongly-typed value rejects the whole patch. A
    /// phase outside [`ProjectPhase::all`] only drops that field and is
    /// listed in `skipped`. `null` values are ignored.
    pub fn from_json(value: &Value) -> Result<MemoryPatch> {
        let Value::Object(_) = value else {
            return Err(CoachError::malformed(TAG, "payload is not a JSON object"));
        };
        let mut flat = Vec::new();
        flatten("", value, &mut flat);

        let mut fields = Vec::with_capacity(flat.len());
        let mut skipped = Vec::new();
        for (path, leaf) in flat {
            if leaf.is_null() {
                continue;
            }
            if let Some(field) = MemoryField::decode(&path, leaf, &mut skipped)? {
                fields.push(field);
            }
        }
        Ok(MemoryPatch { fields, skipped })
    }
}

fn flatten<'a>(prefix: &str, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf)),
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Append the entries of `incoming` that are not already present.
fn union_into(target: &mut Vec<String>, incoming: &[String]) {
    for item in incoming {
        if item.is_empty() {
            continue;
        }
        if !target.iter().any(|existing| existing == item) {
            target.push(item.clone());
        }
    }
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    union_into(&mut out, items);
    out
}

/// Result of checking whether memory holds enough for a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub sufficient: bool,
    pub missing: Vec<&'static str>,
}

impl SessionMemory {
    /// Fold a patch into this memory.
    ///
    /// Project fields override (features included, deduplicated). Progress,
    /// skills, assets and `constraints.lacking` are unioned in first-seen
    /// order. The remaining constraints override.
    pub fn apply(&mut self, patch: &MemoryPatch) {
        for field in &patch.fields {
            match field {
                MemoryField::ProjectName(v) => self.project.name = Some(v.clone()),
                MemoryField::ProjectDescription(v) => self.project.description = Some(v.clone()),
                MemoryField::ProjectFeatures(v) => self.project.features = dedup(v),
                MemoryField::ProjectMarketCategory(v) => {
                    self.project.market_category = Some(v.clone())
                }
                MemoryField::ProjectTargetSegment(v) => {
                    self.project.target_segment = Some(v.clone())
                }
                MemoryField::ProjectProblem(v) => self.project.problem = Some(v.clone()),
                MemoryField::ProjectSolution(v) => self.project.solution = Some(v.clone()),
                MemoryField::ProjectPhase(p) => self.project.phase = Some(*p),
                MemoryField::ProgressActivities(v) => union_into(&mut self.progress.activities, v),
                MemoryField::ProgressMilestones(v) => union_into(&mut self.progress.milestones, v),
                MemoryField::UserSkills(v) => union_into(&mut self.user.skills, v),
                MemoryField::UserAssets(v) => union_into(&mut self.user.assets, v),
                MemoryField::ConstraintTime(v) => self.user.constraints.time = Some(v.clone()),
                MemoryField::ConstraintBudget(v) => self.user.constraints.budget = Some(v.clone()),
                MemoryField::ConstraintGeography(v) => {
                    self.user.constraints.geography = Some(v.clone())
                }
                MemoryField::ConstraintLacking(v) => {
                    union_into(&mut self.user.constraints.lacking, v)
                }
            }
        }
    }

    /// Non-mutating form of [`SessionMemory::apply`].
    pub fn merged(&self, patch: &MemoryPatch) -> SessionMemory {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    pub fn has_description(&self) -> bool {
        self.project
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Human labels for the facts that are still unknown.
    pub fn gaps(&self) -> Vec<&'static str> {
        let mut gaps = Vec::new();
        if !self.has_description() {
            gaps.push("project description");
        }
        if self.progress.activities.is_empty() {
            gaps.push("progress/accomplishments");
        }
        if self.user.skills.is_empty() {
            gaps.push("user skills");
        }
        if self.user.assets.is_empty() {
            gaps.push("user assets");
        }
        if self.user.constraints.time.is_none() {
            gaps.push("time constraints");
        }
        if self.user.constraints.budget.is_none() {
            gaps.push("budget constraints");
        }
        if self.project.phase.is_none() {
            gaps.push("project phase");
        }
        gaps
    }

    pub fn readiness(&self, kind: CapabilityKind) -> Readiness {
        let mut missing = Vec::new();
        if !self.has_description() {
            missing.push("project description");
        }
        match kind {
            CapabilityKind::FlashDiagnostic => {
                if self.progress.activities.len() < 2 {
                    missing.push("at least 2 progress items");
                }
            }
            CapabilityKind::ActionPlan => {
                if self.project.phase.is_none() {
                    missing.push("project phase");
                }
            }
        }
        Readiness {
            sufficient: missing.is_empty(),
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> MemoryPatch {
        MemoryPatch::from_json(&value).unwrap()
    }

    #[test]
    fn skills_union_does_not_duplicate() {
        let mut memory = SessionMemory::default();
        memory.apply(&patch(json!({"user": {"skills": ["sales"]}})));
        memory.apply(&patch(json!({"user": {"skills": ["sales", "design"]}})));
        assert_eq!(memory.user.skills, vec!["sales", "design"]);
    }

    #[test]
    fn dot_paths_and_nested_objects_are_equivalent() {
        let dotted = patch(json!({"user.constraints.time": "5h/week", "project.name": "Lumo"}));
        let nested = patch(json!({
            "project": {"name": "Lumo"},
            "user": {"constraints": {"time": "5h/week"}}
        }));
        let base = SessionMemory::default();
        assert_eq!(base.merged(&dotted), base.merged(&nested));
        assert_eq!(
            base.merged(&dotted).user.constraints.time.as_deref(),
            Some("5h/week")
        );
    }

    #[test]
    fn arrays_never_shrink_across_merges() {
        let updates = [
            json!({"progress.activities": ["interviews", "landing page"]}),
            json!({"progress.activities": ["landing page"]}),
            json!({"progress.activities": ["mvp", "interviews", "mvp"]}),
            json!({"user.constraints.lacking": ["cofounder"]}),
            json!({"user.constraints.lacking": "funding"}),
        ];
        let mut memory = SessionMemory::default();
        let mut previous_len = 0;
        for update in updates {
            memory.apply(&patch(update));
            let len = memory.progress.activities.len();
            assert!(len >= previous_len);
            previous_len = len;
        }
        assert_eq!(
            memory.progress.activities,
            vec!["interviews", "landing page", "mvp"]
        );
        assert_eq!(memory.user.constraints.lacking, vec!["cofounder", "funding"]);
    }

    #[test]
    fn features_override_but_dedup() {
        let mut memory = SessionMemory::default();
        memory.apply(&patch(json!({"project.features": ["chat", "export"]})));
        memory.apply(&patch(json!({"project.features": ["search", "search"]})));
        assert_eq!(memory.project.features, vec!["search"]);
    }

    #[test]
    fn scalars_override() {
        let mut memory = SessionMemory::default();
        memory.apply(&patch(json!({"user.constraints.budget": "0"})));
        memory.apply(&patch(json!({"user.constraints.budget": 500})));
        assert_eq!(memory.user.constraints.budget.as_deref(), Some("500"));
    }

    #[test]
    fn phase_is_typed() {
        let p = patch(json!({"project.phase": "Design"}));
        assert_eq!(p.fields, vec![MemoryField::ProjectPhase(ProjectPhase::Design)]);
        assert!(p.skipped.is_empty());
    }

    #[test]
    fn unknown_phase_drops_only_that_field() {
        let p = patch(json!({
            "project.description": "Bakery scheduling app",
            "user.skills": ["sales"],
            "project.phase": "MVP"
        }));
        assert_eq!(p.skipped, vec!["project.phase: unknown phase 'MVP'"]);

        let memory = SessionMemory::default().merged(&p);
        assert_eq!(memory.project.description.as_deref(), Some("Bakery scheduling app"));
        assert_eq!(memory.user.skills, vec!["sales"]);
        assert_eq!(memory.project.phase, None);
    }

    #[test]
    fn unknown_path_rejects_whole_patch() {
        let err = MemoryPatch::from_json(&json!({
            "project.name": "Lumo",
            "project.mood": "great"
        }))
        .unwrap_err();
        assert!(matches!(err, CoachError::UnknownMemoryPath(p) if p == "project.mood"));
    }

    #[test]
    fn wrong_type_rejects_whole_patch() {
        let err = MemoryPatch::from_json(&json!({"user.skills": [{"name": "x"}]})).unwrap_err();
        assert!(matches!(err, CoachError::MalformedTag { .. }));
        assert!(MemoryPatch::from_json(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn null_means_no_change() {
        let p = patch(json!({"project.name": null, "project.problem": "churn"}));
        assert_eq!(p.fields, vec![MemoryField::ProjectProblem("churn".into())]);
    }

    #[test]
    fn gaps_shrink_as_memory_fills() {
        let mut memory = SessionMemory::default();
        assert_eq!(memory.gaps().len(), 7);
        memory.apply(&patch(json!({
            "project.description": "Tool for bakers",
            "project.phase": "research",
            "user.skills": ["baking"]
        })));
        assert_eq!(
            memory.gaps(),
            vec![
                "progress/accomplishments",
                "user assets",
                "time constraints",
                "budget constraints"
            ]
        );
    }

    #[test]
    fn diagnostic_readiness_needs_two_activities() {
        let mut memory = SessionMemory::default();
        memory.apply(&patch(json!({
            "project.description": "Tool for bakers",
            "progress.activities": ["survey"]
        })));
        let r = memory.readiness(CapabilityKind::FlashDiagnostic);
        assert!(!r.sufficient);
        assert_eq!(r.missing, vec!["at least 2 progress items"]);

        memory.apply(&patch(json!({"progress.activities": ["prototype"]})));
        assert!(memory.readiness(CapabilityKind::FlashDiagnostic).sufficient);
        assert_eq!(
            memory.readiness(CapabilityKind::ActionPlan).missing,
            vec!["project phase"]
        );
    }

    #[test]
    fn deserializes_partial_rows() {
        let memory: SessionMemory =
            serde_json::from_value(json!({"project": {"name": "Lumo"}})).unwrap();
        assert_eq!(memory.project.name.as_deref(), Some("Lumo"));
        assert!(memory.user.skills.is_empty());
    }
}
