use serde::Serialize;

use crate::memory::SessionMemory;
use crate::types::CapabilityKind;

const DIAGNOSTIC_KEYWORDS: &[&str] = &["diagnostic", "diagnos", "assess"];
const ACTION_PLAN_KEYWORDS: &[&str] = &["action plan", "next steps", "plan d'action"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerDecision {
    pub capability: Option<CapabilityKind>,
    pub reason: String,
}

impl TriggerDecision {
    fn none(reason: impl Into<String>) -> Self {
        Self {
            capability: None,
            reason: reason.into(),
        }
    }
}

/// Decide whether the user's message asks for a capability that memory can
/// already support. An insufficient memory is a decision, not an error.
pub fn should_trigger(memory: &SessionMemory, message: &str) -> TriggerDecision {
    let message = message.to_lowercase();
    let asks = |keywords: &[&str]| keywords.iter().any(|k| message.contains(k));

    let (kind, requested, not_ready) = if asks(DIAGNOSTIC_KEYWORDS) {
        (
            CapabilityKind::FlashDiagnostic,
            "User requested diagnostic",
            "Diagnostic not ready",
        )
    } else if asks(ACTION_PLAN_KEYWORDS) {
        (
            CapabilityKind::ActionPlan,
            "User requested action plan",
            "Action plan not ready",
        )
    } else {
        return TriggerDecision::none("No capability trigger detected");
    };

    let readiness = memory.readiness(kind);
    if readiness.sufficient {
        TriggerDecision {
            capability: Some(kind),
            reason: requested.to_string(),
        }
    } else {
        TriggerDecision::none(format!(
            "{not_ready}: missing {}",
            readiness.missing.join(", ")
        ))
    }
}

/// Directive appended to the system prompt when a capability fires.
pub fn capability_prompt(kind: CapabilityKind, memory: &SessionMemory) -> String {
    match kind {
        CapabilityKind::FlashDiagnostic => FLASH_DIAGNOSTIC_PROMPT.to_string(),
        CapabilityKind::ActionPlan => {
            let phase = memory
                .project
                .phase
                .map(|p| p.as_str())
                .unwrap_or("vision");
            let time = memory
                .user
                .constraints
                .time
                .as_deref()
                .unwrap_or("unknown availability");
            ACTION_PLAN_PROMPT
                .replace("{{PHASE}}", phase)
                .replace("{{TIME}}", time)
        }
    }
}

const FLASH_DIAGNOSTIC_PROMPT: &str = "## CAPABILITY TRIGGERED: Flash Diagnostic

Write a flash diagnostic of this project from the memory state above.

### Structure
1. **Project Summary**: what the project is, in two or three sentences
2. **Current Phase Assessment**: where the founder stands today
3. **Strengths Identified**: two or three strengths drawn from their skills, assets and progress
4. **Gaps & Risks**: the two or three most serious concerns or missing pieces
5. **Top 3 Recommendations**: prioritized and actionable

### Formatting
- Bullet points
- Specific to their situation, never generic

### Quick Buttons
End with:
1. Go deeper into the diagnostic
2. Create an action plan
";

const ACTION_PLAN_PROMPT: &str = "## CAPABILITY TRIGGERED: Action Plan

Write a two-week action plan for a project in the \"{{PHASE}}\" phase.
Founder availability: {{TIME}}

### Structure
1. **Goal for the Next 2 Weeks**: one clear objective
2. **Action Items** (3 to 5), each with:
   - Title
   - Why it matters in this phase
   - Time estimate in hours
   - Expected outcome
3. **Dependencies**: what has to happen first
4. **Success Criteria**: how to tell the sprint worked

### Phase Focus
- vision, research: validation, user research, problem definition
- design, test: smallest viable version, first users
- launch, growth: growth experiments, retention, metrics, funding

### Quick Buttons
End with:
1. Get more details on action #1
2. Adjust the plan
3. Start a diagnostic
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectPhase;

    fn ready_memory() -> SessionMemory {
        let mut memory = SessionMemory::default();
        memory.project.description = Some("Marketplace for used lab gear".into());
        memory.progress.activities = vec!["20 interviews".into(), "landing page".into()];
        memory
    }

    #[test]
    fn diagnostic_fires_when_ready() {
        let decision = should_trigger(&ready_memory(), "Can I get a quick DIAGNOSTIC?");
        assert_eq!(decision.capability, Some(CapabilityKind::FlashDiagnostic));
        assert_eq!(decision.reason, "User requested diagnostic");
    }

    #[test]
    fn diagnostic_not_ready_explains_why() {
        let decision = should_trigger(&SessionMemory::default(), "please assess my idea");
        assert_eq!(decision.capability, None);
        assert_eq!(
            decision.reason,
            "Diagnostic not ready: missing project description, at least 2 progress items"
        );
    }

    #[test]
    fn action_plan_needs_phase() {
        let mut memory = ready_memory();
        let decision = should_trigger(&memory, "what are my next steps?");
        assert_eq!(decision.capability, None);
        assert_eq!(decision.reason, "Action plan not ready: missing project phase");

        memory.project.phase = Some(ProjectPhase::Test);
        let decision = should_trigger(&memory, "Je veux un plan d'action");
        assert_eq!(decision.capability, Some(CapabilityKind::ActionPlan));
    }

    #[test]
    fn plain_message_does_not_trigger() {
        let decision = should_trigger(&ready_memory(), "hello coach");
        assert_eq!(decision.capability, None);
        assert_eq!(decision.reason, "No capability trigger detected");
    }

    #[test]
    fn action_plan_prompt_mentions_phase_and_time() {
        let mut memory = ready_memory();
        memory.project.phase = Some(ProjectPhase::Launch);
        memory.user.constraints.time = Some("10h per week".into());
        let prompt = capability_prompt(CapabilityKind::ActionPlan, &memory);
        assert!(prompt.contains("\"launch\" phase"));
        assert!(prompt.contains("Founder availability: 10h per week"));

        let fallback = capability_prompt(CapabilityKind::ActionPlan, &SessionMemory::default());
        assert!(fallback.contains("unknown availability"));
    }
}
