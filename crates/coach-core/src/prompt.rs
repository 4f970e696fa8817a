//! System prompt assembly.
//!
//! Every turn the model receives the coach persona, the tag protocol, what we
//! know about the project, the question backlog, the knowledge base index,
//! capability readiness and one directive: the current workflow stage or a
//! triggered capability.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::backlog::{QuestionItem, QuestionStatus};
use crate::knowledge::KnowledgeEntry;
use crate::memory::{SessionMemory, MEMORY_PATHS};
use crate::types::{CapabilityKind, IntentCategory, Stage};
use crate::workflow::ConversationState;

const KNOWLEDGE_INDEX_LIMIT: usize = 30;
const PENDING_SHOWN: usize = 5;
const COMPLETED_SHOWN: usize = 3;

// ---------------------------------------------------------------------------
// Stage prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt {
    pub prompt: String,
    pub used_fallback: bool,
}

/// Built-in text for a stage, used whenever no external prompt is available.
pub fn fallback_stage_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::IntentUnderstanding => STAGE_1,
        Stage::ProjectUnderstanding => STAGE_2,
        Stage::ProjectProgress => STAGE_3,
        Stage::UnderlyingProblem => STAGE_4_TEMPLATE,
        Stage::Action => STAGE_5,
        Stage::Guidance => STAGE_6,
        Stage::Debrief => STAGE_7,
    }
}

/// Prompt for the state's current stage.
///
/// `external` is the text fetched from the prompt library, if any. The
/// underlying-problem stage has its placeholders filled from the state. The
/// guidance stage uses the built-in skip text unless the user asked for
/// guidance.
pub fn render_stage_prompt(state: &ConversationState, external: Option<&str>) -> StagePrompt {
    let stage = state.current_stage;
    if stage == Stage::Guidance && state.wants_guidance != Some(true) {
        return StagePrompt {
            prompt: STAGE_6_NO_GUIDANCE.to_string(),
            used_fallback: true,
        };
    }

    let (text, used_fallback) = match external.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => (text, false),
        None => (fallback_stage_prompt(stage), true),
    };

    let prompt = if stage == Stage::UnderlyingProblem {
        fill_underlying_problem(text, state)
    } else {
        text.to_string()
    };
    StagePrompt {
        prompt,
        used_fallback,
    }
}

fn fill_underlying_problem(template: &str, state: &ConversationState) -> String {
    let intents = if state.intents.is_empty() {
        "unknown".to_string()
    } else {
        state
            .intents
            .iter()
            .map(|i| i.category.label())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let phase = state
        .project_phase
        .map(|p| p.as_str())
        .unwrap_or("unknown");
    template
        .replace("{{INTENTS}}", &intents)
        .replace("{{PHASE}}", phase)
        .replace("{{COMPATIBILITY_RULES}}", &compatibility_rules())
}

/// One `- <intent> → <phases>` line per intent category.
pub fn compatibility_rules() -> String {
    IntentCategory::all()
        .iter()
        .map(|intent| {
            let phases: Vec<&str> = intent
                .compatible_phases()
                .iter()
                .map(|p| p.as_str())
                .collect();
            format!("- {} → {}", intent.label(), phases.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Context sections
// ---------------------------------------------------------------------------

fn line(out: &mut String, label: &str, value: Option<&str>) {
    let _ = writeln!(out, "- {label}: {}", value.unwrap_or("(unknown)"));
}

fn list_line(out: &mut String, label: &str, values: &[String]) {
    if values.is_empty() {
        let _ = writeln!(out, "- {label}: (unknown)");
    } else {
        let _ = writeln!(out, "- {label}: {}", values.join(", "));
    }
}

pub fn memory_context(memory: &SessionMemory) -> String {
    let mut out = String::from("## CURRENT MEMORY STATE\n\n### Project\n");
    let project = &memory.project;
    line(&mut out, "Name", project.name.as_deref());
    line(&mut out, "Description", project.description.as_deref());
    if !project.features.is_empty() {
        let _ = writeln!(out, "- Features: {}", project.features.join(", "));
    }
    if let Some(segment) = &project.target_segment {
        let _ = writeln!(out, "- Target segment: {segment}");
    }
    if let Some(problem) = &project.problem {
        let _ = writeln!(out, "- Problem: {problem}");
    }
    if let Some(solution) = &project.solution {
        let _ = writeln!(out, "- Solution: {solution}");
    }
    line(&mut out, "Phase", project.phase.map(|p| p.as_str()));

    out.push_str("\n### Progress\n");
    if memory.progress.activities.is_empty() {
        out.push_str("- No progress recorded yet\n");
    }
    for activity in &memory.progress.activities {
        let _ = writeln!(out, "- {activity}");
    }
    if !memory.progress.milestones.is_empty() {
        let _ = writeln!(out, "- Milestones: {}", memory.progress.milestones.join(", "));
    }

    out.push_str("\n### User Profile\n");
    list_line(&mut out, "Skills", &memory.user.skills);
    list_line(&mut out, "Assets", &memory.user.assets);

    out.push_str("\n### Constraints\n");
    let constraints = &memory.user.constraints;
    for (label, value) in [
        ("Time", &constraints.time),
        ("Budget", &constraints.budget),
        ("Geography", &constraints.geography),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "- {label}: {value}");
        }
    }
    if !constraints.lacking.is_empty() {
        let _ = writeln!(out, "- Lacking: {}", constraints.lacking.join(", "));
    }

    out.push_str("\n### Information Gaps\n");
    let gaps = memory.gaps();
    if gaps.is_empty() {
        out.push_str("- No critical gaps\n");
    }
    for gap in gaps {
        let _ = writeln!(out, "- Missing: {gap}");
    }
    out
}

pub fn backlog_context(questions: &[QuestionItem]) -> String {
    let pending: Vec<&QuestionItem> = questions
        .iter()
        .filter(|q| q.status == QuestionStatus::Pending)
        .collect();
    let completed: Vec<&QuestionItem> = questions
        .iter()
        .filter(|q| q.status == QuestionStatus::Completed)
        .collect();

    let mut out = String::from("## QUESTION BACKLOG\n\n### Currently Asking\n");
    match crate::backlog::current(questions) {
        Some(q) => {
            let _ = writeln!(out, "- {}", q.question);
        }
        None => out.push_str("- None\n"),
    }

    let _ = writeln!(out, "\n### Pending Questions ({})", pending.len());
    if pending.is_empty() {
        out.push_str("- None\n");
    }
    for q in pending.iter().take(PENDING_SHOWN) {
        let _ = writeln!(out, "- {}", q.question);
    }

    let _ = writeln!(out, "\n### Completed ({})", completed.len());
    if completed.is_empty() {
        out.push_str("- None\n");
    }
    let skip = completed.len().saturating_sub(COMPLETED_SHOWN);
    for q in completed.iter().skip(skip) {
        let _ = writeln!(out, "- ✓ {}", q.question);
    }
    out
}

pub fn knowledge_context(entries: &[KnowledgeEntry]) -> String {
    if entries.is_empty() {
        return "## KNOWLEDGE BASE\nNo knowledge base entries loaded.\n".to_string();
    }

    let mut by_theme: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *by_theme
            .entry(entry.theme.as_deref().unwrap_or("Other"))
            .or_default() += 1;
    }

    let mut out = format!("## KNOWLEDGE BASE ({} entries)\n\n### Themes Available\n", entries.len());
    for (theme, count) in by_theme {
        let _ = writeln!(out, "- {theme}: {count} entries");
    }

    out.push_str("\n### Entry Index (for matching)\n");
    for entry in entries.iter().take(KNOWLEDGE_INDEX_LIMIT) {
        let phases = if entry.phases.is_empty() {
            "all".to_string()
        } else {
            entry
                .phases
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        let _ = writeln!(
            out,
            "[{}] {} | Questions: \"{}\" | Phases: {}",
            entry.short_id(),
            entry.title,
            entry.question,
            phases
        );
    }

    out.push_str(
        "\n### How to Use Knowledge Base\n\
         When the user's question matches an entry, note the entry id in your thinking and use its recommendation.\n\
         When several entries match with high confidence, combine them.\n\
         When the user's phase is outside an entry's phases, say so and suggest a better-suited topic.\n",
    );
    out
}

/// Capability readiness plus the per-turn checklist.
pub fn capability_context(memory: &SessionMemory) -> String {
    let mut out = String::from("## AVAILABLE CAPABILITIES\n");
    for kind in [CapabilityKind::FlashDiagnostic, CapabilityKind::ActionPlan] {
        let readiness = memory.readiness(kind);
        let _ = writeln!(out, "\n### {}", kind.title());
        if readiness.sufficient {
            let _ = writeln!(out, "READY: enough information to deliver a {}", kind.title().to_lowercase());
        } else {
            let _ = writeln!(out, "NOT READY: missing {}", readiness.missing.join(", "));
        }
    }
    out.push_str(
        "\n## CURRENT TURN INSTRUCTIONS\n\
         1. Extract any new information from the user message\n\
         2. Record it in a <memory_update> tag\n\
         3. Either ask ONE question or deliver a capability\n\
         4. Refresh the <question_backlog> tag\n\
         5. Show your reasoning in a <thinking> tag\n",
    );
    out
}

pub fn locale_instruction(locale: Option<&str>) -> &'static str {
    match locale.map(|l| l.trim().to_ascii_lowercase()) {
        Some(l) if l == "fr" || l.starts_with("fr-") => {
            "## LANGUAGE\nAlways answer in French, whatever the language of the prompts above."
        }
        _ => "## LANGUAGE\nAlways answer in English, whatever the language of the prompts above.",
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// The one instruction block that drives this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Stage { stage: Stage, prompt: String },
    Capability { kind: CapabilityKind, prompt: String },
}

impl Directive {
    fn render(&self) -> String {
        match self {
            Directive::Stage { stage, prompt } => format!(
                "## CURRENT WORKFLOW STAGE: {} ({}/{})\n\n{}",
                stage,
                stage.number(),
                Stage::all().len(),
                prompt
            ),
            Directive::Capability { prompt, .. } => prompt.clone(),
        }
    }
}

/// Builder for the full system prompt of one turn.
pub struct SystemPrompt<'a> {
    base: Option<&'a str>,
    memory: &'a SessionMemory,
    questions: &'a [QuestionItem],
    knowledge: &'a [KnowledgeEntry],
    directive: Option<Directive>,
    locale: Option<&'a str>,
}

impl<'a> SystemPrompt<'a> {
    pub fn new(memory: &'a SessionMemory, questions: &'a [QuestionItem]) -> Self {
        Self {
            base: None,
            memory,
            questions,
            knowledge: &[],
            directive: None,
            locale: None,
        }
    }

    /// Replace the built-in coach persona.
    pub fn base(mut self, base: Option<&'a str>) -> Self {
        self.base = base.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn knowledge(mut self, entries: &'a [KnowledgeEntry]) -> Self {
        self.knowledge = entries;
        self
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directive = Some(directive);
        self
    }

    pub fn locale(mut self, locale: Option<&'a str>) -> Self {
        self.locale = locale;
        self
    }

    pub fn render(&self) -> String {
        let mut sections = vec![
            self.base.unwrap_or(DEFAULT_BASE_PROMPT).trim().to_string(),
            reasoning_instructions(),
            memory_context(self.memory),
            backlog_context(self.questions),
            knowledge_context(self.knowledge),
            capability_context(self.memory),
        ];
        if let Some(directive) = &self.directive {
            sections.push(directive.render());
        }
        sections.push(locale_instruction(self.locale).to_string());
        sections
            .iter()
            .map(|s| s.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The tag protocol as explained to the model.
pub fn reasoning_instructions() -> String {
    REASONING_INSTRUCTIONS.replace("{{MEMORY_PATHS}}", &MEMORY_PATHS.join(", "))
}

pub const DEFAULT_BASE_PROMPT: &str = "# Coaching Assistant

You are an experienced early-stage startup coach working with first-time founders.

Your job:
1. Understand their project and where it stands
2. Find the real problem behind the request
3. Give specific, actionable advice
4. End every exchange with a concrete next step

Be warm and direct. Prefer action to theory. Challenge assumptions, always constructively.
";

pub const REASONING_INSTRUCTIONS: &str = "## RESPONSE FORMAT

Structure every reply with these tags.

### 1. Thinking (shown to the user, collapsed)
<thinking>
- What did I just learn?
- Which memory fields change?
- What is still missing?
- Ask a question or deliver value?
- Which knowledge base entries match, and does the phase fit?
</thinking>

### 2. Memory update (hidden, read by the system)
<memory_update>
{\"path.to.field\": \"value\", \"another.field\": [\"array\", \"values\"]}
</memory_update>

Valid paths: {{MEMORY_PATHS}}
Phase values: vision, research, design, test, launch, growth

### 3. Question backlog (shown to the user, collapsed)
<question_backlog>
[\"Next question to ask\", \"Another pending question\"]
</question_backlog>

### 4. Your reply
After the tags, answer the user in natural language.
- At most ONE question per turn
- Numbered lists for quick choices
- When quoting the knowledge base, include its punchline and challenge

### Phase mismatch
When the request does not fit the project's phase (funding during research, for example):
- acknowledge the question
- explain why it is premature
- suggest the focus that fits their progress
- offer help on that instead
";

const STAGE_1: &str = "# Stage 1 – Intent Understanding

**Activity**:
- Work out the likely intent categories of the request, keeping those above 50% confidence.
- If the request is unclear, ask for more detail.

**Output format**: a TOON table. For the request \"I want more money soon\":

```
intention_categorisation[2]{intention_category,confidence_level,generic}
Funding,60,no
Sell,55,no
```

- **intention_category**: one of No question specified, Personality assessment, Project assessment, Next steps, Personal efficiency, Sell, Funding, Meet people, Build the product, Request expertise, Ideation, Other
- **confidence_level**: your confidence in the category, 0 to 100
- **generic**: \"yes\" when the question is not about one of the user's own projects";

const STAGE_2: &str = "# Stage 2 – Understanding the Project

**Activity**:
- Have the user clarify the concept; offer to read any documents they want to share.
- Update the business model strictly from what the user said.

**Output**: one `field: value` line per known column of

```
business_model{name, market_category, client_segment, problem, value_proposition, differentiator, solution, pitch}
```

- **name**: product or code name
- **market_category**: webapp, mobileapp, saas, marketplace, physical store, physical place, consulting, ...
- **client_segment**: the priority audience
- **problem**: what the product solves
- **value_proposition**: what the client gains
- **differentiator**: why this solution is uniquely better
- **solution**: feature list
- **pitch**: under 200 words covering segment, problem, value, category and differentiator";

const STAGE_3: &str = "# Stage 3 – Project Progress

**Activity**:
- Ask: *\"What have you already accomplished on this project?\"*
- Classify the **project_phase** as one of vision, research, design, test, launch, growth.";

const STAGE_4_TEMPLATE: &str = "# Stage 4 – Underlying Problem

**Activity**: check that the user's intent fits their project phase.
- Detected intents: {{INTENTS}}
- Project phase: {{PHASE}}

**Intent-phase compatibility**:
{{COMPATIBILITY_RULES}}

**Next**:
- Consistent: acknowledge and move on.
- Inconsistent: challenge the intent. Explain they are moving too fast, name the phase their progress puts them in, say where their intent makes sense, propose a more relevant underlying problem and ask what they think.";

const STAGE_5: &str = "# Stage 5 – Action

**Activity**:
- Offer to suggest an action challenge for the coming week.
- Ask how many hours they have available this week.
- Propose **3 priority actions** that fit their phase and can be done within 7 days.
- Ask them to pick one.
- Ask whether they want guidance on it.";

const STAGE_6: &str = "# Stage 6 – Guidance

**Activity**:
- Ask whether they already have a method in mind.
- If so, comment on it and improve it.
- If not, explain an approach and/or provide a tool, script or guide.
- Offer a simulated interview or a short practice session.";

const STAGE_6_NO_GUIDANCE: &str = "# Stage 6 – Guidance

The user does not want guidance. Move straight on to the debrief.";

const STAGE_7: &str = "# Stage 7 – Debrief

**Activity**:
- Ask what they learned in this session.
- Ask how they feel and how satisfied they are.
- Schedule the next session around their availability.";
