use anyhow::Result;
use coach_core::types::{ProjectPhase, Stage};
use coach_core::workflow::{next_stage, ConversationState};

pub struct Flags {
    pub stage: String,
    pub generic: bool,
    pub has_description: bool,
    pub phase: Option<String>,
    pub no_guidance: bool,
}

pub fn run(flags: Flags) -> Result<()> {
    let current: Stage = flags.stage.parse()?;
    let project_phase = flags
        .phase
        .as_deref()
        .map(str::parse::<ProjectPhase>)
        .transpose()?;

    let state = ConversationState {
        current_stage: current,
        is_generic_question: flags.generic.then_some(true),
        has_project_description: flags.has_description.then_some(true),
        project_phase,
        wants_guidance: flags.no_guidance.then_some(false),
        ..ConversationState::default()
    };

    match next_stage(current, &state) {
        Some(next) => println!("{next}"),
        None => println!("none"),
    }
    Ok(())
}
