use std::path::Path;

use anyhow::{Context, Result};
use coach_core::backlog::default_backlog;
use coach_core::config::Config;
use coach_core::memory::SessionMemory;
use coach_core::prompt::{render_stage_prompt, Directive, SystemPrompt};
use coach_core::types::Stage;
use coach_core::workflow::ConversationState;

/// Render the system prompt a turn at `stage` would send, without Notion.
pub fn run(config_path: &Path, memory_path: &Path, stage: &str, locale: Option<&str>) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let raw = std::fs::read_to_string(memory_path)
        .with_context(|| format!("reading {}", memory_path.display()))?;
    let memory: SessionMemory = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", memory_path.display()))?;
    let stage: Stage = stage.parse()?;

    let knowledge = match &config.knowledge_base {
        Some(path) => coach_core::knowledge::load(path)?,
        None => Vec::new(),
    };

    let mut state = ConversationState {
        current_stage: stage,
        ..ConversationState::default()
    };
    state.sync_with_memory(&memory);
    let stage_prompt = render_stage_prompt(&state, None);

    let questions = default_backlog();
    let prompt = SystemPrompt::new(&memory, &questions)
        .knowledge(&knowledge)
        .directive(Directive::Stage {
            stage,
            prompt: stage_prompt.prompt,
        })
        .locale(locale)
        .render();
    println!("{prompt}");
    Ok(())
}
