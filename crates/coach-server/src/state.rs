use std::sync::Arc;

use claude_client::Completion;
use coach_core::config::Config;
use coach_core::knowledge::{self, KnowledgeEntry};
use tracing::{info, warn};

use crate::prompts::PromptLibrary;
use crate::sessions::Sessions;
use crate::store::Store;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sessions: Sessions,
    pub llm: Arc<dyn Completion>,
    pub prompts: PromptLibrary,
    pub knowledge: Arc<Vec<KnowledgeEntry>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the state from a config. A knowledge base that fails to load is
    /// logged and replaced by an empty one.
    pub fn new(store: Store, llm: Arc<dyn Completion>, config: Config) -> Self {
        let knowledge = match &config.knowledge_base {
            Some(path) => match knowledge::load(path) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "knowledge base loaded");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load knowledge base");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let prompts = PromptLibrary::from_config(&config.prompts);
        Self::with_parts(store, llm, prompts, knowledge, config)
    }

    pub fn with_parts(
        store: Store,
        llm: Arc<dyn Completion>,
        prompts: PromptLibrary,
        knowledge: Vec<KnowledgeEntry>,
        config: Config,
    ) -> Self {
        Self {
            sessions: Sessions::new(store.clone()),
            store,
            llm,
            prompts,
            knowledge: Arc::new(knowledge),
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_client::{ChatMessage, TextStream};

    struct Silent;

    impl Completion for Silent {
        fn stream(&self, _system: &str, _messages: Vec<ChatMessage>) -> TextStream {
            TextStream::from_items(Vec::new())
        }
    }

    #[test]
    fn missing_knowledge_base_yields_empty_list() {
        let config = Config {
            knowledge_base: Some("/nonexistent/knowledge.yaml".into()),
            ..Config::default()
        };
        let state = AppState::new(Store::in_memory(), Arc::new(Silent), config);
        assert!(state.knowledge.is_empty());
        assert!(!state.prompts.is_enabled());
        assert_eq!(state.store.backend(), "memory");
    }
}
