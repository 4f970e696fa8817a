use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use claude_client::ClaudeClient;
use coach_core::config::{Config, WarnLevel};
use coach_server::state::AppState;
use coach_server::store::Store;

pub fn run(
    config_path: &Path,
    port: u16,
    database_url: Option<String>,
    in_memory: bool,
) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    report_warnings(&config)?;

    let llm = ClaudeClient::from_env(&config.llm.api_key_env)?
        .with_base_url(&config.llm.base_url)
        .with_model(&config.llm.model)
        .with_max_tokens(config.llm.max_tokens);
    tracing::info!(model = llm.model(), "anthropic client ready");

    let database_url = if in_memory {
        None
    } else {
        database_url.or_else(|| std::env::var(&config.database_url_env).ok())
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let store = match database_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Store::connect(&url)
                .await
                .context("connecting to postgres")?,
            None => {
                tracing::warn!("no database configured, data lives in memory only");
                Store::in_memory()
            }
        };
        let state = AppState::new(store, Arc::new(llm), config);
        coach_server::serve(state, port).await
    })
}

fn report_warnings(config: &Config) -> Result<()> {
    let warnings = config.validate();
    for w in &warnings {
        eprintln!("{:?}: {}", w.level, w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        return Err(anyhow!("invalid configuration"));
    }
    Ok(())
}
