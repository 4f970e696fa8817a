//! Prompt texts kept as Notion pages.
//!
//! Each page is read through the blocks API and flattened to Markdown. Pages
//! are cached for `cache_ttl_secs`. Every failure is logged and reported as
//! `None` so callers fall back to the built-in prompts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coach_core::config::PromptsConfig;
use coach_core::types::Stage;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const NOTION_VERSION: &str = "2022-06-28";

struct NotionSource {
    api_key: String,
    base_url: String,
    base_page_id: Option<String>,
    stage_page_ids: HashMap<Stage, String>,
}

struct Inner {
    http: reqwest::Client,
    notion: Option<NotionSource>,
    use_cache: bool,
    ttl: Duration,
    cache: RwLock<HashMap<String, (Instant, String)>>,
}

#[derive(Clone)]
pub struct PromptLibrary {
    inner: Arc<Inner>,
}

impl PromptLibrary {
    /// A library with no remote source; every lookup returns `None`.
    pub fn disabled() -> Self {
        Self::build(None, &PromptsConfig::default())
    }

    pub fn from_config(config: &PromptsConfig) -> Self {
        let notion = config.notion.as_ref().and_then(|n| {
            let api_key = match std::env::var(&n.api_key_env) {
                Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
                _ => {
                    warn!(var = %n.api_key_env, "Notion API key not set, using built-in prompts");
                    return None;
                }
            };
            let stage_page_ids = n
                .stage_page_ids
                .iter()
                .filter_map(|(number, page)| {
                    let stage = Stage::all().get(usize::from(*number).checked_sub(1)?)?;
                    Some((*stage, page.clone()))
                })
                .collect();
            Some(NotionSource {
                api_key,
                base_url: n.base_url.trim_end_matches('/').to_string(),
                base_page_id: n.base_page_id.clone(),
                stage_page_ids,
            })
        });
        Self::build(notion, config)
    }

    fn build(notion: Option<NotionSource>, config: &PromptsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                notion,
                use_cache: config.use_cache,
                ttl: Duration::from_secs(config.cache_ttl_secs),
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.notion.is_some()
    }

    /// Coach persona page, if configured and reachable.
    pub async fn base_prompt(&self) -> Option<String> {
        let page = self.inner.notion.as_ref()?.base_page_id.clone()?;
        self.page_text(&page).await
    }

    /// External text for one stage, if configured and reachable.
    pub async fn stage_prompt(&self, stage: Stage) -> Option<String> {
        let page = self.inner.notion.as_ref()?.stage_page_ids.get(&stage)?.clone();
        self.page_text(&page).await
    }

    pub async fn page_text(&self, page_id: &str) -> Option<String> {
        let notion = self.inner.notion.as_ref()?;

        if self.inner.use_cache {
            let cache = self.inner.cache.read().await;
            if let Some((at, text)) = cache.get(page_id) {
                if at.elapsed() < self.inner.ttl {
                    debug!(page_id, age_secs = at.elapsed().as_secs(), "prompt cache hit");
                    return Some(text.clone());
                }
            }
        }

        let text = match fetch_page(&self.inner.http, notion, page_id).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(page_id, "Notion page is empty");
                return None;
            }
            Err(e) => {
                warn!(page_id, error = %e, "failed to fetch Notion page");
                return None;
            }
        };

        if self.inner.use_cache {
            self.inner
                .cache
                .write()
                .await
                .insert(page_id.to_string(), (Instant::now(), text.clone()));
        }
        Some(text)
    }

    /// Drop every cached page. Returns how many were cached.
    pub async fn clear(&self) -> usize {
        let mut cache = self.inner.cache.write().await;
        let n = cache.len();
        cache.clear();
        info!(entries = n, "prompt cache cleared");
        n
    }
}

// ---------------------------------------------------------------------------
// Notion blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BlockList {
    results: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    body: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    annotations: Annotations,
}

#[derive(Debug, Default, Deserialize)]
struct Annotations {
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
    #[serde(default)]
    code: bool,
    #[serde(default)]
    strikethrough: bool,
}

async fn fetch_page(
    http: &reqwest::Client,
    notion: &NotionSource,
    page_id: &str,
) -> anyhow::Result<String> {
    debug!(page_id, "fetching Notion page");
    let list: BlockList = http
        .get(format!(
            "{}/v1/blocks/{}/children?page_size=100",
            notion.base_url, page_id
        ))
        .bearer_auth(&notion.api_key)
        .header("Notion-Version", NOTION_VERSION)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(blocks_to_markdown(&list.results))
}

fn blocks_to_markdown(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(block_to_markdown)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn block_to_markdown(block: &Block) -> Option<String> {
    if block.kind == "divider" {
        return Some("---".to_string());
    }
    let body = block.body.get(&block.kind)?;
    let text = rich_text(body.get("rich_text")?);
    let line = match block.kind.as_str() {
        "heading_1" => format!("# {text}"),
        "heading_2" => format!("## {text}"),
        "heading_3" => format!("### {text}"),
        "bulleted_list_item" => format!("- {text}"),
        "numbered_list_item" => format!("1. {text}"),
        "quote" | "callout" => format!("> {text}"),
        "code" => {
            let language = body.get("language").and_then(|l| l.as_str()).unwrap_or("");
            format!("```{language}\n{text}\n```")
        }
        _ => text,
    };
    Some(line)
}

fn rich_text(value: &serde_json::Value) -> String {
    let spans: Vec<RichText> = serde_json::from_value(value.clone()).unwrap_or_default();
    spans
        .into_iter()
        .map(|span| {
            let mut s = span.plain_text;
            if span.annotations.bold {
                s = format!("**{s}**");
            }
            if span.annotations.italic {
                s = format!("*{s}*");
            }
            if span.annotations.code {
                s = format!("`{s}`");
            }
            if span.annotations.strikethrough {
                s = format!("~~{s}~~");
            }
            match span.href {
                Some(href) => format!("[{s}]({href})"),
                None => s,
            }
        })
        .collect()
}
