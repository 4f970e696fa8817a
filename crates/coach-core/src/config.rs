use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: default_anthropic_url(),
            api_key_env: default_anthropic_key_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// PromptsConfig / NotionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(default = "default_notion_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_notion_url")]
    pub base_url: String,
    /// Page holding the coach persona. Absent means the built-in persona.
    #[serde(default)]
    pub base_page_id: Option<String>,
    /// Stage number (1..=7) to page id.
    #[serde(default)]
    pub stage_page_ids: BTreeMap<u8, String>,
}

fn default_notion_key_env() -> String {
    "NOTION_API_KEY".to_string()
}

fn default_notion_url() -> String {
    "https://api.notion.com".to_string()
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_notion_key_env(),
            base_url: default_notion_url(),
            base_page_id: None,
            stage_page_ids: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub notion: Option<NotionConfig>,
}

fn default_use_cache() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            use_cache: default_use_cache(),
            cache_ttl_secs: default_cache_ttl(),
            notion: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// YAML list of knowledge entries, resolved against the config file's directory.
    #[serde(default)]
    pub knowledge_base: Option<PathBuf>,
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
}

fn default_database_url_env() -> String {
    "DATABASE_URL".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            prompts: PromptsConfig::default(),
            knowledge_base: None,
            database_url_env: default_database_url_env(),
        }
    }
}

pub const DEFAULT_CONFIG_FILE: &str = "coach.yaml";

impl Config {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&data)?;
        if let (Some(kb), Some(dir)) = (&cfg.knowledge_base, path.parent()) {
            if kb.is_relative() {
                cfg.knowledge_base = Some(dir.join(kb));
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.llm.max_tokens == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "llm.max_tokens must be greater than zero".to_string(),
            });
        }

        if let Some(notion) = &self.prompts.notion {
            for stage in notion.stage_page_ids.keys() {
                if !(1..=7).contains(stage) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "prompts.notion.stage_page_ids has unknown stage {stage} (expected 1-7)"
                        ),
                    });
                }
            }
        }

        if self.prompts.use_cache && self.prompts.cache_ttl_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "prompts.cache_ttl_secs is 0; cached prompts expire immediately"
                    .to_string(),
            });
        }

        if let Some(kb) = &self.knowledge_base {
            if !kb.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("knowledge_base file not found: {}", kb.display()),
                });
            }
        }

        warnings
    }
}
