//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub airtable: AirtableConfig,

    #[serde(default)]
    pub outreach: OutreachConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Lead store backend: airtable, sqlite or memory
    #[serde(default = "default_store")]
    pub store: String,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Post source: reddit or stub
    #[serde(default = "default_source_provider")]
    pub provider: String,

    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Keyword search terms; empty means read each channel's newest posts
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages_per_channel: u32,

    #[serde(default = "default_source_retries")]
    pub retries: u32,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// JSON array of posts read by the stub provider
    #[serde(default)]
    pub stub_posts_file: Option<PathBuf>,

    #[serde(default)]
    pub reddit: RedditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_client_id_env")]
    pub client_id_env: String,

    #[serde(default = "default_reddit_client_secret_env")]
    pub client_secret_env: String,

    #[serde(default = "default_reddit_username_env")]
    pub username_env: String,

    #[serde(default = "default_reddit_password_env")]
    pub password_env: String,

    /// Env var that overrides `user_agent` when set
    #[serde(default = "default_reddit_user_agent_env")]
    pub user_agent_env: String,

    #[serde(default = "default_reddit_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_service_area")]
    pub service_area: String,

    #[serde(default = "default_agency_description")]
    pub agency_description: String,

    /// Minimum score that qualifies a lead for outreach
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Inference provider: openai, openai_compat, anthropic or stub
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub openai_compat: OpenAiCompatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    #[serde(default)]
    pub api_key_env: String,

    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtableConfig {
    #[serde(default = "default_airtable_base_id_env")]
    pub base_id_env: String,

    #[serde(default = "default_airtable_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_leads_table")]
    pub leads_table: String,

    #[serde(default = "default_log_table")]
    pub log_table: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Reply template; `{username}`, `{title}`, `{score}` and `{post_url}` are substituted
    #[serde(default)]
    pub template: Option<String>,

    /// 0 disables the limit
    #[serde(default)]
    pub per_minute: u32,

    /// 0 disables the limit
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    /// First back-off when the platform rate-limits without saying how long
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,
}

// Default value functions
fn default_store() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./carelead.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    50
}

fn default_store_retries() -> u32 {
    2
}

fn default_source_provider() -> String {
    "reddit".to_string()
}

fn default_channels() -> Vec<String> {
    ["Connecticut", "NewHaven", "caregivers", "HomeHealth", "agingparents"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_keywords() -> Vec<String> {
    ["caregiver", "pca", "companion", "home care", "homemaker"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    4
}

fn default_source_retries() -> u32 {
    2
}

fn default_http_timeout() -> u64 {
    30
}

fn default_reddit_client_id_env() -> String {
    "REDDIT_CLIENT_ID".to_string()
}

fn default_reddit_client_secret_env() -> String {
    "REDDIT_CLIENT_SECRET".to_string()
}

fn default_reddit_username_env() -> String {
    "REDDIT_USERNAME".to_string()
}

fn default_reddit_password_env() -> String {
    "REDDIT_PASSWORD".to_string()
}

fn default_reddit_user_agent_env() -> String {
    "REDDIT_USER_AGENT".to_string()
}

fn default_reddit_user_agent() -> String {
    format!("carelead/{}", env!("CARGO_PKG_VERSION"))
}

fn default_service_area() -> String {
    "New Haven County, Connecticut".to_string()
}

fn default_agency_description() -> String {
    "a home care agency that provides PCA (Personal Care Assistant) and Homemaker Companion services"
        .to_string()
}

fn default_threshold() -> u8 {
    80
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_llm_timeout() -> u64 {
    45
}

fn default_llm_retries() -> u32 {
    2
}

fn default_max_output_tokens() -> u32 {
    150
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_airtable_base_id_env() -> String {
    "AIRTABLE_BASE_ID".to_string()
}

fn default_airtable_api_key_env() -> String {
    "AIRTABLE_API_KEY".to_string()
}

fn default_leads_table() -> String {
    "Leads".to_string()
}

fn default_log_table() -> String {
    "Outreach Log".to_string()
}

fn default_per_hour() -> u32 {
    20
}

fn default_min_interval() -> u64 {
    30
}

fn default_rate_limit_retries() -> u32 {
    5
}

fn default_rate_limit_backoff() -> u64 {
    60
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            sqlite_path: default_sqlite_path(),
            log_level: default_log_level(),
            dry_run: default_true(),
            limit: default_limit(),
            store_retries: default_store_retries(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_source_provider(),
            channels: default_channels(),
            keywords: default_keywords(),
            page_size: default_page_size(),
            max_pages_per_channel: default_max_pages(),
            retries: default_source_retries(),
            timeout_secs: default_http_timeout(),
            stub_posts_file: None,
            reddit: RedditConfig::default(),
        }
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id_env: default_reddit_client_id_env(),
            client_secret_env: default_reddit_client_secret_env(),
            username_env: default_reddit_username_env(),
            password_env: default_reddit_password_env(),
            user_agent_env: default_reddit_user_agent_env(),
            user_agent: default_reddit_user_agent(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            service_area: default_service_area(),
            agency_description: default_agency_description(),
            threshold: default_threshold(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            retries: default_llm_retries(),
            max_output_tokens: default_max_output_tokens(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            openai_compat: OpenAiCompatConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_api_key_env(),
            base_url: default_openai_base_url(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_anthropic_api_key_env(),
        }
    }
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base_id_env: default_airtable_base_id_env(),
            api_key_env: default_airtable_api_key_env(),
            leads_table: default_leads_table(),
            log_table: default_log_table(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            template: None,
            per_minute: 0,
            per_hour: default_per_hour(),
            min_interval_secs: default_min_interval(),
            rate_limit_retries: default_rate_limit_retries(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let default_path = PathBuf::from("./carelead.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CARELEAD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# carelead configuration

[general]
store = "sqlite"  # sqlite, airtable, memory
sqlite_path = "./carelead.sqlite"
log_level = "info"
# Score and store leads but never send replies
dry_run = true
limit = 50
store_retries = 2

[source]
provider = "reddit"  # reddit, stub
channels = ["Connecticut", "NewHaven", "caregivers", "HomeHealth", "agingparents"]
# Leave empty to read each channel's newest posts instead of searching
keywords = ["caregiver", "pca", "companion", "home care", "homemaker"]
page_size = 100
max_pages_per_channel = 4
retries = 2
timeout_secs = 30
# stub_posts_file = "./posts.json"

[source.reddit]
client_id_env = "REDDIT_CLIENT_ID"
client_secret_env = "REDDIT_CLIENT_SECRET"
# Username and password are only needed for outreach
username_env = "REDDIT_USERNAME"
password_env = "REDDIT_PASSWORD"
user_agent_env = "REDDIT_USER_AGENT"
user_agent = "carelead/0.1"

[scoring]
service_area = "New Haven County, Connecticut"
agency_description = "a home care agency that provides PCA (Personal Care Assistant) and Homemaker Companion services"
threshold = 80

[llm]
provider = "openai"  # openai, openai_compat, anthropic, stub
model = "gpt-3.5-turbo-0125"
temperature = 0.3
timeout_secs = 45
retries = 2
max_output_tokens = 150

[llm.openai]
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com/v1"

[llm.anthropic]
api_key_env = "ANTHROPIC_API_KEY"

[llm.openai_compat]
api_key_env = "LLM_API_KEY"
base_url = "https://your-provider.com/v1"

[airtable]
base_id_env = "AIRTABLE_BASE_ID"
api_key_env = "AIRTABLE_API_KEY"
leads_table = "Leads"
log_table = "Outreach Log"
timeout_secs = 30

[outreach]
enabled = false
# template = "Hi {username}! Saw your post \"{title}\". We provide in-home care nearby and would be glad to help."
# 0 disables a limit
per_minute = 0
per_hour = 20
min_interval_secs = 30
rate_limit_retries = 5
rate_limit_backoff_secs = 60
"#
        .to_string()
    }
}
