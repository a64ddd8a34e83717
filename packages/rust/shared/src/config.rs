//! Application configuration for NewsRouter.
//!
//! User config lives at `~/.newsrouter/newsrouter.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NewsRouterError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsrouter.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsrouter";

// ---------------------------------------------------------------------------
// Config structs (matching newsrouter.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Live retrieval settings.
    #[serde(default)]
    pub reddit: RedditConfig,

    /// Category set used by the classification stage.
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// External reasoning bridge.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Extra or overriding stage definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,

    /// Extra fallback headlines per source, merged over the built-in table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fallback: BTreeMap<String, Vec<String>>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Sources fetched when a request names none.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Default maximum items per source.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            limit: default_limit(),
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["worldnews".into(), "news".into(), "sports".into()]
}
fn default_limit() -> usize {
    3
}

/// `[reddit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    /// Name of the env var holding the OAuth client id (never store the value itself).
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    /// Name of the env var holding the OAuth client secret.
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// Name of the env var holding the user-agent string.
    #[serde(default = "default_user_agent_env")]
    pub user_agent_env: String,

    /// OAuth token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Authenticated API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// HTTP timeout for each live request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            user_agent_env: default_user_agent_env(),
            token_url: default_token_url(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_client_id_env() -> String {
    "REDDIT_CLIENT_ID".into()
}
fn default_client_secret_env() -> String {
    "REDDIT_CLIENT_SECRET".into()
}
fn default_user_agent_env() -> String {
    "REDDIT_USER_AGENT".into()
}
fn default_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".into()
}
fn default_api_base() -> String {
    "https://oauth.reddit.com".into()
}
fn default_timeout_secs() -> u64 {
    10
}

/// `[classification]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Recognised category labels.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Bucket for items whose label is missing or unrecognised.
    #[serde(default = "default_uncategorized")]
    pub uncategorized_label: String,

    /// Keyword hints per category, used by the offline stub reasoner.
    #[serde(default = "default_keywords")]
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            uncategorized_label: default_uncategorized(),
            keywords: default_keywords(),
        }
    }
}

fn default_categories() -> Vec<String> {
    [
        "politics",
        "technology",
        "business",
        "science",
        "entertainment",
        "sports",
        "health",
        "environment",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_uncategorized() -> String {
    "uncategorized".into()
}
fn default_keywords() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 8] = [
        (
            "politics",
            &["election", "senate", "government", "policy", "peace talks", "supreme court", "bill", "president", "minister", "refugee"],
        ),
        (
            "technology",
            &["ai", "chip", "software", "tech", "rust", "engine", "cyber", "unity", "unreal", "godot"],
        ),
        (
            "business",
            &["trade", "market", "economy", "contract", "industry", "stocks", "merger"],
        ),
        ("science", &["research", "space", "study", "scientists"]),
        ("entertainment", &["film", "movie", "music", "celebrity", "cinematic"]),
        ("sports", &["championship", "player", "olympic", "coach", "playoff", "team"]),
        ("health", &["fda", "treatment", "disease", "vaccine", "hospital"]),
        ("environment", &["climate", "heatwave", "emissions", "wildfire", "conservation"]),
    ];
    table
        .into_iter()
        .map(|(cat, words)| {
            (
                cat.to_string(),
                words.iter().map(|w| (*w).to_string()).collect(),
            )
        })
        .collect()
}

/// `[bridge]` section: subprocess speaking the JSON-lines reasoning protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Command to launch (e.g., "bun"). Unset means use the offline stub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the bridge subprocess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

/// Input/output shape contract of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageShape {
    /// ItemSet → ItemSet, same keys.
    PassThrough,
    /// ItemSet → CategorizedItemSet.
    Splitting,
    /// CategorizedItemSet + category → ItemSet.
    Selective,
}

/// `[[stages]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage identifier used in requests.
    pub id: String,
    pub shape: StageShape,
    /// Target category (selective stages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Instruction handed to the reasoning capability.
    #[serde(default)]
    pub instruction: String,
}

// ---------------------------------------------------------------------------
// Credentials (runtime, resolved once from the environment)
// ---------------------------------------------------------------------------

/// Live retrieval credentials. Present only when all three values are set.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Read the three credential env vars named in `config`.
///
/// Returns the names of any missing (unset or empty) variables as the error
/// value so the caller can log a configuration warning.
pub fn resolve_credentials(
    config: &RedditConfig,
) -> std::result::Result<RedditCredentials, Vec<String>> {
    let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    let client_id = read(&config.client_id_env);
    let client_secret = read(&config.client_secret_env);
    let user_agent = read(&config.user_agent_env);

    match (client_id, client_secret, user_agent) {
        (Some(client_id), Some(client_secret), Some(user_agent)) => Ok(RedditCredentials {
            client_id,
            client_secret,
            user_agent,
        }),
        (id, secret, agent) => {
            let mut missing = Vec::new();
            if id.is_none() {
                missing.push(config.client_id_env.clone());
            }
            if secret.is_none() {
                missing.push(config.client_secret_env.clone());
            }
            if agent.is_none() {
                missing.push(config.user_agent_env.clone());
            }
            Err(missing)
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsrouter/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsRouterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsrouter/newsrouter.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsRouterError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        NewsRouterError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs that could never produce a valid run.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.limit == 0 {
        return Err(NewsRouterError::config("defaults.limit must be at least 1"));
    }
    if config.defaults.sources.iter().all(|s| s.trim().is_empty()) {
        return Err(NewsRouterError::config(
            "defaults.sources must name at least one source",
        ));
    }
    for stage in &config.stages {
        if stage.shape == StageShape::Selective && stage.category.is_none() {
            return Err(NewsRouterError::config(format!(
                "stage '{}' is selective but names no category",
                stage.id
            )));
        }
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsRouterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsRouterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsRouterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
