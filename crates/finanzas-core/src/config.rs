// Configuration loading and parsing (finanzas.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::context::ContextSettings;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub context: ContextSettings,
    pub ui: UiConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// finanzas.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire finanzas.toml file.
#[derive(Debug, Clone, Deserialize)]
struct FinanzasFile {
    backend: BackendConfig,
    llm: LlmConfig,
    #[serde(default)]
    context: ContextSettings,
    #[serde(default)]
    ui: UiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted Supabase project (GoTrue + PostgREST).
    Supabase,
    /// SQLite file on this machine.
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Supabase project URL, e.g. `https://abc.supabase.co`.
    #[serde(default)]
    pub url: String,
    /// SQLite database path used by the local backend.
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

fn default_local_path() -> String {
    "finanzas.db".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::Supabase,
            url: String::new(),
            local_path: default_local_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Conversation messages sent along with the system prompt.
    pub history_limit: usize,
    pub analysis_model: String,
    pub analysis_max_tokens: u32,
}

/// Mirrors `defaults/finanzas.toml`.
impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            max_tokens: 500,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
            history_limit: 10,
            analysis_model: "gpt-4.1-nano".into(),
            analysis_max_tokens: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    /// Show amounts on startup; the user can toggle this at runtime.
    #[serde(default = "default_true")]
    pub show_values: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig { show_values: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub supabase_anon_key: Option<String>,
    /// Service-role key; only the admin tool needs it.
    pub supabase_service_key: Option<String>,
    pub openai_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/finanzas.toml` and
/// (optionally) `config/credentials.toml`, both relative to `base_dir`.
///
/// Does not copy defaults or read the environment; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- finanzas.toml (required) ---
    let main_path = config_dir.join("finanzas.toml");
    let main_text = read_file(&main_path)?;
    let file: FinanzasFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        backend: file.backend,
        llm: file.llm,
        context: file.context,
        ui: file.ui,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory: copy defaults,
/// parse the files, then apply environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

/// Override URLs and keys from the environment. Each setting accepts a plain
/// name and its `VITE_`-prefixed variant; the plain name wins.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(name)
            .or_else(|| lookup(&format!("VITE_{name}")))
            .filter(|v| !v.trim().is_empty())
    };

    if let Some(url) = get("SUPABASE_URL") {
        config.backend.url = url;
    }
    if let Some(key) = get("SUPABASE_ANON_KEY") {
        config.credentials.supabase_anon_key = Some(key);
    }
    if let Some(key) = get("SUPABASE_SERVICE_KEY") {
        config.credentials.supabase_service_key = Some(key);
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.credentials.openai_api_key = Some(key);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.backend.kind == BackendKind::Local && config.backend.local_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "backend.local_path".into(),
            message: "must not be empty for the local backend".into(),
        });
    }

    let url = config.backend.url.trim();
    if config.backend.kind == BackendKind::Supabase
        && !url.is_empty()
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(ConfigError::ValidationError {
            field: "backend.url".into(),
            message: format!("must be an http(s) URL, got {url}"),
        });
    }

    let llm = &config.llm;
    if llm.model.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "llm.model".into(),
            message: "must not be empty".into(),
        });
    }
    let token_fields: &[(&str, u32)] = &[
        ("llm.max_tokens", llm.max_tokens),
        ("llm.analysis_max_tokens", llm.analysis_max_tokens),
    ];
    for (name, val) in token_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::ValidationError {
            field: "llm.temperature".into(),
            message: format!("must be between 0.0 and 2.0 inclusive, got {}", llm.temperature),
        });
    }
    let penalty_fields: &[(&str, f32)] = &[
        ("llm.presence_penalty", llm.presence_penalty),
        ("llm.frequency_penalty", llm.frequency_penalty),
    ];
    for (name, val) in penalty_fields {
        if !(-2.0..=2.0).contains(val) {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must be between -2.0 and 2.0 inclusive, got {val}"),
            });
        }
    }
    if llm.history_limit == 0 {
        return Err(ConfigError::ValidationError {
            field: "llm.history_limit".into(),
            message: "must be > 0".into(),
        });
    }

    let ctx = &config.context;
    let context_fields: &[(&str, usize)] = &[
        ("context.transaction_limit", ctx.transaction_limit),
        ("context.average_months", ctx.average_months as usize),
        ("context.trend_months", ctx.trend_months as usize),
    ];
    for (name, val) in context_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
